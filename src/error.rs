//! Load-time error types.
//!
//! Everything here is fatal at startup. Request-time failures never surface
//! as errors; they are turned into HTTP responses by the responder.

use thiserror::Error;

/// A malformed path specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path \"{path}\" must start with \"/\"")]
    MustStartWithSlash { path: String },

    #[error("empty path element at position {index} in \"{path}\"; only a trailing element may be empty")]
    EmptySegment { path: String, index: usize },

    #[error("bad path element \"{segment}\" in \"{path}\"; \"**\" must be a whole element and only at the end of the path")]
    BadDoubleWildcardPlacement { path: String, segment: String },

    #[error("bad path element \"{segment}\" in \"{path}\"; \"*\" must be a whole element")]
    BadWildcardPlacement { path: String, segment: String },

    #[error("bad path element \"{segment}\" in \"{path}\"; variables must be of the form \"{{name}}\"")]
    BadVariableSyntax { path: String, segment: String },
}

/// A rule-level or settings-level validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid empty name for mock at index {index}")]
    EmptyName { index: usize },

    #[error("mock with name \"{name}\" already exists at index {first}, duplicate at index {second}")]
    DuplicateName {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("request section missing for mock \"{name}\"")]
    MissingRequest { name: String },

    #[error("request path missing or empty for mock \"{name}\"")]
    MissingPath { name: String },

    #[error("invalid path for mock \"{name}\": {source}")]
    InvalidPath {
        name: String,
        #[source]
        source: PathError,
    },

    #[error("missing or empty verb for mock \"{name}\"; verb can only be (GET|HEAD|POST|PUT|PATCH|DELETE|CONNECT|OPTIONS|TRACE)")]
    MissingVerb { name: String },

    #[error("invalid verb \"{verb}\" for mock \"{name}\"; verb can only be (GET|HEAD|POST|PUT|PATCH|DELETE|CONNECT|OPTIONS|TRACE)")]
    InvalidVerb { name: String, verb: String },

    #[error("invalid request header regex \"{pattern}\" for header \"{key}\" in mock \"{name}\": {source}")]
    InvalidHeaderPattern {
        name: String,
        key: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid request query regex \"{pattern}\" for key \"{key}\" in mock \"{name}\": {source}")]
    InvalidQueryPattern {
        name: String,
        key: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("response section missing for mock \"{name}\"")]
    MissingResponse { name: String },

    #[error("status code is {status}, should be 100 <= status <= 599 for mock \"{name}\"")]
    InvalidStatus { name: String, status: i64 },

    #[error("invalid response header \"{key}\" for mock \"{name}\"")]
    InvalidResponseHeader { name: String, key: String },

    #[error("response section missing body/file for mock \"{name}\"; at least one should be present")]
    MissingResponseSource { name: String },

    #[error("error parsing template for mock \"{name}\": {message}")]
    InvalidTemplate { name: String, message: String },

    #[error("error reading content from \"{path}\" for mock \"{name}\": {source}")]
    UnreadableFile {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid delay for mock \"{name}\": {reason}")]
    InvalidDelay { name: String, reason: String },

    #[error("listen_addr missing or empty in settings")]
    MissingListenAddr,

    #[error("listen_addr \"{addr}\" should be \"<host>:<port>\"")]
    InvalidListenAddr { addr: String },

    #[error("0 mocks configured, configure at least one mock")]
    NoMocks,
}
