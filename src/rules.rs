//! Validated mock rules.
//!
//! [`validate_rules`] turns the raw mocks of a configuration into an
//! immutable [`RuleSet`]. Validation is fail-fast: the first invalid mock
//! aborts with a [`ConfigError`] and no partial rule set is produced.
//! Templates are parsed and body files are read here, once, so nothing can
//! go missing at request time.

use crate::config::{RawDelay, RawResponse, RawRule};
use crate::error::ConfigError;
use crate::path::{self, CompiledPath};
use bytes::Bytes;
use handlebars::Template;
use hyper::header::{HeaderName, HeaderValue};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// The HTTP verbs a mock may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
}

impl Verb {
    /// Parse an uppercase verb. Matching is case-sensitive.
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "GET" => Some(Verb::Get),
            "HEAD" => Some(Verb::Head),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            "CONNECT" => Some(Verb::Connect),
            "OPTIONS" => Some(Verb::Options),
            "TRACE" => Some(Verb::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Connect => "CONNECT",
            Verb::Options => "OPTIONS",
            Verb::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named regex predicate over a header or query value.
#[derive(Debug, Clone)]
pub struct ValueMatcher {
    /// Header names are stored lower-cased; query keys as declared
    pub key: String,
    pub regex: Regex,
}

/// Where a response body comes from.
#[derive(Debug, Clone)]
pub enum ResponseSource {
    /// Template text, rendered per request
    Template(Template),
    /// Body text without template syntax, emitted as is
    Literal(Bytes),
    /// File contents read at validation time
    File(Bytes),
}

/// Latency bounds in milliseconds, `min_millis <= max_millis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    pub min_millis: u64,
    pub max_millis: u64,
}

/// Validated response recipe.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub source: ResponseSource,
    pub delay: Option<Delay>,
}

/// A validated mock.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub verb: Verb,
    pub path: CompiledPath,
    pub header_matchers: Vec<ValueMatcher>,
    pub query_matchers: Vec<ValueMatcher>,
    pub response: ResponseSpec,
}

/// All rules of a running server, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look up a rule by its exact name.
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Source of response body files.
pub trait ContentLoader {
    fn load(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads body files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl ContentLoader for FsLoader {
    fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Validate raw mocks in order and build the rule set.
pub fn validate_rules(raw: &[RawRule], loader: &dyn ContentLoader) -> Result<RuleSet, ConfigError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rules = Vec::with_capacity(raw.len());

    for (index, mock) in raw.iter().enumerate() {
        let name = mock.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName { index });
        }
        if let Some(&first) = seen.get(name) {
            return Err(ConfigError::DuplicateName {
                name: name.to_string(),
                first,
                second: index,
            });
        }
        seen.insert(name.to_string(), index);

        let rule = validate_rule(name, mock, loader)?;
        debug!(
            rule = %rule.name,
            verb = %rule.verb,
            path = %rule.path,
            prefix = rule.path.is_prefix(),
            "Validated mock"
        );
        rules.push(rule);
    }

    Ok(RuleSet { rules })
}

fn validate_rule(name: &str, mock: &RawRule, loader: &dyn ContentLoader) -> Result<Rule, ConfigError> {
    let request = mock.request.as_ref().ok_or_else(|| ConfigError::MissingRequest {
        name: name.to_string(),
    })?;

    let raw_path = request
        .path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingPath {
            name: name.to_string(),
        })?;
    let path = path::compile(raw_path).map_err(|source| ConfigError::InvalidPath {
        name: name.to_string(),
        source,
    })?;

    // Blank means missing; anything else is looked up untrimmed.
    let verb = match request.verb.as_deref() {
        None => {
            return Err(ConfigError::MissingVerb {
                name: name.to_string(),
            })
        }
        Some(v) if v.trim().is_empty() => {
            return Err(ConfigError::MissingVerb {
                name: name.to_string(),
            })
        }
        Some(v) => Verb::parse(v).ok_or_else(|| ConfigError::InvalidVerb {
            name: name.to_string(),
            verb: v.to_string(),
        })?,
    };

    let mut header_matchers = Vec::with_capacity(request.headers.len());
    for (key, pattern) in &request.headers {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidHeaderPattern {
            name: name.to_string(),
            key: key.clone(),
            pattern: pattern.clone(),
            source,
        })?;
        header_matchers.push(ValueMatcher {
            key: key.to_ascii_lowercase(),
            regex,
        });
    }

    let mut query_matchers = Vec::with_capacity(request.queries.len());
    for (key, pattern) in &request.queries {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidQueryPattern {
            name: name.to_string(),
            key: key.clone(),
            pattern: pattern.clone(),
            source,
        })?;
        query_matchers.push(ValueMatcher {
            key: key.clone(),
            regex,
        });
    }

    let response = mock.response.as_ref().ok_or_else(|| ConfigError::MissingResponse {
        name: name.to_string(),
    })?;

    Ok(Rule {
        name: name.to_string(),
        verb,
        path,
        header_matchers,
        query_matchers,
        response: validate_response(name, response, loader)?,
    })
}

fn validate_response(
    name: &str,
    response: &RawResponse,
    loader: &dyn ContentLoader,
) -> Result<ResponseSpec, ConfigError> {
    let status = match response.status.unwrap_or(0) {
        0 => 200,
        s if (100..=599).contains(&s) => s as u16,
        s => {
            return Err(ConfigError::InvalidStatus {
                name: name.to_string(),
                status: s,
            })
        }
    };

    let mut headers = Vec::with_capacity(response.headers.len());
    for (key, value) in &response.headers {
        let valid = HeaderName::from_bytes(key.as_bytes()).is_ok() && HeaderValue::from_str(value).is_ok();
        if !valid {
            return Err(ConfigError::InvalidResponseHeader {
                name: name.to_string(),
                key: key.clone(),
            });
        }
        headers.push((key.clone(), value.clone()));
    }

    // A file must be readable even when a body is also given; the body is served.
    let file_content = match &response.file {
        Some(file) => Some(loader.load(file).map_err(|source| ConfigError::UnreadableFile {
            name: name.to_string(),
            path: file.display().to_string(),
            source,
        })?),
        None => None,
    };

    let source = match (&response.body, file_content) {
        (Some(text), _) => compile_body(name, text)?,
        (None, Some(content)) => ResponseSource::File(Bytes::from(content)),
        (None, None) => {
            return Err(ConfigError::MissingResponseSource {
                name: name.to_string(),
            })
        }
    };

    let delay = response
        .delay
        .as_ref()
        .map(|d| validate_delay(name, d))
        .transpose()?;

    Ok(ResponseSpec {
        status,
        headers,
        source,
        delay,
    })
}

fn compile_body(name: &str, text: &str) -> Result<ResponseSource, ConfigError> {
    if !text.contains("{{") {
        return Ok(ResponseSource::Literal(Bytes::copy_from_slice(text.as_bytes())));
    }
    let template = Template::compile(text).map_err(|e| ConfigError::InvalidTemplate {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(ResponseSource::Template(template))
}

fn validate_delay(name: &str, delay: &RawDelay) -> Result<Delay, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDelay {
        name: name.to_string(),
        reason,
    };
    if delay.min_millis < 0 {
        return Err(invalid(format!("min_millis {} is negative", delay.min_millis)));
    }
    if delay.max_millis < 0 {
        return Err(invalid(format!("max_millis {} is negative", delay.max_millis)));
    }
    if delay.max_millis < delay.min_millis {
        return Err(invalid(format!(
            "max_millis {} is less than min_millis {}",
            delay.max_millis, delay.min_millis
        )));
    }
    Ok(Delay {
        min_millis: delay.min_millis as u64,
        max_millis: delay.max_millis as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawRequest;
    use std::path::PathBuf;

    /// In-memory body files.
    #[derive(Default)]
    struct MemoryLoader {
        files: HashMap<PathBuf, Vec<u8>>,
    }

    impl MemoryLoader {
        fn with(path: &str, content: &[u8]) -> Self {
            let mut files = HashMap::new();
            files.insert(PathBuf::from(path), content.to_vec());
            Self { files }
        }
    }

    impl ContentLoader for MemoryLoader {
        fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn make_raw(name: &str, path: &str, verb: &str, body: &str) -> RawRule {
        RawRule {
            name: name.to_string(),
            request: Some(RawRequest {
                path: Some(path.to_string()),
                verb: Some(verb.to_string()),
                ..Default::default()
            }),
            response: Some(RawResponse {
                body: Some(body.to_string()),
                ..Default::default()
            }),
        }
    }

    fn validate_one(raw: RawRule) -> Result<RuleSet, ConfigError> {
        validate_rules(&[raw], &MemoryLoader::default())
    }

    #[test]
    fn test_valid_rule() {
        let rules = validate_one(make_raw("  hello_world ", "/hello", "GET", "world")).unwrap();
        let rule = rules.get("hello_world").unwrap();
        assert_eq!(rule.verb, Verb::Get);
        assert_eq!(rule.path.normalized(), "/hello");
        assert_eq!(rule.response.status, 200);
        assert!(matches!(&rule.response.source, ResponseSource::Literal(b) if b.as_ref() == b"world"));
    }

    #[test]
    fn test_template_body_compiled() {
        let rules = validate_one(make_raw("t", "/users/{id}", "GET", "user {{path_vars.id}}")).unwrap();
        let rule = rules.iter().next().unwrap();
        assert!(matches!(rule.response.source, ResponseSource::Template(_)));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = validate_one(make_raw("   ", "/hello", "GET", "world")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyName { index: 0 }));
    }

    #[test]
    fn test_duplicate_names_cite_both_indices() {
        let raw = vec![
            make_raw("dup", "/a", "GET", "a"),
            make_raw("other", "/b", "GET", "b"),
            make_raw(" dup ", "/c", "GET", "c"),
        ];
        let err = validate_rules(&raw, &MemoryLoader::default()).unwrap_err();
        match err {
            ConfigError::DuplicateName { name, first, second } => {
                assert_eq!(name, "dup");
                assert_eq!((first, second), (0, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let raw = vec![make_raw("Dup", "/a", "GET", "a"), make_raw("dup", "/b", "GET", "b")];
        assert_eq!(validate_rules(&raw, &MemoryLoader::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_sections() {
        let mut raw = make_raw("no_request", "/a", "GET", "a");
        raw.request = None;
        assert!(matches!(validate_one(raw), Err(ConfigError::MissingRequest { .. })));

        let mut raw = make_raw("no_response", "/a", "GET", "a");
        raw.response = None;
        assert!(matches!(validate_one(raw), Err(ConfigError::MissingResponse { .. })));

        let mut raw = make_raw("no_path", "/a", "GET", "a");
        raw.request.as_mut().unwrap().path = None;
        assert!(matches!(validate_one(raw), Err(ConfigError::MissingPath { .. })));
    }

    #[test]
    fn test_path_errors_propagate() {
        let err = validate_one(make_raw("bad", "/a/**/b", "GET", "x")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPath {
                source: crate::error::PathError::BadDoubleWildcardPlacement { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_verbs() {
        for verb in ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE"] {
            assert!(validate_one(make_raw("v", "/a", verb, "x")).is_ok(), "{verb}");
        }
        assert!(matches!(
            validate_one(make_raw("v", "/a", "get", "x")),
            Err(ConfigError::InvalidVerb { .. })
        ));
        assert!(matches!(
            validate_one(make_raw("v", "/a", "FETCH", "x")),
            Err(ConfigError::InvalidVerb { .. })
        ));
        assert!(matches!(
            validate_one(make_raw("v", "/a", " GET ", "x")),
            Err(ConfigError::InvalidVerb { verb, .. }) if verb == " GET "
        ));
        assert!(matches!(
            validate_one(make_raw("v", "/a", " ", "x")),
            Err(ConfigError::MissingVerb { .. })
        ));
    }

    #[test]
    fn test_bad_regexes_rejected() {
        let mut raw = make_raw("h", "/a", "GET", "x");
        raw.request
            .as_mut()
            .unwrap()
            .headers
            .insert("Origin".to_string(), "(unclosed".to_string());
        assert!(matches!(
            validate_one(raw),
            Err(ConfigError::InvalidHeaderPattern { key, .. }) if key == "Origin"
        ));

        let mut raw = make_raw("q", "/a", "GET", "x");
        raw.request
            .as_mut()
            .unwrap()
            .queries
            .insert("page".to_string(), "[".to_string());
        assert!(matches!(
            validate_one(raw),
            Err(ConfigError::InvalidQueryPattern { key, .. }) if key == "page"
        ));
    }

    #[test]
    fn test_header_matcher_names_lowercased() {
        let mut raw = make_raw("h", "/a", "GET", "x");
        raw.request
            .as_mut()
            .unwrap()
            .headers
            .insert("X-Tenant".to_string(), "^acme$".to_string());
        let rules = validate_one(raw).unwrap();
        assert_eq!(rules.get("h").unwrap().header_matchers[0].key, "x-tenant");
    }

    #[test]
    fn test_status_bounds() {
        let with_status = |status: i64| {
            let mut raw = make_raw("s", "/a", "GET", "x");
            raw.response.as_mut().unwrap().status = Some(status);
            validate_one(raw)
        };

        assert_eq!(with_status(0).unwrap().get("s").unwrap().response.status, 200);
        assert_eq!(with_status(100).unwrap().get("s").unwrap().response.status, 100);
        assert_eq!(with_status(599).unwrap().get("s").unwrap().response.status, 599);
        assert!(matches!(with_status(999), Err(ConfigError::InvalidStatus { status: 999, .. })));
        assert!(matches!(with_status(99), Err(ConfigError::InvalidStatus { .. })));
        assert!(matches!(with_status(-1), Err(ConfigError::InvalidStatus { .. })));
    }

    #[test]
    fn test_missing_body_and_file_rejected() {
        let mut raw = make_raw("empty", "/a", "GET", "x");
        raw.response.as_mut().unwrap().body = None;
        assert!(matches!(
            validate_one(raw),
            Err(ConfigError::MissingResponseSource { .. })
        ));
    }

    #[test]
    fn test_file_body_read_eagerly() {
        let mut raw = make_raw("file", "/a", "GET", "x");
        let response = raw.response.as_mut().unwrap();
        response.body = None;
        response.file = Some(PathBuf::from("/fixtures/payload.json"));

        let loader = MemoryLoader::with("/fixtures/payload.json", b"{\"id\":1}");
        let rules = validate_rules(&[raw.clone()], &loader).unwrap();
        assert!(matches!(
            &rules.get("file").unwrap().response.source,
            ResponseSource::File(b) if b.as_ref() == b"{\"id\":1}"
        ));

        let err = validate_rules(&[raw], &MemoryLoader::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableFile { .. }));
    }

    #[test]
    fn test_body_takes_precedence_over_file() {
        let mut raw = make_raw("both", "/a", "GET", "inline");
        raw.response.as_mut().unwrap().file = Some(PathBuf::from("/data/payload.json"));
        let loader = MemoryLoader::with("/data/payload.json", b"{}");
        let rules = validate_rules(&[raw], &loader).unwrap();
        assert!(matches!(
            &rules.get("both").unwrap().response.source,
            ResponseSource::Literal(b) if b.as_ref() == b"inline"
        ));
    }

    #[test]
    fn test_unreadable_file_rejected_even_with_body() {
        let mut raw = make_raw("both", "/a", "GET", "inline");
        raw.response.as_mut().unwrap().file = Some(PathBuf::from("/missing"));
        assert!(matches!(
            validate_one(raw),
            Err(ConfigError::UnreadableFile { name, path, .. }) if name == "both" && path == "/missing"
        ));
    }

    #[test]
    fn test_bad_template_rejected() {
        let err = validate_one(make_raw("tpl", "/a", "GET", "{{#if x}}unclosed")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_invalid_response_header_rejected() {
        let mut raw = make_raw("hdr", "/a", "GET", "x");
        raw.response
            .as_mut()
            .unwrap()
            .headers
            .insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            validate_one(raw),
            Err(ConfigError::InvalidResponseHeader { .. })
        ));
    }

    #[test]
    fn test_delay_bounds() {
        let with_delay = |min_millis: i64, max_millis: i64| {
            let mut raw = make_raw("d", "/a", "GET", "x");
            raw.response.as_mut().unwrap().delay = Some(RawDelay {
                min_millis,
                max_millis,
            });
            validate_one(raw)
        };

        let rules = with_delay(100, 100).unwrap();
        assert_eq!(
            rules.get("d").unwrap().response.delay,
            Some(Delay {
                min_millis: 100,
                max_millis: 100
            })
        );
        assert!(matches!(with_delay(-1, 10), Err(ConfigError::InvalidDelay { .. })));
        assert!(matches!(with_delay(0, -1), Err(ConfigError::InvalidDelay { .. })));
        assert!(matches!(with_delay(20, 10), Err(ConfigError::InvalidDelay { .. })));
    }

    #[test]
    fn test_first_error_wins() {
        let raw = vec![
            make_raw("ok", "/a", "GET", "a"),
            make_raw("bad_verb", "/b", "NOPE", "b"),
            make_raw("", "/c", "GET", "c"),
        ];
        let err = validate_rules(&raw, &MemoryLoader::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVerb { .. }));
    }
}
