//! Mockingbird
//!
//! A configuration-driven HTTP mock server. Mocks are declared in YAML,
//! validated once at startup and then matched against every incoming
//! request; the first matching mock answers with a literal body, a file or
//! a Handlebars template.
//!
//! # Features
//!
//! - **Path Patterns**: Literals, `{name}` variables, `*` wildcards and a trailing `**`
//! - **Request Matching**: Match by verb, path, header and query regexes
//! - **Dynamic Templates**: Handlebars bodies with request data and fake values
//! - **Reproducible Randomness**: One seeded stream shared by all templates
//! - **Latency Simulation**: Per-mock delays that only hold the delayed request
//! - **Request Log**: Every request recorded as a JSON line
//!
//! # Example Configuration
//!
//! ```yaml
//! mocks:
//!   - name: hello_world
//!     request:
//!       path: /hello
//!       verb: GET
//!     response:
//!       status: 200
//!       body: |
//!         world
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod mock;
pub mod path;
pub mod random;
pub mod request;
pub mod responder;
pub mod rules;
pub mod server;
pub mod template;

pub use config::MockServerConfig;
pub use error::{ConfigError, PathError};
pub use matcher::{find_match, MatchResult};
pub use mock::MockServer;
pub use random::RandomContext;
pub use request::InboundRequest;
pub use responder::ResolvedResponse;
pub use rules::{validate_rules, FsLoader, RuleSet};
pub use server::HttpServer;
