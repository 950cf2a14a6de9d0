//! Mock server core.
//!
//! Owns the validated rules, the responder and the shared random stream,
//! and answers transport-neutral requests.

use crate::config::{MockServerConfig, ServerSettings};
use crate::error::ConfigError;
use crate::matcher::find_match;
use crate::random::RandomContext;
use crate::request::InboundRequest;
use crate::responder::{ResolvedResponse, Responder};
use crate::rules::{ContentLoader, RuleSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers requests from a validated rule set.
///
/// Safe to share between concurrently handled requests: the rule set is
/// read-only and the random stream serializes its own draws.
pub struct MockServer {
    settings: ServerSettings,
    rules: RuleSet,
    responder: Responder,
    /// Total requests handled.
    requests_total: AtomicU64,
    /// Requests answered by a mock.
    requests_matched: AtomicU64,
    /// Requests no mock matched.
    requests_unmatched: AtomicU64,
}

impl MockServer {
    /// Create a mock server from validated rules.
    pub fn new(settings: ServerSettings, rules: RuleSet, rng: Arc<RandomContext>) -> Self {
        let responder = Responder::new(&rules, rng, settings.delay_mode);

        info!(
            mocks = rules.len(),
            delay_mode = ?settings.delay_mode,
            "Mock server initialized"
        );

        Self {
            settings,
            rules,
            responder,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Validate a configuration and build a server with the default seed.
    pub fn from_config(config: &MockServerConfig, loader: &dyn ContentLoader) -> Result<Self, ConfigError> {
        let rules = config.compile(loader)?;
        Ok(Self::new(
            config.settings.clone(),
            rules,
            Arc::new(RandomContext::default()),
        ))
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Get total requests handled.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Match a request and build its response.
    pub async fn handle(&self, req: &InboundRequest) -> ResolvedResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let response = match find_match(&self.rules, req) {
            Some(result) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_matches {
                    info!(
                        rule = %result.rule.name,
                        method = %req.method,
                        path = %req.path,
                        "Request matched mock"
                    );
                }
                self.responder.resolve(result.rule, req, &result.path_vars).await
            }
            None => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_unmatched {
                    warn!(method = %req.method, path = %req.path, "No matching mock found");
                }
                ResolvedResponse::no_match(req)
            }
        };

        debug!(
            status = response.status,
            total = self.total_requests(),
            matched = self.total_matched(),
            unmatched = self.total_unmatched(),
            "Request handled"
        );
        response
    }
}
