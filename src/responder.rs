//! Response resolution.
//!
//! Turns a matched rule into a fully buffered [`ResolvedResponse`]. Bodies
//! are rendered before anything is handed to the transport, so a failing
//! template can still replace the status with a 500.

use crate::config::DelayMode;
use crate::matcher::PathVars;
use crate::random::RandomContext;
use crate::request::InboundRequest;
use crate::rules::{Delay, ResponseSource, Rule, RuleSet};
use crate::template::{TemplateContext, TemplateEngine};
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// A response ready to be written by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResolvedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Set a header, replacing any same-named (case-insensitive) header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn plain_text(status: u16, message: String) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", "text/plain; charset=utf-8");
        response.body = Bytes::from(message);
        response
    }

    /// Response for a request no rule matched.
    pub fn no_match(req: &InboundRequest) -> Self {
        Self::plain_text(404, format!("no mock matched {} {}", req.method, req.path))
    }

    /// Response for a template that failed to execute.
    pub fn template_failure(rule: &Rule, cause: &dyn std::fmt::Display) -> Self {
        Self::plain_text(
            500,
            format!("error executing template for mock \"{}\": {}", rule.name, cause),
        )
    }
}

/// Resolves matched rules into responses.
pub struct Responder {
    engine: TemplateEngine,
    delay_mode: DelayMode,
}

impl Responder {
    /// Create a responder for `rules`, rendering templates with `rng`.
    pub fn new(rules: &RuleSet, rng: Arc<RandomContext>, delay_mode: DelayMode) -> Self {
        let mut engine = TemplateEngine::new(rng);
        engine.register_rules(rules);
        Self { engine, delay_mode }
    }

    /// Build the response for a matched rule.
    ///
    /// Sleeps for the configured delay first; only the calling task waits.
    pub async fn resolve(&self, rule: &Rule, req: &InboundRequest, path_vars: &PathVars) -> ResolvedResponse {
        if let Some(delay) = rule.response.delay {
            let delay_ms = self.delay_millis(delay);
            if delay_ms > 0 {
                debug!(rule = %rule.name, delay_ms, "Applying delay");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        let mut response = ResolvedResponse::new(rule.response.status);
        for (name, value) in &rule.response.headers {
            response.set_header(name, value);
        }

        response.body = match &rule.response.source {
            ResponseSource::Template(_) => {
                let ctx = TemplateContext::new(req, path_vars);
                match self.engine.render(&rule.name, &ctx) {
                    Ok(rendered) => Bytes::from(rendered),
                    Err(e) => {
                        error!(rule = %rule.name, error = %e, "Template execution failed");
                        return ResolvedResponse::template_failure(rule, &e);
                    }
                }
            }
            ResponseSource::Literal(body) | ResponseSource::File(body) => body.clone(),
        };

        response
    }

    /// Milliseconds to sleep for a delay under the configured mode.
    pub fn delay_millis(&self, delay: Delay) -> u64 {
        match self.delay_mode {
            DelayMode::Max => delay.max_millis,
            DelayMode::Random if delay.max_millis > delay.min_millis => {
                rand::thread_rng().gen_range(delay.min_millis..=delay.max_millis)
            }
            DelayMode::Random => delay.min_millis,
        }
    }
}
