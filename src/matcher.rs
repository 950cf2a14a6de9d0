//! Request matching logic.
//!
//! Rules are scanned in declaration order and the first rule whose verb,
//! path, header and query predicates all hold wins. There is no specificity
//! ranking: put narrow rules before broad ones.

use crate::path::{wildcard_var, Segment};
use crate::request::InboundRequest;
use crate::rules::{Rule, RuleSet, ValueMatcher};
use std::collections::HashMap;

/// Values captured from the request path, keyed by variable name.
///
/// `*` elements are captured as `pvar<N>` with N the 1-based position.
pub type PathVars = HashMap<String, String>;

/// Result of matching a request against the rule set.
#[derive(Debug)]
pub struct MatchResult<'a> {
    /// The matched rule
    pub rule: &'a Rule,
    /// Path variables captured during matching
    pub path_vars: PathVars,
}

/// Find the first rule matching a request.
pub fn find_match<'a>(rules: &'a RuleSet, req: &InboundRequest) -> Option<MatchResult<'a>> {
    rules.iter().find_map(|rule| {
        matches_rule(rule, req).map(|path_vars| MatchResult { rule, path_vars })
    })
}

fn matches_rule(rule: &Rule, req: &InboundRequest) -> Option<PathVars> {
    if req.method != rule.verb.as_str() {
        return None;
    }

    let path_vars = match_path(rule, &req.path)?;

    let headers_ok = rule
        .header_matchers
        .iter()
        .all(|m| matches_any(m, req.header_values(&m.key)));
    if !headers_ok {
        return None;
    }

    let queries_ok = rule
        .query_matchers
        .iter()
        .all(|m| matches_any(m, req.query_values(&m.key).unwrap_or(&[])));
    if !queries_ok {
        return None;
    }

    Some(path_vars)
}

/// Walk the compiled segments against the request path.
fn match_path(rule: &Rule, path: &str) -> Option<PathVars> {
    let request_segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();
    let pattern = rule.path.segments();

    if rule.path.is_prefix() {
        if request_segments.len() < pattern.len() {
            return None;
        }
    } else if request_segments.len() != pattern.len() {
        return None;
    }

    let mut vars = PathVars::new();
    for (offset, (segment, actual)) in pattern.iter().zip(&request_segments).enumerate() {
        match segment {
            Segment::Literal(expected) => {
                if expected != actual {
                    return None;
                }
            }
            Segment::SingleWildcard => {
                vars.insert(wildcard_var(offset + 1), actual.to_string());
            }
            Segment::NamedVariable(name) => {
                vars.insert(name.clone(), actual.to_string());
            }
        }
    }

    Some(vars)
}

/// A missing value never matches; any present value may satisfy the regex.
fn matches_any(matcher: &ValueMatcher, values: &[String]) -> bool {
    values.iter().any(|v| matcher.regex.is_match(v))
}
