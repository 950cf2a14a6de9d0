//! Template engine for dynamic responses.
//!
//! Uses Handlebars with the request exposed as the template context. The
//! random helpers (`uuid`, `random_int`, `random_float`, `fake`) draw from
//! the shared [`RandomContext`], so generated data is reproducible.

use crate::matcher::PathVars;
use crate::random::RandomContext;
use crate::request::InboundRequest;
use crate::rules::{ResponseSource, RuleSet};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, Template,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Per-request data exposed to templates.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Protocol, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Host the request was addressed to
    pub host: String,
    /// Peer address
    pub remote_addr: String,
    /// Request path
    pub path: String,
    /// Request headers, lower-cased names, first value
    pub headers: HashMap<String, String>,
    /// Query parameters, first value
    pub query: HashMap<String, String>,
    /// Query parameters and urlencoded form fields, first value
    pub form: HashMap<String, String>,
    /// Request body as JSON (if the content type says so and it parses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// Captured path variables
    pub path_vars: PathVars,
}

impl TemplateContext {
    pub fn new(req: &InboundRequest, path_vars: &PathVars) -> Self {
        let json = if req.is_json() {
            serde_json::from_slice(&req.body).ok()
        } else {
            None
        };

        Self {
            method: req.method.clone(),
            protocol: req.protocol.clone(),
            host: req.host.clone(),
            remote_addr: req.remote_addr.clone(),
            path: req.path.clone(),
            headers: first_values(&req.headers),
            query: first_values(&req.query),
            form: first_values(&req.form()),
            json,
            path_vars: path_vars.clone(),
        }
    }
}

fn first_values(multi: &HashMap<String, Vec<String>>) -> HashMap<String, String> {
    multi
        .iter()
        .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
        .collect()
}

impl TemplateEngine {
    /// Create a template engine whose random helpers use `rng`.
    pub fn new(rng: Arc<RandomContext>) -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("path_var", Box::new(path_var_helper));

        let uuid_rng = Arc::clone(&rng);
        handlebars.register_helper(
            "uuid",
            Box::new(
                move |_: &Helper,
                      _: &Handlebars,
                      _: &Context,
                      _: &mut RenderContext,
                      out: &mut dyn Output|
                      -> HelperResult {
                    out.write(&uuid_rng.new_uuid_like())?;
                    Ok(())
                },
            ),
        );

        let int_rng = Arc::clone(&rng);
        handlebars.register_helper(
            "random_int",
            Box::new(
                move |h: &Helper,
                      _: &Handlebars,
                      _: &Context,
                      _: &mut RenderContext,
                      out: &mut dyn Output|
                      -> HelperResult {
                    let min = int_param(h, 0, "random_int")?;
                    let max = int_param(h, 1, "random_int")?;
                    let value = int_rng.random_int(min, max).map_err(helper_error)?;
                    out.write(&value.to_string())?;
                    Ok(())
                },
            ),
        );

        let float_rng = Arc::clone(&rng);
        handlebars.register_helper(
            "random_float",
            Box::new(
                move |h: &Helper,
                      _: &Handlebars,
                      _: &Context,
                      _: &mut RenderContext,
                      out: &mut dyn Output|
                      -> HelperResult {
                    let min = float_param(h, 0, "random_float")?;
                    let max = float_param(h, 1, "random_float")?;
                    let value = float_rng.random_float(min, max).map_err(helper_error)?;
                    out.write(&value.to_string())?;
                    Ok(())
                },
            ),
        );

        let fake_rng = rng;
        handlebars.register_helper(
            "fake",
            Box::new(
                move |h: &Helper,
                      _: &Handlebars,
                      _: &Context,
                      _: &mut RenderContext,
                      out: &mut dyn Output|
                      -> HelperResult {
                    let kind = h
                        .param(0)
                        .and_then(|v| v.value().as_str())
                        .ok_or_else(|| helper_error("fake expects a kind, e.g. {{fake \"name\"}}"))?;
                    let value = fake_rng.fake(kind).map_err(helper_error)?;
                    out.write(&value)?;
                    Ok(())
                },
            ),
        );

        // Don't escape HTML by default (we're not rendering HTML)
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Register every template body of a rule set under its rule name.
    pub fn register_rules(&mut self, rules: &RuleSet) {
        for rule in rules {
            if let ResponseSource::Template(template) = &rule.response.source {
                self.register(&rule.name, template);
            }
        }
    }

    /// Register a compiled template under `name`.
    pub fn register(&mut self, name: &str, template: &Template) {
        self.handlebars.register_template(name, template.clone());
    }

    /// Render the template registered under `name`.
    pub fn render(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        self.handlebars.render(name, ctx)
    }
}

fn helper_error(message: impl ToString) -> RenderError {
    RenderErrorReason::Other(message.to_string()).into()
}

fn int_param(h: &Helper, index: usize, helper: &str) -> Result<i64, RenderError> {
    h.param(index)
        .and_then(|v| v.value().as_i64())
        .ok_or_else(|| helper_error(format!("{} expects integer parameter {}", helper, index + 1)))
}

fn float_param(h: &Helper, index: usize, helper: &str) -> Result<f64, RenderError> {
    h.param(index)
        .and_then(|v| v.value().as_f64())
        .ok_or_else(|| helper_error(format!("{} expects numeric parameter {}", helper, index + 1)))
}

// Stateless helpers

fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|v| v.value().clone()).unwrap_or_default();
    let rendered = serde_json::to_string(&value).map_err(helper_error)?;
    out.write(&rendered)?;
    Ok(())
}

fn now_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    use chrono::Utc;

    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    let now = Utc::now();
    out.write(&now.format(format).to_string())?;
    Ok(())
}

fn path_var_helper(
    h: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .and_then(|name| ctx.data().get("path_vars")?.get(name)?.as_str())
        .unwrap_or("");
    out.write(value)?;
    Ok(())
}

fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(v) if !v.is_null() => {
            if let Some(s) = v.as_str() {
                if !s.is_empty() {
                    out.write(s)?;
                    return Ok(());
                }
            } else {
                out.write(&v.to_string())?;
                return Ok(());
            }
        }
        _ => {}
    }

    out.write(default)?;
    Ok(())
}

fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, source: &str) -> TemplateEngine {
        let mut engine = TemplateEngine::new(Arc::new(RandomContext::default()));
        engine.register(name, &Template::compile(source).unwrap());
        engine
    }

    fn render(source: &str, req: &InboundRequest, vars: &PathVars) -> Result<String, RenderError> {
        let engine = engine_with("t", source);
        engine.render("t", &TemplateContext::new(req, vars))
    }

    fn vars(pairs: &[(&str, &str)]) -> PathVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_path_vars() {
        let req = InboundRequest::new("GET", "/users/123");
        let result = render(
            "User {{path_vars.id}} / {{path_var \"id\"}} / [{{path_var \"missing\"}}]",
            &req,
            &vars(&[("id", "123")]),
        )
        .unwrap();
        assert_eq!(result, "User 123 / 123 / []");
    }

    #[test]
    fn test_request_metadata() {
        let mut req = InboundRequest::new("GET", "/list?page=2").with_header("User-Agent", "test-client");
        req.host = "mock.local".to_string();
        let result = render(
            "{{method}} {{path}} {{protocol}} {{host}} page={{query.page}} ua={{headers.user-agent}} form={{form.page}}",
            &req,
            &PathVars::new(),
        )
        .unwrap();
        assert_eq!(
            result,
            "GET /list HTTP/1.1 mock.local page=2 ua=test-client form=2"
        );
    }

    #[test]
    fn test_json_body() {
        let req = InboundRequest::new("POST", "/users")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"John"}"#);
        let result = render("Name: {{json.name}}", &req, &PathVars::new()).unwrap();
        assert_eq!(result, "Name: John");
    }

    #[test]
    fn test_json_body_ignored_without_json_content_type() {
        let req = InboundRequest::new("POST", "/users").with_body(r#"{"name":"John"}"#);
        let result = render("Name: {{default json.name \"none\"}}", &req, &PathVars::new()).unwrap();
        assert_eq!(result, "Name: none");
    }

    #[test]
    fn test_uuid_helper_is_reproducible() {
        let req = InboundRequest::new("GET", "/");
        let result = render("ID: {{uuid}}", &req, &PathVars::new()).unwrap();
        assert_eq!(result, "ID: 86e27f31-2311-7d4a-d8a6-60378d730694");
    }

    #[test]
    fn test_random_helpers() {
        let req = InboundRequest::new("GET", "/");
        let result = render("{{random_int 10 15}}", &req, &PathVars::new()).unwrap();
        let n: i64 = result.parse().unwrap();
        assert!((10..15).contains(&n));

        let result = render("{{random_float 0.5 1.5}}", &req, &PathVars::new()).unwrap();
        let f: f64 = result.parse().unwrap();
        assert!((0.5..1.5).contains(&f));
    }

    #[test]
    fn test_random_int_empty_range_is_an_error() {
        let req = InboundRequest::new("GET", "/");
        assert!(render("{{random_int 10 5}}", &req, &PathVars::new()).is_err());
        assert!(render("{{random_int \"a\" 5}}", &req, &PathVars::new()).is_err());
    }

    #[test]
    fn test_fake_helper() {
        let req = InboundRequest::new("GET", "/");
        let first = render("{{fake \"name\"}}", &req, &PathVars::new()).unwrap();
        let second = render("{{fake \"name\"}}", &req, &PathVars::new()).unwrap();
        assert!(!first.is_empty());
        // Fresh engines share a seed, so the first name is always the same.
        assert_eq!(first, second);

        assert!(render("{{fake \"spaceship\"}}", &req, &PathVars::new()).is_err());
    }

    #[test]
    fn test_default_helper() {
        let req = InboundRequest::new("GET", "/");
        let result = render(
            "Value: {{default query.missing \"default_value\"}}",
            &req,
            &PathVars::new(),
        )
        .unwrap();
        assert_eq!(result, "Value: default_value");
    }

    #[test]
    fn test_upper_lower_helpers() {
        let req = InboundRequest::new("GET", "/");
        let result = render(
            "Upper: {{upper path_vars.name}}, Lower: {{lower path_vars.name}}",
            &req,
            &vars(&[("name", "John")]),
        )
        .unwrap();
        assert_eq!(result, "Upper: JOHN, Lower: john");
    }

    #[test]
    fn test_json_helper() {
        let req = InboundRequest::new("GET", "/");
        let result = render("{{json path_vars}}", &req, &vars(&[("id", "7")])).unwrap();
        assert_eq!(result, r#"{"id":"7"}"#);
    }

    #[test]
    fn test_no_html_escaping() {
        let req = InboundRequest::new("GET", "/");
        let result = render("{{path_vars.q}}", &req, &vars(&[("q", "<a&b>")])).unwrap();
        assert_eq!(result, "<a&b>");
    }
}
