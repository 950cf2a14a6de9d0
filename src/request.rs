//! Transport-neutral inbound request.

use bytes::Bytes;
use std::collections::HashMap;

/// An HTTP request as seen by the matcher and the responder.
///
/// Header names are stored lower-cased. Query and header values keep every
/// occurrence in arrival order.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Decoded path, without query string
    pub path: String,
    pub query: HashMap<String, Vec<String>>,
    pub headers: HashMap<String, Vec<String>>,
    /// e.g. `HTTP/1.1`
    pub protocol: String,
    pub host: String,
    pub remote_addr: String,
    pub body: Bytes,
}

impl InboundRequest {
    /// Build a request from a method and a request target (`/path?query`).
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: parse_query_string(query.unwrap_or("")),
            protocol: "HTTP/1.1".to_string(),
            ..Default::default()
        }
    }

    /// Add a header value.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).first().map(String::as_str)
    }

    /// All values of a header, by case-insensitive name.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All values of a query parameter.
    pub fn query_values(&self, key: &str) -> Option<&[String]> {
        self.query.get(key).map(Vec::as_slice)
    }

    /// Whether the content type announces a JSON body.
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }

    /// Query values merged with an urlencoded form body.
    pub fn form(&self) -> HashMap<String, Vec<String>> {
        let mut form = self.query.clone();
        let is_form = self
            .header("content-type")
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            if let Ok(body) = std::str::from_utf8(&self.body) {
                for (key, values) in parse_query_string(body) {
                    form.entry(key).or_default().extend(values);
                }
            }
        }
        form
    }
}

/// Parse a query string into key to values.
///
/// A bare key (`?flag`) yields an empty value.
pub fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.entry(decode(key)).or_default().push(decode(value));
    }

    params
}

fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
