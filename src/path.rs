//! Path pattern compilation.
//!
//! A declared path such as `/a/*/{name}/**` is split into typed segments:
//! literals, single-element wildcards (`*`), named variables (`{name}`) and
//! an optional trailing recursive wildcard (`**`) that turns the pattern into
//! a prefix match.

use crate::error::PathError;
use std::fmt;

/// A single element of a compiled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request element exactly.
    Literal(String),
    /// Matches any one element; captured as `pvar<N>`.
    SingleWildcard,
    /// Matches any one element; captured under the given name.
    NamedVariable(String),
}

/// A validated, normalized path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    segments: Vec<Segment>,
    is_prefix: bool,
    normalized: String,
}

impl CompiledPath {
    /// Segments to match, excluding the trailing `**` of a prefix pattern.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the pattern ended in `**`.
    pub fn is_prefix(&self) -> bool {
        self.is_prefix
    }

    /// Canonical form: wildcards as `{pvarN}`, a prefix ending in `/`.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Name bound to a `*` element at 1-based position `index`.
pub fn wildcard_var(index: usize) -> String {
    format!("pvar{}", index)
}

/// Compile a raw path specification.
pub fn compile(raw: &str) -> Result<CompiledPath, PathError> {
    let rest = raw
        .strip_prefix('/')
        .ok_or_else(|| PathError::MustStartWithSlash {
            path: raw.to_string(),
        })?;

    let parts: Vec<&str> = rest.split('/').collect();
    let last = parts.len();
    let mut segments = Vec::with_capacity(parts.len());
    let mut rendered = vec![String::new()];
    let mut is_prefix = false;

    for (offset, part) in parts.iter().enumerate() {
        let index = offset + 1;
        let is_last = index == last;

        if part.trim().is_empty() {
            if !is_last {
                return Err(PathError::EmptySegment {
                    path: raw.to_string(),
                    index,
                });
            }
            segments.push(Segment::Literal(part.to_string()));
            rendered.push(part.to_string());
        } else if part.contains("**") {
            if *part != "**" || !is_last {
                return Err(PathError::BadDoubleWildcardPlacement {
                    path: raw.to_string(),
                    segment: part.to_string(),
                });
            }
            is_prefix = true;
            rendered.push(String::new());
        } else if part.contains('*') {
            if *part != "*" {
                return Err(PathError::BadWildcardPlacement {
                    path: raw.to_string(),
                    segment: part.to_string(),
                });
            }
            segments.push(Segment::SingleWildcard);
            rendered.push(format!("{{{}}}", wildcard_var(index)));
        } else if part.contains('{') || part.contains('}') {
            let name = variable_name(part).ok_or_else(|| PathError::BadVariableSyntax {
                path: raw.to_string(),
                segment: part.to_string(),
            })?;
            segments.push(Segment::NamedVariable(name.to_string()));
            rendered.push(part.to_string());
        } else {
            segments.push(Segment::Literal(part.to_string()));
            rendered.push(part.to_string());
        }
    }

    Ok(CompiledPath {
        segments,
        is_prefix,
        normalized: rendered.join("/"),
    })
}

/// Inner name of a whole-element `{name}` variable.
fn variable_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty() && !name.contains('\n'))
}
