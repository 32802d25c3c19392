//! # Pattern Parsing and Segment Classification
//!
//! A registration pattern is a `/`-prefixed string decomposed into segments. This module owns
//! the parsing, validation and classification of those segments, plus the shared
//! expression→compiled-regex map referenced in the design notes so that two routes (even across
//! different methods) that declare the same `{name:expr}` compile the expression once.

use crate::error::{Result, RouterError};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// One decomposed segment of a registration pattern.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Characters restricted to letters, digits, `-`, `_`, `.`.
    Literal(String),
    /// `{name}` — matches any single path segment, captured under `name`.
    Named(String),
    /// `{name:expr}` — matches a single path segment iff the anchored `expr` matches.
    Regex { name: String, pattern: Arc<Regex>, source: String },
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_literal()
    }

    /// The parameter name for dynamic segments, `None` for literals.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Named(name) => Some(name),
            Segment::Regex { name, .. } => Some(name),
        }
    }
}

fn is_literal_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.'
}

/// Process-wide cache of compiled regexes, keyed by the anchored source string.
///
/// Shared across all dynamic trees regardless of which HTTP method registered the pattern.
fn regex_cache() -> &'static Mutex<HashMap<String, Arc<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn compile_anchored(expr: &str) -> Result<Arc<Regex>> {
    let anchored = format!("^{}$", expr);
    let mut cache = regex_cache().lock().unwrap();
    if let Some(existing) = cache.get(&anchored) {
        return Ok(Arc::clone(existing));
    }
    let compiled = Regex::new(&anchored)
        .map_err(|e| RouterError::InvalidPattern(format!("bad regex {:?}: {e}", expr)))?;
    let compiled = Arc::new(compiled);
    cache.insert(anchored, Arc::clone(&compiled));
    Ok(compiled)
}

/// Parses a raw segment string (without surrounding slashes) into a classified [`Segment`].
fn parse_segment(raw: &str) -> Result<Segment> {
    if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        if inner.starts_with('*') {
            return Err(RouterError::InvalidPattern(format!(
                "wildcard segments are not supported: {{{inner}}}"
            )));
        }
        if let Some((name, expr)) = inner.split_once(':') {
            if name.is_empty() || expr.is_empty() {
                return Err(RouterError::InvalidPattern(format!("malformed regex segment: {{{inner}}}")));
            }
            let compiled = compile_anchored(expr)?;
            return Ok(Segment::Regex {
                name: name.to_string(),
                pattern: compiled,
                source: expr.to_string(),
            });
        }
        if inner.is_empty() {
            return Err(RouterError::InvalidPattern("empty parameter name".to_string()));
        }
        return Ok(Segment::Named(inner.to_string()));
    }

    if raw.starts_with('*') {
        return Err(RouterError::InvalidPattern(format!("wildcard segments are not supported: {raw}")));
    }
    if raw.is_empty() || !raw.bytes().all(is_literal_byte) {
        return Err(RouterError::InvalidPattern(format!("invalid literal segment: {raw}")));
    }
    Ok(Segment::Literal(raw.to_string()))
}

/// Normalizes a path: prepends `/` if missing, strips exactly one trailing `/` unless the path
/// is `/` itself. No percent-decoding, case folding, or slash collapsing is performed.
pub fn normalize_path(path: &str) -> String {
    let mut owned = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if owned.len() > 1 && owned.ends_with('/') {
        owned.pop();
    }
    owned
}

/// Parses and validates a full registration pattern into its segments.
///
/// The pattern must begin with `/` (after normalization). Parameter names must be unique across
/// the whole pattern (I2). An empty pattern (or one that normalizes to just `/` with zero
/// meaningful segments is still valid — `/` is a legitimate single-segment-less route).
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>> {
    if pattern.is_empty() {
        return Err(RouterError::InvalidPattern("pattern must not be empty".to_string()));
    }
    let normalized = normalize_path(pattern);
    if normalized == "/" {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut seen_names: Vec<String> = Vec::new();
    for raw in normalized.trim_start_matches('/').split('/') {
        let segment = parse_segment(raw)?;
        if let Some(name) = segment.param_name() {
            if seen_names.iter().any(|n| n == name) {
                return Err(RouterError::InvalidPattern(format!(
                    "duplicate parameter name {name:?} in pattern {pattern:?}"
                )));
            }
            seen_names.push(name.to_string());
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// True iff every segment in the parsed pattern is a [`Segment::Literal`].
pub fn is_fully_static(segments: &[Segment]) -> bool {
    segments.iter().all(Segment::is_literal)
}
