//! # Dynamic Radix Tree (C3)
//!
//! One tree per HTTP method, built from the parsed [`Segment`](crate::pattern::Segment)s of
//! every non-fully-static pattern registered for that method. Matching walks the path
//! segment-by-segment, trying literal children first, then named parameters, then regex
//! parameters, rolling back captured parameters on a failed recursive match before trying the
//! next sibling.

use crate::error::{Result, RouterError};
use crate::method::Method;
use crate::params::ParamBuffer;
use crate::pattern::Segment;
use crate::route_entry::RouteArc;

/// One node of a per-method dynamic tree.
struct DynamicNode {
    segment: Segment,
    children: Vec<DynamicNode>,
    handler: Option<RouteArc>,
}

/// Per-method collection of dynamic trees.
///
/// The root of each tree is represented implicitly as a bare `Vec<DynamicNode>` — the design
/// notes call out the reference system's placeholder root node as pure structural overhead once
/// ownership makes an always-empty node unnecessary.
pub struct DynamicTree {
    roots: [Vec<DynamicNode>; Method::COUNT],
}

impl Default for DynamicTree {
    fn default() -> Self {
        DynamicTree { roots: std::array::from_fn(|_| Vec::new()) }
    }
}

fn segment_matches(existing: &Segment, new: &Segment) -> bool {
    match (existing, new) {
        (Segment::Literal(a), Segment::Literal(b)) => a == b,
        (Segment::Named(a), Segment::Named(b)) => a == b,
        (Segment::Regex { name: n1, source: s1, .. }, Segment::Regex { name: n2, source: s2, .. }) => {
            n1 == n2 && s1 == s2
        }
        _ => false,
    }
}

impl DynamicTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `segments` (already parsed, already known not to be fully static) under
    /// `method`, pointing at `handler`.
    pub fn add_route(&mut self, method: Method, segments: &[Segment], handler: RouteArc) -> Result<()> {
        if segments.is_empty() {
            return Err(RouterError::InternalError(
                "dynamic tree requires at least one segment".to_string(),
            ));
        }

        let mut children = &mut self.roots[method.index()];
        let last = segments.len() - 1;
        for (depth, seg) in segments.iter().enumerate() {
            let existing = children.iter().position(|c| segment_matches(&c.segment, seg));
            let idx = match existing {
                Some(p) => p,
                None => {
                    if seg.is_literal() && children.iter().any(|c| c.segment.is_dynamic()) {
                        return Err(RouterError::Conflict(format!(
                            "literal segment mixed with a dynamic sibling at depth {depth}"
                        )));
                    }
                    if seg.is_dynamic() && children.iter().any(|c| c.segment.is_literal()) {
                        return Err(RouterError::Conflict(format!(
                            "dynamic segment mixed with a literal sibling at depth {depth}"
                        )));
                    }
                    children.push(DynamicNode {
                        segment: seg.clone(),
                        children: Vec::new(),
                        handler: None,
                    });
                    children.len() - 1
                }
            };

            if depth == last {
                if children[idx].handler.is_some() {
                    return Err(RouterError::DuplicateRoute(format!(
                        "{method} dynamic route already registered"
                    )));
                }
                children[idx].handler = Some(handler);
                return Ok(());
            }
            children = &mut children[idx].children;
        }
        unreachable!("segments is non-empty so the loop always returns on its last iteration")
    }

    /// Matches `path` (already split on `/`, leading slash stripped by the caller) against the
    /// tree for `method`, capturing named/regex parameters into `buffer`.
    pub fn match_path(&self, method: Method, path_segments: &[&str], buffer: &mut ParamBuffer) -> Option<RouteArc> {
        match_children(&self.roots[method.index()], path_segments, buffer)
    }
}

fn descend(node: &DynamicNode, rest: &[&str], buffer: &mut ParamBuffer) -> Option<RouteArc> {
    if rest.is_empty() {
        return node.handler.clone();
    }
    match_children(&node.children, rest, buffer)
}

fn match_children(children: &[DynamicNode], path_segments: &[&str], buffer: &mut ParamBuffer) -> Option<RouteArc> {
    let (seg, rest) = path_segments.split_first()?;

    for child in children.iter().filter(|c| c.segment.is_literal()) {
        if let Segment::Literal(lit) = &child.segment {
            if lit == seg {
                if let Some(h) = descend(child, rest, buffer) {
                    return Some(h);
                }
            }
        }
    }

    for child in children.iter().filter(|c| matches!(c.segment, Segment::Named(_))) {
        let Segment::Named(name) = &child.segment else { unreachable!() };
        let checkpoint = buffer.len();
        buffer.add(name.clone(), (*seg).to_string());
        if let Some(h) = descend(child, rest, buffer) {
            return Some(h);
        }
        buffer.truncate(checkpoint);
    }

    for child in children.iter().filter(|c| matches!(c.segment, Segment::Regex { .. })) {
        let Segment::Regex { name, pattern, .. } = &child.segment else { unreachable!() };
        if pattern.is_match(seg) {
            let checkpoint = buffer.len();
            buffer.add(name.clone(), (*seg).to_string());
            if let Some(h) = descend(child, rest, buffer) {
                return Some(h);
            }
            buffer.truncate(checkpoint);
        }
    }

    None
}
