//! Collection paging: the result envelope and its navigation links.
//!
//! Links are absolute URLs whose query string is the serialized RQL tree
//! with the `limit()` clause rewritten for the window in question, so a
//! client can follow `next`/`previous` without knowing how the server
//! pages.

use serde::Serialize;
use url::Url;

use crate::rql::{RqlKind, RqlNode};

/// An inclusive, 1-based request window: first ordinal and row count, so
/// `(101, 100)` covers rows 101 through 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub count: u64,
}

impl Window {
    pub fn new(start: u64, count: u64) -> Self {
        Self { start, count }
    }
}

/// Paged collection envelope. Optional members are omitted from the
/// serialized form entirely rather than rendered as null.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RqlCollection<T> {
    /// Total rows matching the query, across all pages.
    pub count: u64,
    /// Rows in this page, present only when the collection is paged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Canonical URL of this page.
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub items: Vec<T>,
}

/// Navigation links for one page of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLinks {
    pub href: String,
    pub first: Option<String>,
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Extract the request's page window from its `limit()` clause, if any.
pub fn page_window(node: Option<&RqlNode>) -> Option<Window> {
    match node?.extract_clause(RqlKind::Limit) {
        Some(RqlNode::Limit { start, count }) => Some(Window::new(*start, *count)),
        _ => None,
    }
}

/// Compute the navigation links for the window starting at `start`,
/// stepping `page_size` rows per page. `page_size` is the effective page
/// size — the request's own count clamped to the batch limit — so the links
/// walk the same windows the list query serves.
///
/// The reference tree is the request tree with a `limit()` clause guaranteed
/// present (one is prepended when the request had none); each link rewrites
/// that clause in place. `first` and `previous` appear only past the first
/// window; `next` only while at least one full window's worth of rows lies
/// at or beyond the next start.
pub fn compute_links(
    root_url: &Url,
    node: Option<&RqlNode>,
    start: u64,
    page_size: u64,
    total: u64,
) -> CollectionLinks {
    let reference = match node {
        None => RqlNode::limit(1, page_size),
        Some(node) => {
            if node.extract_clause(RqlKind::Limit).is_some() {
                node.clone()
            } else {
                RqlNode::And(vec![RqlNode::limit(1, page_size), node.clone()])
            }
        }
    };

    let link = |window_start: u64| {
        let tree = reference.replace_clause(
            RqlKind::Limit,
            &RqlNode::limit(window_start, page_size),
        );
        format!("{}/collection?{tree}", root_url.as_str().trim_end_matches('/'))
    };

    let href = link(start);
    let (first, previous) = if start > 1 {
        (
            Some(link(1)),
            Some(link(start.saturating_sub(page_size).max(1))),
        )
    } else {
        (None, None)
    };
    let next = if total >= start + page_size {
        Some(link(start + page_size))
    } else {
        None
    };

    CollectionLinks {
        href,
        first,
        previous,
        next,
    }
}
