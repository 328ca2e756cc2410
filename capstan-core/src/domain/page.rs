//! Page cursors for id-ordered listings

use serde::{Deserialize, Serialize};

/// A request for one page of an id-descending listing
///
/// At most one of `since`/`until` is set: `since` pages walk towards older
/// rows (`id < since`), `until` pages walk back towards newer rows
/// (`id > until`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    pub limit: i64,
}

impl Page {
    /// The first page of a listing
    pub fn first(limit: i64) -> Self {
        Self {
            since: None,
            until: None,
            limit,
        }
    }

    /// A page of rows older than `id`
    pub fn since(id: i64, limit: i64) -> Self {
        Self {
            since: Some(id),
            until: None,
            limit,
        }
    }

    /// A page of rows newer than `id`
    pub fn until(id: i64, limit: i64) -> Self {
        Self {
            since: None,
            until: Some(id),
            limit,
        }
    }
}

/// Boundary cursors for the slice a query returned
///
/// `next` walks to older rows, `previous` to newer ones; either is `None`
/// when no such rows exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub next: Option<Page>,
    pub previous: Option<Page>,
}
