//! Offset/limit paging: input normalization and navigation links.

use serde::Serialize;

use crate::config::PagingConfig;

/// A normalized page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Parse loosely-typed paging input.
    ///
    /// - offset: missing, non-numeric or negative becomes `0`
    /// - limit: missing, non-numeric or `<= 0` becomes `default_limit`, and
    ///   anything above `max_limit` is capped
    #[must_use]
    pub fn parse(offset: Option<&str>, limit: Option<&str>, config: &PagingConfig) -> Self {
        let offset = offset
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(0);

        let limit = limit
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|value| *value > 0)
            .and_then(|value| usize::try_from(value).ok())
            .map_or(config.default_limit, |value| value.min(config.max_limit));

        Self { offset, limit }
    }

    /// Query-string form, `offset=O&limit=L`.
    #[must_use]
    pub fn to_query(&self) -> String {
        format!("offset={}&limit={}", self.offset, self.limit)
    }
}

/// Navigation links for a page of `result_len` rows out of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagingLinks {
    pub first: Page,
    pub last: Page,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<Page>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Page>,
}

impl PagingLinks {
    /// Compute links for the window `page`.
    ///
    /// `first` covers the rows before `page.offset` that don't fill a whole
    /// page, so stepping `next` from it lands back on `page.offset`. `last`
    /// and `prev` move by whole pages from the current offset; a window that
    /// would start before zero is clipped and shrunk.
    #[must_use]
    pub fn compute(page: Page, result_len: usize, total: usize) -> Self {
        let limit = wide(page.limit.max(1));
        let offset = wide(page.offset);
        let count = wide(total);

        let first = if offset > 0 && offset % limit != 0 {
            Page::new(0, to_usize(offset % limit))
        } else {
            Page::new(0, page.limit.max(1))
        };

        let last_start = if offset < count {
            offset + ((count - offset - 1) / limit) * limit
        } else {
            offset - ((offset - count) / limit + 1) * limit
        };
        let last = clip(last_start, limit);

        let prev = (offset > 0 && count > 0).then(|| {
            let start = if offset <= count {
                offset - limit
            } else {
                offset - ((offset - count) / limit + 1) * limit
            };
            clip(start, limit)
        });

        let next_offset = page.offset.saturating_add(result_len);
        let next = (next_offset < total).then(|| Page::new(next_offset, page.limit.max(1)));

        Self {
            first,
            last,
            prev,
            next,
        }
    }
}

/// A window starting before zero keeps only its non-negative part; an
/// empty remainder falls back to a full page at zero.
fn clip(start: i128, limit: i128) -> Page {
    if start >= 0 {
        return Page::new(to_usize(start), to_usize(limit));
    }
    let remaining = limit + start;
    Page::new(0, to_usize(if remaining > 0 { remaining } else { limit }))
}

/// Whole-page steps from an offset near `usize::MAX` overshoot 64 bits.
fn wide(value: usize) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}

fn to_usize(value: i128) -> usize {
    usize::try_from(value).unwrap_or(0)
}
