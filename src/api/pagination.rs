use serde::Serialize;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub(crate) const fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Offset window for list endpoints, clamped so it is always valid SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Page {
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl Page {
    pub(crate) fn new(skip: i64, limit: i64) -> Self {
        Self { skip: skip.max(0), limit: limit.clamp(1, MAX_LIMIT) }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl<T> PaginatedResponse<T> {
    pub(crate) fn new(items: Vec<T>, total_count: i64, page: Page) -> Self {
        Self { items, total_count, skip: page.skip, limit: page.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::Page;

    #[test]
    fn page_is_clamped_into_valid_range() {
        assert_eq!(Page::new(-5, 0), Page { skip: 0, limit: 1 });
        assert_eq!(Page::new(20, 50_000), Page { skip: 20, limit: 1000 });
        assert_eq!(Page::new(3, 25), Page { skip: 3, limit: 25 });
    }
}
