//! Filter, ordering, and range parameters for the backend's REST dialect.
//!
//! The backend encodes row filters directly in the query string as
//! `column=op.value` pairs (`id=eq.7`, `port=not.is.null`) and reserves the
//! `order`/`limit`/`offset` keys for scans.

/// Sort direction for ordered scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn suffix(self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// Builder for one request's query-string pairs.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.pairs.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// `column IS NOT NULL`
    pub fn not_null(mut self, column: &str) -> Self {
        self.pairs
            .push((column.to_string(), "not.is.null".to_string()));
        self
    }

    /// `column IN (ids…)`. No-op when `ids` is empty.
    pub fn in_list(mut self, column: &str, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return self;
        }
        self.pairs
            .push((column.to_string(), format!("in.({})", join_ids(ids))));
        self
    }

    /// `column NOT IN (ids…)`. No-op when `ids` is empty.
    pub fn not_in(mut self, column: &str, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return self;
        }
        self.pairs
            .push((column.to_string(), format!("not.in.({})", join_ids(ids))));
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.pairs
            .push(("order".to_string(), format!("{column}.{}", direction.suffix())));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.pairs.push(("limit".to_string(), n.to_string()));
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.pairs.push(("offset".to_string(), n.to_string()));
        self
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.query(&self.pairs)
    }

    #[cfg(test)]
    fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Total row count from a `Content-Range` header (`"0-24/3573"`, `"*/0"`).
/// `None` when the backend did not report an exact count.
pub(crate) fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_filter_pairs() {
        let query = Query::new()
            .eq("node_id", 7)
            .not_null("port")
            .not_in("id", &[1, 2, 3])
            .order("index", Direction::Ascending)
            .limit(10)
            .offset(20);

        let pairs = query.pairs();
        assert_eq!(pairs[0], ("node_id".to_string(), "eq.7".to_string()));
        assert_eq!(pairs[1], ("port".to_string(), "not.is.null".to_string()));
        assert_eq!(pairs[2], ("id".to_string(), "not.in.(1,2,3)".to_string()));
        assert_eq!(pairs[3], ("order".to_string(), "index.asc".to_string()));
        assert_eq!(pairs[4], ("limit".to_string(), "10".to_string()));
        assert_eq!(pairs[5], ("offset".to_string(), "20".to_string()));
    }

    #[test]
    fn empty_id_lists_add_no_filter() {
        let query = Query::new().not_in("id", &[]).in_list("id", &[]);
        assert!(query.pairs().is_empty());
    }

    #[test]
    fn parses_content_range_totals() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }
}
