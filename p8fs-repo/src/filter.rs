//! The general-purpose WHERE builder used by `select`, grounded in
//! `BaseRepository.select`'s filter dict and `select_where`'s `-field`
//! descending-order convention.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    Like(String, String),
    /// JSON containment (`@>` on Postgres, `JSON_CONTAINS` on TiDB).
    Contains(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _)
            | Filter::In(f, _)
            | Filter::Like(f, _)
            | Filter::Contains(f, _)
            | Filter::Gt(f, _)
            | Filter::Gte(f, _)
            | Filter::Lt(f, _)
            | Filter::Lte(f, _) => f,
        }
    }
}

/// One ORDER BY term. `-field` in the source's string convention becomes
/// `OrderBy { field, descending: true }` here.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn parse(spec: &str) -> Self {
        if let Some(field) = spec.strip_prefix('-') {
            Self { field: field.to_string(), descending: true }
        } else {
            Self { field: spec.to_string(), descending: false }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectParams {
    pub filters: Vec<Filter>,
    pub fields: Option<Vec<String>>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SelectParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn with_order_by(mut self, spec: &str) -> Self {
        self.order_by.push(OrderBy::parse(spec));
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_parses_descending_prefix() {
        let o = OrderBy::parse("-created_at");
        assert!(o.descending);
        assert_eq!(o.field, "created_at");

        let o = OrderBy::parse("created_at");
        assert!(!o.descending);
    }
}
