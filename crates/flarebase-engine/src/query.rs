//! Listing query parsing.
//!
//! Turns the raw `page`/`perPage`/`sort`/`filter` parameters into a
//! validated [`RecordQuery`]. Every column named by the caller is checked
//! against the collection's allow-list before it reaches SQL text; values
//! are always bound as parameters.

use flarebase_core::FieldValue;

use crate::error::{EngineError, Result};
use crate::schema::{CollectionSchema, FieldType};
use crate::types::{EngineConfig, ListQuery};

const DEFAULT_SORT: &str = "-created_at";

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One `field = value` equality clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    /// Column compared.
    pub field: String,
    /// Value bound for the comparison, coerced to the column's type.
    pub value: FieldValue,
}

/// A validated listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    /// 1-based page.
    pub page: u32,
    /// Page size.
    pub per_page: u32,
    /// Sort column.
    pub sort_field: String,
    /// Sort direction.
    pub sort_direction: SortDirection,
    /// Conjunction of equality clauses.
    pub filters: Vec<FilterClause>,
}

impl RecordQuery {
    /// Validate listing parameters against a collection schema.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if the sort or a filter names a
    /// column the collection does not have.
    pub fn parse(query: &ListQuery, schema: &CollectionSchema, config: &EngineConfig) -> Result<Self> {
        let (page, per_page) = config.paging(query.page, query.per_page);

        let sort = query
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SORT);
        let (sort_field, sort_direction) = match sort.strip_prefix('-') {
            Some(field) => (field, SortDirection::Descending),
            None => (sort, SortDirection::Ascending),
        };
        if schema.column_type(sort_field).is_none() {
            return Err(EngineError::Validation(format!(
                "cannot sort by unknown field '{sort_field}'"
            )));
        }

        let filters = match query.filter.as_deref() {
            Some(filter) => parse_filter(filter, schema)?,
            None => Vec::new(),
        };

        Ok(Self {
            page,
            per_page,
            sort_field: sort_field.to_string(),
            sort_direction,
            filters,
        })
    }

    /// `WHERE` clause (empty when unfiltered) and its parameters.
    #[must_use]
    pub fn where_clause(&self) -> (String, Vec<FieldValue>) {
        if self.filters.is_empty() {
            return (String::new(), Vec::new());
        }
        let conditions: Vec<_> = self
            .filters
            .iter()
            .map(|f| format!("\"{}\" = ?", f.field))
            .collect();
        let params = self.filters.iter().map(|f| f.value.clone()).collect();
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }

    /// `ORDER BY` clause, with `id` as a tie-breaker so pages are stable.
    #[must_use]
    pub fn order_clause(&self) -> String {
        let direction = match self.sort_direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        if self.sort_field == "id" {
            format!(" ORDER BY \"id\" {direction}")
        } else {
            format!(" ORDER BY \"{}\" {direction}, \"id\" {direction}", self.sort_field)
        }
    }

    /// Rows skipped before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

fn parse_filter(filter: &str, schema: &CollectionSchema) -> Result<Vec<FilterClause>> {
    let mut clauses = Vec::new();
    for clause in filter.split(',') {
        let Some((field, value)) = clause.split_once('=') else {
            continue;
        };
        let (field, value) = (field.trim(), value.trim());
        if field.is_empty() || value.is_empty() {
            continue;
        }
        let field_type = schema.column_type(field).ok_or_else(|| {
            EngineError::Validation(format!("cannot filter by unknown field '{field}'"))
        })?;
        clauses.push(FilterClause {
            field: field.to_string(),
            value: coerce(value, field_type),
        });
    }
    Ok(clauses)
}

/// Convert a query-string value to what the column stores.
fn coerce(value: &str, field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Boolean => match value {
            "true" | "1" => FieldValue::Integer(1),
            "false" | "0" => FieldValue::Integer(0),
            _ => FieldValue::Text(value.to_string()),
        },
        FieldType::Integer | FieldType::Number => value
            .parse::<i64>()
            .map(FieldValue::Integer)
            .or_else(|_| value.parse::<f64>().map(FieldValue::Real))
            .unwrap_or_else(|_| FieldValue::Text(value.to_string())),
        FieldType::String | FieldType::Array | FieldType::Object | FieldType::Other => {
            FieldValue::Text(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CollectionSchema {
        CollectionSchema::parse(
            r#"{"properties":{"title":{"type":"string"},"views":{"type":"integer"},"score":{"type":"number"},"published":{"type":"boolean"}}}"#,
        )
        .unwrap()
    }

    fn parse(query: ListQuery) -> Result<RecordQuery> {
        RecordQuery::parse(&query, &schema(), &EngineConfig::default())
    }

    #[test]
    fn defaults() {
        let query = parse(ListQuery::default()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, 20);
        assert_eq!(query.sort_field, "created_at");
        assert_eq!(query.sort_direction, SortDirection::Descending);
        assert!(query.filters.is_empty());
        assert_eq!(query.where_clause(), (String::new(), vec![]));
        assert_eq!(
            query.order_clause(),
            " ORDER BY \"created_at\" DESC, \"id\" DESC"
        );
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn ascending_sort_and_offset() {
        let query = parse(ListQuery {
            page: Some(3),
            per_page: Some(10),
            sort: Some("title".into()),
            filter: None,
        })
        .unwrap();
        assert_eq!(query.sort_direction, SortDirection::Ascending);
        assert_eq!(query.order_clause(), " ORDER BY \"title\" ASC, \"id\" ASC");
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn unknown_sort_field_rejected() {
        let result = parse(ListQuery {
            sort: Some("-title; DROP TABLE posts".into()),
            ..ListQuery::default()
        });
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn each_clause_uses_its_own_field() {
        let query = parse(ListQuery {
            filter: Some("title=hello,views=3".into()),
            ..ListQuery::default()
        })
        .unwrap();
        let (sql, params) = query.where_clause();
        assert_eq!(sql, " WHERE \"title\" = ? AND \"views\" = ?");
        assert_eq!(
            params,
            vec![FieldValue::Text("hello".into()), FieldValue::Integer(3)]
        );
    }

    #[test]
    fn values_coerced_by_type() {
        let query = parse(ListQuery {
            filter: Some("published=true,score=2.5,views=many".into()),
            ..ListQuery::default()
        })
        .unwrap();
        let values: Vec<_> = query.filters.into_iter().map(|f| f.value).collect();
        assert_eq!(
            values,
            vec![
                FieldValue::Integer(1),
                FieldValue::Real(2.5),
                FieldValue::Text("many".into()),
            ]
        );
    }

    #[test]
    fn empty_clauses_ignored() {
        let query = parse(ListQuery {
            filter: Some(",title=,=x,noequals, title = hi ".into()),
            ..ListQuery::default()
        })
        .unwrap();
        assert_eq!(
            query.filters,
            vec![FilterClause {
                field: "title".into(),
                value: FieldValue::Text("hi".into()),
            }]
        );
    }

    #[test]
    fn unknown_filter_field_rejected() {
        let result = parse(ListQuery {
            filter: Some("title=a,\"x\" OR 1=1".into()),
            ..ListQuery::default()
        });
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn value_may_contain_equals() {
        let query = parse(ListQuery {
            filter: Some("title=a=b".into()),
            ..ListQuery::default()
        })
        .unwrap();
        assert_eq!(query.filters[0].value, FieldValue::Text("a=b".into()));
    }
}
