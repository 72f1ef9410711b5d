//! Maps catalog rows onto snapshots.
//!
//! Catalog queries alias their output to canonical column names, so one
//! mapper serves every dialect. Composite constraints arrive either as one
//! row per column (with a `sequence`) or as one row with a `{a,b}` column
//! list; both expand into one entry per column with a 1-based sequence.

use revschema_core::{
    normalize_default, ColumnSnapshot, ConstraintKind, IndexSnapshot, ReferentialAction,
    RelationSpec, ViewSnapshot,
};
use serde_json::Value;

use crate::transport::Row;

/// Typed accessors over a loosely typed catalog row.
pub trait RowExt {
    /// Reads a column as text; numbers and booleans are rendered.
    fn text(&self, key: &str) -> Option<String>;

    /// Reads a column as an integer.
    fn int(&self, key: &str) -> Option<i64>;

    /// Reads a column as a flag (`YES`, `true`, `t`, non-zero).
    fn flag(&self, key: &str) -> bool;

    /// Reads a non-negative integer column.
    fn uint(&self, key: &str) -> Option<u32> {
        self.int(key).and_then(|v| u32::try_from(v).ok())
    }
}

impl RowExt for Row {
    fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "t" | "1" | "y")
            }
            _ => false,
        }
    }
}

/// Splits `varchar(255)` / `decimal(10,2)` into base name and arguments.
fn split_type(data_type: &str) -> (String, Option<u32>, Option<u32>) {
    let data_type = data_type.trim();
    let Some((base, rest)) = data_type.split_once('(') else {
        return (data_type.to_ascii_lowercase(), None, None);
    };
    let mut args = rest
        .trim_end_matches(')')
        .split(',')
        .map(|a| a.trim().parse::<u32>().ok());
    let first = args.next().flatten();
    let second = args.next().flatten();
    (base.trim().to_ascii_lowercase(), first, second)
}

/// Splits a `{a,b}` or `a,b` column list.
fn split_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

const CHAR_TYPES: &[&str] = &["varchar", "char", "character varying", "character", "nvarchar"];

/// Maps one `columns_query` row.
#[must_use]
pub fn map_column(row: &Row) -> ColumnSnapshot {
    let (base, first_arg, second_arg) = split_type(&row.text("data_type").unwrap_or_default());
    let is_char = CHAR_TYPES.contains(&base.as_str());

    let mut column = ColumnSnapshot {
        table_name: row.text("table_name").unwrap_or_default(),
        column_name: row.text("column_name").unwrap_or_default(),
        raw_type: row.text("raw_type"),
        char_length: row.uint("char_length").or(if is_char { first_arg } else { None }),
        numeric_precision: row
            .uint("numeric_precision")
            .or(if is_char { None } else { first_arg }),
        numeric_scale: row.uint("numeric_scale").or(second_arg),
        datetime_precision: row.uint("datetime_precision"),
        ordinal_position: row.uint("ordinal_position"),
        is_primary_key: row.flag("is_primary_key"),
        is_nullable: row.flag("is_nullable"),
        is_auto_increment: row.flag("is_identity"),
        generation_expression: row.text("generation_expression"),
        comment: row.text("comment"),
        logical_type: base,
        ..ColumnSnapshot::default()
    };

    match row.text("default_value") {
        Some(default) if default.trim_start().starts_with("nextval(") => {
            column.is_auto_increment = true;
        }
        Some(default) if !column.is_auto_increment => {
            column.default_value = Some(normalize_default(&default));
        }
        _ => {}
    }
    column
}

/// Maps `columns_query` rows.
#[must_use]
pub fn map_columns(rows: &[Row]) -> Vec<ColumnSnapshot> {
    rows.iter().map(map_column).collect()
}

/// Maps `relations_query` rows, expanding composite keys.
#[must_use]
pub fn map_relations(rows: &[Row]) -> Vec<RelationSpec> {
    let mut out = Vec::new();
    for row in rows {
        let child_columns = split_list(&row.text("child_columns").unwrap_or_default());
        let parent_columns = split_list(&row.text("parent_columns").unwrap_or_default());
        let base = row.uint("sequence").unwrap_or(1);
        let on_update = row.text("update_rule").and_then(|r| ReferentialAction::parse(&r));
        let on_delete = row.text("delete_rule").and_then(|r| ReferentialAction::parse(&r));
        for (offset, (child, parent)) in child_columns.iter().zip(&parent_columns).enumerate() {
            out.push(RelationSpec {
                parent_table: row.text("parent_table").unwrap_or_default(),
                parent_column: parent.clone(),
                child_table: row.text("child_table").unwrap_or_default(),
                child_column: child.clone(),
                constraint_name: row.text("constraint_name"),
                on_update,
                on_delete,
                sequence: base + u32::try_from(offset).unwrap_or(u32::MAX - base),
            });
        }
    }
    out
}

/// Maps `indexes_query` rows.
#[must_use]
pub fn map_indexes(rows: &[Row]) -> Vec<IndexSnapshot> {
    rows.iter()
        .map(|row| IndexSnapshot {
            table_name: row.text("table_name").unwrap_or_default(),
            index_name: row.text("index_name").unwrap_or_default(),
            column_name: row.text("column_name").unwrap_or_default(),
            non_unique: row.flag("non_unique"),
            sequence_in_index: row.uint("sequence_in_index").unwrap_or(1),
            constraint: row
                .text("constraint_type")
                .and_then(|c| ConstraintKind::parse(&c)),
        })
        .collect()
}

/// Maps `constraints_query` rows, one entry per constrained column.
#[must_use]
pub fn map_constraints(rows: &[Row]) -> Vec<IndexSnapshot> {
    let mut out = Vec::new();
    for row in rows {
        let constraint = row
            .text("constraint_type")
            .and_then(|c| ConstraintKind::parse(&c));
        let base = row.uint("sequence").unwrap_or(1);
        let columns = split_list(&row.text("columns").unwrap_or_default());
        for (offset, column) in columns.into_iter().enumerate() {
            out.push(IndexSnapshot {
                table_name: row.text("table_name").unwrap_or_default(),
                index_name: row.text("constraint_name").unwrap_or_default(),
                column_name: column,
                non_unique: !matches!(
                    constraint,
                    Some(ConstraintKind::PrimaryKey | ConstraintKind::Unique)
                ),
                sequence_in_index: base + u32::try_from(offset).unwrap_or(u32::MAX - base),
                constraint,
            });
        }
    }
    out
}

/// Maps `views_query` rows.
#[must_use]
pub fn map_views(rows: &[Row]) -> Vec<ViewSnapshot> {
    rows.iter()
        .map(|row| ViewSnapshot {
            view_name: row.text("view_name").unwrap_or_default(),
            definition: row
                .text("definition")
                .unwrap_or_default()
                .trim()
                .trim_end_matches(';')
                .to_string(),
        })
        .collect()
}

/// Maps `tables_query` rows.
#[must_use]
pub fn map_tables(rows: &[Row]) -> Vec<String> {
    rows.iter().filter_map(|row| row.text("table_name")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test rows are objects"),
        }
    }

    #[test]
    fn test_map_postgres_column_with_cast_default() {
        let column = map_column(&row(json!({
            "table_name": "books",
            "column_name": "status",
            "data_type": "character varying",
            "char_length": 255,
            "is_nullable": "YES",
            "is_primary_key": 0,
            "is_identity": 0,
            "default_value": "'draft'::character varying",
            "ordinal_position": 3,
        })));
        assert_eq!(column.logical_type, "character varying");
        assert_eq!(column.char_length, Some(255));
        assert!(column.is_nullable);
        assert_eq!(column.default_value.as_deref(), Some("draft"));
        assert_eq!(column.ordinal_position, Some(3));
    }

    #[test]
    fn test_serial_default_means_autoincrement() {
        let column = map_column(&row(json!({
            "column_name": "id",
            "data_type": "integer",
            "is_nullable": "NO",
            "is_primary_key": 1,
            "default_value": "nextval('books_id_seq'::regclass)",
        })));
        assert!(column.is_auto_increment);
        assert!(column.is_primary_key);
        assert_eq!(column.default_value, None);
    }

    #[test]
    fn test_sqlite_sized_type() {
        let column = map_column(&row(json!({
            "column_name": "title",
            "data_type": "varchar(120)",
            "is_nullable": "NO",
        })));
        assert_eq!(column.logical_type, "varchar");
        assert_eq!(column.char_length, Some(120));

        let column = map_column(&row(json!({
            "column_name": "price",
            "data_type": "decimal(10,2)",
            "is_nullable": "YES",
        })));
        assert_eq!(column.numeric_precision, Some(10));
        assert_eq!(column.numeric_scale, Some(2));
    }

    #[test]
    fn test_composite_relation_expands_with_sequence() {
        let relations = map_relations(&[row(json!({
            "constraint_name": "line_order_fk",
            "child_table": "lines",
            "child_columns": "tenant_id,order_id",
            "parent_table": "orders",
            "parent_columns": "tenant_id,id",
            "update_rule": "a",
            "delete_rule": "c",
        }))]);
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].sequence, 1);
        assert_eq!(relations[1].sequence, 2);
        assert_eq!(relations[1].parent_column, "id");
        assert_eq!(relations[0].on_delete.map(ReferentialAction::as_sql), Some("CASCADE"));
        assert_eq!(relations[0].on_update, Some(ReferentialAction::NoAction));
    }

    #[test]
    fn test_constraint_column_list_expands() {
        let entries = map_constraints(&[row(json!({
            "constraint_name": "uq_slug",
            "table_name": "posts",
            "constraint_type": "u",
            "columns": "{site_id,slug}",
        }))]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].column_name, "site_id");
        assert_eq!(entries[1].sequence_in_index, 2);
        assert!(!entries[1].non_unique);
        assert_eq!(entries[0].constraint, Some(ConstraintKind::Unique));
    }
}
