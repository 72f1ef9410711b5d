//! PostgreSQL dialect.

use super::DialectStrategy;
use super::DialectKind;
use crate::error::Result;
use crate::quote::{ansi_literal, gen_query, quote_with, Quoter};
use crate::reversible::Statement;
use crate::snapshot::ColumnSnapshot;

const NATIVE_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "int",
    "int2",
    "int4",
    "int8",
    "bigint",
    "serial",
    "bigserial",
    "real",
    "double precision",
    "float4",
    "float8",
    "numeric",
    "decimal",
    "money",
    "boolean",
    "bool",
    "char",
    "character",
    "varchar",
    "character varying",
    "text",
    "bytea",
    "date",
    "time",
    "time without time zone",
    "time with time zone",
    "timestamp",
    "timestamp without time zone",
    "timestamp with time zone",
    "timestamptz",
    "interval",
    "json",
    "jsonb",
    "uuid",
    "inet",
    "cidr",
    "macaddr",
    "xml",
    "tsvector",
    "point",
];

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Quoter for PostgresDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn quote_literal(&self, value: &str) -> String {
        ansi_literal(value)
    }
}

impl DialectStrategy for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn default_schema(&self) -> &'static str {
        "public"
    }

    fn maintenance_database(&self) -> Option<&'static str> {
        Some("postgres")
    }

    fn native_types(&self) -> &'static [&'static str] {
        NATIVE_TYPES
    }

    fn map_logical_type(&self, logical: &str) -> Option<&'static str> {
        Some(match logical {
            "string" => "VARCHAR",
            "text" | "longtext" => "TEXT",
            "integer" | "int" => "INTEGER",
            "smallint" => "SMALLINT",
            "bigint" => "BIGINT",
            "boolean" | "bool" => "BOOLEAN",
            "decimal" => "DECIMAL",
            "float" => "REAL",
            "double" => "DOUBLE PRECISION",
            "date" => "DATE",
            "datetime" | "timestamp" => "TIMESTAMP",
            "time" => "TIME",
            "json" => "JSONB",
            "uuid" => "UUID",
            "binary" => "BYTEA",
            _ => return None,
        })
    }

    fn catalog_type(&self, column: &ColumnSnapshot) -> Option<String> {
        let raw = column.raw_type.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if column.logical_type.eq_ignore_ascii_case("array") {
            // udt_name of an array is the element type prefixed with `_`
            let element = raw.strip_prefix('_')?;
            return Some(format!("{}[]", self.quote_identifier(element)));
        }
        if column.logical_type.eq_ignore_ascii_case("user-defined") {
            return Some(self.quote_identifier(raw));
        }
        None
    }

    fn auto_increment_definition(&self, column: &ColumnSnapshot) -> Result<String> {
        let serial = if column.logical_type.eq_ignore_ascii_case("bigint")
            || column.logical_type.eq_ignore_ascii_case("int8")
        {
            "BIGSERIAL"
        } else {
            "SERIAL"
        };
        Ok(format!(
            "{} {serial} NOT NULL",
            self.quote_identifier(&column.column_name)
        ))
    }

    fn synthesize_drop_table(&self, table: &str) -> Result<Statement> {
        self.statement("DROP TABLE IF EXISTS ??", &[table.into()])
    }

    fn synthesize_detach_sessions(&self, name: &str) -> Result<Vec<Statement>> {
        Ok(vec![
            self.statement(
                "ALTER DATABASE ?? WITH CONNECTION LIMIT 0",
                &[name.into()],
            )?,
            self.statement(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = ? AND pid <> pg_backend_pid()",
                &[name.into()],
            )?,
        ])
    }

    fn columns_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT c.table_name::text AS table_name,
  c.column_name::text AS column_name,
  c.data_type::text AS data_type,
  c.udt_name::text AS raw_type,
  c.character_maximum_length::bigint AS char_length,
  c.numeric_precision::bigint AS numeric_precision,
  c.numeric_scale::bigint AS numeric_scale,
  c.datetime_precision::bigint AS datetime_precision,
  c.ordinal_position::bigint AS ordinal_position,
  c.is_nullable::text AS is_nullable,
  (CASE WHEN pk.column_name IS NULL THEN 0 ELSE 1 END)::bigint AS is_primary_key,
  (CASE WHEN c.is_identity = 'YES' THEN 1 ELSE 0 END)::bigint AS is_identity,
  c.column_default::text AS default_value,
  c.generation_expression::text AS generation_expression,
  col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int)::text AS comment
FROM information_schema.columns c
LEFT JOIN (
  SELECT kcu.column_name
  FROM information_schema.table_constraints tc
  JOIN information_schema.key_column_usage kcu
    ON kcu.constraint_name = tc.constraint_name
   AND kcu.table_schema = tc.table_schema
   AND kcu.table_name = tc.table_name
  WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = ? AND tc.table_name = ?
) pk ON pk.column_name = c.column_name
WHERE c.table_schema = ? AND c.table_name = ?
ORDER BY c.ordinal_position",
            &[schema.into(), table.into(), schema.into(), table.into()],
        )
    }

    fn relations_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT con.conname::text AS constraint_name,
  cl.relname::text AS child_table,
  array_to_string(ARRAY(
    SELECT a.attname::text FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    ORDER BY k.ord), ',') AS child_columns,
  pcl.relname::text AS parent_table,
  array_to_string(ARRAY(
    SELECT a.attname::text FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
    ORDER BY k.ord), ',') AS parent_columns,
  con.confupdtype::text AS update_rule,
  con.confdeltype::text AS delete_rule
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
JOIN pg_class pcl ON pcl.oid = con.confrelid
WHERE con.contype = 'f' AND ns.nspname = ? AND cl.relname = ?
ORDER BY con.conname",
            &[schema.into(), table.into()],
        )
    }

    fn indexes_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT t.relname::text AS table_name,
  i.relname::text AS index_name,
  a.attname::text AS column_name,
  (CASE WHEN ix.indisunique THEN 0 ELSE 1 END)::bigint AS non_unique,
  k.ord::bigint AS sequence_in_index,
  con.contype::text AS constraint_type
FROM pg_index ix
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace ns ON ns.oid = t.relnamespace
CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
LEFT JOIN pg_constraint con ON con.conindid = ix.indexrelid AND con.conrelid = t.oid
WHERE ns.nspname = ? AND t.relname = ?
ORDER BY i.relname, k.ord",
            &[schema.into(), table.into()],
        )
    }

    fn constraints_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT con.conname::text AS constraint_name,
  cl.relname::text AS table_name,
  con.contype::text AS constraint_type,
  ARRAY(
    SELECT a.attname::text FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    ORDER BY k.ord)::text AS columns
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
WHERE con.contype IN ('p', 'u', 'c', 'x') AND ns.nspname = ? AND cl.relname = ?
ORDER BY con.conname",
            &[schema.into(), table.into()],
        )
    }

    fn views_query(&self, schema: &str) -> Result<String> {
        gen_query(
            self,
            "SELECT viewname::text AS view_name, definition::text AS definition FROM pg_views WHERE schemaname = ? ORDER BY viewname",
            &[schema.into()],
        )
    }

    fn tables_query(&self, schema: &str) -> Result<String> {
        gen_query(
            self,
            "SELECT tablename::text AS table_name FROM pg_tables WHERE schemaname = ? ORDER BY tablename",
            &[schema.into()],
        )
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT current_setting('server_version')::text AS server_version"
    }
}
