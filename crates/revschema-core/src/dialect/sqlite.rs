//! SQLite dialect.
//!
//! SQLite's `ALTER TABLE` only supports adding, renaming and dropping
//! columns. Retyping, nullability and default edits, and primary key changes
//! on existing tables, all need a table rebuild and are reported as
//! unsupported instead.

use super::{DialectKind, DialectStrategy};
use crate::diff::PrimaryKeyChange;
use crate::error::{Result, SynthError};
use crate::quote::{ansi_literal, gen_query, quote_with, Quoter};
use crate::reversible::Statement;
use crate::snapshot::{ColumnSnapshot, RelationSpec, TableSpec, TriggerSpec};

const NATIVE_TYPES: &[&str] = &[
    "integer",
    "int",
    "smallint",
    "bigint",
    "real",
    "double",
    "double precision",
    "float",
    "numeric",
    "decimal",
    "boolean",
    "text",
    "varchar",
    "char",
    "character varying",
    "character",
    "nvarchar",
    "clob",
    "blob",
    "date",
    "datetime",
    "timestamp",
    "time",
    "json",
];

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn rebuild_required(column: &str, what: &str) -> SynthError {
        SynthError::unsupported(
            "sqlite",
            format!("changing the {what} of column '{column}' without rebuilding the table"),
        )
    }
}

impl Quoter for SqliteDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn quote_literal(&self, value: &str) -> String {
        ansi_literal(value)
    }
}

impl DialectStrategy for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn default_schema(&self) -> &'static str {
        "main"
    }

    fn native_types(&self) -> &'static [&'static str] {
        NATIVE_TYPES
    }

    fn map_logical_type(&self, logical: &str) -> Option<&'static str> {
        Some(match logical {
            "string" => "VARCHAR",
            "text" | "longtext" | "json" | "uuid" => "TEXT",
            "integer" | "int" | "smallint" => "INTEGER",
            "bigint" => "BIGINT",
            "boolean" | "bool" => "BOOLEAN",
            "decimal" => "DECIMAL",
            "float" | "double" => "REAL",
            "date" => "DATE",
            "datetime" | "timestamp" => "DATETIME",
            "time" => "TIME",
            "binary" => "BLOB",
            _ => return None,
        })
    }

    fn auto_increment_definition(&self, column: &ColumnSnapshot) -> Result<String> {
        Ok(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            self.quote_identifier(&column.column_name)
        ))
    }

    fn primary_key_clause(&self, spec: &TableSpec) -> Result<Option<String>> {
        let auto_keys = spec.columns.iter().filter(|c| c.is_auto_increment).count();
        if auto_keys > 1 {
            return Err(SynthError::unsupported(
                "sqlite",
                format!("more than one autoincrement column on '{}'", spec.table_name),
            ));
        }
        let pk = spec.primary_key();
        if auto_keys == 1 {
            // The key is declared inline with the autoincrement column.
            if pk.len() > 1 {
                return Err(SynthError::unsupported(
                    "sqlite",
                    format!("a composite primary key with an autoincrement column on '{}'", spec.table_name),
                ));
            }
            return Ok(None);
        }
        if pk.is_empty() {
            return Ok(None);
        }
        gen_query(self, "PRIMARY KEY (??)", &[pk.into()]).map(Some)
    }

    fn synthesize_add_column(&self, table: &str, column: &ColumnSnapshot) -> Result<Vec<Statement>> {
        if column.is_auto_increment || column.is_primary_key {
            return Err(SynthError::unsupported(
                "sqlite",
                format!("adding key column '{}' to an existing table", column.column_name),
            ));
        }
        // No ALTER COLUMN, so the default is declared inline.
        let head = gen_query(self, "ALTER TABLE ?? ADD COLUMN", &[table.into()])?;
        Ok(vec![Statement::new(format!(
            "{head} {}",
            self.column_definition(column)?
        ))])
    }

    fn synthesize_edit_column(
        &self,
        table: &str,
        new: &ColumnSnapshot,
        old: &ColumnSnapshot,
    ) -> Result<Vec<Statement>> {
        if !self.type_map(new)?.eq_ignore_ascii_case(&self.type_map(old)?) {
            return Err(Self::rebuild_required(&new.column_name, "type"));
        }
        if new.is_nullable != old.is_nullable {
            return Err(Self::rebuild_required(&new.column_name, "nullability"));
        }
        if new.normalized_default() != old.normalized_default() {
            return Err(Self::rebuild_required(&new.column_name, "default"));
        }
        if new.column_name == old.column_name {
            return Ok(Vec::new());
        }
        Ok(vec![self.statement(
            "ALTER TABLE ?? RENAME COLUMN ?? TO ??",
            &[
                table.into(),
                (&old.column_name).into(),
                (&new.column_name).into(),
            ],
        )?])
    }

    fn synthesize_primary_key(&self, table: &str, _change: &PrimaryKeyChange) -> Result<Vec<Statement>> {
        Err(SynthError::unsupported(
            "sqlite",
            format!("changing the primary key of existing table '{table}'"),
        ))
    }

    fn synthesize_drop_table(&self, table: &str) -> Result<Statement> {
        self.statement("DROP TABLE IF EXISTS ??", &[table.into()])
    }

    fn synthesize_drop_trigger(&self, trigger: &TriggerSpec) -> Result<Statement> {
        self.statement(
            "DROP TRIGGER IF EXISTS ??",
            &[(&trigger.trigger_name).into()],
        )
    }

    fn synthesize_create_sequence(&self, name: &str, _start: Option<i64>) -> Result<Statement> {
        Err(SynthError::unsupported("sqlite", format!("creating sequence '{name}'")))
    }

    fn synthesize_drop_sequence(&self, name: &str) -> Result<Statement> {
        Err(SynthError::unsupported("sqlite", format!("dropping sequence '{name}'")))
    }

    fn synthesize_rename_sequence(&self, from: &str, _to: &str) -> Result<Statement> {
        Err(SynthError::unsupported("sqlite", format!("renaming sequence '{from}'")))
    }

    fn synthesize_add_foreign_key(&self, parts: &[RelationSpec]) -> Result<Statement> {
        let table = parts.first().map_or("", |p| p.child_table.as_str());
        Err(SynthError::unsupported(
            "sqlite",
            format!("adding a foreign key to existing table '{table}'"),
        ))
    }

    fn synthesize_drop_foreign_key(&self, relation: &RelationSpec) -> Result<Statement> {
        Err(SynthError::unsupported(
            "sqlite",
            format!("dropping foreign key '{}'", relation.effective_name()),
        ))
    }

    fn synthesize_create_database(&self, name: &str) -> Result<Statement> {
        Err(SynthError::unsupported("sqlite", format!("creating database '{name}'")))
    }

    fn synthesize_drop_database(&self, name: &str) -> Result<Statement> {
        Err(SynthError::unsupported("sqlite", format!("dropping database '{name}'")))
    }

    fn columns_query(&self, _schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r#"SELECT ? AS table_name,
  p.name AS column_name,
  lower(p.type) AS data_type,
  p.type AS raw_type,
  NULL AS char_length,
  NULL AS numeric_precision,
  NULL AS numeric_scale,
  NULL AS datetime_precision,
  p.cid + 1 AS ordinal_position,
  CASE WHEN p."notnull" = 0 AND p.pk = 0 THEN 'YES' ELSE 'NO' END AS is_nullable,
  CASE WHEN p.pk > 0 THEN 1 ELSE 0 END AS is_primary_key,
  CASE WHEN p.pk > 0 AND upper(p.type) = 'INTEGER' AND upper(m.sql) LIKE '%AUTOINCREMENT%' THEN 1 ELSE 0 END AS is_identity,
  p.dflt_value AS default_value,
  NULL AS generation_expression,
  NULL AS comment
FROM pragma_table_info(?) p
JOIN sqlite_master m ON m.type = 'table' AND m.name = ?
ORDER BY p.cid"#,
            &[table.into(), table.into(), table.into()],
        )
    }

    fn relations_query(&self, _schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r#"SELECT NULL AS constraint_name,
  ? AS child_table,
  f."from" AS child_columns,
  f."table" AS parent_table,
  f."to" AS parent_columns,
  f.on_update AS update_rule,
  f.on_delete AS delete_rule,
  f.seq + 1 AS sequence
FROM pragma_foreign_key_list(?) f
ORDER BY f.id, f.seq"#,
            &[table.into(), table.into()],
        )
    }

    fn indexes_query(&self, _schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r#"SELECT ? AS table_name,
  il.name AS index_name,
  ii.name AS column_name,
  CASE WHEN il."unique" = 1 THEN 0 ELSE 1 END AS non_unique,
  ii.seqno + 1 AS sequence_in_index,
  CASE il.origin WHEN 'pk' THEN 'p' WHEN 'u' THEN 'u' ELSE NULL END AS constraint_type
FROM pragma_index_list(?) il
JOIN pragma_index_info(il.name) ii
ORDER BY il.name, ii.seqno"#,
            &[table.into(), table.into()],
        )
    }

    fn constraints_query(&self, _schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r#"SELECT il.name AS constraint_name,
  ? AS table_name,
  CASE il.origin WHEN 'pk' THEN 'p' ELSE 'u' END AS constraint_type,
  ii.name AS columns,
  ii.seqno + 1 AS sequence
FROM pragma_index_list(?) il
JOIN pragma_index_info(il.name) ii
WHERE il.origin IN ('pk', 'u')
ORDER BY il.name, ii.seqno"#,
            &[table.into(), table.into()],
        )
    }

    fn views_query(&self, _schema: &str) -> Result<String> {
        Ok(
            "SELECT name AS view_name, trim(substr(sql, instr(upper(sql), ' AS ') + 4)) AS definition \
             FROM sqlite_master WHERE type = 'view' ORDER BY name"
                .to_string(),
        )
    }

    fn tables_query(&self, _schema: &str) -> Result<String> {
        Ok(
            "SELECT name AS table_name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
                .to_string(),
        )
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT sqlite_version() AS server_version"
    }
}
