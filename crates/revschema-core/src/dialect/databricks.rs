//! Databricks SQL dialect.
//!
//! Tables are Delta tables created with column mapping enabled, which is what
//! allows `RENAME COLUMN` and `DROP COLUMN` on them. Databricks has no
//! triggers, sequences or secondary indexes.

use super::{DialectKind, DialectStrategy};
use crate::error::{Result, SynthError};
use crate::quote::{gen_query, quote_with, Quoter};
use crate::reversible::Statement;
use crate::snapshot::{ColumnSnapshot, IndexSpec, RelationSpec, TableSpec, TriggerSpec, ViewSnapshot};

const NATIVE_TYPES: &[&str] = &[
    "tinyint",
    "smallint",
    "int",
    "integer",
    "bigint",
    "float",
    "double",
    "decimal",
    "boolean",
    "string",
    "varchar",
    "char",
    "binary",
    "date",
    "timestamp",
    "timestamp_ntz",
    "interval",
    "variant",
];

const TABLE_PROPERTIES: &str = "TBLPROPERTIES('delta.columnMapping.mode' = 'name', \
     'delta.minReaderVersion' = '2', 'delta.minWriterVersion' = '5')";

/// Databricks SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabricksDialect;

impl DatabricksDialect {
    /// Creates a new Databricks dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Quoter for DatabricksDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`')
    }

    fn quote_literal(&self, value: &str) -> String {
        quote_with(&value.replace('\\', "\\\\"), '\'')
    }
}

impl DialectStrategy for DatabricksDialect {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Databricks
    }

    fn default_schema(&self) -> &'static str {
        "default"
    }

    fn native_types(&self) -> &'static [&'static str] {
        NATIVE_TYPES
    }

    fn map_logical_type(&self, logical: &str) -> Option<&'static str> {
        Some(match logical {
            "string" | "text" | "longtext" | "json" | "uuid" | "time" => "STRING",
            "integer" | "int" => "INT",
            "smallint" => "SMALLINT",
            "bigint" => "BIGINT",
            "boolean" | "bool" => "BOOLEAN",
            "decimal" => "DECIMAL",
            "float" => "FLOAT",
            "double" => "DOUBLE",
            "date" => "DATE",
            "datetime" | "timestamp" => "TIMESTAMP",
            "binary" => "BINARY",
            _ => return None,
        })
    }

    /// Generated keys are strings filled in by the application. A key
    /// column declares the key inline.
    fn auto_increment_definition(&self, column: &ColumnSnapshot) -> Result<String> {
        let constraint = if column.is_primary_key { "PRIMARY KEY" } else { "NOT NULL" };
        Ok(format!(
            "{} VARCHAR(255) {constraint}",
            self.quote_identifier(&column.column_name)
        ))
    }

    fn primary_key_clause(&self, spec: &TableSpec) -> Result<Option<String>> {
        let pk = spec.primary_key();
        if pk.is_empty() {
            return Ok(None);
        }
        let inline_keys = spec
            .columns
            .iter()
            .filter(|c| c.is_auto_increment && c.is_primary_key)
            .count();
        match (inline_keys, pk.len()) {
            (0, _) => gen_query(self, "PRIMARY KEY (??)", &[pk.into()]).map(Some),
            (1, 1) => Ok(None),
            _ => Err(SynthError::unsupported(
                "databricks",
                format!("a composite primary key with an autoincrement column on '{}'", spec.table_name),
            )),
        }
    }

    fn table_properties(&self) -> Option<&'static str> {
        Some(TABLE_PROPERTIES)
    }

    fn synthesize_drop_table(&self, table: &str) -> Result<Statement> {
        self.statement("DROP TABLE IF EXISTS ??", &[table.into()])
    }

    fn synthesize_create_view(&self, view: &ViewSnapshot) -> Result<Statement> {
        let head = gen_query(self, "CREATE OR REPLACE VIEW ??", &[(&view.view_name).into()])?;
        Ok(Statement::new(format!("{head} AS {}", view.definition.trim())))
    }

    fn synthesize_create_trigger(&self, trigger: &TriggerSpec) -> Result<Statement> {
        Err(SynthError::unsupported(
            "databricks",
            format!("creating trigger '{}'", trigger.trigger_name),
        ))
    }

    fn synthesize_drop_trigger(&self, trigger: &TriggerSpec) -> Result<Statement> {
        Err(SynthError::unsupported(
            "databricks",
            format!("dropping trigger '{}'", trigger.trigger_name),
        ))
    }

    fn synthesize_create_sequence(&self, name: &str, _start: Option<i64>) -> Result<Statement> {
        Err(SynthError::unsupported("databricks", format!("creating sequence '{name}'")))
    }

    fn synthesize_drop_sequence(&self, name: &str) -> Result<Statement> {
        Err(SynthError::unsupported("databricks", format!("dropping sequence '{name}'")))
    }

    fn synthesize_rename_sequence(&self, from: &str, _to: &str) -> Result<Statement> {
        Err(SynthError::unsupported("databricks", format!("renaming sequence '{from}'")))
    }

    fn synthesize_create_index(&self, index: &IndexSpec) -> Result<Statement> {
        Err(SynthError::unsupported(
            "databricks",
            format!("creating index '{}'", index.index_name),
        ))
    }

    fn synthesize_drop_index(&self, index: &IndexSpec) -> Result<Statement> {
        Err(SynthError::unsupported(
            "databricks",
            format!("dropping index '{}'", index.index_name),
        ))
    }

    /// Foreign keys are informational on Databricks and take no rules.
    fn synthesize_add_foreign_key(&self, parts: &[RelationSpec]) -> Result<Statement> {
        let first = parts
            .first()
            .ok_or_else(|| SynthError::InvalidSpec("foreign key without columns".to_string()))?;
        let child: Vec<String> = parts.iter().map(|p| p.child_column.clone()).collect();
        let parent: Vec<String> = parts.iter().map(|p| p.parent_column.clone()).collect();
        self.statement(
            "ALTER TABLE ?? ADD CONSTRAINT ?? FOREIGN KEY (??) REFERENCES ?? (??)",
            &[
                (&first.child_table).into(),
                first.effective_name().into(),
                child.into(),
                (&first.parent_table).into(),
                parent.into(),
            ],
        )
    }

    fn synthesize_create_database(&self, name: &str) -> Result<Statement> {
        self.statement("CREATE DATABASE IF NOT EXISTS ??", &[name.into()])
    }

    fn synthesize_drop_database(&self, name: &str) -> Result<Statement> {
        self.statement("DROP DATABASE IF EXISTS ?? CASCADE", &[name.into()])
    }

    fn columns_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT c.table_name AS table_name,
  c.column_name AS column_name,
  lower(c.data_type) AS data_type,
  c.full_data_type AS raw_type,
  c.character_maximum_length AS char_length,
  c.numeric_precision AS numeric_precision,
  c.numeric_scale AS numeric_scale,
  c.datetime_precision AS datetime_precision,
  c.ordinal_position + 1 AS ordinal_position,
  c.is_nullable AS is_nullable,
  CASE WHEN pk.column_name IS NULL THEN 0 ELSE 1 END AS is_primary_key,
  CASE WHEN c.is_identity = 'YES' THEN 1 ELSE 0 END AS is_identity,
  c.column_default AS default_value,
  c.generation_expression AS generation_expression,
  c.comment AS comment
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
            r"SELECT rc.constraint_name AS constraint_name,
  kcu.table_name AS child_table,
  kcu.column_name AS child_columns,
  pk.table_name AS parent_table,
  pk.column_name AS parent_columns,
  rc.update_rule AS update_rule,
  rc.delete_rule AS delete_rule,
  kcu.ordinal_position AS sequence
FROM information_schema.referential_constraints rc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = rc.constraint_name AND kcu.constraint_schema = rc.constraint_schema
JOIN information_schema.key_column_usage pk
  ON pk.constraint_name = rc.unique_constraint_name
 AND pk.constraint_schema = rc.unique_constraint_schema
 AND pk.ordinal_position = kcu.position_in_unique_constraint
WHERE kcu.table_schema = ? AND kcu.table_name = ?
ORDER BY rc.constraint_name, kcu.ordinal_position",
            &[schema.into(), table.into()],
        )
    }

    fn indexes_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT kcu.table_name AS table_name,
  kcu.constraint_name AS index_name,
  kcu.column_name AS column_name,
  0 AS non_unique,
  kcu.ordinal_position AS sequence_in_index,
  tc.constraint_type AS constraint_type
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name
 AND kcu.table_schema = tc.table_schema
 AND kcu.table_name = tc.table_name
WHERE tc.table_schema = ? AND tc.table_name = ?
ORDER BY kcu.constraint_name, kcu.ordinal_position",
            &[schema.into(), table.into()],
        )
    }

    fn constraints_query(&self, schema: &str, table: &str) -> Result<String> {
        gen_query(
            self,
            r"SELECT tc.constraint_name AS constraint_name,
  tc.table_name AS table_name,
  tc.constraint_type AS constraint_type,
  kcu.column_name AS columns,
  kcu.ordinal_position AS sequence
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name
 AND kcu.table_schema = tc.table_schema
 AND kcu.table_name = tc.table_name
WHERE tc.constraint_type <> 'FOREIGN KEY' AND tc.table_schema = ? AND tc.table_name = ?
ORDER BY tc.constraint_name, kcu.ordinal_position",
            &[schema.into(), table.into()],
        )
    }

    fn views_query(&self, schema: &str) -> Result<String> {
        gen_query(
            self,
            "SELECT table_name AS view_name, view_definition AS definition \
             FROM information_schema.views WHERE table_schema = ? ORDER BY table_name",
            &[schema.into()],
        )
    }

    fn tables_query(&self, schema: &str) -> Result<String> {
        gen_query(
            self,
            "SELECT table_name AS table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_type <> 'VIEW' ORDER BY table_name",
            &[schema.into()],
        )
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT current_version().dbsql_version AS server_version"
    }
}
