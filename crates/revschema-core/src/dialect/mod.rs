//! Dialect strategies: DDL synthesis and catalog query text.
//!
//! Every supported database is a value implementing [`DialectStrategy`].
//! The trait carries ANSI-flavored default implementations; dialects only
//! override what they render differently or cannot express at all.

mod databricks;
mod postgres;
mod sqlite;

pub use databricks::DatabricksDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diff::PrimaryKeyChange;
use crate::error::{Result, SynthError};
use crate::quote::{gen_query, QueryArg, Quoter};
use crate::reversible::Statement;
use crate::snapshot::{ColumnSnapshot, IndexSpec, RelationSpec, TableSpec, TriggerSpec, ViewSnapshot};

static NATIVE_TYPE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w -]+(?:\(\d+(?:\s?,\s?\d+)?\))?$").expect("valid native type regex")
});

static BARE_FUNCTION_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\(\)$").expect("valid function call regex"));

const CHAR_TYPES: &[&str] = &["varchar", "char", "character varying", "character", "nvarchar"];
const DECIMAL_TYPES: &[&str] = &["decimal", "numeric"];

/// Whether an edit adds a column or changes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOpKind {
    /// `ADD COLUMN`
    Add,
    /// Rename, retype, nullability and default changes.
    Edit,
}

/// The supported dialects, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// Databricks SQL (Delta tables).
    Databricks,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

static DATABRICKS: DatabricksDialect = DatabricksDialect::new();
static POSTGRES: PostgresDialect = PostgresDialect::new();
static SQLITE: SqliteDialect = SqliteDialect::new();

impl DialectKind {
    /// Returns the strategy for this dialect.
    #[must_use]
    pub fn strategy(self) -> &'static dyn DialectStrategy {
        match self {
            Self::Databricks => &DATABRICKS,
            Self::Postgres => &POSTGRES,
            Self::Sqlite => &SQLITE,
        }
    }

    /// Lowercase dialect name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Databricks => "databricks",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "databricks" => Ok(Self::Databricks),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SynthError::InvalidSpec(format!("unknown dialect '{other}'"))),
        }
    }
}

/// Appends length or precision to a base type name when the column carries one.
fn sized_type(base: &str, column: &ColumnSnapshot, default_len: Option<u32>) -> String {
    let lower = base.to_ascii_lowercase();
    if CHAR_TYPES.contains(&lower.as_str()) {
        if let Some(len) = column.char_length.or(default_len) {
            return format!("{base}({len})");
        }
    } else if DECIMAL_TYPES.contains(&lower.as_str()) {
        if let Some(precision) = column.numeric_precision {
            return match column.numeric_scale {
                Some(scale) => format!("{base}({precision},{scale})"),
                None => format!("{base}({precision})"),
            };
        }
    }
    base.to_string()
}

fn is_numeric_literal(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && value.parse::<f64>().is_ok()
}

/// DDL synthesis and catalog query text for one database dialect.
pub trait DialectStrategy: Quoter + fmt::Debug + Send + Sync {
    /// Dialect name, as used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Configuration key for this dialect.
    fn kind(&self) -> DialectKind;

    /// Schema used when the configuration names none.
    fn default_schema(&self) -> &'static str;

    /// Database to connect to while dropping another one, if the dialect
    /// needs to leave the target first.
    fn maintenance_database(&self) -> Option<&'static str> {
        None
    }

    /// Lowercase base names of native types accepted verbatim.
    fn native_types(&self) -> &'static [&'static str];

    /// Maps a portable logical type to this dialect's base type.
    fn map_logical_type(&self, logical: &str) -> Option<&'static str>;

    /// Column definition for a database-generated key.
    fn auto_increment_definition(&self, column: &ColumnSnapshot) -> Result<String>;

    /// Trailing table options appended to `CREATE TABLE`.
    fn table_properties(&self) -> Option<&'static str> {
        None
    }

    /// Expands `template` and wraps it in a [`Statement`].
    fn statement(&self, template: &str, args: &[QueryArg]) -> Result<Statement> {
        gen_query(self, template, args).map(Statement::new)
    }

    /// Type clause rebuilt from the catalog's own type name, for introspected
    /// columns whose logical type has no portable or native spelling.
    fn catalog_type(&self, _column: &ColumnSnapshot) -> Option<String> {
        None
    }

    /// Renders the column's type for this dialect.
    ///
    /// Portable logical names map through [`map_logical_type`]; native names
    /// must have a valid shape and a base name in [`native_types`]. Anything
    /// else falls back to [`catalog_type`].
    ///
    /// [`map_logical_type`]: DialectStrategy::map_logical_type
    /// [`native_types`]: DialectStrategy::native_types
    /// [`catalog_type`]: DialectStrategy::catalog_type
    fn type_map(&self, column: &ColumnSnapshot) -> Result<String> {
        let requested = column.logical_type.trim();
        if let Some(mapped) = self.map_logical_type(&requested.to_ascii_lowercase()) {
            return Ok(sized_type(mapped, column, Some(255)));
        }
        let unsupported = || {
            self.catalog_type(column).ok_or_else(|| SynthError::UnsupportedType {
                dialect: self.name(),
                data_type: column.logical_type.clone(),
            })
        };
        if !NATIVE_TYPE_SHAPE.is_match(requested) {
            return unsupported();
        }
        let base = requested
            .split('(')
            .next()
            .unwrap_or(requested)
            .trim()
            .to_ascii_lowercase();
        if !self.native_types().contains(&base.as_str()) {
            return unsupported();
        }
        if requested.contains('(') {
            Ok(requested.to_string())
        } else {
            Ok(sized_type(requested, column, None))
        }
    }

    /// Renders a default value expression.
    ///
    /// `NULL`, booleans, numbers, zero-argument function calls and
    /// `CURRENT_TIMESTAMP` are kept verbatim; anything else becomes a literal.
    fn render_default(&self, value: &str) -> String {
        let trimmed = value.trim();
        let upper = trimmed.to_ascii_uppercase();
        if matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE" | "CURRENT_TIMESTAMP")
            || is_numeric_literal(trimmed)
            || BARE_FUNCTION_CALL.is_match(trimmed)
        {
            return trimmed.to_string();
        }
        match trimmed
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
        {
            Some(literal) => self.quote_literal(&literal.replace("''", "'")),
            None => self.quote_literal(trimmed),
        }
    }

    /// Full column clause used by `CREATE TABLE`.
    fn column_definition(&self, column: &ColumnSnapshot) -> Result<String> {
        if column.is_auto_increment {
            return self.auto_increment_definition(column);
        }
        let mut def = format!(
            "{} {}",
            self.quote_identifier(&column.column_name),
            self.type_map(column)?
        );
        if column.is_required() {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = column.default_value.as_deref() {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_default(default));
        }
        Ok(def)
    }

    /// Trailing `PRIMARY KEY (...)` clause for `CREATE TABLE`.
    fn primary_key_clause(&self, spec: &TableSpec) -> Result<Option<String>> {
        let pk = spec.primary_key();
        if pk.is_empty() {
            return Ok(None);
        }
        gen_query(self, "PRIMARY KEY (??)", &[pk.into()]).map(Some)
    }

    /// One `CREATE TABLE` statement for the whole specification.
    fn synthesize_create_table(&self, spec: &TableSpec) -> Result<Statement> {
        spec.validate()?;
        let mut clauses = spec
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;
        if let Some(pk) = self.primary_key_clause(spec)? {
            clauses.push(pk);
        }
        let mut sql = format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(&spec.table_name),
            clauses.join(", ")
        );
        if let Some(props) = self.table_properties() {
            sql.push(' ');
            sql.push_str(props);
        }
        Ok(Statement::new(sql))
    }

    /// `DROP TABLE`.
    fn synthesize_drop_table(&self, table: &str) -> Result<Statement> {
        self.statement("DROP TABLE ??", &[table.into()])
    }

    /// `ALTER TABLE ... RENAME TO`.
    fn synthesize_rename_table(&self, from: &str, to: &str) -> Result<Statement> {
        self.statement("ALTER TABLE ?? RENAME TO ??", &[from.into(), to.into()])
    }

    /// Adds or edits a column.
    ///
    /// `old` is required for [`ColumnOpKind::Edit`].
    fn synthesize_column_operation(
        &self,
        table: &str,
        new: &ColumnSnapshot,
        old: Option<&ColumnSnapshot>,
        kind: ColumnOpKind,
    ) -> Result<Vec<Statement>> {
        match (kind, old) {
            (ColumnOpKind::Add, _) => self.synthesize_add_column(table, new),
            (ColumnOpKind::Edit, Some(old)) => self.synthesize_edit_column(table, new, old),
            (ColumnOpKind::Edit, None) => Err(SynthError::InvalidSpec(format!(
                "editing column '{}' requires its previous snapshot",
                new.column_name
            ))),
        }
    }

    /// `ADD COLUMN` followed by `SET DEFAULT` when a default is present.
    fn synthesize_add_column(&self, table: &str, column: &ColumnSnapshot) -> Result<Vec<Statement>> {
        let head = gen_query(self, "ALTER TABLE ?? ADD COLUMN", &[table.into()])?;
        if column.is_auto_increment {
            // The key itself comes from the primary key statement.
            let column = ColumnSnapshot {
                is_primary_key: false,
                ..column.clone()
            };
            let def = self.auto_increment_definition(&column)?;
            return Ok(vec![Statement::new(format!("{head} {def}"))]);
        }
        let mut def = format!(
            "{head} {} {}",
            self.quote_identifier(&column.column_name),
            self.type_map(column)?
        );
        if column.is_required() {
            def.push_str(" NOT NULL");
        }
        let mut out = vec![Statement::new(def)];
        if let Some(default) = column.default_value.as_deref() {
            let alter = gen_query(
                self,
                "ALTER TABLE ?? ALTER COLUMN ??",
                &[table.into(), (&column.column_name).into()],
            )?;
            out.push(Statement::new(format!(
                "{alter} SET DEFAULT {}",
                self.render_default(default)
            )));
        }
        Ok(out)
    }

    /// Guarded rename, retype, nullability and default statements.
    fn synthesize_edit_column(
        &self,
        table: &str,
        new: &ColumnSnapshot,
        old: &ColumnSnapshot,
    ) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        if new.column_name != old.column_name {
            out.push(self.statement(
                "ALTER TABLE ?? RENAME COLUMN ?? TO ??",
                &[
                    table.into(),
                    (&old.column_name).into(),
                    (&new.column_name).into(),
                ],
            )?);
        }

        let alter = gen_query(
            self,
            "ALTER TABLE ?? ALTER COLUMN ??",
            &[table.into(), (&new.column_name).into()],
        )?;

        let new_type = self.type_map(new)?;
        if !new_type.eq_ignore_ascii_case(&self.type_map(old)?) {
            out.push(Statement::new(format!("{alter} TYPE {new_type}")));
        }

        if new.is_nullable != old.is_nullable {
            let clause = if new.is_nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            out.push(Statement::new(format!("{alter} {clause}")));
        }

        if new.normalized_default() != old.normalized_default() {
            let sql = match new.default_value.as_deref() {
                Some(value) => format!("{alter} SET DEFAULT {}", self.render_default(value)),
                None => format!("{alter} DROP DEFAULT"),
            };
            out.push(Statement::new(sql));
        }
        Ok(out)
    }

    /// `DROP COLUMN`.
    fn synthesize_drop_column(&self, table: &str, column: &ColumnSnapshot) -> Result<Statement> {
        self.statement(
            "ALTER TABLE ?? DROP COLUMN ??",
            &[table.into(), (&column.column_name).into()],
        )
    }

    /// Drops and re-adds the `<table>_pkey` constraint.
    fn synthesize_primary_key(&self, table: &str, change: &PrimaryKeyChange) -> Result<Vec<Statement>> {
        let constraint = format!("{table}_pkey");
        let mut out = Vec::with_capacity(2);
        if change.drop_existing {
            out.push(self.statement(
                "ALTER TABLE ?? DROP CONSTRAINT IF EXISTS ??",
                &[table.into(), (&constraint).into()],
            )?);
        }
        if !change.columns.is_empty() {
            out.push(self.statement(
                "ALTER TABLE ?? ADD CONSTRAINT ?? PRIMARY KEY (??)",
                &[
                    table.into(),
                    (&constraint).into(),
                    change.columns.as_slice().into(),
                ],
            )?);
        }
        Ok(out)
    }

    /// `CREATE VIEW ... AS <definition>`.
    fn synthesize_create_view(&self, view: &ViewSnapshot) -> Result<Statement> {
        let head = gen_query(self, "CREATE VIEW ??", &[(&view.view_name).into()])?;
        Ok(Statement::new(format!("{head} AS {}", view.definition.trim())))
    }

    /// `DROP VIEW`.
    fn synthesize_drop_view(&self, view_name: &str) -> Result<Statement> {
        self.statement("DROP VIEW IF EXISTS ??", &[view_name.into()])
    }

    /// `CREATE TRIGGER`.
    fn synthesize_create_trigger(&self, trigger: &TriggerSpec) -> Result<Statement> {
        let head = gen_query(
            self,
            "CREATE TRIGGER ??",
            &[(&trigger.trigger_name).into()],
        )?;
        let table = self.quote_identifier(&trigger.table_name);
        Ok(Statement::new(format!(
            "{head} {} {} ON {table} FOR EACH ROW {}",
            trigger.timing.trim().to_ascii_uppercase(),
            trigger.event.trim().to_ascii_uppercase(),
            trigger.statement.trim()
        )))
    }

    /// `DROP TRIGGER`.
    fn synthesize_drop_trigger(&self, trigger: &TriggerSpec) -> Result<Statement> {
        self.statement(
            "DROP TRIGGER IF EXISTS ?? ON ??",
            &[
                (&trigger.trigger_name).into(),
                (&trigger.table_name).into(),
            ],
        )
    }

    /// `CREATE SEQUENCE`.
    fn synthesize_create_sequence(&self, name: &str, start: Option<i64>) -> Result<Statement> {
        let head = gen_query(self, "CREATE SEQUENCE ??", &[name.into()])?;
        Ok(Statement::new(match start {
            Some(start) => format!("{head} START WITH {start}"),
            None => head,
        }))
    }

    /// `DROP SEQUENCE`.
    fn synthesize_drop_sequence(&self, name: &str) -> Result<Statement> {
        self.statement("DROP SEQUENCE IF EXISTS ??", &[name.into()])
    }

    /// `ALTER SEQUENCE ... RENAME TO`.
    fn synthesize_rename_sequence(&self, from: &str, to: &str) -> Result<Statement> {
        self.statement("ALTER SEQUENCE ?? RENAME TO ??", &[from.into(), to.into()])
    }

    /// `CREATE [UNIQUE] INDEX`.
    fn synthesize_create_index(&self, index: &IndexSpec) -> Result<Statement> {
        let template = if index.unique {
            "CREATE UNIQUE INDEX ?? ON ?? (??)"
        } else {
            "CREATE INDEX ?? ON ?? (??)"
        };
        self.statement(
            template,
            &[
                (&index.index_name).into(),
                (&index.table_name).into(),
                index.columns.as_slice().into(),
            ],
        )
    }

    /// `DROP INDEX`.
    fn synthesize_drop_index(&self, index: &IndexSpec) -> Result<Statement> {
        self.statement("DROP INDEX IF EXISTS ??", &[(&index.index_name).into()])
    }

    /// Adds one foreign key constraint. `parts` are the column pairs of a
    /// single constraint, ordered by sequence.
    fn synthesize_add_foreign_key(&self, parts: &[RelationSpec]) -> Result<Statement> {
        let first = parts
            .first()
            .ok_or_else(|| SynthError::InvalidSpec("foreign key without columns".to_string()))?;
        let child: Vec<String> = parts.iter().map(|p| p.child_column.clone()).collect();
        let parent: Vec<String> = parts.iter().map(|p| p.parent_column.clone()).collect();
        let mut sql = gen_query(
            self,
            "ALTER TABLE ?? ADD CONSTRAINT ?? FOREIGN KEY (??) REFERENCES ?? (??)",
            &[
                (&first.child_table).into(),
                first.effective_name().into(),
                child.into(),
                (&first.parent_table).into(),
                parent.into(),
            ],
        )?;
        if let Some(action) = first.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = first.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        Ok(Statement::new(sql))
    }

    /// Drops one foreign key constraint.
    fn synthesize_drop_foreign_key(&self, relation: &RelationSpec) -> Result<Statement> {
        self.statement(
            "ALTER TABLE ?? DROP CONSTRAINT ??",
            &[
                (&relation.child_table).into(),
                relation.effective_name().into(),
            ],
        )
    }

    /// `CREATE DATABASE`.
    fn synthesize_create_database(&self, name: &str) -> Result<Statement> {
        self.statement("CREATE DATABASE ??", &[name.into()])
    }

    /// Statements run from the maintenance database to cut other sessions
    /// off `name` before it is dropped.
    fn synthesize_detach_sessions(&self, _name: &str) -> Result<Vec<Statement>> {
        Ok(Vec::new())
    }

    /// `DROP DATABASE`.
    fn synthesize_drop_database(&self, name: &str) -> Result<Statement> {
        self.statement("DROP DATABASE ??", &[name.into()])
    }

    /// Lists columns of `table`, aliased to the canonical column names.
    fn columns_query(&self, schema: &str, table: &str) -> Result<String>;

    /// Lists foreign keys declared on `table`.
    fn relations_query(&self, schema: &str, table: &str) -> Result<String>;

    /// Lists index entries on `table`, one row per column.
    fn indexes_query(&self, schema: &str, table: &str) -> Result<String>;

    /// Lists table constraints with their column lists.
    fn constraints_query(&self, schema: &str, table: &str) -> Result<String>;

    /// Lists views with their definitions.
    fn views_query(&self, schema: &str) -> Result<String>;

    /// Lists base tables.
    fn tables_query(&self, schema: &str) -> Result<String>;

    /// Returns the server version as `server_version`.
    fn server_version_query(&self) -> &'static str;

    /// Cheapest round trip proving the connection works.
    fn connection_check_query(&self) -> &'static str {
        "SELECT 1+1 AS data"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::normalize_default;

    #[test]
    fn test_dialect_kind_parse_and_strategy() {
        assert_eq!("PostgreSQL".parse::<DialectKind>().unwrap(), DialectKind::Postgres);
        assert_eq!("sqlite3".parse::<DialectKind>().unwrap(), DialectKind::Sqlite);
        assert!("oracle".parse::<DialectKind>().is_err());
        assert_eq!(DialectKind::Databricks.strategy().name(), "databricks");
        assert_eq!(DialectKind::Sqlite.strategy().kind(), DialectKind::Sqlite);
    }

    #[test]
    fn test_type_map_portable_and_native() {
        let pg = DialectKind::Postgres.strategy();
        let col = |ty: &str| ColumnSnapshot::new("t", "c", ty);
        assert_eq!(pg.type_map(&col("string")).unwrap(), "VARCHAR(255)");
        assert_eq!(pg.type_map(&col("string").char_length(40)).unwrap(), "VARCHAR(40)");
        assert_eq!(pg.type_map(&col("decimal").precision(10, 2)).unwrap(), "DECIMAL(10,2)");
        assert_eq!(pg.type_map(&col("varchar(12)")).unwrap(), "varchar(12)");
        assert_eq!(
            pg.type_map(&col("character varying").char_length(255)).unwrap(),
            "character varying(255)"
        );
        assert!(matches!(
            pg.type_map(&col("int; DROP TABLE x")),
            Err(SynthError::UnsupportedType { .. })
        ));
        assert!(matches!(
            pg.type_map(&col("frobnicator")),
            Err(SynthError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_render_default() {
        let pg = DialectKind::Postgres.strategy();
        assert_eq!(pg.render_default("NULL"), "NULL");
        assert_eq!(pg.render_default("true"), "true");
        assert_eq!(pg.render_default("42"), "42");
        assert_eq!(pg.render_default("-1.5"), "-1.5");
        assert_eq!(pg.render_default("now()"), "now()");
        assert_eq!(pg.render_default("current_timestamp"), "current_timestamp");
        assert_eq!(pg.render_default("draft"), "'draft'");
        assert_eq!(pg.render_default("'draft'"), "'draft'");
        assert_eq!(pg.render_default("it's"), "'it''s'");
        assert_eq!(pg.render_default("'it''s'"), "'it''s'");
        assert_eq!(pg.render_default(&normalize_default("'it''s'::text")), "'it''s'");
        assert_eq!(pg.render_default("now(); DROP TABLE x"), "'now(); DROP TABLE x'");
    }
}
