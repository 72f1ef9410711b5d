//! Dialect-neutral snapshots of tables, columns, relations, indexes and views.
//!
//! A snapshot describes structure at one point in time. Introspection builds
//! the "old" side from a live database; callers build the "new" side from an
//! edit request. The diff classifier compares the two.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

static CAST_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::[\w (),]+$").expect("valid cast suffix regex"));

/// Strips a trailing `::type` cast and one wrapping pair of single quotes,
/// unescaping doubled quotes inside the literal.
///
/// Catalogs report defaults the way the server stores them, e.g.
/// `'draft'::character varying`. Normalizing both sides before comparing
/// keeps a round-tripped default from looking changed.
#[must_use]
pub fn normalize_default(value: &str) -> String {
    let stripped = CAST_SUFFIX.replace(value.trim(), "");
    let stripped = stripped.as_ref();
    match stripped
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        Some(literal) => literal.replace("''", "'"),
        None => stripped.to_string(),
    }
}

/// How a column changed between two snapshots.
///
/// When a column carries more than one marker the precedence is
/// removal, then edit, then addition; DDL ordering depends on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMarker {
    /// Unchanged, or not yet classified.
    #[default]
    Unset,
    /// New column.
    Added,
    /// Existing column with changed facets.
    Edited,
    /// Column present before but not after.
    Removed,
    /// Existing column that was renamed, possibly with other edits.
    RenamedAndEdited,
}

impl ChangeMarker {
    /// Returns `true` for [`Edited`](Self::Edited) and
    /// [`RenamedAndEdited`](Self::RenamedAndEdited).
    #[must_use]
    pub const fn is_edit(self) -> bool {
        matches!(self, Self::Edited | Self::RenamedAndEdited)
    }
}

/// A canonical description of one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Owning table.
    pub table_name: String,
    /// Column name after the change.
    pub column_name: String,
    /// Name of the column this one was derived from, used to pair new
    /// columns with their prior version. `None` for brand-new columns.
    pub original_name: Option<String>,
    /// Portable or native type name (`string`, `bigint`, `varchar`, ...).
    pub logical_type: String,
    /// Full type as reported by the catalog, if known.
    pub raw_type: Option<String>,
    /// Numeric precision.
    pub numeric_precision: Option<u32>,
    /// Numeric scale.
    pub numeric_scale: Option<u32>,
    /// Maximum character length.
    pub char_length: Option<u32>,
    /// Fractional second precision.
    pub datetime_precision: Option<u32>,
    /// 1-based position in the table.
    pub ordinal_position: Option<u32>,
    /// Part of the primary key.
    pub is_primary_key: bool,
    /// Accepts NULL.
    pub is_nullable: bool,
    /// Generated by the database (identity, serial, autoincrement).
    pub is_auto_increment: bool,
    /// Unsigned numeric.
    pub is_unsigned: bool,
    /// Default value, normalized.
    pub default_value: Option<String>,
    /// Generation expression for computed columns.
    pub generation_expression: Option<String>,
    /// Column comment.
    pub comment: Option<String>,
    /// Change marker set by the caller or the classifier.
    pub change: ChangeMarker,
}

impl ColumnSnapshot {
    /// Creates a nullable column of the given type.
    #[must_use]
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        logical_type: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            logical_type: logical_type.into(),
            is_nullable: true,
            ..Self::default()
        }
    }

    /// Marks the column as part of the primary key (and NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    /// Marks the column as database generated.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets the character length.
    #[must_use]
    pub fn char_length(mut self, len: u32) -> Self {
        self.char_length = Some(len);
        self
    }

    /// Sets numeric precision and scale.
    #[must_use]
    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    /// Sets the ordinal position.
    #[must_use]
    pub fn ordinal(mut self, position: u32) -> Self {
        self.ordinal_position = Some(position);
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Records the name this column had before the edit.
    #[must_use]
    pub fn renamed_from(mut self, original: impl Into<String>) -> Self {
        self.original_name = Some(original.into());
        self
    }

    /// Pairs this column with the existing column of the same name.
    #[must_use]
    pub fn existing(mut self) -> Self {
        self.original_name = Some(self.column_name.clone());
        self
    }

    /// Sets the change marker explicitly.
    #[must_use]
    pub fn with_change(mut self, change: ChangeMarker) -> Self {
        self.change = change;
        self
    }

    /// Whether the column is NOT NULL.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        !self.is_nullable
    }

    /// Default value with casts and wrapping quotes removed.
    #[must_use]
    pub fn normalized_default(&self) -> Option<String> {
        self.default_value.as_deref().map(normalize_default)
    }

    /// Whether this is a key the database or the product generates.
    ///
    /// Only drives UI hints; DDL does not depend on it.
    #[must_use]
    pub fn is_system_generated(&self) -> bool {
        self.is_primary_key
            && (self.column_name == "id"
                || (self.default_value.is_none() && self.generation_expression.is_none()))
    }

    /// Returns `true` if any DDL-relevant facet differs from `other`.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.column_name != other.column_name
            || !self.logical_type.eq_ignore_ascii_case(&other.logical_type)
            || self.char_length != other.char_length
            || self.numeric_precision != other.numeric_precision
            || self.numeric_scale != other.numeric_scale
            || self.is_nullable != other.is_nullable
            || self.is_primary_key != other.is_primary_key
            || self.is_auto_increment != other.is_auto_increment
            || self.normalized_default() != other.normalized_default()
            || self.comment != other.comment
    }

    /// Returns `true` if the rendered type would differ from `other`.
    #[must_use]
    pub fn type_differs_from(&self, other: &Self) -> bool {
        !self.logical_type.eq_ignore_ascii_case(&other.logical_type)
            || self.char_length != other.char_length
            || self.numeric_precision != other.numeric_precision
            || self.numeric_scale != other.numeric_scale
    }
}

/// A table and its ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub table_name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSnapshot>,
}

impl TableSpec {
    /// Creates an empty table specification.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    /// Appends a column, stamping it with this table's name.
    #[must_use]
    pub fn column(mut self, mut column: ColumnSnapshot) -> Self {
        column.table_name = self.table_name.clone();
        self.columns.push(column);
        self
    }

    /// Ordered primary key column names.
    #[must_use]
    pub fn primary_key(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.column_name.clone())
            .collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    /// Checks that ordinal positions, where given, are unique and increasing.
    ///
    /// # Errors
    ///
    /// Returns [`SynthError::InvalidSpec`] on an empty table, a blank column
    /// name, or a non-monotonic ordinal.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(SynthError::InvalidSpec("table name is empty".to_string()));
        }
        if self.columns.is_empty() {
            return Err(SynthError::InvalidSpec(format!(
                "table '{}' has no columns",
                self.table_name
            )));
        }
        let mut last: Option<u32> = None;
        for column in &self.columns {
            if column.column_name.trim().is_empty() {
                return Err(SynthError::InvalidSpec(format!(
                    "table '{}' has a column without a name",
                    self.table_name
                )));
            }
            if let Some(pos) = column.ordinal_position {
                if last.is_some_and(|prev| pos <= prev) {
                    return Err(SynthError::InvalidSpec(format!(
                        "column '{}' has ordinal position {pos}, which is not after the previous column",
                        column.column_name
                    )));
                }
                last = Some(pos);
            }
        }
        Ok(())
    }
}

/// A foreign key action (`ON UPDATE` / `ON DELETE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// `NO ACTION`
    NoAction,
    /// `CASCADE`
    Cascade,
    /// `RESTRICT`
    Restrict,
    /// `SET NULL`
    SetNull,
    /// `SET DEFAULT`
    SetDefault,
}

impl ReferentialAction {
    /// Maps a single-letter catalog code (`pg_constraint.confdeltype`).
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'a' => Some(Self::NoAction),
            'c' => Some(Self::Cascade),
            'r' => Some(Self::Restrict),
            'n' => Some(Self::SetNull),
            'd' => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// Parses either a catalog code or a rule name such as `SET NULL`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let mut chars = value.chars();
        if let (Some(code), None) = (chars.next(), chars.next()) {
            return Self::from_code(code);
        }
        match value.to_ascii_uppercase().replace('_', " ").as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "CASCADE" => Some(Self::Cascade),
            "RESTRICT" => Some(Self::Restrict),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// SQL keyword(s) for this action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// One column pair of a foreign key.
///
/// Composite keys appear as one relation per participating column, ordered
/// by `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column.
    pub parent_column: String,
    /// Referencing table.
    pub child_table: String,
    /// Referencing column.
    pub child_column: String,
    /// Constraint name, if known.
    pub constraint_name: Option<String>,
    /// `ON UPDATE` rule.
    pub on_update: Option<ReferentialAction>,
    /// `ON DELETE` rule.
    pub on_delete: Option<ReferentialAction>,
    /// 1-based position within a composite key.
    pub sequence: u32,
}

impl RelationSpec {
    /// Creates a single-column relation with no explicit rules.
    #[must_use]
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            child_table: child_table.into(),
            child_column: child_column.into(),
            constraint_name: None,
            on_update: None,
            on_delete: None,
            sequence: 1,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }

    /// Sets the `ON DELETE` rule.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the `ON UPDATE` rule.
    #[must_use]
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Constraint name, falling back to the conventional
    /// `<child>_<column>_foreign`.
    #[must_use]
    pub fn effective_name(&self) -> String {
        self.constraint_name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_foreign", self.child_table, self.child_column))
    }

    /// Groups per-column relation rows into constraints, each ordered by
    /// sequence. Groups keep the order of their first row.
    #[must_use]
    pub fn group(rows: &[Self]) -> Vec<Vec<Self>> {
        let mut groups: Vec<(String, Vec<Self>)> = Vec::new();
        for row in rows {
            let name = row.effective_name();
            match groups.iter_mut().find(|(n, _)| *n == name) {
                Some((_, parts)) => parts.push(row.clone()),
                None => groups.push((name, vec![row.clone()])),
            }
        }
        groups
            .into_iter()
            .map(|(_, mut parts)| {
                parts.sort_by_key(|p| p.sequence);
                parts
            })
            .collect()
    }
}

/// Kind of constraint backing an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `p`
    PrimaryKey,
    /// `f`
    ForeignKey,
    /// `u`
    Unique,
    /// `c`
    Check,
    /// `x`
    Exclusion,
    /// `t`
    Trigger,
}

impl ConstraintKind {
    /// Maps a catalog code (`pg_constraint.contype`) or a constraint type
    /// name (`PRIMARY KEY`, `UNIQUE`, ...).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "P" | "PRIMARY KEY" | "PK" => Some(Self::PrimaryKey),
            "F" | "FOREIGN KEY" => Some(Self::ForeignKey),
            "U" | "UNIQUE" => Some(Self::Unique),
            "C" | "CHECK" => Some(Self::Check),
            "X" | "EXCLUSION" => Some(Self::Exclusion),
            "T" | "TRIGGER" => Some(Self::Trigger),
            _ => None,
        }
    }
}

/// One column of an index or table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Owning table.
    pub table_name: String,
    /// Index or constraint name.
    pub index_name: String,
    /// Participating column.
    pub column_name: String,
    /// `false` for unique indexes.
    pub non_unique: bool,
    /// 1-based position within the index.
    pub sequence_in_index: u32,
    /// Backing constraint, if any.
    pub constraint: Option<ConstraintKind>,
}

/// A view and its defining query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    /// View name.
    pub view_name: String,
    /// `SELECT` body of the view.
    pub definition: String,
}

/// A trigger definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Trigger name.
    pub trigger_name: String,
    /// Table the trigger fires on.
    pub table_name: String,
    /// `BEFORE` / `AFTER` / `INSTEAD OF`.
    pub timing: String,
    /// `INSERT` / `UPDATE` / `DELETE`.
    pub event: String,
    /// Trigger body (everything after `FOR EACH ROW`).
    pub statement: String,
}

/// An index definition used when creating or dropping indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Owning table.
    pub table_name: String,
    /// Index name.
    pub index_name: String,
    /// Columns in index order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexSpec {
    /// Groups per-column index rows into index definitions, skipping
    /// entries backed by primary or foreign key constraints.
    #[must_use]
    pub fn group(rows: &[IndexSnapshot]) -> Vec<Self> {
        let mut sorted: Vec<&IndexSnapshot> = rows
            .iter()
            .filter(|r| {
                !matches!(
                    r.constraint,
                    Some(ConstraintKind::PrimaryKey | ConstraintKind::ForeignKey)
                )
            })
            .collect();
        sorted.sort_by_key(|r| r.sequence_in_index);

        let mut specs: Vec<Self> = Vec::new();
        for row in sorted {
            if let Some(spec) = specs.iter_mut().find(|s| s.index_name == row.index_name) {
                spec.columns.push(row.column_name.clone());
            } else {
                specs.push(Self {
                    table_name: row.table_name.clone(),
                    index_name: row.index_name.clone(),
                    columns: vec![row.column_name.clone()],
                    unique: !row.non_unique,
                });
            }
        }
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_default_strips_cast_and_quotes() {
        assert_eq!(normalize_default("'foo'::varchar"), "foo");
        assert_eq!(normalize_default("'draft'::character varying"), "draft");
        assert_eq!(normalize_default("'foo'"), "foo");
        assert_eq!(normalize_default("42"), "42");
        assert_eq!(normalize_default("now()"), "now()");
    }

    #[test]
    fn test_normalize_default_unescapes_quotes() {
        assert_eq!(normalize_default("'it''s'::text"), "it's");
        assert_eq!(normalize_default("'it''s'"), "it's");
        assert_eq!(normalize_default("''"), "");
    }

    #[test]
    fn test_round_tripped_default_is_unchanged() {
        let old = ColumnSnapshot::new("t", "status", "varchar").default_value("'foo'::varchar");
        let new = ColumnSnapshot::new("t", "status", "varchar").default_value("'foo'");
        assert!(!new.differs_from(&old));
        let bare = ColumnSnapshot::new("t", "status", "varchar").default_value("foo");
        assert!(!bare.differs_from(&old));
    }

    #[test]
    fn test_system_generated_key() {
        let id = ColumnSnapshot::new("t", "id", "bigint").primary_key();
        assert!(id.is_system_generated());

        let code = ColumnSnapshot::new("t", "code", "varchar")
            .primary_key()
            .default_value("gen_code()");
        assert!(!code.is_system_generated());

        let plain = ColumnSnapshot::new("t", "title", "varchar");
        assert!(!plain.is_system_generated());
    }

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(ReferentialAction::from_code('c'), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::parse("c").map(ReferentialAction::as_sql), Some("CASCADE"));
        assert_eq!(ReferentialAction::parse("SET NULL"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("set_default"), Some(ReferentialAction::SetDefault));
        assert_eq!(ReferentialAction::parse("x"), None);
    }

    #[test]
    fn test_validate_rejects_non_monotonic_ordinals() {
        let spec = TableSpec::new("books")
            .column(ColumnSnapshot::new("", "id", "integer").ordinal(2))
            .column(ColumnSnapshot::new("", "title", "string").ordinal(1));
        assert!(matches!(spec.validate(), Err(SynthError::InvalidSpec(_))));

        let ok = TableSpec::new("books")
            .column(ColumnSnapshot::new("", "id", "integer").ordinal(1))
            .column(ColumnSnapshot::new("", "title", "string"));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.columns[1].table_name, "books");
    }

    #[test]
    fn test_group_indexes() {
        let row = |name: &str, col: &str, seq: u32, constraint| IndexSnapshot {
            table_name: "t".into(),
            index_name: name.into(),
            column_name: col.into(),
            non_unique: name != "uq",
            sequence_in_index: seq,
            constraint,
        };
        let rows = vec![
            row("uq", "b", 2, Some(ConstraintKind::Unique)),
            row("uq", "a", 1, Some(ConstraintKind::Unique)),
            row("t_pkey", "id", 1, Some(ConstraintKind::PrimaryKey)),
            row("idx_c", "c", 1, None),
        ];
        let specs = IndexSpec::group(&rows);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].index_name, "uq");
        assert_eq!(specs[0].columns, vec!["a", "b"]);
        assert!(specs[0].unique);
        assert!(!specs[1].unique);
    }
}
