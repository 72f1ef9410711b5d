//! Reversible operation builder.
//!
//! Every schema change is emitted as a forward (`up`) and a reverse (`down`)
//! statement list. Down statements are stored in the same order as the up
//! operations they undo and are applied top to bottom as returned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::{classify, previous_of, primary_key_change};
use crate::dialect::{ColumnOpKind, DialectStrategy};
use crate::error::Result;
use crate::snapshot::{
    ChangeMarker, ColumnSnapshot, IndexSnapshot, IndexSpec, RelationSpec, TableSpec, TriggerSpec,
    ViewSnapshot,
};

/// One SQL statement, without a trailing separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
}

impl Statement {
    /// Wraps SQL text.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Forward and reverse statement lists for one schema change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversibleStatementSet {
    /// Statements applying the change.
    pub up: Vec<Statement>,
    /// Statements undoing the change, in application order.
    pub down: Vec<Statement>,
}

impl ReversibleStatementSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one operation's forward and reverse statements.
    pub fn push(&mut self, up: impl IntoIterator<Item = Statement>, down: impl IntoIterator<Item = Statement>) {
        self.up.extend(up);
        self.down.extend(down);
    }

    /// Returns `true` if no statements were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    /// Swaps the forward and reverse lists.
    #[must_use]
    pub fn inverted(self) -> Self {
        Self {
            up: self.down,
            down: self.up,
        }
    }
}

/// Builds [`ReversibleStatementSet`]s with one dialect.
#[derive(Debug, Clone, Copy)]
pub struct ReversibleBuilder<'d> {
    dialect: &'d dyn DialectStrategy,
}

impl<'d> ReversibleBuilder<'d> {
    /// Creates a builder for `dialect`.
    #[must_use]
    pub fn new(dialect: &'d dyn DialectStrategy) -> Self {
        Self { dialect }
    }

    /// The dialect statements are rendered with.
    #[must_use]
    pub fn dialect(&self) -> &'d dyn DialectStrategy {
        self.dialect
    }

    /// `CREATE TABLE`, undone by `DROP TABLE`.
    pub fn create_table(&self, spec: &TableSpec) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_table(spec)?],
            [self.dialect.synthesize_drop_table(&spec.table_name)?],
        );
        Ok(set)
    }

    /// `DROP TABLE`. The reverse recreates the columns, the foreign keys
    /// declared on the table and its secondary indexes; data is not restored.
    pub fn drop_table(
        &self,
        spec: &TableSpec,
        relations: &[RelationSpec],
        indexes: &[IndexSnapshot],
    ) -> Result<ReversibleStatementSet> {
        let mut down = vec![self.dialect.synthesize_create_table(spec)?];
        for parts in RelationSpec::group(relations) {
            down.push(self.dialect.synthesize_add_foreign_key(&parts)?);
        }
        for index in IndexSpec::group(indexes) {
            down.push(self.dialect.synthesize_create_index(&index)?);
        }
        let mut set = ReversibleStatementSet::new();
        set.push([self.dialect.synthesize_drop_table(&spec.table_name)?], down);
        Ok(set)
    }

    /// Renames a table.
    pub fn rename_table(&self, from: &str, to: &str) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_rename_table(from, to)?],
            [self.dialect.synthesize_rename_table(to, from)?],
        );
        Ok(set)
    }

    /// Classifies `new` against `old` and synthesizes the column changes,
    /// then the primary key rebuild if the key sequence changed.
    ///
    /// Removals come first, then edits, then additions.
    pub fn alter_table(
        &self,
        table: &str,
        old: &[ColumnSnapshot],
        new: &[ColumnSnapshot],
    ) -> Result<ReversibleStatementSet> {
        let classified = classify(old, new)?;
        let mut set = ReversibleStatementSet::new();

        for column in classified.iter().filter(|c| c.change == ChangeMarker::Removed) {
            let previous = previous_of(old, column).unwrap_or(column);
            set.push(
                [self.dialect.synthesize_drop_column(table, column)?],
                self.dialect
                    .synthesize_column_operation(table, previous, None, ColumnOpKind::Add)?,
            );
        }

        for column in classified.iter().filter(|c| c.change.is_edit()) {
            let previous = previous_of(old, column);
            let up = self.dialect.synthesize_column_operation(
                table,
                column,
                previous,
                ColumnOpKind::Edit,
            )?;
            let down = match previous {
                Some(previous) => self.dialect.synthesize_column_operation(
                    table,
                    previous,
                    Some(column),
                    ColumnOpKind::Edit,
                )?,
                None => Vec::new(),
            };
            set.push(up, down);
        }

        for column in classified.iter().filter(|c| c.change == ChangeMarker::Added) {
            set.push(
                self.dialect
                    .synthesize_column_operation(table, column, None, ColumnOpKind::Add)?,
                [self.dialect.synthesize_drop_column(table, column)?],
            );
        }

        if let Some(change) = primary_key_change(&classified, old) {
            let up = self.dialect.synthesize_primary_key(table, &change)?;
            let down = match primary_key_change(old, &classified) {
                Some(reverse) => self.dialect.synthesize_primary_key(table, &reverse)?,
                None => Vec::new(),
            };
            set.push(up, down);
        }

        Ok(set)
    }

    /// `CREATE VIEW`, undone by `DROP VIEW`.
    pub fn create_view(&self, view: &ViewSnapshot) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_view(view)?],
            [self.dialect.synthesize_drop_view(&view.view_name)?],
        );
        Ok(set)
    }

    /// Replaces a view definition.
    pub fn update_view(&self, old: &ViewSnapshot, new: &ViewSnapshot) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [
                self.dialect.synthesize_drop_view(&old.view_name)?,
                self.dialect.synthesize_create_view(new)?,
            ],
            [
                self.dialect.synthesize_drop_view(&new.view_name)?,
                self.dialect.synthesize_create_view(old)?,
            ],
        );
        Ok(set)
    }

    /// `DROP VIEW`, undone by recreating it from `view`.
    pub fn drop_view(&self, view: &ViewSnapshot) -> Result<ReversibleStatementSet> {
        Ok(self.create_view(view)?.inverted())
    }

    /// `CREATE TRIGGER`, undone by `DROP TRIGGER`.
    pub fn create_trigger(&self, trigger: &TriggerSpec) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_trigger(trigger)?],
            [self.dialect.synthesize_drop_trigger(trigger)?],
        );
        Ok(set)
    }

    /// Replaces a trigger.
    pub fn update_trigger(&self, old: &TriggerSpec, new: &TriggerSpec) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [
                self.dialect.synthesize_drop_trigger(old)?,
                self.dialect.synthesize_create_trigger(new)?,
            ],
            [
                self.dialect.synthesize_drop_trigger(new)?,
                self.dialect.synthesize_create_trigger(old)?,
            ],
        );
        Ok(set)
    }

    /// `DROP TRIGGER`, undone by recreating it.
    pub fn drop_trigger(&self, trigger: &TriggerSpec) -> Result<ReversibleStatementSet> {
        Ok(self.create_trigger(trigger)?.inverted())
    }

    /// `CREATE SEQUENCE`, undone by `DROP SEQUENCE`.
    pub fn create_sequence(&self, name: &str, start: Option<i64>) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_sequence(name, start)?],
            [self.dialect.synthesize_drop_sequence(name)?],
        );
        Ok(set)
    }

    /// `DROP SEQUENCE`. The reverse recreates it from its start value.
    pub fn drop_sequence(&self, name: &str) -> Result<ReversibleStatementSet> {
        Ok(self.create_sequence(name, None)?.inverted())
    }

    /// Renames a sequence.
    pub fn rename_sequence(&self, from: &str, to: &str) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_rename_sequence(from, to)?],
            [self.dialect.synthesize_rename_sequence(to, from)?],
        );
        Ok(set)
    }

    /// `CREATE INDEX`, undone by `DROP INDEX`.
    pub fn create_index(&self, index: &IndexSpec) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_index(index)?],
            [self.dialect.synthesize_drop_index(index)?],
        );
        Ok(set)
    }

    /// `DROP INDEX`, undone by recreating it.
    pub fn drop_index(&self, index: &IndexSpec) -> Result<ReversibleStatementSet> {
        Ok(self.create_index(index)?.inverted())
    }

    /// Adds a foreign key made of `parts`, undone by dropping it.
    pub fn create_relation(&self, parts: &[RelationSpec]) -> Result<ReversibleStatementSet> {
        let mut set = ReversibleStatementSet::new();
        let up = self.dialect.synthesize_add_foreign_key(parts)?;
        let mut down = Vec::with_capacity(1);
        if let Some(first) = parts.first() {
            down.push(self.dialect.synthesize_drop_foreign_key(first)?);
        }
        set.push([up], down);
        Ok(set)
    }

    /// Drops a foreign key, undone by re-adding it.
    pub fn drop_relation(&self, parts: &[RelationSpec]) -> Result<ReversibleStatementSet> {
        Ok(self.create_relation(parts)?.inverted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::error::SynthError;
    use crate::snapshot::ReferentialAction;

    fn pg() -> ReversibleBuilder<'static> {
        ReversibleBuilder::new(DialectKind::Postgres.strategy())
    }

    fn books() -> Vec<ColumnSnapshot> {
        vec![
            ColumnSnapshot::new("books", "id", "integer").primary_key(),
            ColumnSnapshot::new("books", "title", "string"),
        ]
    }

    #[test]
    fn test_alter_precedence_removed_edited_added() {
        let old = vec![
            ColumnSnapshot::new("books", "id", "integer").primary_key(),
            ColumnSnapshot::new("books", "title", "string"),
            ColumnSnapshot::new("books", "legacy", "string"),
        ];
        let new = vec![
            ColumnSnapshot::new("books", "pages", "integer"),
            ColumnSnapshot::new("books", "id", "integer").primary_key().existing(),
            ColumnSnapshot::new("books", "title", "string").not_null().existing(),
        ];
        let set = pg().alter_table("books", &old, &new).unwrap();
        let up: Vec<&str> = set.up.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            up,
            vec![
                r#"ALTER TABLE "books" DROP COLUMN "legacy""#,
                r#"ALTER TABLE "books" ALTER COLUMN "title" SET NOT NULL"#,
                r#"ALTER TABLE "books" ADD COLUMN "pages" INTEGER"#,
            ]
        );
        let down: Vec<&str> = set.down.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            down,
            vec![
                r#"ALTER TABLE "books" ADD COLUMN "legacy" VARCHAR(255)"#,
                r#"ALTER TABLE "books" ALTER COLUMN "title" DROP NOT NULL"#,
                r#"ALTER TABLE "books" DROP COLUMN "pages""#,
            ]
        );
    }

    #[test]
    fn test_rename_is_reversed() {
        let old = books();
        let new = vec![
            old[0].clone().existing(),
            ColumnSnapshot::new("books", "name", "string").renamed_from("title"),
        ];
        let set = pg().alter_table("books", &old, &new).unwrap();
        assert_eq!(set.up.len(), 1);
        assert_eq!(set.up[0].sql, r#"ALTER TABLE "books" RENAME COLUMN "title" TO "name""#);
        assert_eq!(set.down[0].sql, r#"ALTER TABLE "books" RENAME COLUMN "name" TO "title""#);
    }

    #[test]
    fn test_removing_key_column_restores_key_on_down() {
        let old = books();
        let new = vec![old[1].clone().existing()];
        let set = pg().alter_table("books", &old, &new).unwrap();
        assert_eq!(set.up.len(), 2);
        assert_eq!(
            set.up[1].sql,
            r#"ALTER TABLE "books" DROP CONSTRAINT IF EXISTS "books_pkey""#
        );
        assert_eq!(
            set.down[1].sql,
            r#"ALTER TABLE "books" ADD CONSTRAINT "books_pkey" PRIMARY KEY ("id")"#
        );
    }

    #[test]
    fn test_update_view_round_trip() {
        let old = ViewSnapshot {
            view_name: "v".into(),
            definition: "SELECT 1".into(),
        };
        let new = ViewSnapshot {
            view_name: "v".into(),
            definition: "SELECT 2".into(),
        };
        let set = pg().update_view(&old, &new).unwrap();
        assert_eq!(set.up[1].sql, r#"CREATE VIEW "v" AS SELECT 2"#);
        assert_eq!(set.down[1].sql, r#"CREATE VIEW "v" AS SELECT 1"#);
    }

    #[test]
    fn test_relation_with_rules() {
        let parts = vec![RelationSpec::new("orders", "customer_id", "customers", "id")
            .on_delete(ReferentialAction::Cascade)];
        let set = pg().create_relation(&parts).unwrap();
        assert_eq!(
            set.up[0].sql,
            r#"ALTER TABLE "orders" ADD CONSTRAINT "orders_customer_id_foreign" FOREIGN KEY ("customer_id") REFERENCES "customers" ("id") ON DELETE CASCADE"#
        );
        assert_eq!(
            set.down[0].sql,
            r#"ALTER TABLE "orders" DROP CONSTRAINT "orders_customer_id_foreign""#
        );
    }

    #[test]
    fn test_sqlite_rejects_key_change() {
        let builder = ReversibleBuilder::new(DialectKind::Sqlite.strategy());
        let old = vec![ColumnSnapshot::new("t", "a", "integer")];
        let new = vec![ColumnSnapshot::new("t", "a", "integer").primary_key().existing()];
        assert!(matches!(
            builder.alter_table("t", &old, &new),
            Err(SynthError::Unsupported { .. })
        ));
    }
}
