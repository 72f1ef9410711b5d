//! First generation of the metadata schema.

use futures::future::BoxFuture;
use revschema_core::{ColumnSnapshot, TableSpec};
use tracing::info;

use super::{LEGACY_BASES, MODELS, PROJECTS, SOURCES};
use crate::error::Result;
use crate::migration::{MetaConnection, MigrationSource, MigrationUnit};

/// Base tables, ordering columns, and the bases to sources rename.
pub static V1: MigrationSource = MigrationSource {
    name: "v1",
    ledger_table: "nc_migrations_v1",
    units: &[
        MigrationUnit {
            name: "nc_001_init",
            up: init_up,
            down: init_down,
        },
        MigrationUnit {
            name: "nc_002_add_order",
            up: add_order_up,
            down: add_order_down,
        },
        MigrationUnit {
            name: "nc_003_rename_bases_to_sources",
            up: rename_bases_up,
            down: rename_bases_down,
        },
    ],
};

fn projects() -> TableSpec {
    TableSpec::new(PROJECTS)
        .column(ColumnSnapshot::new("", "id", "string").char_length(128).primary_key())
        .column(ColumnSnapshot::new("", "title", "string"))
        .column(ColumnSnapshot::new("", "status", "string"))
        .column(ColumnSnapshot::new("", "description", "text"))
        .column(ColumnSnapshot::new("", "meta", "text"))
        .column(ColumnSnapshot::new("", "deleted", "boolean").default_value("false"))
        .column(ColumnSnapshot::new("", "created_at", "timestamp"))
        .column(ColumnSnapshot::new("", "updated_at", "timestamp"))
}

fn bases() -> TableSpec {
    TableSpec::new(LEGACY_BASES)
        .column(ColumnSnapshot::new("", "id", "string").char_length(20).primary_key())
        .column(ColumnSnapshot::new("", "project_id", "string").char_length(128))
        .column(ColumnSnapshot::new("", "alias", "string"))
        .column(ColumnSnapshot::new("", "config", "text"))
        .column(ColumnSnapshot::new("", "type", "string"))
        .column(ColumnSnapshot::new("", "created_at", "timestamp"))
        .column(ColumnSnapshot::new("", "updated_at", "timestamp"))
}

fn models() -> TableSpec {
    TableSpec::new(MODELS)
        .column(ColumnSnapshot::new("", "id", "string").char_length(20).primary_key())
        .column(ColumnSnapshot::new("", "base_id", "string").char_length(20))
        .column(ColumnSnapshot::new("", "project_id", "string").char_length(128))
        .column(ColumnSnapshot::new("", "table_name", "string"))
        .column(ColumnSnapshot::new("", "title", "string"))
        .column(ColumnSnapshot::new("", "type", "string").default_value("table"))
        .column(ColumnSnapshot::new("", "created_at", "timestamp"))
        .column(ColumnSnapshot::new("", "updated_at", "timestamp"))
}

fn init_up(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for spec in [projects(), bases(), models()] {
            info!(table = %spec.table_name, "Creating metadata table");
            conn.create_table_if_missing(&spec).await?;
        }
        Ok(())
    })
}

fn init_down(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [MODELS, LEGACY_BASES, PROJECTS] {
            conn.drop_table_if_exists(table).await?;
        }
        Ok(())
    })
}

fn order_column() -> ColumnSnapshot {
    ColumnSnapshot::new("", "order", "float")
}

fn add_order_up(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [PROJECTS, LEGACY_BASES, MODELS] {
            info!(table = %table, "Adding order column");
            conn.add_column_if_missing(table, order_column()).await?;
        }
        Ok(())
    })
}

fn add_order_down(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [MODELS, LEGACY_BASES, PROJECTS] {
            conn.drop_column_if_exists(table, "order").await?;
        }
        Ok(())
    })
}

fn rename_bases_up(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        info!("Renaming bases table to sources");
        conn.rename_table_if_exists(LEGACY_BASES, SOURCES).await?;
        info!(table = %MODELS, "Renaming `base_id` column to `source_id`");
        conn.rename_column_if_exists(MODELS, "base_id", "source_id").await
    })
}

fn rename_bases_down(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        conn.rename_column_if_exists(MODELS, "source_id", "base_id").await?;
        conn.rename_table_if_exists(SOURCES, LEGACY_BASES).await
    })
}
