//! Second generation: workspace scoping.

use futures::future::BoxFuture;
use revschema_core::{gen_query, ColumnSnapshot};
use tracing::{debug, info};

use super::{MODELS, PROJECTS, SOURCES};
use crate::error::Result;
use crate::migration::{MetaConnection, MigrationSource, MigrationUnit};

/// Adds `fk_workspace_id` and back-fills it from the owning project.
pub static V2: MigrationSource = MigrationSource {
    name: "v2",
    ledger_table: "nc_migrations_v2",
    units: &[
        MigrationUnit {
            name: "nc_001_workspace_scoping",
            up: workspace_columns_up,
            down: workspace_columns_down,
        },
        MigrationUnit {
            name: "nc_002_backfill_workspace",
            up: backfill_up,
            down: backfill_down,
        },
    ],
};

const WORKSPACE_COLUMN: &str = "fk_workspace_id";

fn workspace_columns_up(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [PROJECTS, SOURCES, MODELS] {
            if !conn.has_table(table).await? {
                continue;
            }
            info!(table = %table, "Adding workspace column");
            let column = ColumnSnapshot::new("", WORKSPACE_COLUMN, "string").char_length(20);
            conn.add_column_if_missing(table, column).await?;
        }
        Ok(())
    })
}

fn workspace_columns_down(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [MODELS, SOURCES, PROJECTS] {
            if conn.has_table(table).await? {
                conn.drop_column_if_exists(table, WORKSPACE_COLUMN).await?;
            }
        }
        Ok(())
    })
}

/// Copies the project's workspace onto `table` rows that have none, in one
/// statement.
async fn backfill_from_project(conn: &MetaConnection, table: &str) -> Result<()> {
    let sql = gen_query(
        conn.dialect(),
        "UPDATE ?? SET ?? = (SELECT ??.?? FROM ?? WHERE ??.?? = ??.??) WHERE ?? IS NULL",
        &[
            table.into(),
            WORKSPACE_COLUMN.into(),
            PROJECTS.into(),
            WORKSPACE_COLUMN.into(),
            PROJECTS.into(),
            PROJECTS.into(),
            "id".into(),
            table.into(),
            "project_id".into(),
            WORKSPACE_COLUMN.into(),
        ],
    )?;
    let updated = conn.execute(&sql).await?;
    info!(table = %table, rows = updated, "Back-filled workspace ids");
    Ok(())
}

fn backfill_up(conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for table in [SOURCES, MODELS] {
            if conn.has_column(table, WORKSPACE_COLUMN).await? {
                backfill_from_project(conn, table).await?;
            }
        }
        Ok(())
    })
}

fn backfill_down(_conn: &MetaConnection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        debug!("Back-filled workspace ids are left in place");
        Ok(())
    })
}
