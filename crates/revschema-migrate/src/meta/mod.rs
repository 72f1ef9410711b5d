//! Built-in migrations for the metadata store.
//!
//! Each generation of the metadata schema is a [`MigrationSource`] with its
//! own ledger table. [`init`] brings a store up to date by running every
//! source in order.

mod v1;
mod v2;

use tracing::info;

use crate::error::Result;
use crate::executor::MigrationExecutor;
use crate::migration::{MetaConnection, MigrationSource};

pub use v1::V1;
pub use v2::V2;

/// Projects table.
pub const PROJECTS: &str = "nc_projects_v2";
/// Data sources table, called bases before `v1/nc_003`.
pub const SOURCES: &str = "nc_sources_v2";
/// Name of the sources table before the rename.
pub const LEGACY_BASES: &str = "nc_bases_v2";
/// Models (tables) table.
pub const MODELS: &str = "nc_models_v2";

/// Every source, in the order they run.
pub static ALL_SOURCES: &[&MigrationSource] = &[&V1, &V2];

/// Finds a source by name.
#[must_use]
pub fn source(name: &str) -> Option<&'static MigrationSource> {
    ALL_SOURCES.iter().copied().find(|s| s.name == name)
}

/// Applies every pending unit of every source.
///
/// Returns the applied unit names per source.
pub async fn init(conn: &MetaConnection) -> Result<Vec<(&'static str, Vec<&'static str>)>> {
    let mut report = Vec::with_capacity(ALL_SOURCES.len());
    for source in ALL_SOURCES {
        let executor = MigrationExecutor::new(conn.clone(), source);
        let applied = executor.apply_pending().await?;
        info!(source = %source.name, count = applied.len(), "Metadata source up to date");
        report.push((source.name, applied));
    }
    Ok(report)
}
