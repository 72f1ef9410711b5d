//! Migration sequencer.
//!
//! Applies the units of one [`MigrationSource`] in registration order and
//! reverts them in strict reverse order of application, keeping the ledger
//! in step.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::history::MigrationLedger;
use crate::migration::{MetaConnection, MigrationSource, MigrationUnit};

/// Lifecycle of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Not applied yet.
    Pending,
    /// `up` is running.
    Applying,
    /// Recorded in the ledger.
    Applied,
    /// `down` is running.
    Reverting,
    /// Reverted by this executor.
    Reverted,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Reverting => "reverting",
            Self::Reverted => "reverted",
        };
        f.write_str(name)
    }
}

/// State of one registered unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Unit name.
    pub name: &'static str,
    /// Current state.
    pub state: MigrationState,
    /// When the unit was applied, if it is applied.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Runs the units of one source against the metadata database.
#[derive(Debug)]
pub struct MigrationExecutor {
    conn: MetaConnection,
    source: &'static MigrationSource,
    ledger: MigrationLedger,
    states: Mutex<HashMap<&'static str, MigrationState>>,
}

impl MigrationExecutor {
    /// Creates an executor for `source`.
    #[must_use]
    pub fn new(conn: MetaConnection, source: &'static MigrationSource) -> Self {
        let ledger = MigrationLedger::new(conn.shared(), source.ledger_table);
        Self {
            conn,
            source,
            ledger,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Ensures the ledger table exists and the source is well formed.
    pub async fn init(&self) -> Result<()> {
        self.source.validate()?;
        self.ledger.ensure_table().await
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Returns the source.
    #[must_use]
    pub fn source(&self) -> &'static MigrationSource {
        self.source
    }

    fn set_state(&self, name: &'static str, state: MigrationState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(name, state);
        }
    }

    fn tracked_state(&self, name: &str) -> Option<MigrationState> {
        self.states.lock().ok().and_then(|s| s.get(name).copied())
    }

    /// Units not recorded in the ledger, in registration order.
    pub async fn list_pending_migrations(&self) -> Result<Vec<&'static MigrationUnit>> {
        self.init().await?;
        let applied = self.ledger.applied().await?;
        let applied_names: HashSet<&str> = applied.iter().map(|m| m.name.as_str()).collect();

        for record in &applied {
            if self.source.unit(&record.name).is_none() {
                warn!(
                    source = %self.source.name,
                    name = %record.name,
                    "Ledger names an unknown migration, ignoring"
                );
            }
        }

        let pending: Vec<&'static MigrationUnit> = self
            .source
            .units
            .iter()
            .filter(|u| !applied_names.contains(u.name))
            .collect();

        if let Some(last_applied) = self
            .source
            .units
            .iter()
            .rposition(|u| applied_names.contains(u.name))
        {
            for unit in pending.iter().filter(|u| {
                self.source
                    .units
                    .iter()
                    .position(|x| x.name == u.name)
                    .is_some_and(|p| p < last_applied)
            }) {
                warn!(
                    source = %self.source.name,
                    name = %unit.name,
                    "Migration is pending but a later one is applied"
                );
            }
        }
        Ok(pending)
    }

    /// Applies every pending unit in order. Returns the names applied.
    ///
    /// Stops at the first failure; the failing unit is not recorded and
    /// later units do not run.
    pub async fn apply_pending(&self) -> Result<Vec<&'static str>> {
        let pending = self.list_pending_migrations().await?;
        if pending.is_empty() {
            info!(source = %self.source.name, "No pending migrations");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for unit in pending {
            info!(source = %self.source.name, name = %unit.name, "Applying migration");
            self.set_state(unit.name, MigrationState::Applying);
            let outcome = match (unit.up)(&self.conn).await {
                Ok(()) => self.ledger.record_applied(unit.name).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.set_state(unit.name, MigrationState::Pending);
                warn!(source = %self.source.name, name = %unit.name, error = %e, "Migration failed");
                return Err(Error::MigrationSequence {
                    name: unit.name.to_string(),
                    source: Box::new(e),
                });
            }
            self.set_state(unit.name, MigrationState::Applied);
            info!(source = %self.source.name, name = %unit.name, "Migration applied successfully");
            applied.push(unit.name);
        }
        Ok(applied)
    }

    /// Reverts the `count` most recently applied units, newest first.
    /// Returns the names reverted.
    pub async fn revert_last(&self, count: usize) -> Result<Vec<&'static str>> {
        self.init().await?;
        let applied = self.ledger.applied().await?;
        let mut reverted = Vec::with_capacity(count.min(applied.len()));

        for record in applied.iter().rev().take(count) {
            let Some(unit) = self.source.unit(&record.name) else {
                return Err(Error::InvalidState(format!(
                    "cannot revert '{}': not registered in source '{}'",
                    record.name, self.source.name
                )));
            };
            info!(source = %self.source.name, name = %unit.name, "Reverting migration");
            self.set_state(unit.name, MigrationState::Reverting);
            let outcome = match (unit.down)(&self.conn).await {
                Ok(()) => self.ledger.record_unapplied(unit.name).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.set_state(unit.name, MigrationState::Applied);
                warn!(source = %self.source.name, name = %unit.name, error = %e, "Revert failed");
                return Err(Error::MigrationSequence {
                    name: unit.name.to_string(),
                    source: Box::new(e),
                });
            }
            self.set_state(unit.name, MigrationState::Reverted);
            info!(source = %self.source.name, name = %unit.name, "Migration reverted successfully");
            reverted.push(unit.name);
        }

        if reverted.len() < count {
            warn!(
                source = %self.source.name,
                requested = count,
                reverted = reverted.len(),
                "Fewer migrations applied than requested"
            );
        }
        Ok(reverted)
    }

    /// State of every registered unit, in registration order.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.init().await?;
        let applied: HashMap<String, DateTime<Utc>> = self
            .ledger
            .applied()
            .await?
            .into_iter()
            .map(|m| (m.name, m.applied_at))
            .collect();

        Ok(self
            .source
            .units
            .iter()
            .map(|unit| {
                let applied_at = applied.get(unit.name).copied();
                let state = match (applied_at, self.tracked_state(unit.name)) {
                    (Some(_), _) => MigrationState::Applied,
                    (None, Some(MigrationState::Reverted)) => MigrationState::Reverted,
                    (None, _) => MigrationState::Pending,
                };
                MigrationStatus {
                    name: unit.name,
                    state,
                    applied_at,
                }
            })
            .collect())
    }
}
