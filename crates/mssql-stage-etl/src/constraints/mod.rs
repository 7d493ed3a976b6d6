//! Foreign key capture, drop and restore around the bulk reload.
//!
//! [`ConstraintManager::capture_and_drop_all`] hands back a
//! [`DroppedConstraints`] value that [`ConstraintManager::restore_all`]
//! consumes, so a run restores exactly the list it captured, exactly once.
//! Failures are never swallowed here: a half-modified schema must surface.

mod types;

pub use types::*;

use crate::error::{MigrateError, Result};
use crate::session::SqlSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Foreign keys dropped by [`ConstraintManager::capture_and_drop_all`].
///
/// Not `Clone`: restoring consumes it.
#[derive(Debug)]
#[must_use = "dropped constraints must be passed to restore_all"]
pub struct DroppedConstraints {
    descriptors: Vec<ForeignKeyDescriptor>,
    captured_at: DateTime<Utc>,
    snapshot: Option<PathBuf>,
}

impl DroppedConstraints {
    pub fn descriptors(&self) -> &[ForeignKeyDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Path of the snapshot tracking these constraints, if any.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Recover the list from a snapshot left behind by an aborted run.
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let snapshot: ConstraintSnapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded {} foreign keys captured at {} from {:?}",
            snapshot.foreign_keys.len(),
            snapshot.captured_at,
            path
        );
        Ok(Self {
            descriptors: snapshot.foreign_keys,
            captured_at: snapshot.captured_at,
            snapshot: Some(path.to_path_buf()),
        })
    }
}

/// On-disk list of constraints that are dropped and not yet restored.
#[derive(Debug, Serialize, Deserialize)]
struct ConstraintSnapshot {
    captured_at: DateTime<Utc>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl ConstraintSnapshot {
    /// Atomic write: write to temp file, then rename.
    fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Make the snapshot at `path` list exactly `pending`. An empty list removes
/// the file.
fn sync_snapshot(
    path: Option<&Path>,
    captured_at: DateTime<Utc>,
    pending: &[ForeignKeyDescriptor],
) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    if pending.is_empty() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        return Ok(());
    }

    ConstraintSnapshot {
        captured_at,
        foreign_keys: pending.to_vec(),
    }
    .save(path)?;
    debug!("Constraint snapshot {:?} lists {} foreign keys", path, pending.len());
    Ok(())
}

/// Like [`sync_snapshot`], for paths that are already failing.
fn sync_snapshot_or_warn(
    path: Option<&Path>,
    captured_at: DateTime<Utc>,
    pending: &[ForeignKeyDescriptor],
) {
    if let Err(e) = sync_snapshot(path, captured_at, pending) {
        warn!("Could not update constraint snapshot {:?}: {}", path, e);
    }
}

/// Drops and restores every foreign key of one database.
pub struct ConstraintManager<'a, S: SqlSession + ?Sized> {
    session: &'a S,
    snapshot: Option<PathBuf>,
}

impl<'a, S: SqlSession + ?Sized> ConstraintManager<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self {
            session,
            snapshot: None,
        }
    }

    /// Keep the list of dropped, not yet restored constraints in `path`.
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot = Some(path);
        self
    }

    /// Read the foreign keys without changing anything.
    pub async fn capture(&self) -> Result<Vec<ForeignKeyDescriptor>> {
        let descriptors = self.session.foreign_keys().await?;
        debug!(
            "Found {} foreign keys on {}",
            descriptors.len(),
            self.session.label()
        );
        Ok(descriptors)
    }

    /// Capture every foreign key, then drop them one by one in catalog order.
    ///
    /// Each drop commits on its own. A constraint enters the snapshot before
    /// its DROP runs and leaves it again if the DROP fails, so after a failure
    /// the file lists exactly the constraints that are gone. The first failure
    /// aborts with [`MigrateError::ConstraintOperation`].
    pub async fn capture_and_drop_all(&self) -> Result<DroppedConstraints> {
        let descriptors = self.capture().await?;
        let captured_at = Utc::now();
        let snapshot = self.snapshot.as_deref();

        let mut dropped: Vec<ForeignKeyDescriptor> = Vec::with_capacity(descriptors.len());
        for fk in descriptors {
            dropped.push(fk.clone());
            if let Err(e) = sync_snapshot(snapshot, captured_at, &dropped) {
                dropped.pop();
                log_unrestored(&dropped);
                return Err(e);
            }

            debug!("Dropping FK {} on {}", fk.constraint_name, fk.child_table);
            if let Err(e) = self.session.drop_foreign_key(&fk).await {
                error!(
                    "Failed to drop FK {} on {}: {}",
                    fk.constraint_name, fk.child_table, e
                );
                dropped.pop();
                sync_snapshot_or_warn(snapshot, captured_at, &dropped);
                log_unrestored(&dropped);
                return Err(constraint_error("drop", &fk, e));
            }
        }

        info!("Dropped {} foreign keys", dropped.len());
        Ok(DroppedConstraints {
            descriptors: dropped,
            captured_at,
            snapshot: self.snapshot.clone(),
        })
    }

    /// Re-create every dropped constraint, committing per constraint.
    ///
    /// Returns the number restored. Each restored constraint is removed from
    /// the snapshot, and the file goes away once all of them are back.
    pub async fn restore_all(&self, dropped: DroppedConstraints) -> Result<usize> {
        let DroppedConstraints {
            descriptors,
            captured_at,
            snapshot,
        } = dropped;
        let snapshot = snapshot.as_deref();

        for (i, fk) in descriptors.iter().enumerate() {
            debug!("Restoring FK {} on {}", fk.constraint_name, fk.child_table);
            if let Err(e) = self.session.add_foreign_key(fk).await {
                error!(
                    "Failed to restore FK {} on {}: {}",
                    fk.constraint_name, fk.child_table, e
                );
                sync_snapshot_or_warn(snapshot, captured_at, &descriptors[i..]);
                log_unrestored(&descriptors[i..]);
                return Err(constraint_error("restore", fk, e));
            }
            sync_snapshot_or_warn(snapshot, captured_at, &descriptors[i + 1..]);
        }
        sync_snapshot_or_warn(snapshot, captured_at, &[]);

        info!("Restored {} foreign keys", descriptors.len());
        Ok(descriptors.len())
    }
}

fn constraint_error(
    operation: &'static str,
    fk: &ForeignKeyDescriptor,
    source: MigrateError,
) -> MigrateError {
    MigrateError::ConstraintOperation {
        operation,
        constraint: fk.constraint_name.clone(),
        table: fk.child_table.to_string(),
        message: source.to_string(),
    }
}

/// Log the DDL needed to put back constraints that are currently missing.
fn log_unrestored(pending: &[ForeignKeyDescriptor]) {
    for fk in pending {
        match fk.add_sql() {
            Ok(sql) => error!("Not restored: {}", sql),
            Err(_) => error!("Not restored: {} on {}", fk.constraint_name, fk.child_table),
        }
    }
}
