//! Schema migrations for versioned artifacts.
//!
//! Each artifact carries an integer `schemaVersion` at its document root.
//! A [`Migration`] registered for version `v` upgrades a document from `v` to
//! `v + 1`. Upgrading from `current` to `target` runs every step in
//! `[current, target)` in ascending order.
//!
//! The whole plan is validated before anything is mutated. A missing or
//! duplicate step, or a target below the current version, is a configuration
//! error and fails loudly without touching the document.
//!
//! The engine writes `schemaVersion = v + 1` itself, in the same transaction
//! as the step's `up` function, so a step only has to reshape the payload.

use std::collections::BTreeMap;
use std::sync::Arc;

use automerge::transaction::{Transactable, Transaction};
use automerge::{Automerge, AutomergeError, ROOT, ReadDoc, ScalarValue, Value};

use crate::artifact::{ChangeOrigin, DocHandle, VersionedArtifact};
use crate::error::{Result, VersoError};

/// Root key holding an artifact's schema version.
pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";

/// Version assumed for documents that carry no `schemaVersion`.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// Upgrade function for one schema step.
pub type MigrationFn =
    dyn Fn(&mut Transaction<'_>) -> std::result::Result<(), AutomergeError> + Send + Sync;

/// One schema step: transforms version `version` into `version + 1`.
#[derive(Clone)]
pub struct Migration {
    /// The version this step upgrades from.
    pub version: u32,
    up: Arc<MigrationFn>,
}

impl Migration {
    /// Create a step for `version`.
    pub fn new<F>(version: u32, up: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> std::result::Result<(), AutomergeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            version,
            up: Arc::new(up),
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Read the schema version from any readable document.
///
/// Absent or non-numeric values fall back to [`DEFAULT_SCHEMA_VERSION`].
pub fn schema_version_of<D: ReadDoc>(doc: &D) -> u32 {
    let value = match doc.get(ROOT, SCHEMA_VERSION_KEY) {
        Ok(Some((Value::Scalar(scalar), _))) => scalar.into_owned(),
        _ => return DEFAULT_SCHEMA_VERSION,
    };
    let version = match value {
        ScalarValue::Int(i) => u32::try_from(i).ok(),
        ScalarValue::Uint(u) => u32::try_from(u).ok(),
        ScalarValue::F64(f) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => {
            Some(f as u32)
        }
        _ => None,
    };
    version.unwrap_or_else(|| {
        log::warn!(
            "[Migration] Ignoring unreadable {} value, assuming {}",
            SCHEMA_VERSION_KEY,
            DEFAULT_SCHEMA_VERSION
        );
        DEFAULT_SCHEMA_VERSION
    })
}

/// The artifact's current schema version.
pub fn current_version<T>(artifact: &VersionedArtifact<T>) -> u32 {
    artifact.schema_version()
}

/// Whether the artifact is below `target`.
pub fn needs_migration<T>(artifact: &VersionedArtifact<T>, target: u32) -> bool {
    current_version(artifact) < target
}

/// Resolve the ordered list of steps that take `current` to `target`.
///
/// Fails with [`VersoError::VersionInversion`] when `current > target`,
/// [`VersoError::DuplicateMigration`] when any version is registered twice,
/// and [`VersoError::MissingMigration`] for the first absent step.
pub fn plan(current: u32, target: u32, migrations: &[Migration]) -> Result<Vec<&Migration>> {
    if current > target {
        return Err(VersoError::VersionInversion { current, target });
    }

    let mut by_version: BTreeMap<u32, &Migration> = BTreeMap::new();
    for migration in migrations {
        if by_version.insert(migration.version, migration).is_some() {
            return Err(VersoError::DuplicateMigration(migration.version));
        }
    }

    (current..target)
        .map(|version| {
            by_version
                .get(&version)
                .copied()
                .ok_or(VersoError::MissingMigration(version))
        })
        .collect()
}

fn run_step(doc: &mut Automerge, step: &Migration) -> Result<()> {
    let next = step.version + 1;
    let mut tx = doc.transaction();
    let outcome =
        (step.up)(&mut tx).and_then(|()| tx.put(ROOT, SCHEMA_VERSION_KEY, i64::from(next)));
    match outcome {
        Ok(()) => {
            tx.commit();
            log::debug!("[Migration] Applied {} -> {}", step.version, next);
            Ok(())
        }
        Err(e) => {
            tx.rollback();
            log::error!("[Migration] Step {} failed: {}", step.version, e);
            Err(VersoError::MigrationFailed {
                version: step.version,
                message: e.to_string(),
            })
        }
    }
}

/// Upgrade `artifact` to `target`, returning the upgraded snapshot.
///
/// Steps run on a fork of the input, so the input is never mutated and a
/// failure leaves no partial result behind.
pub fn migrate<T>(
    artifact: &VersionedArtifact<T>,
    migrations: &[Migration],
    target: u32,
) -> Result<VersionedArtifact<T>> {
    let current = current_version(artifact);
    let steps = plan(current, target, migrations)?;
    if steps.is_empty() {
        return Ok(artifact.clone());
    }

    log::info!(
        "[Migration] Upgrading schema {} -> {} ({} steps)",
        current,
        target,
        steps.len()
    );
    let mut doc = artifact.doc().fork();
    for step in steps {
        run_step(&mut doc, step)?;
    }
    Ok(VersionedArtifact::from_doc(doc))
}

/// Like [`migrate`], but a no-op when the artifact is already at or above
/// `target`. Applying it twice gives the same result as applying it once.
pub fn migrate_if_needed<T>(
    artifact: &VersionedArtifact<T>,
    migrations: &[Migration],
    target: u32,
) -> Result<VersionedArtifact<T>> {
    if needs_migration(artifact, target) {
        migrate(artifact, migrations, target)
    } else {
        Ok(artifact.clone())
    }
}

/// Upgrade a live document in place, one change event per step.
///
/// The plan is validated up front. If a step's `up` fails, the steps before
/// it stay committed and the document is left at that step's version.
pub fn migrate_handle<T>(handle: &DocHandle<T>, migrations: &[Migration], target: u32) -> Result<u32> {
    let current = current_version(&handle.doc()?);
    if current >= target {
        return Ok(current);
    }
    let steps = plan(current, target, migrations)?;
    for step in steps {
        handle
            .core()
            .apply(ChangeOrigin::Local, |doc| run_step(doc, step))?;
    }
    Ok(target)
}
