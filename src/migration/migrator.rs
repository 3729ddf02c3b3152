//! Migrator - Core migration execution engine

use crate::executor::StoreExecutor;
use crate::migration::checksum::{calculate_checksum, render_sql, validate_checksum};
use crate::migration::lock::{MigrationLockGuard, DEFAULT_LOCK_TIMEOUT_SECONDS};
use crate::migration::{
    Direction, MigrationError, MigrationHistory, MigrationRecord, MigrationStatus, PendingRevision,
    RevisionChain, SchemaChange, SchemaManager,
};
use crate::transaction::Transaction;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// How far an upgrade or downgrade should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Last revision of the chain (upgrade only)
    Head,
    /// Nothing from the chain applied (downgrade only)
    Base,
    /// A specific revision; a downgrade leaves it applied
    Revision(String),
    /// At most this many revisions, in whichever direction is running
    Steps(usize),
    /// Signed step count: `+N` upgrades, `-N` downgrades
    Relative(i64),
}

impl Target {
    /// Parse a command-line target: `head`, `base`, a revision id, or `+N`/`-N`
    pub fn parse(value: &str) -> Self {
        match value {
            "head" | "heads" => Target::Head,
            "base" => Target::Base,
            other => {
                let signed = match other.as_bytes().first() {
                    Some(b'+' | b'-') => other.parse::<i64>().ok(),
                    _ => None,
                };
                match signed {
                    Some(n) => Target::Relative(n),
                    None => Target::Revision(other.to_string()),
                }
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Head => f.write_str("head"),
            Target::Base => f.write_str("base"),
            Target::Revision(rev) => f.write_str(rev),
            Target::Steps(n) => write!(f, "{n} step(s)"),
            Target::Relative(n) => write!(f, "{n:+}"),
        }
    }
}

/// Core migration execution engine
///
/// The `Migrator` owns a validated [`RevisionChain`] and the injected
/// [`MigrationHistory`]. Each revision is applied or reverted in its own
/// transaction together with its history write, and multi-revision operations
/// hold the advisory migration lock for their whole duration.
pub struct Migrator {
    chain: RevisionChain,
    history: Box<dyn MigrationHistory>,
    lock_timeout_seconds: u64,
    use_lock: bool,
}

impl Migrator {
    pub fn new(chain: RevisionChain, history: impl MigrationHistory + 'static) -> Self {
        Self {
            chain,
            history: Box::new(history),
            lock_timeout_seconds: DEFAULT_LOCK_TIMEOUT_SECONDS,
            use_lock: true,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout_seconds = seconds;
        self
    }

    /// Disable the advisory lock (single-runner setups and tests)
    #[must_use]
    pub fn with_lock(mut self, enabled: bool) -> Self {
        self.use_lock = enabled;
        self
    }

    pub fn chain(&self) -> &RevisionChain {
        &self.chain
    }

    pub fn history(&self) -> &dyn MigrationHistory {
        self.history.as_ref()
    }

    fn lock<'e>(&self, executor: &'e dyn StoreExecutor) -> Result<Option<MigrationLockGuard<'e>>, MigrationError> {
        if self.use_lock {
            MigrationLockGuard::acquire(executor, Some(self.lock_timeout_seconds)).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Compare the history with the chain
    ///
    /// # Errors
    ///
    /// - `UnknownAppliedRevision` if the history holds a revision that is neither
    ///   in the chain nor its baseline
    /// - `ChecksumMismatch` if an applied revision renders different SQL now
    pub fn status(&self, executor: &dyn StoreExecutor) -> Result<MigrationStatus, MigrationError> {
        self.history.ensure(executor)?;
        let records = self.history.applied(executor)?;
        self.compare(records)
    }

    /// Like [`status`](Self::status), but never creates the history storage
    fn read_status(&self, executor: &dyn StoreExecutor) -> Result<MigrationStatus, MigrationError> {
        let records = if self.history.is_initialized(executor)? {
            self.history.applied(executor)?
        } else {
            Vec::new()
        };
        self.compare(records)
    }

    fn compare(&self, records: Vec<MigrationRecord>) -> Result<MigrationStatus, MigrationError> {
        let baseline = self.chain.baseline();
        let mut by_revision: HashMap<String, MigrationRecord> = HashMap::new();
        let mut baseline_record = None;
        for record in records {
            if self.chain.contains(&record.revision) {
                by_revision.insert(record.revision.clone(), record);
            } else if baseline == Some(record.revision.as_str()) {
                baseline_record = Some(record);
            } else {
                return Err(MigrationError::UnknownAppliedRevision(record.revision));
            }
        }

        let mut applied = Vec::new();
        let mut pending = Vec::new();
        let mut current = baseline_record.as_ref().map(|r| r.revision.clone());
        applied.extend(baseline_record);

        for change in self.chain.ordered() {
            let checksum = calculate_checksum(change)?;
            match by_revision.remove(change.revision) {
                Some(record) => {
                    if !record.is_stamped() {
                        validate_checksum(change.revision, &record.checksum, &checksum)?;
                    }
                    current = Some(record.revision.clone());
                    applied.push(record);
                }
                None => pending.push(PendingRevision {
                    revision: change.revision.to_string(),
                    down_revision: change.down_revision.map(str::to_string),
                    description: change.description.to_string(),
                    checksum,
                }),
            }
        }

        Ok(MigrationStatus::new(
            applied,
            pending,
            current,
            self.chain.head().revision,
        ))
    }

    /// Validate checksums of all applied revisions
    pub fn validate_checksums(&self, executor: &dyn StoreExecutor) -> Result<(), MigrationError> {
        self.status(executor).map(|_| ())
    }

    fn upgrade_plan(&self, current: Option<&str>, target: &Target) -> Result<Vec<&SchemaChange>, MigrationError> {
        let head = self.chain.head().revision;
        match target {
            Target::Head => self.chain.upgrade_path(current, head),
            Target::Revision(rev) => self.chain.upgrade_path(current, rev),
            Target::Steps(n) => {
                let mut path = self.chain.upgrade_path(current, head)?;
                path.truncate(*n);
                Ok(path)
            }
            Target::Relative(n) if *n >= 0 => {
                let mut path = self.chain.upgrade_path(current, head)?;
                path.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                Ok(path)
            }
            Target::Relative(n) => Err(MigrationError::InvalidTarget(format!(
                "cannot upgrade by {n} step(s); use a downgrade"
            ))),
            Target::Base => Err(MigrationError::InvalidTarget(
                "cannot upgrade to base; use a downgrade".to_string(),
            )),
        }
    }

    fn downgrade_plan(&self, current: Option<&str>, target: &Target) -> Result<Vec<&SchemaChange>, MigrationError> {
        match target {
            Target::Base => self.chain.downgrade_path(current, None),
            Target::Revision(rev) => {
                if !self.chain.contains(rev) && self.chain.baseline() != Some(rev.as_str()) {
                    return Err(MigrationError::UnknownRevision(rev.clone()));
                }
                self.chain.downgrade_path(current, Some(rev))
            }
            Target::Steps(n) => {
                let mut path = self.chain.downgrade_path(current, None)?;
                path.truncate(*n);
                Ok(path)
            }
            Target::Relative(n) if *n <= 0 => {
                let mut path = self.chain.downgrade_path(current, None)?;
                path.truncate(usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX));
                Ok(path)
            }
            Target::Relative(n) => Err(MigrationError::InvalidTarget(format!(
                "cannot downgrade by {n:+} step(s); use an upgrade"
            ))),
            Target::Head => Err(MigrationError::InvalidTarget(
                "cannot downgrade to head; use an upgrade".to_string(),
            )),
        }
    }

    /// Revisions an upgrade to `target` would apply, without running anything
    ///
    /// Only reads the history; a missing history table counts as empty.
    pub fn plan_upgrade(&self, executor: &dyn StoreExecutor, target: &Target) -> Result<Vec<SchemaChange>, MigrationError> {
        let status = self.read_status(executor)?;
        let plan = self.upgrade_plan(status.current.as_deref(), target)?;
        Ok(plan.into_iter().copied().collect())
    }

    /// Revisions a downgrade to `target` would revert, newest first
    pub fn plan_downgrade(&self, executor: &dyn StoreExecutor, target: &Target) -> Result<Vec<SchemaChange>, MigrationError> {
        let status = self.read_status(executor)?;
        let plan = self.downgrade_plan(status.current.as_deref(), target)?;
        Ok(plan.into_iter().copied().collect())
    }

    /// Apply revisions up to `target`, returning how many were applied
    ///
    /// Stops at the first failing revision; revisions applied before it stay
    /// applied.
    pub fn upgrade(&self, executor: &dyn StoreExecutor, target: &Target) -> Result<usize, MigrationError> {
        let _lock = self.lock(executor)?;
        let status = self.status(executor)?;
        let plan = self.upgrade_plan(status.current.as_deref(), target)?;

        if plan.is_empty() {
            log::info!("Already at {}; nothing to upgrade", status.current.as_deref().unwrap_or("<base>"));
            return Ok(0);
        }

        for change in &plan {
            self.apply_change(executor, change)?;
        }
        Ok(plan.len())
    }

    /// Revert revisions down to `target`, returning how many were reverted
    pub fn downgrade(&self, executor: &dyn StoreExecutor, target: &Target) -> Result<usize, MigrationError> {
        let _lock = self.lock(executor)?;
        let status = self.status(executor)?;
        let plan = self.downgrade_plan(status.current.as_deref(), target)?;

        if plan.is_empty() {
            log::info!("Already at {}; nothing to downgrade", status.current.as_deref().unwrap_or("<base>"));
            return Ok(0);
        }

        for change in &plan {
            self.revert_change(executor, change)?;
        }
        Ok(plan.len())
    }

    /// Apply a single revision
    ///
    /// # Errors
    ///
    /// `UnknownRevision`, `AlreadyApplied`, `PredecessorNotApplied`, or the
    /// revision's own failure (`SchemaConflict`, `ReferentialTargetMissing`, ...).
    pub fn apply(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<(), MigrationError> {
        let change = self.require(revision)?;
        let _lock = self.lock(executor)?;
        self.history.ensure(executor)?;
        self.apply_change(executor, change)
    }

    /// Revert a single revision
    ///
    /// # Errors
    ///
    /// `UnknownRevision`, `NotApplied`, `SuccessorApplied`, or the revision's own
    /// failure (`SchemaObjectMissing`, `DependencyConflict`, ...).
    pub fn revert(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<(), MigrationError> {
        let change = self.require(revision)?;
        let _lock = self.lock(executor)?;
        self.history.ensure(executor)?;
        self.revert_change(executor, change)
    }

    /// Mark the store as being at `revision` without running any DDL
    ///
    /// Records `revision` and every unrecorded revision before it (including the
    /// baseline), all in one transaction. Returns the number of records written.
    pub fn stamp(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<usize, MigrationError> {
        let baseline = self.chain.baseline();
        let mut to_record: Vec<(&str, &str)> = Vec::new();
        if baseline == Some(revision) {
            to_record.push((revision, "baseline"));
        } else {
            let position = self
                .chain
                .position(revision)
                .ok_or_else(|| MigrationError::UnknownRevision(revision.to_string()))?;
            to_record.extend(baseline.map(|b| (b, "baseline")));
            to_record.extend(
                self.chain.ordered()[..=position]
                    .iter()
                    .map(|c| (c.revision, c.description)),
            );
        }

        let _lock = self.lock(executor)?;
        self.history.ensure(executor)?;

        if self.history.has_applied(executor, revision)? {
            return Err(MigrationError::AlreadyApplied(revision.to_string()));
        }

        let tx = Transaction::begin(executor)?;
        let mut written = 0;
        for (rev, description) in to_record {
            if self.history.has_applied(&tx, rev)? {
                continue;
            }
            self.history
                .record_applied(&tx, &MigrationRecord::stamped(rev, description))?;
            written += 1;
        }
        tx.commit()?;

        log::info!("Stamped {revision} ({written} record(s) written)");
        Ok(written)
    }

    /// Render an offline upgrade script from `from` to `target`
    ///
    /// `from = None` starts from an empty store, which is only possible for a
    /// chain without a baseline. Each revision is wrapped in `BEGIN;`/`COMMIT;`
    /// together with its history insert.
    ///
    /// # Errors
    ///
    /// `PredecessorNotApplied` when `from` is `None` and the root needs a
    /// baseline; `UnknownRevision` for an unknown `from`.
    pub fn upgrade_sql(&self, from: Option<&str>, target: &Target) -> Result<String, MigrationError> {
        if let Some(rev) = from {
            if !self.chain.contains(rev) && self.chain.baseline() != Some(rev) {
                return Err(MigrationError::UnknownRevision(rev.to_string()));
            }
        }
        let plan = self.upgrade_plan(from, target)?;
        if from.is_none() {
            if let Some(first) = plan.first() {
                if let Some(predecessor) = first.down_revision {
                    return Err(MigrationError::PredecessorNotApplied {
                        revision: first.revision.to_string(),
                        predecessor: predecessor.to_string(),
                    });
                }
            }
        }

        let mut script = String::new();
        let ensure = self.history.ensure_sql();
        if !ensure.is_empty() {
            for statement in ensure {
                script.push_str(&statement);
                script.push_str(";\n\n");
            }
        }

        for change in plan {
            script.push_str(&format!("-- Running upgrade {change}\n\n"));
            script.push_str("BEGIN;\n\n");
            for statement in render_sql(change, Direction::Up)? {
                script.push_str(&statement);
                script.push_str(";\n\n");
            }
            let record = MigrationRecord::new(
                change.revision,
                change.description,
                calculate_checksum(change)?,
                Utc::now(),
                None,
            );
            if let Some(insert) = self.history.record_sql(&record) {
                script.push_str(&insert);
                script.push_str(";\n\n");
            }
            script.push_str("COMMIT;\n\n");
        }

        Ok(script)
    }

    fn require(&self, revision: &str) -> Result<&SchemaChange, MigrationError> {
        self.chain
            .get(revision)
            .ok_or_else(|| MigrationError::UnknownRevision(revision.to_string()))
    }

    fn apply_change(&self, executor: &dyn StoreExecutor, change: &SchemaChange) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::schema_change_span(change.revision, "upgrade").entered();

        if self.history.has_applied(executor, change.revision)? {
            return Err(MigrationError::AlreadyApplied(change.revision.to_string()));
        }
        if let Some(parent) = change.down_revision {
            if !self.history.has_applied(executor, parent)? {
                return Err(MigrationError::PredecessorNotApplied {
                    revision: change.revision.to_string(),
                    predecessor: parent.to_string(),
                });
            }
        }

        let checksum = calculate_checksum(change)?;
        log::info!("Running upgrade {change}");
        let start = Instant::now();

        let tx = Transaction::begin(executor)?;
        let result = change.run(&SchemaManager::new(&tx), Direction::Up).and_then(|()| {
            let record = MigrationRecord::new(
                change.revision,
                change.description,
                checksum,
                Utc::now(),
                Some(elapsed_ms(start)),
            );
            self.history.record_applied(&tx, &record)
        });
        finish(tx, result)?;

        log::info!("Applied {} in {}ms", change.revision, elapsed_ms(start));
        Ok(())
    }

    fn revert_change(&self, executor: &dyn StoreExecutor, change: &SchemaChange) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::schema_change_span(change.revision, "downgrade").entered();

        if !self.history.has_applied(executor, change.revision)? {
            return Err(MigrationError::NotApplied(change.revision.to_string()));
        }
        let successor = self
            .chain
            .position(change.revision)
            .and_then(|i| self.chain.ordered().get(i + 1));
        if let Some(successor) = successor {
            if self.history.has_applied(executor, successor.revision)? {
                return Err(MigrationError::SuccessorApplied {
                    revision: change.revision.to_string(),
                    successor: successor.revision.to_string(),
                });
            }
        }

        log::info!("Running downgrade {change}");
        let start = Instant::now();

        let tx = Transaction::begin(executor)?;
        let result = change
            .run(&SchemaManager::new(&tx), Direction::Down)
            .and_then(|()| self.history.remove_applied(&tx, change.revision));
        finish(tx, result)?;

        log::info!("Reverted {} in {}ms", change.revision, elapsed_ms(start));
        Ok(())
    }
}

/// Commit on success, roll back and return the original error otherwise
fn finish(tx: Transaction<'_>, result: Result<(), MigrationError>) -> Result<(), MigrationError> {
    match result {
        Ok(()) => Ok(tx.commit()?),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::warn!("rollback failed: {rollback_err}");
            }
            log::error!("{e}");
            Err(e)
        }
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}
