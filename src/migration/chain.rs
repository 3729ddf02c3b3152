//! Revision chain - ordering of schema changes by their declared predecessors

use crate::migration::change::validate_revision_id;
use crate::migration::{MigrationError, SchemaChange};
use std::collections::{HashMap, HashSet};

/// A validated, linear chain of schema changes
///
/// The root's predecessor is either `None` or a revision that is not shipped in
/// the chain: the *baseline*, created by earlier tooling and recorded with
/// `stamp` before the root can be applied.
#[derive(Debug, Clone)]
pub struct RevisionChain {
    /// Root first, head last
    ordered: Vec<SchemaChange>,
    index: HashMap<&'static str, usize>,
}

impl RevisionChain {
    /// Validate `changes` and order them from root to head
    ///
    /// # Errors
    ///
    /// - `EmptyChain` if there are no changes
    /// - `InvalidRevision` for malformed ids
    /// - `DuplicateRevision` if an id is declared twice
    /// - `MultipleRoots` if several changes have no in-chain predecessor
    /// - `Branching` if two changes follow the same revision
    /// - `Disconnected` if some changes cannot be reached from the root (cycles)
    pub fn new(changes: Vec<SchemaChange>) -> Result<Self, MigrationError> {
        if changes.is_empty() {
            return Err(MigrationError::EmptyChain);
        }

        let mut ids: HashSet<&'static str> = HashSet::new();
        for change in &changes {
            validate_revision_id(change.revision)?;
            if let Some(parent) = change.down_revision {
                validate_revision_id(parent)?;
            }
            if !ids.insert(change.revision) {
                return Err(MigrationError::DuplicateRevision(change.revision.to_string()));
            }
        }

        let roots: Vec<&SchemaChange> = changes
            .iter()
            .filter(|c| c.down_revision.map_or(true, |parent| !ids.contains(parent)))
            .collect();
        let root = match roots.as_slice() {
            [root] => **root,
            [] => {
                let mut members: Vec<String> = changes.iter().map(|c| c.revision.to_string()).collect();
                members.sort();
                return Err(MigrationError::Disconnected(members));
            }
            many => {
                let mut names: Vec<String> = many.iter().map(|c| c.revision.to_string()).collect();
                names.sort();
                return Err(MigrationError::MultipleRoots(names));
            }
        };

        let mut children: HashMap<&'static str, Vec<&SchemaChange>> = HashMap::new();
        for change in &changes {
            if let Some(parent) = change.down_revision.filter(|p| ids.contains(p)) {
                children.entry(parent).or_default().push(change);
            }
        }
        if let Some((parent, kids)) = children.iter().find(|(_, kids)| kids.len() > 1) {
            let mut names: Vec<String> = kids.iter().map(|c| c.revision.to_string()).collect();
            names.sort();
            return Err(MigrationError::Branching {
                parent: (*parent).to_string(),
                children: names,
            });
        }

        let mut ordered = Vec::with_capacity(changes.len());
        let mut current = Some(root);
        while let Some(change) = current {
            ordered.push(change);
            current = children
                .get(change.revision)
                .and_then(|kids| kids.first())
                .map(|c| **c);
        }

        if ordered.len() != changes.len() {
            let reached: HashSet<&str> = ordered.iter().map(|c| c.revision).collect();
            let mut missing: Vec<String> = changes
                .iter()
                .filter(|c| !reached.contains(c.revision))
                .map(|c| c.revision.to_string())
                .collect();
            missing.sort();
            return Err(MigrationError::Disconnected(missing));
        }

        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, c)| (c.revision, i))
            .collect();

        Ok(Self { ordered, index })
    }

    /// Changes from root to head
    pub fn ordered(&self) -> &[SchemaChange] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn root(&self) -> &SchemaChange {
        &self.ordered[0]
    }

    pub fn head(&self) -> &SchemaChange {
        &self.ordered[self.ordered.len() - 1]
    }

    /// Predecessor of the root that is not part of the chain
    pub fn baseline(&self) -> Option<&'static str> {
        self.root().down_revision
    }

    pub fn get(&self, revision: &str) -> Option<&SchemaChange> {
        self.index.get(revision).map(|&i| &self.ordered[i])
    }

    pub fn contains(&self, revision: &str) -> bool {
        self.index.contains_key(revision)
    }

    /// Position of `revision` counted from the root (0-based)
    pub fn position(&self, revision: &str) -> Option<usize> {
        self.index.get(revision).copied()
    }

    fn require_position(&self, revision: &str) -> Result<usize, MigrationError> {
        self.position(revision)
            .ok_or_else(|| MigrationError::UnknownRevision(revision.to_string()))
    }

    /// Number of changes applied when the store is at `current`
    ///
    /// `None` and the baseline both mean nothing from this chain is applied.
    fn applied_len(&self, current: Option<&str>) -> Result<usize, MigrationError> {
        match current {
            None => Ok(0),
            Some(rev) if Some(rev) == self.baseline() => Ok(0),
            Some(rev) => Ok(self.require_position(rev)? + 1),
        }
    }

    /// Changes to apply, in order, to go from `current` up to `target`
    ///
    /// # Errors
    ///
    /// `UnknownRevision` for ids outside the chain, `InvalidTarget` if `target`
    /// is behind `current`.
    pub fn upgrade_path(&self, current: Option<&str>, target: &str) -> Result<Vec<&SchemaChange>, MigrationError> {
        let from = self.applied_len(current)?;
        let to = self.require_position(target)? + 1;
        if to < from {
            return Err(MigrationError::InvalidTarget(format!(
                "'{}' is older than the current revision '{}'; use a downgrade",
                target,
                current.unwrap_or("<base>")
            )));
        }
        Ok(self.ordered[from..to].iter().collect())
    }

    /// Changes to revert, newest first, to go from `current` down to `target`
    ///
    /// `target = None` (or the baseline) reverts every change of the chain; the
    /// target revision itself stays applied.
    pub fn downgrade_path(&self, current: Option<&str>, target: Option<&str>) -> Result<Vec<&SchemaChange>, MigrationError> {
        let from = self.applied_len(current)?;
        let to = self.applied_len(target)?;
        if to > from {
            return Err(MigrationError::InvalidTarget(format!(
                "'{}' is newer than the current revision '{}'; use an upgrade",
                target.unwrap_or("<base>"),
                current.unwrap_or("<base>")
            )));
        }
        Ok(self.ordered[to..from].iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::SchemaManager;

    fn noop(_: &SchemaManager<'_>) -> Result<(), MigrationError> {
        Ok(())
    }

    fn change(revision: &'static str, parent: Option<&'static str>) -> SchemaChange {
        SchemaChange::new(revision, parent, "test", noop, noop)
    }

    fn names(path: &[&SchemaChange]) -> Vec<&'static str> {
        path.iter().map(|c| c.revision).collect()
    }

    fn abc() -> RevisionChain {
        // Deliberately shuffled
        RevisionChain::new(vec![
            change("c", Some("b")),
            change("a", Some("base0")),
            change("b", Some("a")),
        ])
        .unwrap()
    }

    #[test]
    fn test_orders_from_root_to_head() {
        let chain = abc();
        let order: Vec<&str> = chain.ordered().iter().map(|c| c.revision).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(chain.root().revision, "a");
        assert_eq!(chain.head().revision, "c");
        assert_eq!(chain.baseline(), Some("base0"));
        assert_eq!(chain.position("b"), Some(1));
        assert!(chain.contains("c"));
        assert!(!chain.contains("base0"));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_rejects_invalid_chains() {
        assert!(matches!(RevisionChain::new(vec![]), Err(MigrationError::EmptyChain)));
        assert!(matches!(
            RevisionChain::new(vec![change("a", None), change("a", None)]),
            Err(MigrationError::DuplicateRevision(_))
        ));
        assert!(matches!(
            RevisionChain::new(vec![change("a", None), change("b", None)]),
            Err(MigrationError::MultipleRoots(_))
        ));
        assert!(matches!(
            RevisionChain::new(vec![change("a", None), change("b", Some("a")), change("c", Some("a"))]),
            Err(MigrationError::Branching { .. })
        ));
        assert!(matches!(
            RevisionChain::new(vec![change("bad id", None)]),
            Err(MigrationError::InvalidRevision(_))
        ));
    }

    #[test]
    fn test_rejects_cycles() {
        // a <- b <- a has no root at all
        assert!(matches!(
            RevisionChain::new(vec![change("a", Some("b")), change("b", Some("a"))]),
            Err(MigrationError::Disconnected(_))
        ));
        // root r plus a detached cycle x <-> y
        let err = RevisionChain::new(vec![
            change("r", None),
            change("x", Some("y")),
            change("y", Some("x")),
        ])
        .unwrap_err();
        match err {
            MigrationError::Disconnected(missing) => assert_eq!(missing, vec!["x", "y"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_upgrade_path() {
        let chain = abc();
        assert_eq!(names(&chain.upgrade_path(None, "c").unwrap()), vec!["a", "b", "c"]);
        assert_eq!(names(&chain.upgrade_path(Some("base0"), "b").unwrap()), vec!["a", "b"]);
        assert_eq!(names(&chain.upgrade_path(Some("a"), "c").unwrap()), vec!["b", "c"]);
        assert!(chain.upgrade_path(Some("c"), "c").unwrap().is_empty());
        assert!(matches!(
            chain.upgrade_path(Some("c"), "a"),
            Err(MigrationError::InvalidTarget(_))
        ));
        assert!(matches!(
            chain.upgrade_path(None, "zzz"),
            Err(MigrationError::UnknownRevision(_))
        ));
    }

    #[test]
    fn test_downgrade_path() {
        let chain = abc();
        assert_eq!(names(&chain.downgrade_path(Some("c"), None).unwrap()), vec!["c", "b", "a"]);
        assert_eq!(names(&chain.downgrade_path(Some("c"), Some("base0")).unwrap()), vec!["c", "b", "a"]);
        assert_eq!(names(&chain.downgrade_path(Some("c"), Some("a")).unwrap()), vec!["c", "b"]);
        assert!(chain.downgrade_path(None, None).unwrap().is_empty());
        assert!(matches!(
            chain.downgrade_path(Some("a"), Some("c")),
            Err(MigrationError::InvalidTarget(_))
        ));
    }
}
