//! Reconciles declared shortcuts with the per-scope menu keys in the store.
//! Apply and remove both converge on a desired scope set and only ever write
//! the difference, so repeating an operation is a no-op.

use std::fmt;
use std::io;

use log::info;

use crate::error::{Error, Result, StoreAction, StoreFailure};
use crate::model::{MenuEntry, Scope};
use crate::store::ScopeStore;
use crate::system::Privilege;

const ACCESS_PROBE_KEY: &str = r"Directory\shell\__openwith_access_test__";

/// What a reconcile pass actually changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScopeDiff {
    pub added: Vec<Scope>,
    pub removed: Vec<Scope>,
}

impl ScopeDiff {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for ScopeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return f.write_str("no menu changes needed");
        }
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            let labels: Vec<&str> = self.added.iter().map(|s| s.label()).collect();
            parts.push(format!("added {}", labels.join(", ")));
        }
        if !self.removed.is_empty() {
            let labels: Vec<&str> = self.removed.iter().map(|s| s.label()).collect();
            parts.push(format!("removed {}", labels.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}

pub struct MenuProvisioner<'a, S: ScopeStore> {
    store: &'a S,
    privilege: &'a dyn Privilege,
}

impl<'a, S: ScopeStore> MenuProvisioner<'a, S> {
    pub fn new(store: &'a S, privilege: &'a dyn Privilege) -> Self {
        Self { store, privilege }
    }

    /// Bring the store in line with the entry's scope flags.
    pub fn apply(&self, entry: &MenuEntry) -> Result<ScopeDiff> {
        self.reconcile(entry, &entry.desired_scopes())
    }

    /// Clear every scope of the entry, whatever its flags say.
    pub fn remove(&self, entry: &MenuEntry) -> Result<ScopeDiff> {
        self.reconcile(entry, &[])
    }

    fn reconcile(&self, entry: &MenuEntry, desired: &[Scope]) -> Result<ScopeDiff> {
        if !self.privilege.is_elevated() {
            return Err(Error::Permission);
        }

        let mut diff = ScopeDiff::default();
        let mut failures = Vec::new();
        // Each scope is reconciled on its own; a failure in one never rolls
        // back or blocks the others.
        for scope in Scope::ALL {
            let wanted = desired.contains(&scope);
            let live = self.store.exists(&scope.key_path(&entry.root));
            match (wanted, live) {
                (true, false) => match self.add_scope(entry, scope) {
                    Ok(()) => diff.added.push(scope),
                    Err(err) => failures.push(StoreFailure::scope(scope, StoreAction::Add, &err)),
                },
                (false, true) => match self.store.delete_subtree(&scope.key_path(&entry.root)) {
                    Ok(()) => diff.removed.push(scope),
                    Err(err) => failures.push(StoreFailure::scope(scope, StoreAction::Remove, &err)),
                },
                _ => {}
            }
        }

        if !failures.is_empty() {
            return Err(Error::Store(failures));
        }
        if !diff.is_noop() {
            info!("'{}': {diff}", entry.root);
        }
        Ok(diff)
    }

    fn add_scope(&self, entry: &MenuEntry, scope: Scope) -> io::Result<()> {
        let icon = entry.icon_value();
        self.store.create(
            &scope.key_path(&entry.root),
            &[("", entry.name.as_str()), ("Icon", icon.as_str())],
        )?;
        let command = entry.command_value(scope);
        self.store
            .create(&scope.command_path(&entry.root), &[("", command.as_str())])
    }

    /// Ground truth for one entry: which scopes are live right now.
    pub fn live_scopes(&self, root: &str) -> Vec<Scope> {
        Scope::ALL
            .into_iter()
            .filter(|s| self.store.exists(&s.key_path(root)))
            .collect()
    }

    /// Overwrite every entry's scope flags with what the store reports.
    /// Read-only, so no elevation is needed.
    pub fn refresh(&self, entries: &mut [MenuEntry]) {
        for entry in entries {
            for scope in Scope::ALL {
                let live = self.store.exists(&scope.key_path(&entry.root));
                entry.set_scope(scope, live);
            }
        }
    }

    /// Probe whether the menu subtree is writable by creating and deleting a
    /// scratch key. Diagnostic only; all errors collapse to `false`.
    pub fn test_access(&self) -> bool {
        if self.store.create(ACCESS_PROBE_KEY, &[("probe", "ok")]).is_err() {
            return false;
        }
        self.store.delete_subtree(ACCESS_PROBE_KEY).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreOp};

    struct FixedPrivilege(bool);

    impl Privilege for FixedPrivilege {
        fn is_elevated(&self) -> bool {
            self.0
        }

        fn request_elevated_relaunch(&self) -> bool {
            false
        }
    }

    const ELEVATED: FixedPrivilege = FixedPrivilege(true);
    const RESTRICTED: FixedPrivilege = FixedPrivilege(false);

    fn entry(root: &str, scopes: &[Scope]) -> MenuEntry {
        let mut entry = MenuEntry::new("My Tool", root, r"C:\Tools\My Tool\tool.exe");
        for scope in scopes {
            entry.set_scope(*scope, true);
        }
        entry
    }

    #[test]
    fn apply_writes_keys_values_and_commands() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        let entry = entry("mytool", &[Scope::Files, Scope::Desktop]);

        let diff = provisioner.apply(&entry).unwrap();
        assert_eq!(diff.added, vec![Scope::Files, Scope::Desktop]);
        assert!(diff.removed.is_empty());

        assert_eq!(store.value(r"*\shell\mytool", "").as_deref(), Some("My Tool"));
        assert_eq!(
            store.value(r"*\shell\mytool", "Icon").as_deref(),
            Some(r#""C:\Tools\My Tool\tool.exe""#)
        );
        assert_eq!(
            store.value(r"*\shell\mytool\command", "").as_deref(),
            Some(r#""C:\Tools\My Tool\tool.exe" "%1""#)
        );
        assert_eq!(
            store.value(r"Directory\Background\shell\mytool\command", "").as_deref(),
            Some(r#""C:\Tools\My Tool\tool.exe" "%V""#)
        );
        assert!(!store.exists(r"Directory\shell\mytool"));

        // Reading the store back reproduces exactly the flags that were applied.
        let mut read_back = vec![MenuEntry::new("My Tool", "mytool", r"C:\Tools\My Tool\tool.exe")];
        provisioner.refresh(&mut read_back);
        assert_eq!(read_back[0], entry);
    }

    #[test]
    fn apply_twice_converges_without_writing() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        let entry = entry("mytool", &[Scope::Directories]);

        provisioner.apply(&entry).unwrap();
        store.clear_ops();

        let diff = provisioner.apply(&entry).unwrap();
        assert!(diff.is_noop());
        assert!(store.ops().is_empty());
    }

    #[test]
    fn apply_only_touches_changed_scopes() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        provisioner
            .apply(&entry("mytool", &[Scope::Files, Scope::Directories]))
            .unwrap();
        store.clear_ops();

        let diff = provisioner
            .apply(&entry("mytool", &[Scope::Directories, Scope::Desktop]))
            .unwrap();
        assert_eq!(diff.added, vec![Scope::Desktop]);
        assert_eq!(diff.removed, vec![Scope::Files]);
        // The untouched directories scope saw no traffic at all.
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Delete(r"*\shell\mytool".to_string()),
                StoreOp::Create(r"Directory\Background\shell\mytool".to_string()),
                StoreOp::Create(r"Directory\Background\shell\mytool\command".to_string()),
            ]
        );
    }

    #[test]
    fn failed_scope_is_reported_and_the_rest_still_lands() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        store.fail_when_path_contains(r"Directory\shell\mytool");

        let err = provisioner
            .apply(&entry("mytool", &[Scope::Files, Scope::Directories, Scope::Desktop]))
            .unwrap_err();
        let Error::Store(failures) = &err else {
            panic!("expected a store error, got {err:?}");
        };
        assert_eq!(failures.len(), 1);
        assert!(err.to_string().contains("directories scope"));

        assert!(store.exists(r"*\shell\mytool"));
        assert!(store.exists(r"Directory\Background\shell\mytool"));
        assert!(!store.exists(r"Directory\shell\mytool"));

        // Once the store cooperates, a plain re-apply converges.
        store.clear_failure();
        let diff = provisioner
            .apply(&entry("mytool", &[Scope::Files, Scope::Directories, Scope::Desktop]))
            .unwrap();
        assert_eq!(diff.added, vec![Scope::Directories]);
    }

    #[test]
    fn remove_clears_every_live_scope() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        let entry = entry("mytool", &[Scope::Files, Scope::Directories, Scope::Desktop]);

        provisioner.apply(&entry).unwrap();
        let diff = provisioner.remove(&entry).unwrap();
        assert_eq!(diff.removed.len(), 3);
        assert_eq!(store.key_count(), 0);

        // Removing an entry that is nowhere live writes nothing.
        store.clear_ops();
        let diff = provisioner.remove(&entry).unwrap();
        assert!(diff.is_noop());
        assert!(store.ops().is_empty());
    }

    #[test]
    fn refresh_reads_ground_truth_without_writing() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        provisioner.apply(&entry("mytool", &[Scope::Desktop])).unwrap();
        store.clear_ops();

        // Stale flags: the file claims files-only, the store says desktop.
        let mut entries = vec![entry("mytool", &[Scope::Files]), entry("other", &[])];
        let restricted = MenuProvisioner::new(&store, &RESTRICTED);
        restricted.refresh(&mut entries);

        assert!(!entries[0].for_files);
        assert!(entries[0].for_desktop);
        assert!(!entries[1].enabled());
        assert!(store.ops().is_empty());
    }

    #[test]
    fn mutations_require_elevation() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &RESTRICTED);
        let entry = entry("mytool", &[Scope::Files]);

        assert!(matches!(provisioner.apply(&entry), Err(Error::Permission)));
        assert!(matches!(provisioner.remove(&entry), Err(Error::Permission)));
        assert!(store.ops().is_empty());
    }

    #[test]
    fn live_scopes_reflects_the_store() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        assert!(provisioner.live_scopes("mytool").is_empty());

        provisioner
            .apply(&entry("mytool", &[Scope::Files, Scope::Desktop]))
            .unwrap();
        assert_eq!(
            provisioner.live_scopes("mytool"),
            vec![Scope::Files, Scope::Desktop]
        );
    }

    #[test]
    fn access_probe_cleans_up_after_itself() {
        let store = MemoryStore::new();
        let provisioner = MenuProvisioner::new(&store, &ELEVATED);
        assert!(provisioner.test_access());
        assert_eq!(store.key_count(), 0);

        store.fail_when_path_contains("__openwith_access_test__");
        assert!(!provisioner.test_access());
    }
}
