//! In-memory stand-in for the registry store. Records every mutating call so
//! tests can assert that a reconcile pass wrote exactly what it had to.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;

use crate::store::ScopeStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create(String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryStore {
    keys: RefCell<BTreeMap<String, BTreeMap<String, String>>>,
    ops: RefCell<Vec<StoreOp>>,
    fail_matching: RefCell<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mutation whose path contains `needle` fail with a
    /// permission error, leaving other paths untouched.
    pub fn fail_when_path_contains(&self, needle: &str) {
        *self.fail_matching.borrow_mut() = Some(needle.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_matching.borrow_mut() = None;
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn value(&self, path: &str, name: &str) -> Option<String> {
        self.keys.borrow().get(path).and_then(|v| v.get(name).cloned())
    }

    pub fn key_count(&self) -> usize {
        self.keys.borrow().len()
    }

    fn check_fault(&self, path: &str) -> io::Result<()> {
        if let Some(needle) = self.fail_matching.borrow().as_ref() {
            if path.contains(needle.as_str()) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("injected failure for {path}"),
                ));
            }
        }
        Ok(())
    }
}

impl ScopeStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        let keys = self.keys.borrow();
        if keys.contains_key(path) {
            return true;
        }
        // Creating a deep key creates its parents, so a parent of any stored
        // key exists too.
        let prefix = format!("{path}\\");
        keys.keys().any(|k| k.starts_with(&prefix))
    }

    fn create(&self, path: &str, values: &[(&str, &str)]) -> io::Result<()> {
        self.check_fault(path)?;
        let mut keys = self.keys.borrow_mut();
        let node = keys.entry(path.to_string()).or_default();
        for (name, data) in values {
            node.insert((*name).to_string(), (*data).to_string());
        }
        self.ops.borrow_mut().push(StoreOp::Create(path.to_string()));
        Ok(())
    }

    fn delete_subtree(&self, path: &str) -> io::Result<()> {
        self.check_fault(path)?;
        let mut keys = self.keys.borrow_mut();
        let prefix = format!("{path}\\");
        keys.retain(|k, _| k != path && !k.starts_with(&prefix));
        self.ops.borrow_mut().push(StoreOp::Delete(path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_of_created_keys_exist() {
        let store = MemoryStore::new();
        store
            .create(r"Directory\shell\vscode\command", &[("", "cmd")])
            .unwrap();
        assert!(store.exists(r"Directory\shell\vscode\command"));
        assert!(store.exists(r"Directory\shell\vscode"));
        assert!(store.exists(r"Directory\shell"));
        assert!(!store.exists(r"Directory\shell\vs"));
    }

    #[test]
    fn delete_subtree_removes_descendants() {
        let store = MemoryStore::new();
        store.create(r"*\shell\vscode", &[("", "VSCode")]).unwrap();
        store.create(r"*\shell\vscode\command", &[("", "cmd")]).unwrap();
        store.delete_subtree(r"*\shell\vscode").unwrap();
        assert!(!store.exists(r"*\shell\vscode"));
        assert!(!store.exists(r"*\shell\vscode\command"));
        // Deleting again is still fine.
        store.delete_subtree(r"*\shell\vscode").unwrap();
    }

    #[test]
    fn injected_faults_only_hit_matching_paths() {
        let store = MemoryStore::new();
        store.fail_when_path_contains(r"Directory\shell");
        assert!(store.create(r"*\shell\x", &[]).is_ok());
        let err = store.create(r"Directory\shell\x", &[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        store.clear_failure();
        assert!(store.create(r"Directory\shell\x", &[]).is_ok());
    }

    #[test]
    fn ops_record_mutations_in_order() {
        let store = MemoryStore::new();
        store.create(r"*\shell\a", &[]).unwrap();
        store.delete_subtree(r"*\shell\a").unwrap();
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Create(r"*\shell\a".to_string()),
                StoreOp::Delete(r"*\shell\a".to_string()),
            ]
        );
    }
}
