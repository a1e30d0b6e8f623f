//! Registry-backed store. Menu keys live under HKEY_CLASSES_ROOT, the Win11
//! style override under HKEY_CURRENT_USER.

use std::io;

#[cfg(not(windows))]
use crate::error::Error;
use crate::error::Result;
use crate::store::ScopeStore;

#[cfg(windows)]
use winreg::RegKey;
#[cfg(windows)]
use winreg::enums::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER};

#[cfg(windows)]
pub struct SystemStore {
    root: RegKey,
    hive: &'static str,
}

#[cfg(windows)]
impl SystemStore {
    pub fn classes_root() -> Result<Self> {
        Ok(Self {
            root: RegKey::predef(HKEY_CLASSES_ROOT),
            hive: "HKCR",
        })
    }

    pub fn current_user() -> Result<Self> {
        Ok(Self {
            root: RegKey::predef(HKEY_CURRENT_USER),
            hive: "HKCU",
        })
    }
}

#[cfg(windows)]
impl ScopeStore for SystemStore {
    fn exists(&self, path: &str) -> bool {
        self.root.open_subkey(path).is_ok()
    }

    fn create(&self, path: &str, values: &[(&str, &str)]) -> io::Result<()> {
        let (key, _disposition) = self.root.create_subkey(path)?;
        for (name, data) in values {
            key.set_value(name, data)?;
        }
        log::debug!("created {}\\{path}", self.hive);
        Ok(())
    }

    fn delete_subtree(&self, path: &str) -> io::Result<()> {
        match self.root.delete_subkey_all(path) {
            Ok(()) => {
                log::debug!("deleted {}\\{path}", self.hive);
                Ok(())
            }
            // Deleting a key that was never created is a no-op.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

// The stub keeps the crate compiling elsewhere; both constructors refuse, so
// the trait methods below are never reached.
#[cfg(not(windows))]
#[allow(dead_code)]
pub struct SystemStore;

#[cfg(not(windows))]
impl SystemStore {
    pub fn classes_root() -> Result<Self> {
        Err(Error::Unsupported)
    }

    pub fn current_user() -> Result<Self> {
        Err(Error::Unsupported)
    }
}

#[cfg(not(windows))]
impl ScopeStore for SystemStore {
    fn exists(&self, _path: &str) -> bool {
        false
    }

    fn create(&self, _path: &str, _values: &[(&str, &str)]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "registry access requires Windows",
        ))
    }

    fn delete_subtree(&self, _path: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "registry access requires Windows",
        ))
    }
}
