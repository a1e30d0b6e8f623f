use std::io;

/// Key-level access to the per-scope menu store. The live implementation sits
/// on the Windows registry; tests swap in an in-memory fake.
///
/// Paths are backslash-separated and relative to the root the store was opened
/// on. `create` opens an existing key when one is already there, so repeating
/// a create is harmless.
pub trait ScopeStore {
    /// Whether the key (or any key below it) exists. Lookup problems count as
    /// absent; only mutations report errors.
    fn exists(&self, path: &str) -> bool;

    /// Create the key (parents included) and set the given values on it. An
    /// empty value name addresses the key's default value.
    fn create(&self, path: &str, values: &[(&str, &str)]) -> io::Result<()>;

    /// Delete the key and everything below it. A missing key is not an error.
    fn delete_subtree(&self, path: &str) -> io::Result<()>;
}

pub mod registry;

#[cfg(test)]
pub mod memory;
