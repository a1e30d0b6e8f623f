use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{ConfigFile, MenuEntry};

/// Owns the declared shortcut list and its JSON file. Every successful
/// mutation is written back before it returns.
pub struct ConfigStore {
    path: PathBuf,
    entries: Vec<MenuEntry>,
}

pub fn config_file_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("org", "openwith", "openwith") {
        dirs.config_dir().join("shortcuts.json")
    } else {
        PathBuf::from("shortcuts.json")
    }
}

fn default_entries() -> Vec<MenuEntry> {
    vec![
        MenuEntry::new("VSCode", "vscode", r"C:\Program Files\Microsoft VS Code\Code.exe"),
        MenuEntry::new("Notepad++", "notepadpp", r"C:\Program Files\Notepad++\notepad++.exe"),
        MenuEntry::new(
            "Sublime Text",
            "sublimetext",
            r"C:\Program Files\Sublime Text\sublime_text.exe",
        ),
        MenuEntry::new("Notepad", "notepad", r"C:\Windows\System32\notepad.exe"),
    ]
}

impl ConfigStore {
    pub fn open_default() -> Self {
        Self::open_at(config_file_path())
    }

    pub fn open_at(path: PathBuf) -> Self {
        let mut store = Self { path, entries: Vec::new() };
        store.load();
        store
    }

    /// Read the file, falling back to the default shortcut set when it is
    /// missing, empty or unreadable. Loading never fails the caller.
    fn load(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<ConfigFile>(&text) {
                Ok(file) if !file.configs.is_empty() => {
                    debug!("loaded {} shortcuts from {}", file.configs.len(), self.path.display());
                    self.entries = file.configs;
                }
                Ok(_) => {
                    debug!("shortcut list at {} is empty, regenerating defaults", self.path.display());
                    self.reset_to_defaults();
                }
                Err(err) => {
                    warn!("shortcut list at {} is unreadable ({err}), regenerating defaults", self.path.display());
                    self.reset_to_defaults();
                }
            },
            Err(_) => {
                debug!("no shortcut list at {}, writing defaults", self.path.display());
                self.reset_to_defaults();
            }
        }
    }

    fn reset_to_defaults(&mut self) {
        self.entries = default_entries();
        if let Err(err) = self.save() {
            warn!("could not write the default shortcut list: {err}");
        }
    }

    pub fn save(&self) -> Result<()> {
        let file = ConfigFile { configs: self.entries.clone() };
        let persist_err = |source: io::Error| Error::Persistence {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }
        let content = serde_json::to_string_pretty(&file)
            .map_err(|err| persist_err(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        fs::write(&self.path, content).map_err(persist_err)
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn find_index(&self, root: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.root == root)
    }

    /// Field checks shared by add and update. Scope flags are free-form; the
    /// three name/root/path fields must be present and the path must look
    /// like an executable path, not a bare program name.
    pub fn validate(entry: &MenuEntry) -> Result<()> {
        if entry.name.trim().is_empty() {
            return Err(Error::Validation("the display name must not be empty".to_string()));
        }
        if entry.root.trim().is_empty() {
            return Err(Error::Validation("the registry key name must not be empty".to_string()));
        }
        if entry.path.trim().is_empty() {
            return Err(Error::Validation("the program path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn root_is_unique(&self, root: &str, exclude: Option<usize>) -> bool {
        !self
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| Some(i) != exclude && e.root == root)
    }

    /// Derive a registry key name from the display name: lowercased, with
    /// spaces, dashes and underscores stripped, suffixed with a counter until
    /// it is unique.
    pub fn generate_root(&self, name: &str) -> Result<String> {
        let base: String = name
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect();
        if base.is_empty() {
            return Err(Error::Validation(format!(
                "the name '{name}' leaves no usable characters for a registry key"
            )));
        }
        if self.root_is_unique(&base, None) {
            return Ok(base);
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{base}{counter}");
            if self.root_is_unique(&candidate, None) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Append a new shortcut and persist. An empty root is filled in from the
    /// name; a caller-supplied root must be unique.
    pub fn add(&mut self, mut entry: MenuEntry) -> Result<usize> {
        if entry.root.trim().is_empty() {
            entry.root = self.generate_root(&entry.name)?;
        }
        Self::validate(&entry)?;
        if !self.root_is_unique(&entry.root, None) {
            return Err(Error::Uniqueness(entry.root));
        }
        self.entries.push(entry);
        self.save()?;
        Ok(self.entries.len() - 1)
    }

    pub fn update(&mut self, index: usize, entry: MenuEntry) -> Result<()> {
        if index >= self.entries.len() {
            return Err(Error::Validation(format!("no shortcut at position {index}")));
        }
        Self::validate(&entry)?;
        if !self.root_is_unique(&entry.root, Some(index)) {
            return Err(Error::Uniqueness(entry.root));
        }
        self.entries[index] = entry;
        self.save()
    }

    pub fn remove(&mut self, index: usize) -> Result<MenuEntry> {
        if index >= self.entries.len() {
            return Err(Error::Validation(format!("no shortcut at position {index}")));
        }
        let removed = self.entries.remove(index);
        self.save()?;
        Ok(removed)
    }

    /// Swap in a full list (the refresh path) and persist it.
    pub fn replace_all(&mut self, entries: Vec<MenuEntry>) -> Result<()> {
        self.entries = entries;
        self.save()
    }
}

/// Advisory only: a shortcut may point at a program that is not installed
/// yet, so a missing target never blocks a declaration.
pub fn target_exists(path: &str) -> bool {
    !path.trim().is_empty() && Path::new(path).is_file()
}
