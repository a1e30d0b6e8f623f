use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a shortcut shows up in the Explorer context menu. Each scope maps to
/// one registry subtree under HKEY_CLASSES_ROOT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Files,
    Directories,
    Desktop,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Files, Scope::Directories, Scope::Desktop];

    /// Registry path of the menu key for this scope, relative to the classes root.
    pub fn key_path(self, root: &str) -> String {
        match self {
            Scope::Files => format!(r"*\shell\{root}"),
            Scope::Directories => format!(r"Directory\shell\{root}"),
            Scope::Desktop => format!(r"Directory\Background\shell\{root}"),
        }
    }

    pub fn command_path(self, root: &str) -> String {
        format!(r"{}\command", self.key_path(root))
    }

    /// Placeholder Explorer substitutes when invoking the command: the clicked
    /// file for file entries, the folder (or background folder) otherwise.
    pub fn invocation_token(self) -> &'static str {
        match self {
            Scope::Files => "%1",
            Scope::Directories | Scope::Desktop => "%V",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Scope::Files => "files",
            Scope::Directories => "directories",
            Scope::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "files" => Ok(Scope::Files),
            "directories" => Ok(Scope::Directories),
            "desktop" => Ok(Scope::Desktop),
            other => Err(format!(
                "unknown scope '{other}' (expected files, directories or desktop)"
            )),
        }
    }
}

/// One declared "open with" shortcut. The three flags record where the user
/// wants the entry; the registry is only touched when the entry is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub name: String, // Display name shown in the menu
    pub root: String, // Registry key name, unique across entries
    pub path: String, // Absolute path of the target executable
    #[serde(default)]
    pub for_files: bool,
    #[serde(default)]
    pub for_directories: bool,
    #[serde(default)]
    pub for_desktop: bool,
}

impl MenuEntry {
    pub fn new(name: &str, root: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            root: root.to_string(),
            path: path.to_string(),
            for_files: false,
            for_directories: false,
            for_desktop: false,
        }
    }

    pub fn scope(&self, scope: Scope) -> bool {
        match scope {
            Scope::Files => self.for_files,
            Scope::Directories => self.for_directories,
            Scope::Desktop => self.for_desktop,
        }
    }

    pub fn set_scope(&mut self, scope: Scope, on: bool) {
        match scope {
            Scope::Files => self.for_files = on,
            Scope::Directories => self.for_directories = on,
            Scope::Desktop => self.for_desktop = on,
        }
    }

    /// Scopes this entry should occupy once applied.
    pub fn desired_scopes(&self) -> Vec<Scope> {
        Scope::ALL.into_iter().filter(|s| self.scope(*s)).collect()
    }

    /// An entry is enabled when at least one scope is requested.
    pub fn enabled(&self) -> bool {
        self.for_files || self.for_directories || self.for_desktop
    }

    pub fn status_text(&self) -> &'static str {
        if self.enabled() { "enabled" } else { "disabled" }
    }

    pub fn scope_text(&self) -> String {
        let labels: Vec<&str> = self.desired_scopes().iter().map(|s| s.label()).collect();
        if labels.is_empty() {
            "none".to_string()
        } else {
            labels.join(", ")
        }
    }

    /// Command line stored under the scope's command key. The target and the
    /// Explorer placeholder are both quoted so paths with spaces survive.
    pub fn command_value(&self, scope: Scope) -> String {
        format!("\"{}\" \"{}\"", self.path, scope.invocation_token())
    }

    pub fn icon_value(&self) -> String {
        format!("\"{}\"", self.path)
    }
}

/// On-disk shape of the shortcut list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub configs: Vec<MenuEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_key_paths() {
        assert_eq!(Scope::Files.key_path("vscode"), r"*\shell\vscode");
        assert_eq!(Scope::Directories.key_path("vscode"), r"Directory\shell\vscode");
        assert_eq!(
            Scope::Desktop.key_path("vscode"),
            r"Directory\Background\shell\vscode"
        );
        assert_eq!(
            Scope::Desktop.command_path("vscode"),
            r"Directory\Background\shell\vscode\command"
        );
    }

    #[test]
    fn invocation_tokens_per_scope() {
        let entry = MenuEntry::new("VSCode", "vscode", r"C:\Tools\Code.exe");
        assert!(entry.command_value(Scope::Files).ends_with("\"%1\""));
        assert!(entry.command_value(Scope::Directories).ends_with("\"%V\""));
        assert!(entry.command_value(Scope::Desktop).ends_with("\"%V\""));
        assert_eq!(
            entry.command_value(Scope::Files),
            r#""C:\Tools\Code.exe" "%1""#
        );
    }

    #[test]
    fn enabled_follows_scope_flags() {
        let mut entry = MenuEntry::new("VSCode", "vscode", r"C:\Tools\Code.exe");
        assert!(!entry.enabled());
        assert_eq!(entry.status_text(), "disabled");
        assert_eq!(entry.scope_text(), "none");

        entry.set_scope(Scope::Desktop, true);
        assert!(entry.enabled());
        assert_eq!(entry.desired_scopes(), vec![Scope::Desktop]);

        entry.set_scope(Scope::Files, true);
        assert_eq!(entry.scope_text(), "files, desktop");
    }

    #[test]
    fn scope_parsing_accepts_labels_only() {
        assert_eq!("files".parse::<Scope>().unwrap(), Scope::Files);
        assert_eq!(" Desktop ".parse::<Scope>().unwrap(), Scope::Desktop);
        assert!("background".parse::<Scope>().is_err());
    }

    #[test]
    fn unknown_json_fields_are_ignored() {
        // Older releases stored a single `enabled` flag and only two scopes.
        let legacy = r#"{
            "configs": [
                {"name": "VSCode", "root": "vscode", "path": "C:\\Code.exe",
                 "enabled": true, "for_files": true}
            ]
        }"#;
        let file: ConfigFile = serde_json::from_str(legacy).unwrap();
        assert_eq!(file.configs.len(), 1);
        let entry = &file.configs[0];
        assert!(entry.for_files);
        assert!(!entry.for_desktop);
    }
}
