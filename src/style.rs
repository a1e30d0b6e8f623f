//! Win11 context-menu style switch. Explorer serves the compact one-level
//! menu by default; registering an empty InprocServer32 override under the
//! user's classes blocks the handler and brings the classic two-level menu
//! back. Explorer only picks the change up after a restart.

use std::fmt;
use std::io;
use std::time::Duration;

use log::warn;

use crate::error::{Error, Result, StoreAction, StoreFailure};
use crate::store::ScopeStore;
use crate::system::{OsRelease, Privilege, ShellRestart};

const OVERRIDE_BRANCH: &str = r"Software\Classes\CLSID\{86ca1aa0-34aa-4e8b-a509-50c905bae2a2}";
const OVERRIDE_KEY: &str =
    r"Software\Classes\CLSID\{86ca1aa0-34aa-4e8b-a509-50c905bae2a2}\InprocServer32";
const STYLE_PROBE_KEY: &str = r"Software\Classes\CLSID\__openwith_access_test__";

/// First Windows 11 build; older systems have no one-level menu to toggle.
const MIN_BUILD: u32 = 22000;

const RESTART_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuStyle {
    /// Windows 11 default, extra entries behind "Show more options".
    OneLevel,
    /// Classic menu with every entry on the first level.
    TwoLevel,
}

impl fmt::Display for MenuStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuStyle::OneLevel => f.write_str("one-level"),
            MenuStyle::TwoLevel => f.write_str("two-level"),
        }
    }
}

/// Outcome of a style change. A failed Explorer restart degrades the result
/// instead of rolling the registry back: the store is already correct, only
/// the display lags until the shell comes back.
#[derive(Debug, PartialEq, Eq)]
pub enum StyleTransition {
    AlreadySet,
    Applied,
    AppliedDisplayStale(String),
}

impl fmt::Display for StyleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleTransition::AlreadySet => f.write_str("already in the requested style"),
            StyleTransition::Applied => f.write_str("style changed, Explorer restarted"),
            StyleTransition::AppliedDisplayStale(reason) => write!(
                f,
                "style changed, but Explorer must be restarted by hand: {reason}"
            ),
        }
    }
}

pub struct StyleToggle<'a, S: ScopeStore> {
    store: &'a S,
    privilege: &'a dyn Privilege,
    os: &'a dyn OsRelease,
    shell: &'a dyn ShellRestart,
}

impl<'a, S: ScopeStore> StyleToggle<'a, S> {
    pub fn new(
        store: &'a S,
        privilege: &'a dyn Privilege,
        os: &'a dyn OsRelease,
        shell: &'a dyn ShellRestart,
    ) -> Self {
        Self { store, privilege, os, shell }
    }

    /// Current style, read straight from the override key.
    pub fn status(&self) -> MenuStyle {
        if self.store.exists(OVERRIDE_KEY) {
            MenuStyle::TwoLevel
        } else {
            MenuStyle::OneLevel
        }
    }

    /// Force the classic two-level menu by planting the empty override.
    pub fn to_two_level(&self) -> Result<StyleTransition> {
        self.ensure_allowed()?;
        if self.status() == MenuStyle::TwoLevel {
            return Ok(StyleTransition::AlreadySet);
        }
        self.store
            .create(OVERRIDE_KEY, &[("", "")])
            .map_err(|err| override_failure(StoreAction::Add, &err))?;
        Ok(self.restart_shell())
    }

    /// Return to the Windows 11 default by dropping the whole override branch.
    pub fn to_one_level(&self) -> Result<StyleTransition> {
        self.ensure_allowed()?;
        if self.status() == MenuStyle::OneLevel {
            return Ok(StyleTransition::AlreadySet);
        }
        self.store
            .delete_subtree(OVERRIDE_BRANCH)
            .map_err(|err| override_failure(StoreAction::Remove, &err))?;
        Ok(self.restart_shell())
    }

    fn ensure_allowed(&self) -> Result<()> {
        match self.os.build() {
            None => {
                return Err(Error::Incompatible(
                    "the context menu style can only be changed on Windows 11".to_string(),
                ));
            }
            Some(build) if build < MIN_BUILD => {
                return Err(Error::Incompatible(format!(
                    "the context menu style needs Windows 11 (build {MIN_BUILD} or newer), this system reports build {build}"
                )));
            }
            Some(_) => {}
        }
        if !self.privilege.is_elevated() {
            return Err(Error::Permission);
        }
        Ok(())
    }

    fn restart_shell(&self) -> StyleTransition {
        match self.shell.restart(RESTART_TIMEOUT) {
            Ok(()) => StyleTransition::Applied,
            Err(err) => {
                // The override is in place either way; only the running shell
                // still shows the old menu.
                warn!("shell restart failed after a style change: {err}");
                StyleTransition::AppliedDisplayStale(err.to_string())
            }
        }
    }

    /// Pre-flight check for UIs: can the style be changed here, and if not,
    /// why not.
    pub fn validate_compatibility(&self) -> (bool, String) {
        match self.os.build() {
            None => {
                return (
                    false,
                    "this system does not report a Windows build; Windows 11 is required".to_string(),
                );
            }
            Some(build) if build < MIN_BUILD => {
                return (
                    false,
                    format!(
                        "Windows 11 (build {MIN_BUILD} or newer) is required, this system reports build {build}"
                    ),
                );
            }
            Some(_) => {}
        }
        if !self.privilege.is_elevated() {
            return (
                false,
                "administrator privileges are required to change the context menu style".to_string(),
            );
        }
        (true, "the context menu style can be changed on this system".to_string())
    }

    pub fn status_description(&self) -> String {
        let supported = matches!(self.os.build(), Some(build) if build >= MIN_BUILD);
        if !supported {
            return "not available: this system predates the Windows 11 context menu".to_string();
        }
        match self.status() {
            MenuStyle::TwoLevel => "two-level menu forced (classic right-click menu)".to_string(),
            MenuStyle::OneLevel => "one-level menu active (Windows 11 default)".to_string(),
        }
    }

    /// Probe whether the override branch is writable. Diagnostic only.
    pub fn test_access(&self) -> bool {
        if self.store.create(STYLE_PROBE_KEY, &[("probe", "ok")]).is_err() {
            return false;
        }
        self.store.delete_subtree(STYLE_PROBE_KEY).is_ok()
    }
}

fn override_failure(action: StoreAction, err: &io::Error) -> Error {
    Error::Store(vec![StoreFailure {
        target: "context menu style override".to_string(),
        action,
        detail: err.to_string(),
    }])
}
