mod config;
mod error;
mod model;
mod provision;
mod store;
mod style;
mod system;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::warn;

use crate::config::ConfigStore;
use crate::error::Error;
use crate::model::{MenuEntry, Scope};
use crate::provision::MenuProvisioner;
use crate::store::registry::SystemStore;
use crate::style::StyleToggle;
use crate::system::{ExplorerRestart, OsPrivilege, OsRelease, Privilege, WindowsRelease};

#[derive(Parser, Debug)]
#[command(author, version, about = "\"Open with\" shortcuts for the Explorer context menu", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show every declared shortcut with its live menu state
    List,
    /// Declare a new shortcut; the menu is only touched by `apply`
    Add {
        /// Display name shown in the context menu
        name: String,
        /// Absolute path of the program to launch
        #[arg(long)]
        path: String,
        /// Scopes to occupy, comma separated: files, directories, desktop
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
        /// Registry key name; derived from the name when omitted
        #[arg(long)]
        root: Option<String>,
    },
    /// Change fields of a declared shortcut
    Update {
        /// Registry key name of the shortcut to change
        root: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        path: Option<String>,
        /// Replacement scope set, comma separated; pass "" to clear all
        #[arg(long, value_delimiter = ',')]
        scopes: Option<Vec<String>>,
        /// Move the shortcut to a different registry key name
        #[arg(long)]
        new_root: Option<String>,
    },
    /// Reconcile a shortcut's declared scopes into the context menu
    Apply {
        /// Registry key name of the shortcut
        root: String,
    },
    /// Drop a shortcut, clearing its menu entries first
    Remove {
        /// Registry key name of the shortcut
        root: String,
    },
    /// Re-read the menu store and rewrite every declared flag from it
    Refresh,
    /// Inspect or switch the Windows 11 context menu style
    Style {
        #[command(subcommand)]
        command: StyleCmd,
    },
    /// Print elevation, compatibility and store diagnostics
    Status,
    /// Relaunch this program with administrator privileges
    Elevate,
}

#[derive(Subcommand, Debug)]
enum StyleCmd {
    /// Show the current menu style
    Status,
    /// Windows 11 default: compact menu with "Show more options"
    OneLevel,
    /// Classic menu with every entry on the first level
    TwoLevel,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(args.command) {
        if matches!(err.downcast_ref::<Error>(), Some(Error::Permission)) {
            eprintln!("run 'openwith elevate' to restart with administrator privileges");
        }
        return Err(err);
    }
    Ok(())
}

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::List => cmd_list(),
        Cmd::Add { name, path, scopes, root } => cmd_add(name, path, scopes, root),
        Cmd::Update { root, name, path, scopes, new_root } => {
            cmd_update(root, name, path, scopes, new_root)
        }
        Cmd::Apply { root } => cmd_apply(root),
        Cmd::Remove { root } => cmd_remove(root),
        Cmd::Refresh => cmd_refresh(),
        Cmd::Style { command } => cmd_style(command),
        Cmd::Status => cmd_status(),
        Cmd::Elevate => cmd_elevate(),
    }
}

fn cmd_list() -> Result<()> {
    let config = ConfigStore::open_default();
    let store = SystemStore::classes_root()?;
    let provisioner = MenuProvisioner::new(&store, &OsPrivilege);

    // Display ground truth; the file itself is only rewritten by `refresh`.
    let mut entries = config.entries().to_vec();
    provisioner.refresh(&mut entries);
    print_entries(&entries);
    Ok(())
}

fn cmd_add(name: String, path: String, scopes: Vec<String>, root: Option<String>) -> Result<()> {
    let mut config = ConfigStore::open_default();
    let scopes = parse_scopes(&scopes)?;

    let mut entry = MenuEntry::new(&name, root.as_deref().unwrap_or(""), &path);
    for scope in scopes {
        entry.set_scope(scope, true);
    }
    if let Some(path) = path_if_missing(&entry) {
        warn!("'{path}' does not exist yet; the menu entry will point at nothing until it does");
    }

    let index = config.add(entry)?;
    let entry = &config.entries()[index];
    println!("declared '{}' under the key '{}'", entry.name, entry.root);
    if entry.enabled() {
        println!("run 'openwith apply {}' to put it in the menu", entry.root);
    }
    Ok(())
}

fn cmd_update(
    root: String,
    name: Option<String>,
    path: Option<String>,
    scopes: Option<Vec<String>>,
    new_root: Option<String>,
) -> Result<()> {
    let mut config = ConfigStore::open_default();
    let index = find_entry(&config, &root)?;

    let mut entry = config.entries()[index].clone();
    if let Some(name) = name {
        entry.name = name;
    }
    if let Some(path) = path {
        entry.path = path;
    }
    if let Some(raw) = scopes {
        let scopes = parse_scopes(&raw)?;
        for scope in Scope::ALL {
            entry.set_scope(scope, scopes.contains(&scope));
        }
    }
    if let Some(new_root) = new_root {
        entry.root = new_root;
    }
    ConfigStore::validate(&entry)?;
    if !config.root_is_unique(&entry.root, Some(index)) {
        return Err(Error::Uniqueness(entry.root).into());
    }

    // A renamed key would orphan live menu entries under the old name, so
    // those are cleared before the declaration moves.
    if entry.root != root {
        match SystemStore::classes_root() {
            Ok(store) => {
                let provisioner = MenuProvisioner::new(&store, &OsPrivilege);
                if !provisioner.live_scopes(&root).is_empty() {
                    let old = config.entries()[index].clone();
                    provisioner.remove(&old)?;
                    println!("cleared menu entries under the old key '{root}'");
                }
            }
            Err(Error::Unsupported) => {}
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(path) = path_if_missing(&entry) {
        warn!("'{path}' does not exist yet; the menu entry will point at nothing until it does");
    }
    config.update(index, entry)?;
    let entry = &config.entries()[index];
    println!("updated '{}'", entry.root);
    if entry.enabled() {
        println!("run 'openwith apply {}' to push the change into the menu", entry.root);
    }
    Ok(())
}

fn cmd_apply(root: String) -> Result<()> {
    let mut config = ConfigStore::open_default();
    let index = find_entry(&config, &root)?;
    let entry = config.entries()[index].clone();
    if let Some(path) = path_if_missing(&entry) {
        warn!("'{path}' does not exist; the menu entry will point at nothing");
    }

    let store = SystemStore::classes_root()?;
    let provisioner = MenuProvisioner::new(&store, &OsPrivilege);
    let diff = provisioner.apply(&entry)?;
    println!("'{}': {diff}", entry.root);

    // Read the store back so the file records what actually happened.
    let mut entries = config.entries().to_vec();
    provisioner.refresh(&mut entries);
    config.replace_all(entries)?;
    Ok(())
}

fn cmd_remove(root: String) -> Result<()> {
    let mut config = ConfigStore::open_default();
    let index = find_entry(&config, &root)?;
    let entry = config.entries()[index].clone();

    // Clear live menu entries first; if that fails the declaration stays so
    // the removal can be retried.
    match SystemStore::classes_root() {
        Ok(store) => {
            let provisioner = MenuProvisioner::new(&store, &OsPrivilege);
            if !provisioner.live_scopes(&entry.root).is_empty() {
                let diff = provisioner.remove(&entry)?;
                println!("'{}': {diff}", entry.root);
            }
        }
        Err(Error::Unsupported) => {}
        Err(err) => return Err(err.into()),
    }

    config.remove(index)?;
    println!("dropped '{root}' from the shortcut list");
    Ok(())
}

fn cmd_refresh() -> Result<()> {
    let mut config = ConfigStore::open_default();
    let store = SystemStore::classes_root()?;
    let provisioner = MenuProvisioner::new(&store, &OsPrivilege);

    let mut entries = config.entries().to_vec();
    provisioner.refresh(&mut entries);
    config.replace_all(entries)?;
    println!("synchronized {} shortcuts with the menu store", config.entries().len());
    print_entries(config.entries());
    Ok(())
}

fn cmd_style(cmd: StyleCmd) -> Result<()> {
    let store = SystemStore::current_user()?;
    let toggle = StyleToggle::new(&store, &OsPrivilege, &WindowsRelease, &ExplorerRestart);

    match cmd {
        StyleCmd::Status => {
            println!("{}", toggle.status_description());
            let (ok, reason) = toggle.validate_compatibility();
            if !ok {
                println!("note: {reason}");
            }
        }
        StyleCmd::OneLevel => {
            let outcome = toggle.to_one_level()?;
            println!("{outcome}");
        }
        StyleCmd::TwoLevel => {
            let outcome = toggle.to_two_level()?;
            println!("{outcome}");
        }
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = ConfigStore::open_default();
    let privilege = OsPrivilege;
    let release = WindowsRelease;

    println!("shortcut file:  {}", config.file_path().display());
    let enabled = config.entries().iter().filter(|e| e.enabled()).count();
    println!("declared:       {} shortcuts ({enabled} enabled)", config.entries().len());
    println!("elevated:       {}", if privilege.is_elevated() { "yes" } else { "no" });
    match release.build() {
        Some(build) => println!("windows build:  {build}"),
        None => println!("windows build:  not detected"),
    }

    match SystemStore::classes_root() {
        Ok(store) => {
            let provisioner = MenuProvisioner::new(&store, &privilege);
            let access = if provisioner.test_access() { "writable" } else { "not writable" };
            println!("menu store:     {access}");
        }
        Err(_) => println!("menu store:     unavailable on this platform"),
    }

    match SystemStore::current_user() {
        Ok(store) => {
            let toggle = StyleToggle::new(&store, &privilege, &release, &ExplorerRestart);
            let access = if toggle.test_access() { "writable" } else { "not writable" };
            println!("style store:    {access}");
            println!("menu style:     {}", toggle.status_description());
            let (ok, reason) = toggle.validate_compatibility();
            println!("style toggle:   {}", if ok { "available".to_string() } else { reason });
        }
        Err(_) => println!("menu style:     unavailable on this platform"),
    }
    Ok(())
}

fn cmd_elevate() -> Result<()> {
    let privilege = OsPrivilege;
    if privilege.is_elevated() {
        println!("already running with administrator privileges");
        return Ok(());
    }
    if privilege.request_elevated_relaunch() {
        println!("elevated instance launched; this one can be closed");
        Ok(())
    } else {
        anyhow::bail!("the elevated relaunch was refused")
    }
}

fn find_entry(config: &ConfigStore, root: &str) -> Result<usize, Error> {
    config
        .find_index(root)
        .ok_or_else(|| Error::Validation(format!("no shortcut with the key '{root}'")))
}

fn parse_scopes(raw: &[String]) -> Result<Vec<Scope>, Error> {
    let mut scopes = Vec::new();
    for part in raw {
        if part.trim().is_empty() {
            continue;
        }
        let scope = part.parse::<Scope>().map_err(Error::Validation)?;
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    Ok(scopes)
}

fn path_if_missing(entry: &MenuEntry) -> Option<&str> {
    if config::target_exists(&entry.path) {
        None
    } else {
        Some(entry.path.as_str())
    }
}

fn print_entries(entries: &[MenuEntry]) {
    if entries.is_empty() {
        println!("no shortcuts declared");
        return;
    }
    let name_w = entries.iter().map(|e| e.name.len()).max().unwrap_or(0).max(4);
    let root_w = entries.iter().map(|e| e.root.len()).max().unwrap_or(0).max(4);
    println!("{:<name_w$}  {:<root_w$}  {:<8}  {:<28}  PATH", "NAME", "ROOT", "STATUS", "SCOPES");
    for entry in entries {
        let missing = if config::target_exists(&entry.path) { "" } else { "  (not found)" };
        println!(
            "{:<name_w$}  {:<root_w$}  {:<8}  {:<28}  {}{missing}",
            entry.name,
            entry.root,
            entry.status_text(),
            entry.scope_text(),
            entry.path,
        );
    }
}
