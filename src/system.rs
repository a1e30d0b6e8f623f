//! Process-level surroundings: elevation state, the Windows build, and the
//! Explorer restart. Everything sits behind a trait so the provisioning and
//! style logic can run against stubs.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use sysinfo::{ProcessesToUpdate, System};

use crate::error::{Error, Result};

const SHELL_PROCESS: &str = "explorer.exe";
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Elevation state of this process, plus the escalation hatch.
pub trait Privilege {
    fn is_elevated(&self) -> bool;

    /// Launch a second, elevated copy of this executable. Returns whether the
    /// launch was accepted; the caller decides whether to exit.
    fn request_elevated_relaunch(&self) -> bool;
}

/// Windows build lookup, `None` anywhere the build cannot be determined.
pub trait OsRelease {
    fn build(&self) -> Option<u32>;
}

/// Restarting the shell so registry changes become visible.
pub trait ShellRestart {
    fn restart(&self, timeout: Duration) -> Result<()>;
}

pub struct OsPrivilege;

impl Privilege for OsPrivilege {
    fn is_elevated(&self) -> bool {
        elevated_now()
    }

    fn request_elevated_relaunch(&self) -> bool {
        let Ok(exe) = std::env::current_exe() else {
            warn!("cannot resolve the current executable for an elevated relaunch");
            return false;
        };
        spawn_elevated(&exe)
    }
}

#[cfg(windows)]
fn elevated_now() -> bool {
    use windows::Win32::UI::Shell::IsUserAnAdmin;

    unsafe { IsUserAnAdmin().as_bool() }
}

#[cfg(not(windows))]
fn elevated_now() -> bool {
    false
}

#[cfg(windows)]
fn spawn_elevated(exe: &std::path::Path) -> bool {
    use std::os::windows::ffi::OsStrExt;

    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Shell::ShellExecuteW;
    use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
    use windows::core::{PCWSTR, w};

    let path: Vec<u16> = exe.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
    let instance = unsafe {
        ShellExecuteW(
            HWND::default(),
            w!("runas"),
            PCWSTR(path.as_ptr()),
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // ShellExecute reports success with a value above 32.
    let accepted = instance.0 as isize > 32;
    if accepted {
        info!("elevated instance launched");
    } else {
        warn!("elevated relaunch was refused (code {})", instance.0 as isize);
    }
    accepted
}

#[cfg(not(windows))]
fn spawn_elevated(_exe: &std::path::Path) -> bool {
    false
}

pub struct WindowsRelease;

impl OsRelease for WindowsRelease {
    fn build(&self) -> Option<u32> {
        current_build()
    }
}

#[cfg(windows)]
fn current_build() -> Option<u32> {
    use winreg::RegKey;
    use winreg::enums::HKEY_LOCAL_MACHINE;

    let key = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey(r"SOFTWARE\Microsoft\Windows NT\CurrentVersion")
        .ok()?;
    let build: String = key.get_value("CurrentBuildNumber").ok()?;
    build.trim().parse().ok()
}

#[cfg(not(windows))]
fn current_build() -> Option<u32> {
    None
}

/// Kills every running Explorer instance, waits for each to go away and
/// starts a fresh one. Explorer respawns the taskbar and desktop on its own.
pub struct ExplorerRestart;

impl ShellRestart for ExplorerRestart {
    fn restart(&self, timeout: Duration) -> Result<()> {
        let mut system = System::new_all();
        let pids: Vec<_> = system
            .processes_by_exact_name(SHELL_PROCESS.as_ref())
            .map(|p| p.pid())
            .collect();

        info!("restarting {SHELL_PROCESS} ({} running)", pids.len());
        for pid in &pids {
            if let Some(process) = system.process(*pid) {
                if !process.kill() {
                    warn!("could not signal {SHELL_PROCESS} (pid {pid})");
                }
            }
        }

        // Wait for each instance to vanish before relaunching, so the new
        // shell does not race the dying ones.
        for pid in &pids {
            let deadline = Instant::now() + timeout;
            loop {
                system.refresh_processes(ProcessesToUpdate::Some(&[*pid]), true);
                if system.process(*pid).is_none() {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(Error::ShellRestart(format!(
                        "{SHELL_PROCESS} (pid {pid}) did not exit within {}s",
                        timeout.as_secs()
                    )));
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
        }

        Command::new(SHELL_PROCESS)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| Error::ShellRestart(format!("could not start {SHELL_PROCESS}: {err}")))?;
        Ok(())
    }
}
