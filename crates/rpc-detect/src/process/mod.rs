//! Process enumeration
//!
//! The detector sees processes only through `ProcessSource`, so tests can
//! script process lists.

mod sysinfo_source;

pub use sysinfo_source::SysinfoProcessSource;

use crate::error::DetectionError;

/// One process as seen on one poll tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// `/`-separated executable path, cut after `.exe` for Wine command lines
    pub executable_path: String,
    /// Last path component of `executable_path`
    pub executable_name: String,
}

impl ProcessSnapshot {
    /// Build from a command line or executable path
    ///
    /// Returns `None` for processes that can never be games: no path
    /// separator, system library locations, shells.
    pub fn from_command(pid: u32, command: &str) -> Option<Self> {
        let executable_path = executable_from_command(command)?;
        let executable_name = executable_path.rsplit('/').next().unwrap_or_default().to_string();
        if executable_name.is_empty() {
            return None;
        }
        Some(Self {
            pid,
            executable_path,
            executable_name,
        })
    }
}

// Prefixes of locations that never hold games
const SYSTEM_PREFIXES: &[&str] = &["/usr/lib", "/usr/libexec", "bash"];
const SYSTEM_FRAGMENTS: &[&str] = &[":/windows/", ":/program files/windowsapps/"];

/// Executable path from a command line
fn executable_from_command(command: &str) -> Option<String> {
    let command = command.replace('\0', " ");
    let mut path = command.trim();

    // Wine/Proton: everything after the first `.exe` is arguments
    if let Some(end) = path.to_ascii_lowercase().find(".exe") {
        path = &path[..end + ".exe".len()];
    }

    let path = path.replace('\\', "/");
    if !path.contains('/') {
        return None;
    }

    let lower = path.to_lowercase();
    if SYSTEM_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        || SYSTEM_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
    {
        return None;
    }

    Some(path)
}

/// Enumerates the current user's processes
pub trait ProcessSource: Send {
    /// All candidate processes, in enumeration order
    fn snapshot(&mut self) -> Result<Vec<ProcessSnapshot>, DetectionError>;
}

impl<F> ProcessSource for F
where
    F: FnMut() -> Result<Vec<ProcessSnapshot>, DetectionError> + Send,
{
    fn snapshot(&mut self) -> Result<Vec<ProcessSnapshot>, DetectionError> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths() {
        let snap = ProcessSnapshot::from_command(7, "/home/me/Games/native_game").unwrap();
        assert_eq!(snap.executable_path, "/home/me/Games/native_game");
        assert_eq!(snap.executable_name, "native_game");
    }

    #[test]
    fn test_wine_command_lines_are_cut_after_exe() {
        let snap = ProcessSnapshot::from_command(
            1,
            "Z:\\home\\me\\Games\\Hades\\x64\\Hades.exe -skipintro --windowed",
        )
        .unwrap();
        assert_eq!(snap.executable_path, "Z:/home/me/Games/Hades/x64/Hades.exe");
        assert_eq!(snap.executable_name, "Hades.exe");

        let snap = ProcessSnapshot::from_command(2, "C:\\Games\\Game.EXE\0--arg").unwrap();
        assert_eq!(snap.executable_path, "C:/Games/Game.EXE");
    }

    #[test]
    fn test_filters_non_games() {
        assert!(ProcessSnapshot::from_command(1, "bash").is_none());
        assert!(ProcessSnapshot::from_command(1, "sleep 10").is_none());
        assert!(ProcessSnapshot::from_command(1, "/usr/lib/systemd/systemd --user").is_none());
        assert!(ProcessSnapshot::from_command(1, "C:\\Windows\\explorer.exe").is_none());
        assert!(ProcessSnapshot::from_command(1, "C:\\Program Files\\WindowsApps\\app.exe").is_none());
        assert!(ProcessSnapshot::from_command(1, "").is_none());
        assert!(ProcessSnapshot::from_command(1, "/games/").is_none());
    }
}
