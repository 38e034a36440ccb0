//! `sysinfo` backed process enumeration

use sysinfo::{Pid, ProcessRefreshKind, System, Uid, UpdateKind};

use super::{ProcessSnapshot, ProcessSource};
use crate::error::DetectionError;

/// Lists processes of the user running this program
pub struct SysinfoProcessSource {
    system: System,
    user: Option<Uid>,
}

impl SysinfoProcessSource {
    pub fn new() -> Result<Self, DetectionError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(DetectionError::UnsupportedPlatform);
        }

        let mut system = System::new();
        system.refresh_processes_specifics(refresh_kind());
        let user = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| system.process(pid))
            .and_then(|process| process.user_id().cloned());
        if user.is_none() {
            tracing::warn!("Could not determine the current user, scanning all processes");
        }

        Ok(Self { system, user })
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cmd(UpdateKind::OnlyIfNotSet)
        .with_exe(UpdateKind::OnlyIfNotSet)
        .with_user(UpdateKind::OnlyIfNotSet)
}

impl ProcessSource for SysinfoProcessSource {
    fn snapshot(&mut self) -> Result<Vec<ProcessSnapshot>, DetectionError> {
        self.system.refresh_processes_specifics(refresh_kind());

        let mut processes: Vec<(Pid, ProcessSnapshot)> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| self.user.is_none() || process.user_id() == self.user.as_ref())
            .filter_map(|(pid, process)| {
                // argv[0] is only useful when it carries a path
                let command = process
                    .cmd()
                    .first()
                    .filter(|first| first.contains(['/', '\\']))
                    .cloned()
                    .or_else(|| process.exe().map(|exe| exe.to_string_lossy().into_owned()))?;
                ProcessSnapshot::from_command(pid.as_u32(), &command).map(|snap| (*pid, snap))
            })
            .collect();

        if processes.is_empty() && self.system.processes().is_empty() {
            return Err(DetectionError::Enumeration("no processes visible".to_string()));
        }

        processes.sort_by_key(|(pid, _)| *pid);
        Ok(processes.into_iter().map(|(_, snap)| snap).collect())
    }
}
