use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Pid, Signal, System};
use tracing::{info, warn};

use super::daemon_path::to_daemon_path;

/// Path of the daemon executable belonging to this cli.
pub fn daemon_executable() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

/// Processes running the daemon executable, except this process and its children.
fn find_daemons<'a>(system: &'a System, daemon: &Path) -> Result<Vec<&'a sysinfo::Process>> {
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get current pid: {e}"))?;
    Ok(system
        .processes()
        .iter()
        .filter(|(pid, _)| **pid != current_id)
        .filter(|(_, process)| !matches!(process.parent(), Some(p) if p == current_id))
        .filter(|(_, process)| process.exe().is_some_and(|v| v == daemon))
        .map(|(_, process)| process)
        .collect())
}

pub fn is_daemon_running(daemon: &Path) -> Result<bool> {
    let system = System::new_all();
    Ok(!find_daemons(&system, daemon)?.is_empty())
}

/// Sends `signal` to every running daemon. Returns the ids of the processes that received it.
pub fn signal_daemons(daemon: &Path, signal: Signal) -> Result<Vec<Pid>> {
    let system = System::new_all();
    let mut signaled = vec![];
    for process in find_daemons(&system, daemon)? {
        match process.kill_with(signal) {
            Some(true) => signaled.push(process.pid()),
            Some(false) => warn!("Failed to send {signal:?} to {}", process.pid()),
            None => warn!("{signal:?} isn't supported on this platform"),
        }
    }
    Ok(signaled)
}

/// Asks every running daemon to exit and waits for them. Daemons flush their records before
/// exiting, so the record files can be edited afterwards.
pub fn stop_daemons(daemon: &Path) -> Result<usize> {
    let system = System::new_all();
    let daemons = find_daemons(&system, daemon)?;
    for process in &daemons {
        // Forceful on platforms without SIGTERM
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
        info!("Stopped daemon {}", process.pid());
    }
    Ok(daemons.len())
}

/// Starts a detached daemon storing its data in `dir`.
pub fn spawn_daemon(daemon: &Path, dir: &Path) -> Result<()> {
    let mut command = std::process::Command::new(daemon);
    command.arg("--dir").arg(dir);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    info!("Spawning {daemon:?}");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    Ok(())
}

/// Intended for shutting down previous daemon and starting new one.
pub fn restart_daemon(dir: &Path) -> Result<()> {
    let daemon = daemon_executable()?;
    stop_daemons(&daemon)?;
    spawn_daemon(&daemon, dir)
}
