//! Spawning and terminating the engine process.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessesToUpdate, System};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// A launched engine process.
#[async_trait]
pub trait EngineHandle: Send {
    fn id(&self) -> Option<u32>;

    /// True once the process has exited for any reason.
    fn has_exited(&mut self) -> bool;

    /// Ask the process to exit, then kill it if it is still alive after `grace`.
    async fn terminate(&mut self, grace: Duration) -> Result<(), EngineError>;
}

/// Creates engine processes.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Kill engine instances left behind by an unclean shutdown. Best effort.
    async fn kill_stray(&self, config: &EngineConfig);

    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn EngineHandle>, EngineError>;
}

/// Launches the real llama-server executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn kill_stray(&self, config: &EngineConfig) {
        let name = config.executable_name().to_string();
        let target = name.clone();
        match tokio::task::spawn_blocking(move || kill_by_image_name(&target)).await {
            Ok(0) => debug!(executable = %name, "No stray engine processes"),
            Ok(killed) => {
                info!(executable = %name, killed, "Killed stray engine processes");
                // Give the OS a moment to release the port.
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => debug!(executable = %name, error = %e, "Stray process cleanup failed"),
        }
    }

    async fn launch(&self, config: &EngineConfig) -> Result<Box<dyn EngineHandle>, EngineError> {
        let args = config.args();
        info!(executable = %config.executable, args = ?args, "Launching engine");

        let mut cmd = Command::new(&config.executable);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        }

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            executable: config.executable.clone(),
            source,
        })?;

        forward_output(&mut child);
        Ok(Box::new(ProcessHandle { child }))
    }
}

/// Kill every other process whose image name is exactly `name`.
fn kill_by_image_name(name: &str) -> usize {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let own_pid = sysinfo::get_current_pid().ok();

    sys.processes()
        .iter()
        .filter(|(pid, _)| Some(**pid) != own_pid)
        .filter(|(_, process)| is_engine_image(process.name(), process.exe(), name))
        .filter(|(pid, process)| {
            let killed = process.kill();
            if killed {
                debug!(pid = pid.as_u32(), "Killed stray engine");
            }
            killed
        })
        .count()
}

/// Whole-name comparison against the process name or, since Linux truncates
/// process names to 15 bytes, the file name of its executable. A `.exe`
/// suffix is ignored.
fn is_engine_image(name: &OsStr, exe: Option<&Path>, executable_name: &str) -> bool {
    let target = image_stem(executable_name);
    let matches = |candidate: &OsStr| {
        candidate
            .to_str()
            .map(|c| same_image(image_stem(c), target))
            .unwrap_or(false)
    };
    matches(name) || exe.and_then(Path::file_name).map(matches).unwrap_or(false)
}

fn image_stem(name: &str) -> &str {
    match name.len().checked_sub(4) {
        Some(i) if i > 0 && name.get(i..).is_some_and(|ext| ext.eq_ignore_ascii_case(".exe")) => {
            &name[..i]
        }
        _ => name,
    }
}

#[cfg(target_os = "windows")]
fn same_image(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(target_os = "windows"))]
fn same_image(a: &str, b: &str) -> bool {
    a == b
}

/// Pipe engine stdout/stderr into the log.
fn forward_output(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.is_empty() {
                    debug!(target: "engine", "{}", line);
                }
            }
        });
    }
    // llama-server logs almost everything to stderr.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains("error") || line.contains("failed") {
                    warn!(target: "engine", "{}", line);
                } else if !line.is_empty() {
                    debug!(target: "engine", "{}", line);
                }
            }
        });
    }
}

struct ProcessHandle {
    child: Child,
}

#[async_trait]
impl EngineHandle for ProcessHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), EngineError> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        if let Err(e) = graceful_kill_command(pid).output().await {
            debug!(pid, error = %e, "Graceful signal failed");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, %status, "Engine exited");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Terminate(e.to_string())),
            Err(_) => {
                warn!(pid, grace_ms = grace.as_millis() as u64, "Engine ignored shutdown request, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|e| EngineError::Terminate(e.to_string()))
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn graceful_kill_command(pid: u32) -> Command {
    let mut cmd = Command::new("kill");
    cmd.args(["-TERM", &pid.to_string()]);
    cmd
}

#[cfg(target_os = "windows")]
fn graceful_kill_command(pid: u32) -> Command {
    // Without /F taskkill asks the process tree to close.
    let mut cmd = Command::new("taskkill");
    cmd.args(["/pid", &pid.to_string(), "/T"]);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn config_for(executable: &str) -> EngineConfig {
        EngineConfig {
            executable: executable.to_string(),
            model: String::new(),
            mmproj: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8081,
            context_size: 2048,
            extra_args: Vec::new(),
        }
    }

    fn image(name: &str, exe: Option<&str>, target: &str) -> bool {
        is_engine_image(OsStr::new(name), exe.map(Path::new), target)
    }

    #[test]
    fn engine_image_requires_whole_name() {
        assert!(image("llama-server", None, "llama-server"));
        assert!(image("llama-server.exe", None, "llama-server.exe"));
        assert!(image("llama-server.exe", None, "llama-server"));
        assert!(!image("llama-server", None, "server"));
        assert!(!image("server", None, "llama-server"));
        assert!(!image("sh", Some("/bin/sh"), "llama-server"));
        assert!(!image("llama-server-wr", Some("/opt/llama-server-wrapper"), "llama-server"));
    }

    #[test]
    fn truncated_name_matches_through_executable() {
        assert!(image(
            "llama-server-cu",
            Some("/opt/llama/llama-server-cuda"),
            "llama-server-cuda"
        ));
        assert!(!image("llama-server-cu", None, "llama-server-cuda"));
    }

    #[test]
    fn exe_suffix_alone_is_not_stripped() {
        assert_eq!(image_stem(".exe"), ".exe");
        assert_eq!(image_stem("a.EXE"), "a");
        assert_eq!(image_stem("sh"), "sh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_stray_spares_processes_that_mention_the_name() {
        let mut bystander = Command::new("sh")
            .args(["-c", "sleep 30; true", "notes-about-vg-test-engine"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        ProcessLauncher
            .kill_stray(&config_for("/opt/llama/vg-test-engine"))
            .await;

        assert!(matches!(bystander.try_wait(), Ok(None)));
        bystander.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_executable_is_spawn_error() {
        let err = ProcessLauncher
            .launch(&config_for("/nonexistent/llama-server"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_running_process() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut handle = ProcessHandle { child };

        assert!(handle.id().is_some());
        assert!(!handle.has_exited());
        handle.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(handle.has_exited());
    }
}
