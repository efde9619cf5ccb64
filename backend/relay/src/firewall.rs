//! Inbound firewall allowance for the relay port.
//!
//! Best effort: every path ends in a [`FirewallOutcome`] and none of them
//! stops the server from trying to bind.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Stable rule name so a changed port replaces the old rule.
pub const FIREWALL_RULE_NAME: &str = "VisionGrab Relay Server";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallOutcome {
    AlreadyPresent,
    Provisioned,
    Skipped(String),
    Failed(String),
}

#[async_trait]
pub trait FirewallProvisioner: Send + Sync {
    async fn ensure_rule(&self, port: u16) -> FirewallOutcome;
}

/// Port text accepted for firewall provisioning: an integer in `1..=65535`.
pub fn validate_port(raw: &str) -> Option<u16> {
    visiongrab_config::parse_port(raw)
}

/// What `netsh advfirewall firewall show rule` says about our rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Missing,
    /// Present with the wanted port.
    Matching,
    /// Present with some other port.
    Stale,
}

pub fn rule_status(show_output: &str, rule_name: &str, port: u16) -> RuleStatus {
    if !show_output.contains(rule_name) {
        return RuleStatus::Missing;
    }
    let wanted = port.to_string();
    let port_matches = show_output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("LocalPort:"))
        .any(|value| value.trim() == wanted);
    if port_matches {
        RuleStatus::Matching
    } else {
        RuleStatus::Stale
    }
}

/// Result of one `netsh` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetshOutput {
    pub success: bool,
    pub stdout: String,
    /// Exit status as text, for error messages.
    pub status: String,
}

/// Runs `netsh` with the given arguments.
#[async_trait]
pub trait NetshRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<NetshOutput, String>;
}

/// Spawns the real `netsh.exe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetsh;

#[async_trait]
impl NetshRunner for SystemNetsh {
    async fn run(&self, args: &[String]) -> Result<NetshOutput, String> {
        let mut cmd = Command::new("netsh");
        cmd.args(args);
        #[cfg(target_os = "windows")]
        {
            cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to run netsh: {e}"))?;
        Ok(NetshOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status.to_string(),
        })
    }
}

/// Windows Defender Firewall via `netsh`. Needs an elevated process.
#[derive(Clone)]
pub struct NetshFirewall {
    runner: Arc<dyn NetshRunner>,
}

impl Default for NetshFirewall {
    fn default() -> Self {
        Self::with_runner(Arc::new(SystemNetsh))
    }
}

impl NetshFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(runner: Arc<dyn NetshRunner>) -> Self {
        Self { runner }
    }

    fn rule_args(verb: &str, name_arg: &str) -> Vec<String> {
        vec![
            "advfirewall".into(),
            "firewall".into(),
            verb.into(),
            "rule".into(),
            name_arg.into(),
        ]
    }

    /// Show the rule, delete it if it names another port, then add it.
    async fn provision(&self, port: u16) -> FirewallOutcome {
        let name_arg = format!("name={FIREWALL_RULE_NAME}");

        // `show` exits non-zero when no rule matches; only the text matters.
        let show = match self.runner.run(&Self::rule_args("show", &name_arg)).await {
            Ok(output) => output.stdout,
            Err(e) => return FirewallOutcome::Failed(e),
        };

        match rule_status(&show, FIREWALL_RULE_NAME, port) {
            RuleStatus::Matching => return FirewallOutcome::AlreadyPresent,
            RuleStatus::Stale => {
                debug!(port, "Replacing firewall rule for old port");
                if let Err(e) = self.runner.run(&Self::rule_args("delete", &name_arg)).await {
                    return FirewallOutcome::Failed(e);
                }
            }
            RuleStatus::Missing => {}
        }

        let mut add = Self::rule_args("add", &name_arg);
        add.extend([
            "dir=in".into(),
            "action=allow".into(),
            "protocol=TCP".into(),
            format!("localport={port}"),
        ]);

        match self.runner.run(&add).await {
            Ok(output) if output.success => FirewallOutcome::Provisioned,
            Ok(output) => {
                // netsh reports errors on stdout.
                let text = output.stdout.trim().to_string();
                FirewallOutcome::Failed(if text.is_empty() {
                    format!("netsh exited with {}", output.status)
                } else {
                    text
                })
            }
            Err(e) => FirewallOutcome::Failed(e),
        }
    }
}

#[async_trait]
impl FirewallProvisioner for NetshFirewall {
    async fn ensure_rule(&self, port: u16) -> FirewallOutcome {
        if !cfg!(target_os = "windows") {
            return FirewallOutcome::Skipped("no firewall integration on this platform".into());
        }
        let outcome = self.provision(port).await;
        match &outcome {
            FirewallOutcome::Failed(reason) => {
                warn!(port, reason = %reason, "Could not add firewall rule")
            }
            other => info!(port, outcome = ?other, "Firewall rule checked"),
        }
        outcome
    }
}

/// Never touches the firewall.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFirewall;

#[async_trait]
impl FirewallProvisioner for NoFirewall {
    async fn ensure_rule(&self, _port: u16) -> FirewallOutcome {
        FirewallOutcome::Skipped("firewall provisioning disabled".into())
    }
}
