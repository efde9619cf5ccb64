//! Relay Server: lets peers on the network run jobs on this machine's local engine.

pub mod error;
pub mod firewall;
pub mod handlers;
pub mod server;

pub use error::RelayError;
pub use firewall::{
    rule_status, validate_port, FirewallOutcome, FirewallProvisioner, NetshFirewall, NetshOutput,
    NetshRunner, NoFirewall, RuleStatus, SystemNetsh, FIREWALL_RULE_NAME,
};
pub use server::{RelayServer, RelayServerState};
