//! `visiongrab status`: probe a relay server's liveness endpoint.

use std::time::Duration;

use anyhow::{bail, Result};
use visiongrab_relay::handlers::LIVENESS_BODY;

use crate::terminal_output::{note_success, note_warn};

#[derive(Debug, PartialEq, Eq)]
pub enum Liveness {
    Active,
    /// Something answered, but not a VisionGrab relay.
    Unexpected(String),
    Unreachable(String),
}

pub async fn run(address: &str) -> Result<()> {
    match probe(address).await {
        Liveness::Active => note_success(&format!("{address}: {LIVENESS_BODY}")),
        Liveness::Unexpected(body) => {
            note_warn(&format!("{address} answered, but not as a relay server: {body}"))
        }
        Liveness::Unreachable(reason) => bail!("{address} is not reachable: {reason}"),
    }
    Ok(())
}

pub async fn probe(address: &str) -> Liveness {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => return Liveness::Unreachable(e.to_string()),
    };

    let url = format!("{}/", address.trim_end_matches('/'));
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => return Liveness::Unreachable(e.to_string()),
    };
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() && body == LIVENESS_BODY {
        Liveness::Active
    } else {
        Liveness::Unexpected(format!("{status} {}", body.trim()))
    }
}
