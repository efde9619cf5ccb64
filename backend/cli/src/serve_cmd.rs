//! `visiongrab serve`: the long-running mode.
//!
//! Starts the engine if `localEngine.startOnStartup` is set, starts the relay
//! server when enabled, prints status transitions and shuts everything down
//! on Ctrl-C.

use std::future::Future;

use anyhow::Result;
use tracing::info;
use visiongrab_config::PortSetting;
use visiongrab_core::{compose_status, BackendKind};

use crate::app::App;
use crate::terminal_output::{note_error, note_success};

pub async fn run(app: &App, port: Option<String>, force_relay: bool) -> Result<()> {
    serve_until(app, port, force_relay, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received");
    })
    .await
}

pub async fn serve_until<F>(
    app: &App,
    port: Option<String>,
    force_relay: bool,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (relay_enabled, relay_port, active) = {
        let mut settings = app.settings.write().await;
        if let Some(port) = port {
            settings.relay.server_port = PortSetting::from(port.as_str());
        }
        (
            force_relay || settings.relay.server_enabled,
            settings.relay.server_port.to_string(),
            BackendKind::from_setting(&settings.default_backend),
        )
    };

    let mut updates = app.status.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            println!("{}", compose_status(active, &status));
        }
    });

    let startup = app.registry.start_default_services().await;

    if relay_enabled {
        // The relay serves with the local engine regardless of defaultBackend.
        if startup.is_none() {
            let _ = app.registry.start_relay_services();
        }
        match app.relay.start(&relay_port).await {
            Ok(addr) => note_success(&format!("Relay server listening on {addr}")),
            Err(e) => note_error(&format!("Relay server failed to start: {e}")),
        }
    } else {
        println!("{}", compose_status(active, ""));
    }

    shutdown.await;

    app.relay.stop().await;
    app.registry.stop_all().await;
    printer.abort();
    Ok(())
}
