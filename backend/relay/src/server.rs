//! Relay Server lifecycle.
//!
//! Stopped → Starting → Listening → Stopped. The listener slot is guarded by
//! an async mutex held through `start()`, so racing starts bind once.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use visiongrab_config::SharedSettings;
use visiongrab_core::{ResultSink, StatusSink};
use visiongrab_providers::BackendRegistry;

use crate::error::RelayError;
use crate::firewall::{FirewallOutcome, FirewallProvisioner, validate_port};
use crate::handlers::{RelayState, router};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayServerState {
    Stopped,
    Starting,
    Listening(SocketAddr),
}

struct Listening {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    accept_loop: JoinHandle<()>,
}

pub struct RelayServer {
    state: RelayState,
    firewall: Arc<dyn FirewallProvisioner>,
    slot: Mutex<Option<Listening>>,
    phase: watch::Sender<RelayServerState>,
}

impl RelayServer {
    pub fn new(
        registry: Arc<BackendRegistry>,
        settings: SharedSettings,
        results: Arc<dyn ResultSink>,
        status: Arc<dyn StatusSink>,
        firewall: Arc<dyn FirewallProvisioner>,
    ) -> Self {
        let (phase, _) = watch::channel(RelayServerState::Stopped);
        Self {
            state: RelayState {
                registry,
                settings,
                results,
                status,
            },
            firewall,
            slot: Mutex::new(None),
            phase,
        }
    }

    pub fn state(&self) -> RelayServerState {
        *self.phase.borrow()
    }

    /// Bind `0.0.0.0:<port>` and serve. Returns the bound address; a no-op if already listening.
    ///
    /// Port `0` binds an ephemeral port and skips firewall provisioning.
    pub async fn start(&self, port: &str) -> Result<SocketAddr, RelayError> {
        let mut slot = self.slot.lock().await;
        if let Some(listening) = slot.as_ref() {
            return Ok(listening.addr);
        }
        self.phase.send_replace(RelayServerState::Starting);

        match self.bind(port).await {
            Ok(listener) => {
                let addr = listener
                    .local_addr()
                    .map_err(|source| self.fail(RelayError::Bind { port: 0, source }))?;
                let (shutdown, rx) = oneshot::channel::<()>();
                let app = router(self.state.clone())
                    .into_make_service_with_connect_info::<SocketAddr>();

                let accept_loop = tokio::spawn(async move {
                    let result = axum::serve(listener, app)
                        .with_graceful_shutdown(async {
                            let _ = rx.await;
                        })
                        .await;
                    if let Err(e) = result {
                        error!(error = %e, "Relay accept loop ended with error");
                    }
                });

                *slot = Some(Listening {
                    addr,
                    shutdown,
                    accept_loop,
                });
                self.phase.send_replace(RelayServerState::Listening(addr));
                info!(addr = %addr, "Relay server listening");
                self.state
                    .status
                    .update(&format!("Relay Server: Running on Port {}", addr.port()));
                Ok(addr)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Text that is not a `u16` fails as `InvalidPort` without a bind attempt;
    /// the caller sees the same failure status and Stopped state a refused
    /// bind produces. Valid numbers outside 1-65535 (only `0`) skip the
    /// firewall and still bind.
    async fn bind(&self, port: &str) -> Result<TcpListener, RelayError> {
        let port_number: u16 = port
            .trim()
            .parse()
            .map_err(|_| RelayError::InvalidPort(port.to_string()))?;

        match validate_port(port) {
            Some(valid) => {
                if let FirewallOutcome::Failed(reason) = self.firewall.ensure_rule(valid).await {
                    warn!(port = valid, reason = %reason, "Continuing without firewall rule");
                }
            }
            None => info!(port = %port, "Skipping firewall provisioning"),
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], port_number));
        TcpListener::bind(addr).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::PermissionDenied {
                RelayError::PermissionDenied { port: port_number }
            } else {
                RelayError::Bind {
                    port: port_number,
                    source,
                }
            }
        })
    }

    fn fail(&self, err: RelayError) -> RelayError {
        error!(error = %err, "Relay server failed to start");
        self.phase.send_replace(RelayServerState::Stopped);
        self.state
            .status
            .update(&format!("Relay Server failed to start: {err}"));
        err
    }

    /// Stop accepting connections. In-flight requests are allowed to finish.
    ///
    /// Returns once the listening socket is closed, so the port can be bound
    /// again straight away.
    pub async fn stop(&self) {
        if let Some(listening) = self.slot.lock().await.take() {
            // The accept loop may already be gone.
            let _ = listening.shutdown.send(());
            // Connections run on their own tasks and drain after the signal
            // above; cancelling the accept loop drops the listener now.
            listening.accept_loop.abort();
            let _ = listening.accept_loop.await;
            info!(addr = %listening.addr, "Relay server stopped");
        }
        self.phase.send_replace(RelayServerState::Stopped);
        self.state.status.update("Relay Server: Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{LIVENESS_BODY, RELAY_RESULT_LABEL};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};
    use visiongrab_config::{AppSettings, shared};
    use visiongrab_core::{Backend, BackendError, BackendKind, ProcessingJob, ProcessingResult};
    use visiongrab_engine::{EngineManager, ProcessLauncher};
    use visiongrab_providers::StaticBackend;

    #[derive(Default)]
    struct Recorder {
        statuses: StdMutex<Vec<String>>,
        results: StdMutex<Vec<ProcessingResult>>,
    }

    impl StatusSink for Recorder {
        fn update(&self, status: &str) {
            self.statuses.lock().unwrap().push(status.to_string());
        }
    }

    impl ResultSink for Recorder {
        fn deliver(&self, result: &ProcessingResult) {
            self.results.lock().unwrap().push(result.clone());
        }
    }

    #[derive(Default)]
    struct FakeFirewall(StdMutex<Vec<u16>>);

    #[async_trait]
    impl FirewallProvisioner for FakeFirewall {
        async fn ensure_rule(&self, port: u16) -> FirewallOutcome {
            self.0.lock().unwrap().push(port);
            FirewallOutcome::Failed("not elevated".into())
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl Backend for PanickingBackend {
        fn name(&self) -> &str {
            "Llama"
        }
        async fn process(&self, _job: &ProcessingJob) -> Result<String, BackendError> {
            panic!("engine exploded");
        }
    }

    struct Harness {
        server: RelayServer,
        recorder: Arc<Recorder>,
        firewall: Arc<FakeFirewall>,
        settings: SharedSettings,
    }

    fn harness(local: Arc<dyn Backend>) -> Harness {
        let settings = shared(AppSettings::default());
        let recorder = Arc::new(Recorder::default());
        let engine = Arc::new(EngineManager::new(
            settings.clone(),
            Arc::new(ProcessLauncher),
            recorder.clone(),
        ));
        let registry = Arc::new(
            BackendRegistry::new(settings.clone(), engine).with_backend(BackendKind::Local, local),
        );
        let firewall = Arc::new(FakeFirewall::default());
        let server = RelayServer::new(
            registry,
            settings.clone(),
            recorder.clone(),
            recorder.clone(),
            firewall.clone(),
        );
        Harness {
            server,
            recorder,
            firewall,
            settings,
        }
    }

    fn url(addr: SocketAddr, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", addr.port(), path)
    }

    #[tokio::test]
    async fn test_get_any_path_is_liveness() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let addr = h.server.start("0").await.unwrap();
        let client = reqwest::Client::new();

        for path in ["/", "/anything", "/process"] {
            let resp = client.get(url(addr, path)).send().await.unwrap();
            assert_eq!(resp.status(), 200);
            assert!(
                resp.headers()["content-type"]
                    .to_str()
                    .unwrap()
                    .starts_with("text/plain")
            );
            assert_eq!(resp.text().await.unwrap(), LIVENESS_BODY);
        }
        h.server.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_requests_are_400() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let addr = h.server.start("0").await.unwrap();
        let client = reqwest::Client::new();

        for body in ["", "   ", "{}", r#"{"image": null}"#, "not json", r#"{"prompt":"hi"}"#] {
            let resp = client
                .post(url(addr, "/process"))
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "body {body:?}");
        }
        assert!(h.recorder.results.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_routes_are_404() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let addr = h.server.start("0").await.unwrap();
        let client = reqwest::Client::new();

        let resp = client.post(url(addr, "/other")).body("{}").send().await.unwrap();
        assert_eq!(resp.status(), 404);
        let resp = client.put(url(addr, "/process")).body("{}").send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_process_returns_text_and_records_result() {
        let backend = Arc::new(StaticBackend::new("Llama").with_response("<p>x</p>"));
        let h = harness(backend.clone());
        let addr = h.server.start("0").await.unwrap();

        let resp = reqwest::Client::new()
            .post(url(addr, "/process"))
            .json(&serde_json::json!({"image": "iVBORw0KGgo=", "prompt": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "<p>x</p>");

        let results = h.recorder.results.lock().unwrap().clone();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "<p>x</p>");
        assert_eq!(results[0].prompt, "hi");
        assert_eq!(results[0].label, RELAY_RESULT_LABEL);
        assert_eq!(backend.last_job().unwrap().image, "iVBORw0KGgo=");

        let statuses = h.recorder.statuses.lock().unwrap().clone();
        assert!(
            statuses
                .iter()
                .any(|s| s.starts_with("Relay Server: Processing request from 127.0.0.1"))
        );
    }

    #[tokio::test]
    async fn test_display_results_off_skips_sink() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        h.settings.write().await.relay.display_results = false;
        let addr = h.server.start("0").await.unwrap();

        let resp = reqwest::Client::new()
            .post(url(addr, "/process"))
            .json(&serde_json::json!({"image": "AAAA"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(h.recorder.results.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_500() {
        let h = harness(Arc::new(StaticBackend::new("Llama").with_failure("engine offline")));
        let addr = h.server.start("0").await.unwrap();

        let resp = reqwest::Client::new()
            .post(url(addr, "/process"))
            .json(&serde_json::json!({"image": "AAAA", "prompt": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body = resp.text().await.unwrap();
        assert!(body.starts_with("Server Error: "), "{body}");
        assert!(body.contains("engine offline"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_500_and_server_survives() {
        let h = harness(Arc::new(PanickingBackend));
        let addr = h.server.start("0").await.unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(url(addr, "/process"))
            .json(&serde_json::json!({"image": "AAAA"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert!(resp.text().await.unwrap().contains("engine exploded"));

        let resp = client.get(url(addr, "/")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_concurrent_requests_overlap() {
        let delay = Duration::from_millis(400);
        let h = harness(Arc::new(StaticBackend::new("Llama").with_delay(delay)));
        let addr = h.server.start("0").await.unwrap();
        let client = reqwest::Client::new();

        let started = Instant::now();
        let requests = (0..8).map(|i| {
            let client = client.clone();
            async move {
                client
                    .post(url(addr, "/process"))
                    .json(&serde_json::json!({"image": "AAAA", "prompt": format!("job {i}")}))
                    .send()
                    .await
                    .unwrap()
                    .status()
            }
        });
        let statuses = spawn_all(requests).await;
        assert!(statuses.iter().all(|s| *s == 200));
        assert!(started.elapsed() < delay * 3, "took {:?}", started.elapsed());
        assert_eq!(h.recorder.results.lock().unwrap().len(), 8);
    }

    async fn spawn_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let first = h.server.start("0").await.unwrap();
        let second = h.server.start("0").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.server.state(), RelayServerState::Listening(first));

        let running = h
            .recorder
            .statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.starts_with("Relay Server: Running on Port"))
            .count();
        assert_eq!(running, 1);
    }

    #[tokio::test]
    async fn test_stop_when_never_started() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        h.server.stop().await;
        assert_eq!(h.server.state(), RelayServerState::Stopped);
        assert_eq!(
            h.recorder.statuses.lock().unwrap().last().map(String::as_str),
            Some("Relay Server: Stopped")
        );
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let addr = h.server.start("0").await.unwrap();
        h.server.stop().await;
        assert_eq!(h.server.state(), RelayServerState::Stopped);

        let result = reqwest::Client::new()
            .get(url(addr, "/"))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_firewall_skipped_for_ephemeral_port() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        h.server.start("0").await.unwrap();
        assert!(h.firewall.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_firewall_failure_does_not_block_start() {
        let probe = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let addr = h.server.start(&port.to_string()).await.unwrap();
        assert_eq!(addr.port(), port);
        assert_eq!(*h.firewall.0.lock().unwrap(), vec![port]);
    }

    #[tokio::test]
    async fn test_invalid_port_fails_and_stays_stopped() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        for port in ["eighty", "70000", "-1"] {
            let err = h.server.start(port).await.unwrap_err();
            assert!(matches!(err, RelayError::InvalidPort(_)), "{port}: {err}");
            assert_eq!(h.server.state(), RelayServerState::Stopped);
            let last = h.recorder.statuses.lock().unwrap().last().cloned().unwrap();
            assert!(last.starts_with("Relay Server failed to start"));
        }
        assert!(h.firewall.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restart_on_same_port() {
        let h = harness(Arc::new(StaticBackend::new("Llama").with_response("ok")));
        let port = h.server.start("0").await.unwrap().port().to_string();
        h.server.stop().await;

        // Each round gets a fresh connection to the new listener.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap();
        for _ in 0..20 {
            let addr = h.server.start(&port).await.unwrap();
            let resp = client.get(url(addr, "/")).send().await.unwrap();
            assert_eq!(resp.status(), 200);
            h.server.stop().await;
        }
        assert_eq!(h.server.state(), RelayServerState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_restart_on_same_port_multi_thread() {
        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let port = h.server.start("0").await.unwrap().port().to_string();
        for _ in 0..20 {
            h.server.stop().await;
            h.server.start(&port).await.unwrap();
        }
        h.server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_request_finish() {
        let backend = StaticBackend::new("Llama")
            .with_response("slow text")
            .with_delay(Duration::from_millis(300));
        let h = harness(Arc::new(backend));
        let addr = h.server.start("0").await.unwrap();

        let request = tokio::spawn(async move {
            reqwest::Client::new()
                .post(url(addr, "/process"))
                .body(r#"{"image":"aGVsbG8="}"#)
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.server.stop().await;

        assert_eq!(request.await.unwrap(), "slow text");
    }

    #[tokio::test]
    async fn test_port_in_use_is_bind_error() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let h = harness(Arc::new(StaticBackend::new("Llama")));
        let err = h.server.start(&port.to_string()).await.unwrap_err();
        assert!(matches!(err, RelayError::Bind { .. }));
        assert_eq!(h.server.state(), RelayServerState::Stopped);
        let last = h.recorder.statuses.lock().unwrap().last().cloned().unwrap();
        assert!(last.starts_with("Relay Server failed to start"));
    }
}
