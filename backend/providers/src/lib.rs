//! `visiongrab-providers` — the concrete backends and the registry that picks one.
//!
//! | Kind   | Backend                 | Talks to                          |
//! |--------|-------------------------|-----------------------------------|
//! | Local  | [`LocalEngineBackend`]  | managed llama-server on localhost |
//! | Cloud  | [`CloudBackend`]        | Gemini `generateContent`          |
//! | Remote | [`RemoteEngineBackend`] | llama-server at `remoteEngine.address` |
//! | Relay  | [`RelayClientBackend`]  | a peer's relay server             |

pub mod cloud;
pub mod engine_client;
pub mod local;
pub mod mock;
pub mod registry;
pub mod relay_client;
pub mod remote;

pub use cloud::CloudBackend;
pub use engine_client::EngineClient;
pub use local::LocalEngineBackend;
pub use mock::StaticBackend;
pub use registry::{resolve_kind, BackendRegistry, SelectedBackend};
pub use relay_client::RelayClientBackend;
pub use remote::RemoteEngineBackend;
