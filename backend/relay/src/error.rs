use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("'{0}' is not a valid port")]
    InvalidPort(String),

    #[error(
        "access denied while binding port {port}. Try running VisionGrab as Administrator (elevated); listening on all network interfaces requires it"
    )]
    PermissionDenied { port: u16 },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
