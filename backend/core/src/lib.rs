//! `visiongrab-core` — shared vocabulary for the VisionGrab runtime.
//!
//! Every processing engine (local llama-server, cloud API, remote engine,
//! relay peer) implements [`Backend`]; status and result consumers plug in
//! through [`StatusSink`] and [`ResultSink`].

pub mod error;
pub mod image;
pub mod status;
pub mod traits;
pub mod types;

pub use error::BackendError;
pub use image::{sniff_image_mime, DEFAULT_IMAGE_MIME};
pub use status::{compose_status, NullResultSink, ResultSink, StatusSink, WatchStatus};
pub use traits::Backend;
pub use types::{
    BackendKind, ParseBackendKindError, ProcessingJob, ProcessingResult, DEFAULT_OCR_PROMPT,
};
