//! Unified error taxonomy for the imagegate service.
//!
//! Mirrors the shape of `ferroid-tonic-core::common::error::Error`: one
//! `#[non_exhaustive]` enum covering every recoverable/reportable case, with
//! transport-specific `From` conversions living on the server side (HTTP
//! status codes here, rather than `tonic::Status`).

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the imagegate service.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The client request was malformed or exceeded a validated bound.
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    /// The request is valid in isolation but exceeds the VRAM admission cap.
    #[error("request exceeds VRAM limits")]
    Admission,

    /// Failure during the pipeline invocation itself (not a per-step
    /// decode/encode failure, which is logged and the frame is dropped
    /// instead of erroring the whole request).
    #[error("generation failed: {reason}")]
    ModelInvocation { reason: String },

    /// Gallery file or JSON index I/O failed.
    #[error("gallery I/O error: {reason}")]
    GalleryIo { reason: String },

    /// The external prompt-rewrite LLM call failed. Never surfaced as an
    /// HTTP error: callers absorb this into a `success: false` response
    /// body and fall back to the original prompt text.
    #[error("external LLM call failed: {reason}")]
    ExternalLlm { reason: String },

    /// Internal channel send/receive failure (closed or full channel).
    #[error("channel error: {context}")]
    ChannelClosed { context: String },

    /// A request arrived while the service was shutting down.
    #[error("service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn model_invocation(reason: impl Into<String>) -> Self {
        Self::ModelInvocation {
            reason: reason.into(),
        }
    }

    pub fn gallery_io(reason: impl Into<String>) -> Self {
        Self::GalleryIo {
            reason: reason.into(),
        }
    }

    pub fn channel_closed(context: impl Into<String>) -> Self {
        Self::ChannelClosed {
            context: context.into(),
        }
    }

    pub fn external_llm(reason: impl Into<String>) -> Self {
        Self::ExternalLlm {
            reason: reason.into(),
        }
    }

    pub fn admission() -> Self {
        Self::Admission
    }

    pub fn service_shutdown() -> Self {
        Self::ServiceShutdown
    }
}
