//! Boundary traits for the platform's on-demand resource download
//! mechanism.
//!
//! The registry never talks to the platform directly; it goes through a
//! [`SessionFactory`] supplied by the embedding application. Each
//! [`DownloadSession`] is scoped to one tag and lives until `end()` is
//! called on it.

use std::sync::Arc;

/// Error codes reported by the platform download mechanism.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("not enough local storage to complete the download")]
    OutOfSpace,
    #[error("requested bundle exceeds the allowed size")]
    ExceededMaximumSize,
    #[error("tag does not name a known resource group")]
    InvalidTag,
    #[error("no session factory configured")]
    NotConfigured,
    #[error("{0}")]
    Other(String),
}

/// One active or completed download/cache-check operation for a tag.
///
/// `progress_fraction` is polled, not pushed, and some platforms report
/// 1.0 before the completion callback fires; treat the `begin` result as
/// the only completion signal.
#[async_trait::async_trait]
pub trait DownloadSession: Send + Sync {
    /// Non-destructive check for already-available content.
    async fn is_cached(&self) -> Result<bool, PortError>;

    /// Start or resume the fetch at the given loading priority in [0, 1].
    /// Completes once the platform reports an outcome; there is no
    /// coordinator-side deadline.
    async fn begin(&self, priority: f32) -> Result<(), PortError>;

    /// Download progress in [0, 1].
    fn progress_fraction(&self) -> f32;

    /// Release the session; idempotent, safe even if `begin` never ran.
    /// Whether an in-flight transfer halts is up to the platform.
    fn end(&self);
}

/// Constructs download sessions; supplied once by the embedding
/// application at startup.
pub trait SessionFactory: Send + Sync {
    fn open(&self, tag: &str) -> Result<Arc<dyn DownloadSession>, PortError>;
}

pub type SharedSession = Arc<dyn DownloadSession>;

/// Stand-in session used when no factory was configured. Every operation
/// fails with [`PortError::NotConfigured`] so callers surface a normal
/// failure instead of panicking.
pub struct NoopSession;

#[async_trait::async_trait]
impl DownloadSession for NoopSession {
    async fn is_cached(&self) -> Result<bool, PortError> {
        Err(PortError::NotConfigured)
    }

    async fn begin(&self, _priority: f32) -> Result<(), PortError> {
        Err(PortError::NotConfigured)
    }

    fn progress_fraction(&self) -> f32 {
        0.0
    }

    fn end(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_session_fails_not_configured() {
        let session = NoopSession;
        assert_eq!(session.is_cached().await, Err(PortError::NotConfigured));
        assert_eq!(session.begin(1.0).await, Err(PortError::NotConfigured));
        assert_eq!(session.progress_fraction(), 0.0);
        session.end();
        session.end();
    }

    #[test]
    fn port_error_messages_are_specific() {
        assert!(PortError::OutOfSpace.to_string().contains("storage"));
        assert!(PortError::InvalidTag.to_string().contains("tag"));
        assert_eq!(PortError::Other("boom".into()).to_string(), "boom");
    }
}
