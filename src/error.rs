//! Error codes shared by every error enum in the crate.
//!
//! DESIGN
//! ======
//! Nothing in the sync engine is fatal. Errors are logged with a grepable
//! code and a retryable flag, and the next natural trigger (timer tick,
//! pointer-up, re-subscribe) is what retries them.

/// Grepable error code and retryable flag for structured logs and notices.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
