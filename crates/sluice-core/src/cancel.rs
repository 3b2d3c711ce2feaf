//! Cooperative cancellation.
//!
//! A run is cancelled by cancelling its [`CancellationToken`] from any thread.
//! The engine and drivers observe the request only at check-points: between
//! top-level elements, at the start of every query row and before every
//! statement a driver executes.

pub use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Returns a cancellation error if the token has been cancelled.
#[inline]
pub fn checkpoint(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::cancelled());
    }
    Ok(())
}
