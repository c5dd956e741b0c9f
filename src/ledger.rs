//! Pure accounting over a stream record.
//!
//! Nothing here mutates state; the controller decides what to commit.

use crate::amount::Amount;
use crate::error::{EscrowError, Result};
use crate::stream::{Stream, MAX_PROGRESS};

/// `floor(total_deposit * progress / 100)`.
pub fn earned(stream: &Stream) -> Amount {
    stream.total_deposit.percent_floor(stream.progress)
}

/// Earned but not yet paid out. Never negative while the invariants hold.
pub fn withdrawable(stream: &Stream) -> Amount {
    earned(stream) - stream.withdrawn
}

/// Checks a requested progress value against the stream's current progress.
///
/// Returns the accepted progress narrowed to its stored width.
pub fn validate_progress_transition(stream: &Stream, requested: u32) -> Result<u8> {
    let accepted = u8::try_from(requested)
        .ok()
        .filter(|p| *p <= MAX_PROGRESS)
        .ok_or_else(|| {
            EscrowError::InvalidArgument(format!(
                "progress {} exceeds {}",
                requested, MAX_PROGRESS
            ))
        })?;

    if accepted < stream.progress {
        return Err(EscrowError::ProgressDecreased {
            stream_id: stream.id,
            current: stream.progress,
            requested,
        });
    }

    Ok(accepted)
}
