//! Error types for the escrow ledger.

use crate::gateway::GatewayError;
use crate::identity::Identity;
use crate::stream::StreamId;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, EscrowError>;

/// Errors that can occur while operating on streams.
///
/// Every ledger error aborts the call with the store left exactly as it was
/// before the call.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Unset worker, non-positive deposit, progress above 100
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller does not hold the role the operation requires
    #[error("Caller {caller} is not authorized for stream {stream_id}")]
    Unauthorized { stream_id: StreamId, caller: Identity },

    #[error("Stream {0} not found")]
    NotFound(StreamId),

    #[error("Stream {0} is not active")]
    InactiveStream(StreamId),

    #[error("Stream {0} is already cancelled")]
    AlreadyInactive(StreamId),

    #[error("Stream {0} is already finalized")]
    AlreadyFinalized(StreamId),

    #[error("Stream {0} is finalized and cannot be cancelled")]
    CannotCancelFinalized(StreamId),

    #[error("Stream {stream_id}: progress cannot decrease from {current} to {requested}")]
    ProgressDecreased {
        stream_id: StreamId,
        current: u8,
        requested: u32,
    },

    #[error("Stream {stream_id}: progress is {progress}, finalize requires 100")]
    ProgressIncomplete { stream_id: StreamId, progress: u8 },

    #[error("Stream {0} has nothing to withdraw")]
    NothingToWithdraw(StreamId),

    /// A fund transfer tried to call back into the stream it is settling
    #[error("Reentrant call into stream {0} during fund transfer")]
    ReentrantCall(StreamId),

    /// The gateway refused the settlement; stream state was rolled back
    #[error("Transfer for stream {stream_id} failed: {source}")]
    TransferFailed {
        stream_id: StreamId,
        #[source]
        source: GatewayError,
    },

    /// The gateway refused to take the deposit; no stream was created
    #[error("Deposit collection failed: {0}")]
    DepositFailed(#[source] GatewayError),

    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing command journal argument
    #[error("Missing input file argument. Usage: progress-escrow <commands.csv> [audit.csv]")]
    MissingArgument,
}
