//! Stream record and role predicates.
//!
//! Maintains the invariant: `withdrawn <= earned(progress) <= total_deposit`.

use crate::amount::Amount;
use crate::identity::Identity;
use crate::ledger;

/// Dense, sequential stream handle starting at 0.
pub type StreamId = u64;

/// Progress at which a stream is complete.
pub const MAX_PROGRESS: u8 = 100;

/// Lifecycle position of a stream, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Accepting progress updates, withdrawals and cancellation.
    Open,
    /// Progress reached 100. Withdrawals only.
    Finalized,
    /// Terminated by the client and fully settled.
    Cancelled,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Open => "open",
            StreamStatus::Finalized => "finalized",
            StreamStatus::Cancelled => "cancelled",
        }
    }
}

/// One escrow arrangement between a client and a worker.
///
/// # Invariants
///
/// - `progress <= 100` and never decreases
/// - `withdrawn <= earned(progress) <= total_deposit`
/// - A stream is never both cancelled and finalized
/// - Once `active == false` nothing about the stream changes again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,

    /// Funded the stream. Reports progress and may cancel.
    pub client: Identity,

    /// Entitled to withdraw earned funds.
    pub worker: Identity,

    /// Optional independent party that may also report progress.
    pub verifier: Option<Identity>,

    /// Fixed at creation.
    pub total_deposit: Amount,

    /// Cumulative amount paid to the worker.
    pub withdrawn: Amount,

    pub progress: u8,

    /// `false` once cancelled.
    pub active: bool,

    pub finalized: bool,
}

impl Stream {
    pub(crate) fn open(
        id: StreamId,
        client: Identity,
        worker: Identity,
        verifier: Option<Identity>,
        total_deposit: Amount,
    ) -> Self {
        Stream {
            id,
            client,
            worker,
            verifier,
            total_deposit,
            withdrawn: Amount::ZERO,
            progress: 0,
            active: true,
            finalized: false,
        }
    }

    pub fn status(&self) -> StreamStatus {
        if !self.active {
            StreamStatus::Cancelled
        } else if self.finalized {
            StreamStatus::Finalized
        } else {
            StreamStatus::Open
        }
    }

    pub fn is_client(&self, caller: &Identity) -> bool {
        !caller.is_unset() && *caller == self.client
    }

    pub fn is_worker(&self, caller: &Identity) -> bool {
        !caller.is_unset() && *caller == self.worker
    }

    /// An absent verifier matches nobody.
    pub fn is_verifier(&self, caller: &Identity) -> bool {
        !caller.is_unset() && self.verifier.as_ref() == Some(caller)
    }

    /// Roles allowed to report progress and finalize.
    pub fn is_client_or_verifier(&self, caller: &Identity) -> bool {
        self.is_client(caller) || self.is_verifier(caller)
    }

    /// Verifies the accounting invariants of a single observation.
    pub fn check_invariant(&self) -> bool {
        let earned = ledger::earned(self);
        self.progress <= MAX_PROGRESS
            && !self.withdrawn.minor_units().is_negative()
            && self.withdrawn <= earned
            && earned <= self.total_deposit
            && !(self.finalized && !self.active)
    }
}
