//! Boundary to the system that actually holds and moves funds.

use crate::amount::Amount;
use crate::identity::Identity;
use crate::stream::StreamId;
use std::sync::Arc;
use thiserror::Error;

/// Why a value movement leaves the escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Earned funds paid to the worker.
    Payout,
    /// Unearned remainder returned to the client on cancellation.
    Refund,
}

/// A single movement of value out of escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub stream_id: StreamId,
    pub kind: TransferKind,
    pub recipient: Identity,
    pub amount: Amount,
}

/// Errors reported by a fund gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway is frozen")]
    Frozen,

    #[error("insufficient escrow: requested {requested}, held {held}")]
    InsufficientEscrow { requested: Amount, held: Amount },

    #[error("balance overflow")]
    Overflow,

    #[error("{0}")]
    Rejected(String),
}

/// Moves value on behalf of the controller.
///
/// `execute` is all-or-nothing: either every transfer in the batch happens
/// or none does. The controller holds the stream's lock for the duration of
/// the call, and any attempt by the gateway to call back into that stream
/// fails with `ReentrantCall`.
pub trait FundGateway: Send + Sync {
    /// Takes the value attached to a create call into escrow.
    fn collect_deposit(&self, from: &Identity, amount: Amount) -> Result<(), GatewayError>;

    /// Applies a settlement batch.
    fn execute(&self, transfers: &[Transfer]) -> Result<(), GatewayError>;
}

impl<T: FundGateway + ?Sized> FundGateway for Arc<T> {
    fn collect_deposit(&self, from: &Identity, amount: Amount) -> Result<(), GatewayError> {
        (**self).collect_deposit(from, amount)
    }

    fn execute(&self, transfers: &[Transfer]) -> Result<(), GatewayError> {
        (**self).execute(transfers)
    }
}
