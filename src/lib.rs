//! # Progress Escrow
//!
//! An escrow ledger that releases a client's deposit to a worker in
//! proportion to reported work progress (0-100%), optionally vouched for by
//! an independent verifier.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: 4 decimal places via `rust_decimal`; earned
//!   amounts are `floor(deposit * progress / 100)` in minor units
//! - **Strict invariants**: `withdrawn <= earned <= deposit`, progress never
//!   decreases, cancelled streams never change again
//! - **Checks-effects-interactions**: state is committed before funds move,
//!   and a failed transfer rolls the whole call back
//! - **Per-stream serialization**: each stream has its own lock; different
//!   streams proceed in parallel
//!
//! ## Example
//!
//! ```
//! use progress_escrow::{Amount, AuditLog, EscrowVault, Identity, StreamController};
//! use std::str::FromStr;
//!
//! let ledger = StreamController::new(EscrowVault::new(), AuditLog::new());
//! let client = Identity::from("alice");
//! let worker = Identity::from("bob");
//!
//! let id = ledger
//!     .create(&client, worker.clone(), None, Amount::from_str("10").unwrap())
//!     .unwrap();
//! ledger.update_progress(id, &client, 25).unwrap();
//! assert_eq!(ledger.withdraw(id, &worker).unwrap().to_string(), "2.5000");
//! ```

pub mod amount;
pub mod audit;
pub mod command;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod journal;
pub mod ledger;
pub mod store;
pub mod stream;
pub mod vault;

pub use amount::{Amount, AmountError};
pub use audit::{AuditEvent, AuditLog, AuditSink};
pub use command::{Command, CommandRecord};
pub use controller::{CancelSettlement, StreamController};
pub use error::{EscrowError, Result};
pub use gateway::{FundGateway, GatewayError, Transfer, TransferKind};
pub use identity::Identity;
pub use journal::JournalRunner;
pub use store::StreamStore;
pub use stream::{Stream, StreamId, StreamStatus, MAX_PROGRESS};
pub use vault::EscrowVault;
