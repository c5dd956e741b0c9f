//! Public operation surface of the escrow ledger.
//!
//! Every mutating operation runs under the stream's own lock, from the first
//! check to the end of settlement, so calls on one stream are linearizable
//! while calls on different streams proceed in parallel.
//!
//! Withdraw and cancel follow checks-effects-interactions: the new state is
//! committed and the audit events are staged before the gateway is called.
//! If the gateway fails, the previous state is restored and the staged
//! events are dropped, so the call leaves no trace.

use crate::amount::Amount;
use crate::audit::{AuditEvent, AuditSink};
use crate::error::{EscrowError, Result};
use crate::gateway::{FundGateway, Transfer, TransferKind};
use crate::identity::Identity;
use crate::ledger;
use crate::store::{StreamSlot, StreamStore};
use crate::stream::{Stream, StreamId, MAX_PROGRESS};
use log::{debug, warn};

/// Amounts moved when a stream is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelSettlement {
    /// Earned but unwithdrawn funds paid to the worker.
    pub worker_paid: Amount,
    /// Unearned remainder returned to the client.
    pub client_refund: Amount,
}

/// Validates, commits and settles stream operations.
pub struct StreamController<G, A> {
    store: StreamStore,
    gateway: G,
    audit: A,
}

impl<G: FundGateway, A: AuditSink> StreamController<G, A> {
    pub fn new(gateway: G, audit: A) -> Self {
        StreamController {
            store: StreamStore::new(),
            gateway,
            audit,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    /// Opens a stream funded by `client` with `deposit`.
    ///
    /// The deposit is collected before an id is allocated, so a rejected
    /// deposit leaves no record behind. It must be an exact amount (see
    /// `Amount::is_exact`); amounts parsed with `FromStr` always are.
    pub fn create(
        &self,
        client: &Identity,
        worker: Identity,
        verifier: Option<Identity>,
        deposit: Amount,
    ) -> Result<StreamId> {
        StreamStore::validate_new(client, &worker, deposit)?;

        self.gateway
            .collect_deposit(client, deposit)
            .map_err(EscrowError::DepositFailed)?;

        let id = self.store.create(client.clone(), worker, verifier, deposit)?;
        let stream = self.store.get(id)?;

        debug!(
            "Stream {}: created by {} for {} with deposit {}",
            id, stream.client, stream.worker, deposit
        );
        self.audit.publish(&[AuditEvent::Created {
            stream_id: id,
            client: stream.client,
            worker: stream.worker,
            verifier: stream.verifier,
            deposit,
        }]);

        Ok(id)
    }

    /// Records new progress. Reaching 100 finalizes the stream in the same step.
    pub fn update_progress(
        &self,
        stream_id: StreamId,
        caller: &Identity,
        new_progress: u32,
    ) -> Result<()> {
        let slot = self.store.slot(stream_id)?;
        let mut stream = slot.lock()?;

        if !stream.active {
            return Err(EscrowError::InactiveStream(stream_id));
        }
        if stream.finalized {
            return Err(EscrowError::AlreadyFinalized(stream_id));
        }
        require(stream.is_client_or_verifier(caller), stream_id, caller)?;
        let accepted = ledger::validate_progress_transition(&stream, new_progress)?;

        let mut events = vec![AuditEvent::ProgressUpdated {
            stream_id,
            caller: caller.clone(),
            from: stream.progress,
            to: accepted,
        }];
        stream.progress = accepted;
        if accepted == MAX_PROGRESS {
            stream.finalized = true;
            events.push(AuditEvent::Finalized { stream_id });
        }
        debug_assert!(stream.check_invariant());

        debug!(
            "Stream {}: progress {} reported by {}",
            stream_id, accepted, caller
        );
        self.audit.publish(&events);
        Ok(())
    }

    /// Finalizes a stream sitting at 100% that was not finalized yet.
    ///
    /// Progress reaching 100 already finalizes, so this only succeeds if that
    /// rule is ever relaxed; it still enforces the full set of checks.
    pub fn finalize_stream(&self, stream_id: StreamId, caller: &Identity) -> Result<()> {
        let slot = self.store.slot(stream_id)?;
        let mut stream = slot.lock()?;

        if !stream.active {
            return Err(EscrowError::InactiveStream(stream_id));
        }
        if stream.finalized {
            return Err(EscrowError::AlreadyFinalized(stream_id));
        }
        require(stream.is_client_or_verifier(caller), stream_id, caller)?;
        if stream.progress != MAX_PROGRESS {
            return Err(EscrowError::ProgressIncomplete {
                stream_id,
                progress: stream.progress,
            });
        }

        stream.finalized = true;
        debug!("Stream {}: finalized by {}", stream_id, caller);
        self.audit.publish(&[AuditEvent::Finalized { stream_id }]);
        Ok(())
    }

    /// Pays the worker everything earned and not yet withdrawn.
    pub fn withdraw(&self, stream_id: StreamId, caller: &Identity) -> Result<Amount> {
        let slot = self.store.slot(stream_id)?;
        let mut stream = slot.lock()?;

        require(stream.is_worker(caller), stream_id, caller)?;
        if !stream.active {
            return Err(EscrowError::InactiveStream(stream_id));
        }
        let amount = ledger::withdrawable(&stream);
        if !amount.is_positive() {
            return Err(EscrowError::NothingToWithdraw(stream_id));
        }

        let before = stream.clone();
        stream.withdrawn += amount;
        let events = vec![AuditEvent::Withdrawn {
            stream_id,
            worker: stream.worker.clone(),
            amount,
        }];
        let transfers = vec![Transfer {
            stream_id,
            kind: TransferKind::Payout,
            recipient: stream.worker.clone(),
            amount,
        }];

        self.settle(&slot, &mut stream, before, &events, &transfers)?;
        debug!("Stream {}: withdrew {} to {}", stream_id, amount, caller);
        Ok(amount)
    }

    /// Terminates an open stream, paying the worker what was earned and
    /// refunding the rest to the client.
    pub fn cancel_stream(&self, stream_id: StreamId, caller: &Identity) -> Result<CancelSettlement> {
        let slot = self.store.slot(stream_id)?;
        let mut stream = slot.lock()?;

        require(stream.is_client(caller), stream_id, caller)?;
        if !stream.active {
            return Err(EscrowError::AlreadyInactive(stream_id));
        }
        if stream.finalized {
            return Err(EscrowError::CannotCancelFinalized(stream_id));
        }

        let earned_now = ledger::earned(&stream);
        let unwithdrawn = earned_now - stream.withdrawn;
        let remaining = stream.total_deposit - earned_now;

        let before = stream.clone();
        stream.active = false;

        let mut transfers = Vec::with_capacity(2);
        if unwithdrawn.is_positive() {
            stream.withdrawn += unwithdrawn;
            transfers.push(Transfer {
                stream_id,
                kind: TransferKind::Payout,
                recipient: stream.worker.clone(),
                amount: unwithdrawn,
            });
        }
        if remaining.is_positive() {
            transfers.push(Transfer {
                stream_id,
                kind: TransferKind::Refund,
                recipient: stream.client.clone(),
                amount: remaining,
            });
        }

        let settlement = CancelSettlement {
            worker_paid: unwithdrawn,
            client_refund: remaining,
        };
        let events = vec![AuditEvent::Cancelled {
            stream_id,
            worker_paid: settlement.worker_paid,
            client_refund: settlement.client_refund,
        }];

        self.settle(&slot, &mut stream, before, &events, &transfers)?;
        debug!(
            "Stream {}: cancelled, worker paid {}, client refunded {}",
            stream_id, unwithdrawn, remaining
        );
        Ok(settlement)
    }

    /// Runs the transfers for state already committed in `stream`.
    ///
    /// On success the staged events are published; on failure `stream` is
    /// reset to `before` and the events are discarded.
    fn settle(
        &self,
        slot: &StreamSlot,
        stream: &mut Stream,
        before: Stream,
        events: &[AuditEvent],
        transfers: &[Transfer],
    ) -> Result<()> {
        debug_assert!(stream.check_invariant());

        if !transfers.is_empty() {
            let outcome = {
                let _settling = slot.begin_settlement();
                self.gateway.execute(transfers)
            };
            if let Err(source) = outcome {
                *stream = before;
                warn!(
                    "Stream {}: transfer failed ({}), state rolled back",
                    stream.id, source
                );
                return Err(EscrowError::TransferFailed {
                    stream_id: stream.id,
                    source,
                });
            }
        }

        self.audit.publish(events);
        Ok(())
    }

    pub fn get_stream(&self, stream_id: StreamId) -> Result<Stream> {
        self.store.get(stream_id)
    }

    pub fn earned_amount(&self, stream_id: StreamId) -> Result<Amount> {
        let stream = self.store.get(stream_id)?;
        Ok(ledger::earned(&stream))
    }

    /// What `withdraw` would pay right now; zero once cancelled.
    pub fn get_withdrawable_amount(&self, stream_id: StreamId) -> Result<Amount> {
        let stream = self.store.get(stream_id)?;
        if !stream.active {
            return Ok(Amount::ZERO);
        }
        Ok(ledger::withdrawable(&stream))
    }

    /// All streams in id order.
    pub fn streams(&self) -> Result<Vec<Stream>> {
        self.store.snapshot()
    }
}

fn require(allowed: bool, stream_id: StreamId, caller: &Identity) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(EscrowError::Unauthorized {
            stream_id,
            caller: caller.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::vault::EscrowVault;
    use std::str::FromStr;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn id(name: &str) -> Identity {
        Identity::from(name)
    }

    fn controller() -> StreamController<EscrowVault, AuditLog> {
        StreamController::new(EscrowVault::new(), AuditLog::new())
    }

    fn open(c: &StreamController<EscrowVault, AuditLog>, deposit: &str) -> StreamId {
        c.create(&id("client"), id("worker"), Some(id("vera")), amt(deposit))
            .unwrap()
    }

    #[test]
    fn test_create_collects_deposit_and_audits() {
        let c = controller();
        let sid = open(&c, "10");

        assert_eq!(sid, 0);
        assert_eq!(c.gateway().escrowed(), amt("10"));
        assert!(matches!(
            c.audit().events().as_slice(),
            [AuditEvent::Created { stream_id: 0, .. }]
        ));
    }

    #[test]
    fn test_create_rejected_when_deposit_not_collected() {
        let c = controller();
        c.gateway().freeze();

        let result = c.create(&id("client"), id("worker"), None, amt("10"));
        assert!(matches!(result, Err(EscrowError::DepositFailed(_))));
        assert!(c.store().is_empty());
        assert!(c.audit().is_empty());
    }

    #[test]
    fn test_verifier_can_report_progress() {
        let c = controller();
        let sid = open(&c, "10");

        c.update_progress(sid, &id("vera"), 30).unwrap();
        assert_eq!(c.get_stream(sid).unwrap().progress, 30);
    }

    #[test]
    fn test_progress_to_hundred_emits_progress_then_finalized() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 100).unwrap();

        let kinds: Vec<_> = c.audit().events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["created", "progress", "finalized"]);
        assert!(c.get_stream(sid).unwrap().finalized);
    }

    #[test]
    fn test_finalized_stream_rejects_progress_and_cancel() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 100).unwrap();

        assert!(matches!(
            c.update_progress(sid, &id("client"), 100),
            Err(EscrowError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            c.finalize_stream(sid, &id("client")),
            Err(EscrowError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            c.cancel_stream(sid, &id("client")),
            Err(EscrowError::CannotCancelFinalized(_))
        ));
    }

    #[test]
    fn test_finalize_before_complete() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 99).unwrap();

        assert!(matches!(
            c.finalize_stream(sid, &id("worker")),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert!(matches!(
            c.finalize_stream(sid, &id("client")),
            Err(EscrowError::ProgressIncomplete { progress: 99, .. })
        ));
    }

    #[test]
    fn test_only_worker_withdraws() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 50).unwrap();

        for caller in ["client", "vera", "mallory", ""] {
            assert!(matches!(
                c.withdraw(sid, &id(caller)),
                Err(EscrowError::Unauthorized { .. })
            ));
        }
        assert_eq!(c.withdraw(sid, &id("worker")).unwrap(), amt("5"));
    }

    #[test]
    fn test_withdraw_at_zero_progress() {
        let c = controller();
        let sid = open(&c, "10");
        assert!(matches!(
            c.withdraw(sid, &id("worker")),
            Err(EscrowError::NothingToWithdraw(0))
        ));
    }

    #[test]
    fn test_withdraw_rolls_back_on_transfer_failure() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 40).unwrap();
        let before = c.get_stream(sid).unwrap();
        let events_before = c.audit().len();

        c.gateway().freeze();
        assert!(matches!(
            c.withdraw(sid, &id("worker")),
            Err(EscrowError::TransferFailed { stream_id: 0, .. })
        ));
        assert_eq!(c.get_stream(sid).unwrap(), before);
        assert_eq!(c.audit().len(), events_before);

        c.gateway().thaw();
        assert_eq!(c.withdraw(sid, &id("worker")).unwrap(), amt("4"));
    }

    #[test]
    fn test_cancel_rolls_back_on_transfer_failure() {
        let c = controller();
        let sid = open(&c, "5");
        c.update_progress(sid, &id("client"), 40).unwrap();
        let before = c.get_stream(sid).unwrap();

        c.gateway().freeze();
        assert!(matches!(
            c.cancel_stream(sid, &id("client")),
            Err(EscrowError::TransferFailed { .. })
        ));
        assert_eq!(c.get_stream(sid).unwrap(), before);
        assert_eq!(c.gateway().escrowed(), amt("5"));
    }

    #[test]
    fn test_cancel_after_partial_withdrawal() {
        let c = controller();
        let sid = open(&c, "10");
        c.update_progress(sid, &id("client"), 30).unwrap();
        c.withdraw(sid, &id("worker")).unwrap();
        c.update_progress(sid, &id("vera"), 55).unwrap();

        let settlement = c.cancel_stream(sid, &id("client")).unwrap();
        assert_eq!(settlement.worker_paid, amt("2.5"));
        assert_eq!(settlement.client_refund, amt("4.5"));

        let stream = c.get_stream(sid).unwrap();
        assert!(!stream.active);
        assert_eq!(stream.withdrawn, amt("5.5"));
        assert_eq!(c.gateway().escrowed(), Amount::ZERO);
    }

    #[test]
    fn test_cancel_at_zero_progress_refunds_everything() {
        let c = controller();
        let sid = open(&c, "7");
        let settlement = c.cancel_stream(sid, &id("client")).unwrap();
        assert_eq!(settlement.worker_paid, Amount::ZERO);
        assert_eq!(settlement.client_refund, amt("7"));
        assert_eq!(c.gateway().received_by(&id("client")), amt("7"));
    }

    #[test]
    fn test_verifier_cannot_cancel() {
        let c = controller();
        let sid = open(&c, "7");
        assert!(matches!(
            c.cancel_stream(sid, &id("vera")),
            Err(EscrowError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_cancelled_stream_is_frozen() {
        let c = controller();
        let sid = open(&c, "7");
        c.cancel_stream(sid, &id("client")).unwrap();

        assert!(matches!(
            c.update_progress(sid, &id("client"), 50),
            Err(EscrowError::InactiveStream(_))
        ));
        assert!(matches!(
            c.finalize_stream(sid, &id("client")),
            Err(EscrowError::InactiveStream(_))
        ));
        assert!(matches!(
            c.withdraw(sid, &id("worker")),
            Err(EscrowError::InactiveStream(_))
        ));
        assert!(matches!(
            c.cancel_stream(sid, &id("client")),
            Err(EscrowError::AlreadyInactive(_))
        ));
        assert_eq!(c.get_withdrawable_amount(sid).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_unknown_stream() {
        let c = controller();
        assert!(matches!(
            c.update_progress(4, &id("client"), 1),
            Err(EscrowError::NotFound(4))
        ));
        assert!(matches!(
            c.finalize_stream(4, &id("client")),
            Err(EscrowError::NotFound(4))
        ));
        assert!(matches!(
            c.withdraw(4, &id("worker")),
            Err(EscrowError::NotFound(4))
        ));
        assert!(matches!(
            c.cancel_stream(4, &id("client")),
            Err(EscrowError::NotFound(4))
        ));
        assert!(matches!(c.get_stream(4), Err(EscrowError::NotFound(4))));
        assert!(matches!(c.earned_amount(4), Err(EscrowError::NotFound(4))));
        assert!(matches!(
            c.get_withdrawable_amount(4),
            Err(EscrowError::NotFound(4))
        ));
    }
}
