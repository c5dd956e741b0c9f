//! In-memory fund gateway backing the CLI and the tests.

use crate::amount::Amount;
use crate::gateway::{FundGateway, GatewayError, Transfer};
use crate::identity::Identity;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Pooled escrow with per-identity running totals.
///
/// A frozen vault rejects every request, which is how callers simulate an
/// unavailable payment rail.
#[derive(Default)]
pub struct EscrowVault {
    state: Mutex<VaultState>,
}

#[derive(Default)]
struct VaultState {
    escrowed: Amount,
    deposited: BTreeMap<Identity, Amount>,
    received: BTreeMap<Identity, Amount>,
    frozen: bool,
}

impl EscrowVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn freeze(&self) {
        self.state().frozen = true;
    }

    pub fn thaw(&self) {
        self.state().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.state().frozen
    }

    /// Funds currently held in escrow.
    pub fn escrowed(&self) -> Amount {
        self.state().escrowed
    }

    /// Total ever deposited by `identity`.
    pub fn deposited_by(&self, identity: &Identity) -> Amount {
        self.state()
            .deposited
            .get(identity)
            .copied()
            .unwrap_or_default()
    }

    /// Total ever paid out to `identity`, payouts and refunds alike.
    pub fn received_by(&self, identity: &Identity) -> Amount {
        self.state()
            .received
            .get(identity)
            .copied()
            .unwrap_or_default()
    }
}

fn credit(
    book: &mut BTreeMap<Identity, Amount>,
    identity: &Identity,
    amount: Amount,
) -> Result<(), GatewayError> {
    let entry = book.entry(identity.clone()).or_default();
    *entry = entry.checked_add(amount).ok_or(GatewayError::Overflow)?;
    Ok(())
}

impl FundGateway for EscrowVault {
    fn collect_deposit(&self, from: &Identity, amount: Amount) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.frozen {
            return Err(GatewayError::Frozen);
        }

        let escrowed = state
            .escrowed
            .checked_add(amount)
            .ok_or(GatewayError::Overflow)?;
        credit(&mut state.deposited, from, amount)?;
        state.escrowed = escrowed;

        debug!("Collected {} from {} into escrow", amount, from);
        Ok(())
    }

    fn execute(&self, transfers: &[Transfer]) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.frozen {
            return Err(GatewayError::Frozen);
        }

        let requested = transfers
            .iter()
            .try_fold(Amount::ZERO, |sum, t| sum.checked_add(t.amount))
            .ok_or(GatewayError::Overflow)?;
        if requested > state.escrowed {
            return Err(GatewayError::InsufficientEscrow {
                requested,
                held: state.escrowed,
            });
        }

        // Validate the whole batch against a scratch copy before applying.
        let mut received = state.received.clone();
        for transfer in transfers {
            credit(&mut received, &transfer.recipient, transfer.amount)?;
        }
        state.received = received;
        state.escrowed -= requested;

        for transfer in transfers {
            debug!(
                "Stream {}: {:?} of {} to {}",
                transfer.stream_id, transfer.kind, transfer.amount, transfer.recipient
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TransferKind;
    use std::str::FromStr;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn payout(to: &str, amount: &str) -> Transfer {
        Transfer {
            stream_id: 0,
            kind: TransferKind::Payout,
            recipient: Identity::from(to),
            amount: amt(amount),
        }
    }

    #[test]
    fn test_deposit_then_payout() {
        let vault = EscrowVault::new();
        let client = Identity::from("client");
        vault.collect_deposit(&client, amt("10")).unwrap();
        assert_eq!(vault.escrowed(), amt("10"));
        assert_eq!(vault.deposited_by(&client), amt("10"));

        vault.execute(&[payout("worker", "2.5")]).unwrap();
        assert_eq!(vault.escrowed(), amt("7.5"));
        assert_eq!(vault.received_by(&Identity::from("worker")), amt("2.5"));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let vault = EscrowVault::new();
        vault
            .collect_deposit(&Identity::from("client"), amt("3"))
            .unwrap();

        let result = vault.execute(&[payout("worker", "2"), payout("client", "2")]);
        assert!(matches!(
            result,
            Err(GatewayError::InsufficientEscrow { .. })
        ));
        assert_eq!(vault.escrowed(), amt("3"));
        assert_eq!(vault.received_by(&Identity::from("worker")), Amount::ZERO);
    }

    #[test]
    fn test_frozen_vault_rejects_everything() {
        let vault = EscrowVault::new();
        vault
            .collect_deposit(&Identity::from("client"), amt("3"))
            .unwrap();
        vault.freeze();
        assert!(vault.is_frozen());

        assert_eq!(
            vault.collect_deposit(&Identity::from("client"), amt("1")),
            Err(GatewayError::Frozen)
        );
        assert_eq!(
            vault.execute(&[payout("worker", "1")]),
            Err(GatewayError::Frozen)
        );

        vault.thaw();
        assert!(vault.execute(&[payout("worker", "1")]).is_ok());
    }
}
