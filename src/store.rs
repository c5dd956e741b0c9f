//! Append-only arena of stream records.
//!
//! Each record lives in its own slot behind a mutex, addressed by its dense
//! id. The arena lock is taken for writing only to append a slot, so
//! operations on different streams never wait on each other.

use crate::amount::Amount;
use crate::error::{EscrowError, Result};
use crate::identity::Identity;
use crate::stream::{Stream, StreamId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Holds one stream and the reentrancy marker for its settlements.
pub(crate) struct StreamSlot {
    id: StreamId,
    record: Mutex<Stream>,
    /// Thread currently inside the fund gateway for this stream.
    settling_on: Mutex<Option<ThreadId>>,
}

impl StreamSlot {
    fn new(stream: Stream) -> Self {
        StreamSlot {
            id: stream.id,
            record: Mutex::new(stream),
            settling_on: Mutex::new(None),
        }
    }

    /// Acquires exclusive access to the record.
    ///
    /// Fails with `ReentrantCall` when the current thread is already inside
    /// a settlement of this stream; other threads simply wait for it.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Stream>> {
        let settling_on = *self
            .settling_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if settling_on == Some(thread::current().id()) {
            return Err(EscrowError::ReentrantCall(self.id));
        }

        Ok(self.record.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Marks the current thread as settling this stream until the guard drops.
    pub(crate) fn begin_settlement(&self) -> SettlementGuard<'_> {
        *self
            .settling_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        SettlementGuard { slot: self }
    }
}

pub(crate) struct SettlementGuard<'a> {
    slot: &'a StreamSlot,
}

impl Drop for SettlementGuard<'_> {
    fn drop(&mut self) {
        *self
            .slot
            .settling_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Indexed container of every stream ever created.
///
/// Records are never removed and ids are allocated without gaps from 0.
#[derive(Default)]
pub struct StreamStore {
    slots: RwLock<Vec<Arc<StreamSlot>>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the arguments of a new stream without touching the store.
    pub fn validate_new(client: &Identity, worker: &Identity, deposit: Amount) -> Result<()> {
        if client.is_unset() {
            return Err(EscrowError::InvalidArgument(
                "client identity is unset".to_string(),
            ));
        }
        if worker.is_unset() {
            return Err(EscrowError::InvalidArgument(
                "worker identity is unset".to_string(),
            ));
        }
        if !deposit.is_positive() {
            return Err(EscrowError::InvalidArgument(format!(
                "deposit must be positive, got {}",
                deposit
            )));
        }
        if !deposit.is_exact() {
            return Err(EscrowError::InvalidArgument(format!(
                "deposit {} cannot be held at 4 decimal places",
                deposit
            )));
        }
        Ok(())
    }

    /// Appends a new open stream and returns its id.
    ///
    /// An unset verifier is stored as absent.
    pub fn create(
        &self,
        client: Identity,
        worker: Identity,
        verifier: Option<Identity>,
        deposit: Amount,
    ) -> Result<StreamId> {
        Self::validate_new(&client, &worker, deposit)?;
        let verifier = verifier.and_then(Identity::into_option);

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let id = slots.len() as StreamId;
        let stream = Stream::open(id, client, worker, verifier, deposit);
        slots.push(Arc::new(StreamSlot::new(stream)));

        Ok(id)
    }

    /// Returns a copy of the stream. Mutation goes through the controller.
    pub fn get(&self, id: StreamId) -> Result<Stream> {
        let slot = self.slot(id)?;
        let stream = slot.lock()?;
        Ok(stream.clone())
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of all streams in id order.
    pub fn snapshot(&self) -> Result<Vec<Stream>> {
        let slots: Vec<_> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        slots
            .iter()
            .map(|slot| slot.lock().map(|stream| stream.clone()))
            .collect()
    }

    pub(crate) fn slot(&self, id: StreamId) -> Result<Arc<StreamSlot>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(id)
            .ok()
            .and_then(|index| slots.get(index))
            .cloned()
            .ok_or(EscrowError::NotFound(id))
    }
}
