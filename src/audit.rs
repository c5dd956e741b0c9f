//! Audit events and the sink that receives them.

use crate::amount::Amount;
use crate::error::Result;
use crate::identity::Identity;
use crate::stream::StreamId;
use log::info;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// One semantic state transition of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    Created {
        stream_id: StreamId,
        client: Identity,
        worker: Identity,
        verifier: Option<Identity>,
        deposit: Amount,
    },
    ProgressUpdated {
        stream_id: StreamId,
        caller: Identity,
        from: u8,
        to: u8,
    },
    Finalized {
        stream_id: StreamId,
    },
    Withdrawn {
        stream_id: StreamId,
        worker: Identity,
        amount: Amount,
    },
    Cancelled {
        stream_id: StreamId,
        worker_paid: Amount,
        client_refund: Amount,
    },
}

impl AuditEvent {
    pub fn stream_id(&self) -> StreamId {
        match self {
            AuditEvent::Created { stream_id, .. }
            | AuditEvent::ProgressUpdated { stream_id, .. }
            | AuditEvent::Finalized { stream_id }
            | AuditEvent::Withdrawn { stream_id, .. }
            | AuditEvent::Cancelled { stream_id, .. } => *stream_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Created { .. } => "created",
            AuditEvent::ProgressUpdated { .. } => "progress",
            AuditEvent::Finalized { .. } => "finalized",
            AuditEvent::Withdrawn { .. } => "withdrawn",
            AuditEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// Receives the events of each committed operation, in emission order.
///
/// Withdraw and cancel stage their events together with the state change,
/// before the fund gateway is called, and publish them only after the
/// gateway succeeds. Events of an operation whose settlement failed are
/// discarded and never reach the sink.
pub trait AuditSink: Send + Sync {
    fn publish(&self, events: &[AuditEvent]);
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn publish(&self, events: &[AuditEvent]) {
        (**self).publish(events)
    }
}

/// Flat CSV row for an audit event.
#[derive(Debug, Serialize)]
struct AuditRow {
    seq: usize,
    event: &'static str,
    stream: StreamId,
    party: Option<String>,
    amount: Option<Amount>,
    refund: Option<Amount>,
    progress: Option<u8>,
}

impl AuditRow {
    fn from_event(seq: usize, event: &AuditEvent) -> Self {
        let mut row = AuditRow {
            seq,
            event: event.kind(),
            stream: event.stream_id(),
            party: None,
            amount: None,
            refund: None,
            progress: None,
        };
        match event {
            AuditEvent::Created {
                client, deposit, ..
            } => {
                row.party = Some(client.to_string());
                row.amount = Some(*deposit);
            }
            AuditEvent::ProgressUpdated { caller, to, .. } => {
                row.party = Some(caller.to_string());
                row.progress = Some(*to);
            }
            AuditEvent::Finalized { .. } => {}
            AuditEvent::Withdrawn { worker, amount, .. } => {
                row.party = Some(worker.to_string());
                row.amount = Some(*amount);
            }
            AuditEvent::Cancelled {
                worker_paid,
                client_refund,
                ..
            } => {
                row.amount = Some(*worker_paid);
                row.refund = Some(*client_refund);
            }
        }
        row
    }
}

/// Ordered in-memory audit trail that also logs each event.
#[derive(Default)]
pub struct AuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event published so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the trail as CSV, one row per event.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for (seq, event) in self.events().iter().enumerate() {
            csv_writer.serialize(AuditRow::from_event(seq, event))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl AuditSink for AuditLog {
    fn publish(&self, events: &[AuditEvent]) {
        let mut log = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            info!("Stream {}: {:?}", event.stream_id(), event);
            log.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_publish_keeps_order() {
        let log = AuditLog::new();
        log.publish(&[
            AuditEvent::ProgressUpdated {
                stream_id: 3,
                caller: Identity::from("client"),
                from: 40,
                to: 100,
            },
            AuditEvent::Finalized { stream_id: 3 },
        ]);

        let kinds: Vec<_> = log.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["progress", "finalized"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_csv_output() {
        let log = AuditLog::new();
        log.publish(&[AuditEvent::Cancelled {
            stream_id: 0,
            worker_paid: Amount::from_str("2").unwrap(),
            client_refund: Amount::from_str("3").unwrap(),
        }]);

        let mut output = Vec::new();
        log.write_csv(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.starts_with("seq,event,stream,party,amount,refund,progress"));
        assert!(output.contains("0,cancelled,0,,2.0000,3.0000,"));
    }
}
