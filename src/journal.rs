//! Replays a CSV command journal against a ledger and reports the result.
//!
//! This is the demo harness: every row is one call into the controller, and
//! the final state of all streams is written back out as CSV.

use crate::amount::Amount;
use crate::audit::AuditLog;
use crate::command::{Command, CommandRecord};
use crate::controller::StreamController;
use crate::error::Result;
use crate::ledger;
use crate::vault::EscrowVault;
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use std::io::{Read, Write};

/// Ledger wired to the in-memory vault and audit log.
pub struct JournalRunner {
    controller: StreamController<EscrowVault, AuditLog>,
}

impl JournalRunner {
    pub fn new() -> Self {
        JournalRunner {
            controller: StreamController::new(EscrowVault::new(), AuditLog::new()),
        }
    }

    pub fn controller(&self) -> &StreamController<EscrowVault, AuditLog> {
        &self.controller
    }

    /// Replays commands from a CSV reader in streaming fashion.
    ///
    /// Unparseable rows and rejected commands are logged at warn level and
    /// skipped; a rejected command leaves the ledger untouched.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<CommandRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            match result {
                Ok(record) => {
                    if let Some(command) = record.parse() {
                        if let Err(e) = self.apply(command, row_num) {
                            warn!("Row {}: {}", row_num, e);
                        }
                    } else {
                        warn!("Row {}: Failed to parse command record", row_num);
                    }
                }
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                }
            }
        }

        Ok(())
    }

    fn apply(&self, command: Command, row: usize) -> Result<()> {
        let c = &self.controller;
        match command {
            Command::Create {
                client,
                worker,
                verifier,
                deposit,
            } => {
                let id = c.create(&client, worker, verifier, deposit)?;
                debug!("Row {}: Created stream {}", row, id);
            }
            Command::Progress {
                stream,
                caller,
                progress,
            } => {
                c.update_progress(stream, &caller, progress)?;
                debug!("Row {}: Stream {} at {}%", row, stream, progress);
            }
            Command::Finalize { stream, caller } => {
                c.finalize_stream(stream, &caller)?;
                debug!("Row {}: Finalized stream {}", row, stream);
            }
            Command::Withdraw { stream, caller } => {
                let amount = c.withdraw(stream, &caller)?;
                debug!("Row {}: Withdrew {} from stream {}", row, amount, stream);
            }
            Command::Cancel { stream, caller } => {
                let settlement = c.cancel_stream(stream, &caller)?;
                debug!(
                    "Row {}: Cancelled stream {}, paid {}, refunded {}",
                    row, stream, settlement.worker_paid, settlement.client_refund
                );
            }
            Command::Freeze => {
                c.gateway().freeze();
                debug!("Row {}: Gateway frozen", row);
            }
            Command::Thaw => {
                c.gateway().thaw();
                debug!("Row {}: Gateway thawed", row);
            }
        }

        Ok(())
    }

    /// Writes final stream states to CSV, sorted by stream id.
    ///
    /// All monetary values are formatted with exactly 4 decimal places.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "client",
            "worker",
            "verifier",
            "deposit",
            "progress",
            "earned",
            "withdrawn",
            "withdrawable",
            "active",
            "finalized",
        ])?;

        for stream in self.controller.streams()? {
            let withdrawable = if stream.active {
                ledger::withdrawable(&stream).to_string()
            } else {
                Amount::ZERO.to_string()
            };
            csv_writer.write_record([
                stream.id.to_string(),
                stream.client.as_str().to_string(),
                stream.worker.as_str().to_string(),
                stream
                    .verifier
                    .as_ref()
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_default(),
                stream.total_deposit.to_string(),
                stream.progress.to_string(),
                ledger::earned(&stream).to_string(),
                stream.withdrawn.to_string(),
                withdrawable,
                stream.active.to_string(),
                stream.finalized.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes the audit trail to CSV.
    pub fn write_audit<W: Write>(&self, writer: W) -> Result<()> {
        self.controller.audit().write_csv(writer)
    }
}

impl Default for JournalRunner {
    fn default() -> Self {
        Self::new()
    }
}
