//! Buffered bulk document loading
//!
//! Each collection gets a subpool of insertion workers fed round-robin
//! from its document stream over bounded channels, so a slow server
//! stalls the reader instead of growing memory. Maintain-insertion-order
//! pins the subpool to one worker and switches to ordered writes, which
//! stop the collection at the first failure. Ignorable per-document
//! failures (duplicate key, validation failure, unacknowledged write) are
//! logged and skipped unless stop-on-error converts them into a hard
//! stop; the timeseries mixed-schema rejection triggers a collMod and one
//! retry of the batch.

use std::io::Read;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;

use bson::doc;

use crate::bsonio::BsonSource;
use crate::catalog::Namespace;
use crate::metadata::MIXED_SCHEMA_OPTION;
use crate::observability::Logger;
use crate::server::{ServerError, ServerSession};

use super::errors::{RestoreError, RestoreResult};
use super::options::RestoreOptions;

/// Counters for one collection's load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertStats {
    pub inserted: u64,
    pub failed: u64,
}

impl InsertStats {
    fn merge(&mut self, other: InsertStats) {
        self.inserted += other.inserted;
        self.failed += other.failed;
    }
}

/// Loads one collection's document stream.
pub struct BulkLoader<'a> {
    session: &'a dyn ServerSession,
    /// Insert target (the bucket collection for timeseries)
    target: Namespace,
    /// collMod target for the mixed-schema retry, when the target is a
    /// bucket collection
    coll_mod: Option<Namespace>,
    options: &'a RestoreOptions,
}

impl<'a> BulkLoader<'a> {
    pub fn new(
        session: &'a dyn ServerSession,
        target: Namespace,
        coll_mod: Option<Namespace>,
        options: &'a RestoreOptions,
    ) -> Self {
        Self {
            session,
            target,
            coll_mod,
            options,
        }
    }

    /// Streams documents from `reader` into the target collection.
    pub fn load<R: Read>(&self, reader: R) -> RestoreResult<InsertStats> {
        if self.options.maintain_insertion_order {
            self.load_ordered(reader)
        } else {
            self.load_parallel(reader)
        }
    }

    fn load_ordered<R: Read>(&self, reader: R) -> RestoreResult<InsertStats> {
        let mut source = BsonSource::new(reader);
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(self.options.bulk_buffer_size);
        let mut stats = InsertStats::default();
        let mut drained = false;

        while !drained {
            batch.clear();
            while batch.len() < self.options.bulk_buffer_size {
                match source.read_next_raw()? {
                    Some(raw) => batch.push(raw.to_vec()),
                    None => {
                        drained = true;
                        break;
                    }
                }
            }
            if batch.is_empty() {
                break;
            }

            let result = self.insert_batch(&batch, true)?;
            stats.inserted += result.inserted;
            let had_failure = !result.failures.is_empty();
            for failure in &result.failures {
                self.check_failure(failure.is_ignorable(), &failure.to_string())?;
                stats.failed += 1;
            }
            if had_failure {
                // Ordered writes abandon the remainder of the stream
                self.options.logger.warn(
                    "RESTORE_ORDERED_STOP",
                    &[("namespace", &self.target.to_string())],
                );
                break;
            }
        }
        Ok(stats)
    }

    fn load_parallel<R: Read>(&self, reader: R) -> RestoreResult<InsertStats> {
        let worker_count = self.options.effective_insertion_workers();
        let mut source = BsonSource::new(reader);

        let results: RestoreResult<Vec<InsertStats>> = thread::scope(|scope| {
            let mut senders: Vec<SyncSender<Vec<u8>>> = Vec::with_capacity(worker_count);
            let mut handles = Vec::with_capacity(worker_count);

            for _ in 0..worker_count {
                // One bulk buffer of slack per worker
                let (sender, receiver): (SyncSender<Vec<u8>>, Receiver<Vec<u8>>) =
                    sync_channel(self.options.bulk_buffer_size);
                senders.push(sender);
                handles.push(scope.spawn(move || self.insertion_worker(receiver)));
            }

            // Round-robin distribution across the subpool
            let mut next = 0usize;
            let mut read_error = None;
            loop {
                match source.read_next_raw() {
                    Ok(Some(raw)) => {
                        if senders[next % worker_count].send(raw.to_vec()).is_err() {
                            // Worker failed; its error surfaces at join
                            break;
                        }
                        next += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        read_error = Some(RestoreError::from(e));
                        break;
                    }
                }
            }
            drop(senders);

            let mut collected = Vec::with_capacity(worker_count);
            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(stats)) => collected.push(stats),
                    Ok(Err(e)) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(_) => {
                        if first_error.is_none() {
                            first_error =
                                Some(RestoreError::write("insertion worker panicked"));
                        }
                    }
                }
            }
            if let Some(e) = read_error {
                return Err(e);
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            Ok(collected)
        });

        let mut stats = InsertStats::default();
        for worker_stats in results? {
            stats.merge(worker_stats);
        }
        Ok(stats)
    }

    fn insertion_worker(&self, receiver: Receiver<Vec<u8>>) -> RestoreResult<InsertStats> {
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(self.options.bulk_buffer_size);
        let mut stats = InsertStats::default();

        loop {
            match receiver.recv() {
                Ok(raw) => {
                    batch.push(raw);
                    if batch.len() >= self.options.bulk_buffer_size {
                        self.flush(&mut batch, &mut stats)?;
                    }
                }
                Err(_) => {
                    self.flush(&mut batch, &mut stats)?;
                    return Ok(stats);
                }
            }
        }
    }

    fn flush(&self, batch: &mut Vec<Vec<u8>>, stats: &mut InsertStats) -> RestoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let result = self.insert_batch(batch, false)?;
        stats.inserted += result.inserted;
        for failure in &result.failures {
            self.check_failure(failure.is_ignorable(), &failure.to_string())?;
            stats.failed += 1;
        }
        batch.clear();
        Ok(())
    }

    /// One bulk write, with the mixed-schema collMod-and-retry recovery.
    fn insert_batch(
        &self,
        batch: &[Vec<u8>],
        ordered: bool,
    ) -> RestoreResult<crate::server::BulkResult> {
        match self.session.insert_many(
            &self.target,
            batch,
            ordered,
            self.options.bypass_document_validation,
        ) {
            Ok(result) => Ok(result),
            Err(e) if e.is_mixed_schema_rejection() && self.coll_mod.is_some() => {
                self.recover_mixed_schema(&e)?;
                self.session
                    .insert_many(
                        &self.target,
                        batch,
                        ordered,
                        self.options.bypass_document_validation,
                    )
                    .map_err(RestoreError::from)
            }
            Err(e) => Err(RestoreError::from(e)),
        }
    }

    fn recover_mixed_schema(&self, cause: &ServerError) -> RestoreResult<()> {
        let ts_ns = self.coll_mod.as_ref().expect("checked by caller");
        self.options.logger.warn(
            "RESTORE_MIXED_SCHEMA_RETRY",
            &[
                ("namespace", &ts_ns.to_string()),
                ("cause", cause.message()),
            ],
        );
        let mut coll_mod = doc! {"collMod": ts_ns.coll()};
        coll_mod.insert(MIXED_SCHEMA_OPTION, true);
        self.session.run_command(ts_ns.db(), coll_mod)?;
        Ok(())
    }

    fn check_failure(&self, ignorable: bool, description: &str) -> RestoreResult<()> {
        if !ignorable {
            return Err(RestoreError::write(format!(
                "{}: {}",
                self.target, description
            )));
        }
        if self.options.stop_on_error {
            return Err(RestoreError::write(format!(
                "{}: {} (stopping on first error)",
                self.target, description
            )));
        }
        log_ignored(&self.options.logger, &self.target, description);
        Ok(())
    }
}

fn log_ignored(logger: &Logger, ns: &Namespace, description: &str) {
    logger.info(
        "RESTORE_WRITE_SKIPPED",
        &[("namespace", &ns.to_string()), ("error", description)],
    );
}
