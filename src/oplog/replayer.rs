//! Oplog replayer
//!
//! Reads entries from a dump's oplog stream, runs each through the filter
//! and transform stages, and applies batches through the server's atomic
//! multi-op primitive. The first apply error stops replay; a resharding
//! entry anywhere in the stream is fatal before anything after it is
//! applied.

use std::io::Read;

use bson::{Document, Timestamp};

use crate::bsonio::BsonSource;
use crate::observability::Logger;
use crate::server::{cmp_timestamps, ServerSession, ServerVersion};

use super::entry::OplogEntry;
use super::errors::{OplogError, OplogResult};
use super::filter::{is_resharding_related, should_skip};
use super::transform::transform;

/// Documents per apply-ops batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Entries per apply-ops call
    pub batch_size: usize,
    /// Exclusive upper bound; entries at or past it are not applied
    pub limit: Option<Timestamp>,
    pub logger: Logger,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            logger: Logger::default(),
        }
    }
}

/// Replay outcome counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub entries_read: u64,
    pub entries_skipped: u64,
    pub entries_applied: u64,
    /// Newest timestamp seen in the stream, filtered entries included
    pub latest_seen: Option<Timestamp>,
}

/// The replayer: `IDLE -> READING -> (FILTER -> TRANSFORM -> APPLY)* -> DONE`.
pub struct OplogReplayer<'a> {
    session: &'a dyn ServerSession,
    server_version: ServerVersion,
    options: ReplayOptions,
}

impl<'a> OplogReplayer<'a> {
    pub fn new(
        session: &'a dyn ServerSession,
        server_version: ServerVersion,
        options: ReplayOptions,
    ) -> Self {
        Self {
            session,
            server_version,
            options,
        }
    }

    /// Replays an oplog stream to completion or first error.
    pub fn replay<R: Read>(&self, reader: R) -> OplogResult<ReplayStats> {
        let mut source = BsonSource::new(reader);
        let mut stats = ReplayStats::default();
        let mut batch: Vec<Document> = Vec::with_capacity(self.options.batch_size);

        while let Some(doc) = source.read_next()? {
            stats.entries_read += 1;
            let entry = OplogEntry::from_document(doc)?;

            // Timestamps advance on every entry, including ones we drop
            if let Some(ts) = entry.timestamp() {
                let newer = stats
                    .latest_seen
                    .map(|seen| cmp_timestamps(ts, seen) == std::cmp::Ordering::Greater)
                    .unwrap_or(true);
                if newer {
                    stats.latest_seen = Some(ts);
                }
                if let Some(limit) = self.options.limit {
                    if cmp_timestamps(ts, limit) != std::cmp::Ordering::Less {
                        self.options.logger.info(
                            "OPLOG_LIMIT_REACHED",
                            &[("limit", &format!("{}:{}", limit.time, limit.increment))],
                        );
                        break;
                    }
                }
            }

            if is_resharding_related(&entry) {
                return Err(OplogError::resharding(
                    "cannot replay oplog while a resharding operation is in progress",
                ));
            }

            if should_skip(&entry) {
                stats.entries_skipped += 1;
                continue;
            }

            let applied_count = {
                let transformed = transform(entry, self.server_version)?;
                let count = transformed.len() as u64;
                batch.extend(transformed);
                count
            };
            stats.entries_applied += applied_count;

            if batch.len() >= self.options.batch_size {
                self.flush(&mut batch)?;
            }
        }

        self.flush(&mut batch)?;
        self.options.logger.info(
            "OPLOG_REPLAY_DONE",
            &[
                ("applied", &stats.entries_applied.to_string()),
                ("read", &stats.entries_read.to_string()),
                ("skipped", &stats.entries_skipped.to_string()),
            ],
        );
        Ok(stats)
    }

    fn flush(&self, batch: &mut Vec<Document>) -> OplogResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(batch);
        self.session.apply_ops(&entries)?;
        Ok(())
    }
}
