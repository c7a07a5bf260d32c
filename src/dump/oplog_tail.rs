//! Oplog capture around a dump
//!
//! The start position is recorded before any collection cursor opens and
//! the end position after all of them close; the entries between the two
//! make the dump point-in-time consistent when replayed. A resharding
//! operation discovered at either checkpoint, or in the stream itself,
//! fails the dump with its distinctive error.

use bson::{Document, Timestamp};

use crate::catalog::Namespace;
use crate::oplog::RESHARDING_COLLECTIONS;
use crate::server::{cmp_timestamps, ServerSession};

use super::errors::{DumpError, DumpResult};
use super::output::CollectionSink;

/// Returns true when any resharding bookkeeping collection exists.
pub fn resharding_active(session: &dyn ServerSession) -> DumpResult<bool> {
    for coll in RESHARDING_COLLECTIONS {
        let ns = Namespace::new("config", coll);
        if session.collection_exists(&ns)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Records the replication-log position before the data copy starts.
pub fn record_start(session: &dyn ServerSession) -> DumpResult<Timestamp> {
    Ok(session.latest_oplog_position()?)
}

/// Streams the oplog from `start` through the position current at call
/// time into `sink`. Returns the number of entries written.
pub fn dump_oplog(
    session: &dyn ServerSession,
    start: Timestamp,
    sink: &mut CollectionSink,
) -> DumpResult<u64> {
    // The "after" checkpoint: all collection cursors are closed by now
    let end = session.latest_oplog_position()?;

    let mut cursor = session.oplog_since(start)?;
    let mut written = 0u64;
    while let Some(raw) = cursor.next_raw()? {
        let entry = Document::from_reader(&mut &raw[..])
            .map_err(|e| DumpError::worker(format!("undecodable oplog entry: {}", e)))?;

        if let Ok(ts) = entry.get_timestamp("ts") {
            if cmp_timestamps(ts, end) == std::cmp::Ordering::Greater {
                break;
            }
        }

        // A resharding operation starting mid-dump poisons the capture
        if let Ok(ns) = entry.get_str("ns") {
            if let Some(coll) = ns.strip_prefix("config.") {
                if RESHARDING_COLLECTIONS.contains(&coll) {
                    return Err(DumpError::resharding());
                }
            }
        }

        sink.write_raw(&raw)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsonio::{BsonSink, BsonSource};
    use crate::server::MemoryServer;
    use bson::doc;

    fn discard_sink() -> CollectionSink {
        let writer: Box<dyn std::io::Write + Send> = Box::new(std::io::sink());
        CollectionSink::File(BsonSink::new(writer))
    }

    #[test]
    fn test_resharding_active_detection() {
        let server = MemoryServer::new();
        assert!(!resharding_active(&server).unwrap());

        server.seed_collection(
            &Namespace::new("config", "reshardingOperations"),
            doc! {},
            vec![],
        );
        assert!(resharding_active(&server).unwrap());
    }

    #[test]
    fn test_dump_oplog_respects_window() {
        let server = MemoryServer::new();
        for t in 1..=5u32 {
            server.push_oplog_entry(doc! {
                "ts": Timestamp { time: t, increment: 0 },
                "op": "i",
                "ns": "db1.users",
                "o": {"_id": t as i32},
            });
        }

        let start = Timestamp { time: 2, increment: 0 };
        let mut sink = discard_sink();
        let written = dump_oplog(&server, start, &mut sink).unwrap();
        // Entries strictly after the start checkpoint
        assert_eq!(written, 3);
    }

    #[test]
    fn test_dump_oplog_fails_on_resharding_entry() {
        let server = MemoryServer::new();
        server.push_oplog_entry(doc! {
            "ts": Timestamp { time: 1, increment: 0 },
            "op": "i",
            "ns": "config.reshardingOperations",
            "o": {"_id": 1},
        });

        let mut sink = discard_sink();
        let err = dump_oplog(&server, Timestamp { time: 0, increment: 0 }, &mut sink)
            .unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_RESHARDING");
        assert_eq!(
            err.message(),
            "cannot dump with oplog while resharding operation is in progress"
        );
    }

    #[test]
    fn test_oplog_roundtrips_through_sink() {
        let server = MemoryServer::new();
        server.push_oplog_entry(doc! {
            "ts": Timestamp { time: 1, increment: 0 },
            "op": "i",
            "ns": "db1.users",
            "o": {"_id": 1},
        });

        let mut sink = discard_sink();
        let written =
            dump_oplog(&server, Timestamp { time: 0, increment: 0 }, &mut sink).unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_source_reads_dumped_entries() {
        let mut bytes = Vec::new();
        doc! {"ts": Timestamp { time: 1, increment: 0 }, "op": "i", "ns": "a.b", "o": {}}
            .to_writer(&mut bytes)
            .unwrap();
        let mut source = BsonSource::new(&bytes[..]);
        assert!(source.read_next().unwrap().is_some());
    }
}
