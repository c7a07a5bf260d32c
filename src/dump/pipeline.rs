//! The dump pipeline
//!
//! Enumerate, plan, then copy: a fixed pool of collection workers drains
//! the intent queue, each worker owning one namespace end to end. Archive
//! mode funnels every worker through the single serializer thread; the
//! prelude (complete with per-namespace metadata) goes first in both
//! modes. Users, roles, and the auth-version doc stream after the user
//! data; the oplog window brackets the whole copy.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use bson::Document;

use crate::archive::{ArchiveMultiplexer, ArchivePrelude};
use crate::bsonio::{create_writer, write_file_bytes, BsonSink};
use crate::catalog::Namespace;
use crate::intents::{Intent, IntentKind};
use crate::metadata::CollectionMetadata;
use crate::server::{CollectionKind, FindOptions, ServerSession};

use super::enumerate::build_plan;
use super::errors::{DumpError, DumpResult};
use super::oplog_tail::{dump_oplog, record_start, resharding_active};
use super::options::DumpOptions;
use super::output::{
    metadata_file_path, oplog_file_path, prelude_file_path, CollectionSink, DumpTarget,
};

/// Counters reported after a dump.
#[derive(Debug, Clone, Default)]
pub struct DumpStats {
    pub collections: u64,
    pub documents: u64,
    pub oplog_entries: u64,
}

/// The archive namespace carrying the replication log.
fn oplog_namespace() -> Namespace {
    Namespace::new("local", "oplog.rs")
}

/// An auxiliary stream dumped after the collection workers finish.
struct SpecialStream {
    /// The server namespace to scan
    scan_ns: Namespace,
    /// The namespace it is written under
    out_ns: Namespace,
    /// Whether a metadata file accompanies the stream
    with_metadata: bool,
}

enum OutputMode {
    Directory {
        root: PathBuf,
        gzip: bool,
    },
    Archive {
        mux: Arc<ArchiveMultiplexer<Box<dyn Write + Send>>>,
    },
}

impl OutputMode {
    fn sink_for(&self, ns: &Namespace, gzip: bool) -> DumpResult<CollectionSink> {
        match self {
            OutputMode::Directory { root, .. } => CollectionSink::file(root, ns, gzip),
            OutputMode::Archive { mux } => Ok(CollectionSink::Archive(mux.sink(ns.clone()))),
        }
    }
}

/// The dump tool's core.
pub struct DumpPipeline {
    session: Arc<dyn ServerSession>,
    options: DumpOptions,
}

impl DumpPipeline {
    pub fn new(session: Arc<dyn ServerSession>, options: DumpOptions) -> Self {
        Self { session, options }
    }

    /// Runs the dump against a directory tree or archive stream.
    pub fn run(&self, target: DumpTarget) -> DumpResult<DumpStats> {
        self.options.validate()?;
        let info = self.session.info()?;

        if self.options.oplog {
            if !info.has_oplog() {
                return Err(DumpError::validation(
                    "oplog capture requires a replica set source",
                ));
            }
            if resharding_active(self.session.as_ref())? {
                return Err(DumpError::resharding());
            }
        }

        let mut plan = build_plan(self.session.as_ref(), &self.options)?;
        let specials = self.special_streams(info.managed_proxy)?;

        self.options.logger.info(
            "DUMP_PLANNED",
            &[("collections", &plan.len().to_string())],
        );

        // The prelude must be complete before any body bytes flow
        let prelude = self.build_prelude(&info.version.to_string(), &plan, &specials)?;

        let mode = match target {
            DumpTarget::Directory(root) => {
                write_file_bytes(
                    &prelude_file_path(&root, self.options.gzip),
                    &prelude.to_json_bytes()?,
                    self.options.gzip,
                )?;
                OutputMode::Directory {
                    root,
                    gzip: self.options.gzip,
                }
            }
            DumpTarget::Archive(writer) => OutputMode::Archive {
                mux: Arc::new(ArchiveMultiplexer::start(writer, &prelude, 64)?),
            },
        };

        // Start position first; no collection cursor is open yet
        let oplog_start = if self.options.oplog {
            Some(record_start(self.session.as_ref())?)
        } else {
            None
        };

        let mut stats = self.run_workers(&mode, plan.drain())?;

        for special in &specials {
            stats.documents += self.dump_special(&mode, special)?;
        }

        if let Some(start) = oplog_start {
            if resharding_active(self.session.as_ref())? {
                return Err(DumpError::resharding());
            }
            let mut sink = match &mode {
                OutputMode::Directory { root, gzip } => {
                    let path = oplog_file_path(root, *gzip);
                    let writer = create_writer(&path, *gzip)?;
                    CollectionSink::File(BsonSink::new(writer))
                }
                OutputMode::Archive { mux } => {
                    CollectionSink::Archive(mux.sink(oplog_namespace()))
                }
            };
            stats.oplog_entries = dump_oplog(self.session.as_ref(), start, &mut sink)?;
            sink.finish()?;
            self.options.logger.info(
                "DUMP_OPLOG_CAPTURED",
                &[("entries", &stats.oplog_entries.to_string())],
            );
        }

        if let OutputMode::Archive { mux } = mode {
            let mux = Arc::try_unwrap(mux)
                .map_err(|_| DumpError::output("archive serializer still referenced"))?;
            mux.finish()?;
        }

        self.options.logger.info(
            "DUMP_DONE",
            &[
                ("collections", &stats.collections.to_string()),
                ("documents", &stats.documents.to_string()),
            ],
        );
        Ok(stats)
    }

    /// Users, roles, and the auth-version doc, when in scope.
    fn special_streams(&self, managed_proxy: bool) -> DumpResult<Vec<SpecialStream>> {
        // A managed proxy owns authentication outright
        if managed_proxy {
            return Ok(Vec::new());
        }

        let mut streams = Vec::new();
        let full_dump = self.options.db.is_none();
        let scoped_with_auth = self.options.db.is_some() && self.options.dump_users_and_roles;
        if !full_dump && !scoped_with_auth {
            return Ok(Vec::new());
        }

        let sources = [
            ("system.users", true),
            ("system.roles", true),
            ("system.version", false),
        ];
        for (coll, with_metadata) in sources {
            let scan_ns = Namespace::new("admin", coll);
            if !self.session.collection_exists(&scan_ns)? {
                continue;
            }
            let out_ns = if full_dump {
                scan_ns.clone()
            } else {
                Namespace::new(
                    self.options.db.as_deref().expect("scoped"),
                    format!("$admin.{}", coll),
                )
            };
            streams.push(SpecialStream {
                scan_ns,
                out_ns,
                with_metadata,
            });
        }
        Ok(streams)
    }

    fn build_prelude(
        &self,
        server_version: &str,
        plan: &crate::intents::IntentManager,
        specials: &[SpecialStream],
    ) -> DumpResult<ArchivePrelude> {
        let mut prelude = ArchivePrelude::new(server_version);
        for intent in plan.iter() {
            let metadata = intent.metadata().expect("enumeration attaches metadata");
            let metadata_json = String::from_utf8(metadata.to_json_bytes()?)
                .map_err(|_| DumpError::enumeration("metadata JSON is not UTF-8"))?;
            let stream_ns = stream_namespace(intent);
            prelude.push(
                stream_ns.db(),
                stream_ns.coll(),
                metadata_json,
                intent.size_hint(),
            );
        }
        for special in specials {
            let size = self.session.collection_byte_size(&special.scan_ns)?;
            prelude.push(special.out_ns.db(), special.out_ns.coll(), String::new(), size);
        }
        if self.options.oplog {
            let oplog_ns = oplog_namespace();
            prelude.push(oplog_ns.db(), oplog_ns.coll(), String::new(), 0);
        }
        Ok(prelude)
    }

    fn run_workers(&self, mode: &OutputMode, intents: Vec<Intent>) -> DumpResult<DumpStats> {
        let queue = Arc::new(Mutex::new(intents));
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_count = self.options.num_parallel_collections;

        let results: Vec<DumpResult<DumpStats>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(worker_count);
            for _ in 0..worker_count {
                let queue = Arc::clone(&queue);
                let cancel = Arc::clone(&cancel);
                handles.push(scope.spawn(move || {
                    let mut local = DumpStats::default();
                    loop {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let intent = {
                            let mut queue = queue.lock().expect("dump queue poisoned");
                            if queue.is_empty() {
                                None
                            } else {
                                Some(queue.remove(0))
                            }
                        };
                        let Some(intent) = intent else { break };

                        match self.dump_intent(mode, &intent) {
                            Ok(documents) => {
                                local.collections += 1;
                                local.documents += documents;
                            }
                            Err(e) => {
                                cancel.store(true, Ordering::Relaxed);
                                return Err(e);
                            }
                        }
                    }
                    Ok(local)
                }));
            }
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(DumpError::worker("collection worker panicked")),
                })
                .collect()
        });

        // First error wins; later ones were consequences of the cancel
        let mut stats = DumpStats::default();
        for result in results {
            let local = result?;
            stats.collections += local.collections;
            stats.documents += local.documents;
        }
        Ok(stats)
    }

    fn dump_intent(&self, mode: &OutputMode, intent: &Intent) -> DumpResult<u64> {
        let metadata = intent.metadata().expect("enumeration attaches metadata");
        let stream_ns = stream_namespace(intent);
        let gzip = self.options.gzip;

        self.options.logger.info(
            "DUMP_COLLECTION",
            &[("namespace", &intent.namespace().to_string())],
        );

        if let OutputMode::Directory { root, gzip } = mode {
            let metadata_path = metadata_file_path(root, intent.namespace(), *gzip);
            write_file_bytes(&metadata_path, &metadata.to_json_bytes()?, *gzip)?;
        }

        // Views carry no documents; archives still declare and close them
        if intent.kind() == IntentKind::View {
            if let OutputMode::Archive { mux } = mode {
                CollectionSink::Archive(mux.sink(stream_ns)).finish()?;
            }
            return Ok(0);
        }

        let filter = self.scan_filter(intent, metadata);
        let mut cursor = self.session.find(
            &stream_ns,
            FindOptions {
                filter,
                // Leave the planner alone; forced hints cause collection
                // scans on engines where they are counterproductive
                hint: None,
            },
        )?;

        let mut sink = mode.sink_for(&stream_ns, gzip)?;
        let mut documents = 0u64;
        while let Some(raw) = cursor.next_raw()? {
            sink.write_raw(&raw)?;
            documents += 1;
        }
        sink.finish()?;
        Ok(documents)
    }

    /// The filter pushed into the collection scan, with the timeseries
    /// metadata field mapped onto its bucket spelling.
    fn scan_filter(&self, intent: &Intent, metadata: &CollectionMetadata) -> Option<Document> {
        let query = self.options.query.clone()?;
        if intent.kind() != IntentKind::Timeseries {
            return Some(query);
        }
        let meta_field = metadata
            .options
            .get_document("timeseries")
            .ok()
            .and_then(|ts| ts.get_str("metaField").ok())?
            .to_string();

        let mut translated = Document::new();
        for (key, value) in &query {
            let bucket_key = if key == &meta_field {
                "meta".to_string()
            } else if let Some(rest) = key.strip_prefix(&format!("{}.", meta_field)) {
                format!("meta.{}", rest)
            } else {
                key.clone()
            };
            translated.insert(bucket_key, value.clone());
        }
        Some(translated)
    }

    fn dump_special(&self, mode: &OutputMode, special: &SpecialStream) -> DumpResult<u64> {
        self.options.logger.info(
            "DUMP_SPECIAL",
            &[("namespace", &special.out_ns.to_string())],
        );

        if special.with_metadata {
            if let OutputMode::Directory { root, gzip } = mode {
                let mut metadata = CollectionMetadata::empty(special.out_ns.coll());
                metadata.kind = CollectionKind::Collection;
                let path = metadata_file_path(root, &special.out_ns, *gzip);
                write_file_bytes(&path, &metadata.to_json_bytes()?, *gzip)?;
            }
        }

        let mut cursor = self
            .session
            .find(&special.scan_ns, FindOptions::default())?;
        let mut sink = mode.sink_for(&special.out_ns, self.options.gzip)?;
        let mut documents = 0u64;
        while let Some(raw) = cursor.next_raw()? {
            sink.write_raw(&raw)?;
            documents += 1;
        }
        sink.finish()?;
        Ok(documents)
    }
}

/// The namespace a collection intent's bytes stream under: the bucket
/// collection for timeseries, the namespace itself otherwise.
fn stream_namespace(intent: &Intent) -> Namespace {
    match intent.kind() {
        IntentKind::Timeseries => intent.namespace().bucket(),
        _ => intent.namespace().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Logger;
    use crate::server::MemoryServer;
    use bson::doc;
    use tempfile::TempDir;

    fn quiet_options() -> DumpOptions {
        DumpOptions {
            logger: Logger::quiet(),
            ..DumpOptions::default()
        }
    }

    fn seeded() -> Arc<MemoryServer> {
        let server = MemoryServer::new();
        server.seed_collection(
            &Namespace::new("db1", "users"),
            doc! {},
            vec![doc! {"_id": 1, "name": "a"}, doc! {"_id": 2, "name": "b"}],
        );
        server.seed_collection(
            &Namespace::new("db1", "orders"),
            doc! {},
            vec![doc! {"_id": 10}],
        );
        Arc::new(server)
    }

    #[test]
    fn test_directory_dump_layout() {
        let server = seeded();
        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(server, quiet_options());

        let stats = pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();
        assert_eq!(stats.collections, 2);
        assert_eq!(stats.documents, 3);

        assert!(dir.path().join("prelude.json").exists());
        assert!(dir.path().join("db1/users.bson").exists());
        assert!(dir.path().join("db1/users.metadata.json").exists());
        assert!(dir.path().join("db1/orders.bson").exists());
        assert!(dir.path().join("db1/orders.metadata.json").exists());
    }

    #[test]
    fn test_directory_dump_gzip_layout() {
        let server = seeded();
        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(
            server,
            DumpOptions {
                gzip: true,
                ..quiet_options()
            },
        );

        pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();
        assert!(dir.path().join("prelude.json.gz").exists());
        assert!(dir.path().join("db1/users.bson.gz").exists());
        assert!(dir.path().join("db1/users.metadata.json.gz").exists());
    }

    #[test]
    fn test_archive_dump_readable() {
        use crate::archive::ArchiveReader;
        let server = seeded();
        let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct SharedWriter(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let pipeline = DumpPipeline::new(server, quiet_options());
        let stats = pipeline
            .run(DumpTarget::Archive(Box::new(SharedWriter(Arc::clone(&buffer)))))
            .unwrap();
        assert_eq!(stats.collections, 2);

        let bytes = buffer.lock().unwrap().clone();
        let mut reader = ArchiveReader::new(&bytes[..]);
        let prelude = reader.read_prelude().unwrap().clone();
        assert_eq!(prelude.namespaces.len(), 2);

        let bodies = reader.read_namespace_bodies().unwrap();
        assert!(bodies.contains_key(&Namespace::new("db1", "users")));
        assert!(bodies.contains_key(&Namespace::new("db1", "orders")));
    }

    #[test]
    fn test_oplog_dump_requires_replica_set() {
        let server = Arc::new(
            MemoryServer::new().with_topology(crate::server::Topology::Standalone),
        );
        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(
            server,
            DumpOptions {
                oplog: true,
                ..quiet_options()
            },
        );
        let err = pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_VALIDATION");
    }

    #[test]
    fn test_oplog_dump_fails_when_resharding_at_start() {
        let server = seeded();
        server.seed_collection(
            &Namespace::new("config", "reshardingOperations"),
            doc! {},
            vec![],
        );
        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(
            server,
            DumpOptions {
                oplog: true,
                ..quiet_options()
            },
        );
        let err = pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_RESHARDING");
    }

    #[test]
    fn test_oplog_capture_writes_stream() {
        let server = seeded();
        server.enable_oplog_recording();
        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(
            Arc::clone(&server) as Arc<dyn ServerSession>,
            DumpOptions {
                oplog: true,
                ..quiet_options()
            },
        );

        // Writes that land between the start and end checkpoints
        server
            .insert_many(
                &Namespace::new("db1", "users"),
                &[{
                    let mut raw = Vec::new();
                    doc! {"_id": 99}.to_writer(&mut raw).unwrap();
                    raw
                }],
                false,
                false,
            )
            .unwrap();

        let stats = pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();
        assert!(dir.path().join("oplog.bson").exists());
        // The pre-dump insert is in the window only if it happened after
        // the recorded start; this one happened before run(), so the
        // stream may be empty, but the file always exists
        let _ = stats.oplog_entries;
    }

    #[test]
    fn test_full_dump_includes_users_and_roles() {
        let server = seeded();
        server.seed_collection(
            &Namespace::new("admin", "system.users"),
            doc! {},
            vec![doc! {"_id": "db1.alice", "user": "alice", "db": "db1"}],
        );
        server.seed_collection(
            &Namespace::new("admin", "system.version"),
            doc! {},
            vec![doc! {"_id": "authSchema", "currentVersion": 5}],
        );

        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(server, quiet_options());
        pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();

        assert!(dir.path().join("admin/system.users.bson").exists());
        assert!(dir.path().join("admin/system.users.metadata.json").exists());
        assert!(dir.path().join("admin/system.version.bson").exists());
        // The auth-version doc needs no metadata file
        assert!(!dir.path().join("admin/system.version.metadata.json").exists());
    }

    #[test]
    fn test_scoped_dump_users_and_roles_uses_dollar_admin_stems() {
        let server = seeded();
        server.seed_collection(
            &Namespace::new("admin", "system.users"),
            doc! {},
            vec![doc! {"_id": "db1.alice", "user": "alice", "db": "db1"}],
        );

        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(
            server,
            DumpOptions {
                db: Some("db1".into()),
                dump_users_and_roles: true,
                ..quiet_options()
            },
        );
        pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();

        assert!(dir.path().join("db1/%24admin.system.users.bson").exists());
    }

    #[test]
    fn test_timeseries_dump_writes_bucket_stream() {
        let server = MemoryServer::new();
        server
            .run_command(
                "db1",
                doc! {"create": "weather", "timeseries": {"timeField": "t", "metaField": "m"}},
            )
            .unwrap();
        let bucket = Namespace::new("db1", "system.buckets.weather");
        server
            .insert_many(
                &bucket,
                &[{
                    let mut raw = Vec::new();
                    doc! {"_id": 1, "meta": {"site": "x"}}.to_writer(&mut raw).unwrap();
                    raw
                }],
                false,
                false,
            )
            .unwrap();

        let dir = TempDir::new().unwrap();
        let pipeline = DumpPipeline::new(Arc::new(server), quiet_options());
        pipeline
            .run(DumpTarget::Directory(dir.path().to_path_buf()))
            .unwrap();

        // One bucket data file, one metadata file under the user name
        assert!(dir.path().join("db1/system.buckets.weather.bson").exists());
        assert!(dir.path().join("db1/weather.metadata.json").exists());
        assert!(!dir.path().join("db1/weather.bson").exists());
        assert!(!dir
            .path()
            .join("db1/system.buckets.weather.metadata.json")
            .exists());
    }
}
