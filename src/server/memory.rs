//! In-memory server
//!
//! A self-contained implementation of the driver seam backed by process
//! memory. It honors the command shapes the pipelines emit (create, drop,
//! collMod, createIndexes, applyOps, the users/roles merge) closely enough
//! to exercise every dump/restore path end to end, and it is what the CLI
//! dry-run mode and the integration suites run against.

use std::collections::BTreeMap;
use std::sync::Mutex;

use bson::{doc, Bson, Document, Timestamp};
use uuid::Uuid;

use crate::catalog::{Namespace, BUCKET_PREFIX};

use super::errors::{ServerError, ServerResult, WriteFailure, DUPLICATE_KEY, MIXED_SCHEMA_NOT_ALLOWED};
use super::session::{
    binary_to_uuid_hex, cmp_timestamps, BulkResult, CollectionKind, CollectionSpec,
    DocumentCursor, FindOptions, ServerInfo, ServerSession, Topology, VecCursor,
};
use super::version::ServerVersion;

#[derive(Debug, Clone)]
struct CollectionState {
    kind: CollectionKind,
    options: Document,
    uuid: Option<String>,
    documents: Vec<Document>,
    indexes: Vec<Document>,
    /// collMod `timeseriesBucketsMayHaveMixedSchemaData` state
    mixed_schema_allowed: bool,
    /// Emulation knob: inserts fail with the mixed-schema code until the
    /// flag above is turned on
    reject_mixed_schema: bool,
}

impl CollectionState {
    fn new(kind: CollectionKind, options: Document, uuid: Option<String>) -> Self {
        Self {
            kind,
            options,
            uuid,
            documents: Vec::new(),
            indexes: Vec::new(),
            mixed_schema_allowed: false,
            reject_mixed_schema: false,
        }
    }
}

/// A read-only copy of one collection's state, for assertions and tooling.
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub kind: CollectionKind,
    pub options: Document,
    pub uuid: Option<String>,
    pub documents: Vec<Document>,
    pub indexes: Vec<Document>,
    pub mixed_schema_allowed: bool,
}

#[derive(Default)]
struct ServerState {
    databases: BTreeMap<String, BTreeMap<String, CollectionState>>,
    oplog: Vec<Document>,
    oplog_clock: u32,
    record_oplog: bool,
}

/// The in-memory server.
pub struct MemoryServer {
    state: Mutex<ServerState>,
    version: ServerVersion,
    topology: Topology,
    managed_proxy: bool,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// A replica-set server at the newest supported version.
    pub fn new() -> Self {
        Self::with_version(ServerVersion::new(8, 0, 0))
    }

    /// A replica-set server at a specific version.
    pub fn with_version(version: ServerVersion) -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            version,
            topology: Topology::ReplicaSet,
            managed_proxy: false,
        }
    }

    /// Overrides the reported topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Marks the server as a managed proxy.
    pub fn with_managed_proxy(mut self) -> Self {
        self.managed_proxy = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().expect("memory server poisoned")
    }

    /// Turns on replication-log recording for subsequent writes.
    pub fn enable_oplog_recording(&self) {
        self.lock().record_oplog = true;
    }

    /// Appends a raw replication-log entry (test scaffolding).
    pub fn push_oplog_entry(&self, entry: Document) {
        self.lock().oplog.push(entry);
    }

    /// Makes inserts into `ns` fail with the mixed-schema code until the
    /// collection is collMod-ed to allow mixed-schema buckets.
    pub fn set_reject_mixed_schema(&self, ns: &Namespace) {
        let mut state = self.lock();
        if let Some(coll) = state
            .databases
            .get_mut(ns.db())
            .and_then(|d| d.get_mut(ns.coll()))
        {
            coll.reject_mixed_schema = true;
        }
    }

    /// Returns a copy of a collection's state, if it exists.
    pub fn snapshot(&self, ns: &Namespace) -> Option<CollectionSnapshot> {
        let state = self.lock();
        let coll = state.databases.get(ns.db())?.get(ns.coll())?;
        Some(CollectionSnapshot {
            kind: coll.kind,
            options: coll.options.clone(),
            uuid: coll.uuid.clone(),
            documents: coll.documents.clone(),
            indexes: coll.indexes.clone(),
            mixed_schema_allowed: coll.mixed_schema_allowed,
        })
    }

    /// Creates a collection directly (test scaffolding).
    pub fn seed_collection(&self, ns: &Namespace, options: Document, docs: Vec<Document>) {
        let mut state = self.lock();
        let coll = create_in_state(&mut state, ns, options, None)
            .expect("seed collection");
        coll.documents = docs;
    }

    /// Appends an index spec directly (test scaffolding).
    pub fn seed_index(&self, ns: &Namespace, index: Document) {
        let mut state = self.lock();
        if let Some(coll) = state
            .databases
            .get_mut(ns.db())
            .and_then(|d| d.get_mut(ns.coll()))
        {
            coll.indexes.push(index);
        }
    }

    fn next_timestamp(state: &mut ServerState) -> Timestamp {
        state.oplog_clock += 1;
        Timestamp {
            time: state.oplog_clock,
            increment: 0,
        }
    }

    fn record_insert(state: &mut ServerState, ns: &Namespace, document: &Document, uuid: &Option<String>) {
        if !state.record_oplog {
            return;
        }
        let ts = Self::next_timestamp(state);
        let mut entry = doc! {
            "ts": ts,
            "op": "i",
            "ns": ns.to_string(),
        };
        if let Some(hex) = uuid {
            if let Ok(binary) = super::session::uuid_hex_to_binary(hex) {
                entry.insert("ui", Bson::Binary(binary));
            }
        }
        entry.insert("o", document.clone());
        state.oplog.push(entry);
    }
}

fn create_in_state<'a>(
    state: &'a mut ServerState,
    ns: &Namespace,
    options: Document,
    uuid: Option<String>,
) -> ServerResult<&'a mut CollectionState> {
    let kind = if options.contains_key("viewOn") {
        CollectionKind::View
    } else if options.contains_key("timeseries") {
        CollectionKind::Timeseries
    } else {
        CollectionKind::Collection
    };

    let db = state.databases.entry(ns.db().to_string()).or_default();
    if db.contains_key(ns.coll()) {
        return Err(ServerError::command(
            48,
            format!("collection already exists: {}", ns),
        ));
    }

    let assigned_uuid = match kind {
        // Views have no storage and no UUID
        CollectionKind::View => None,
        _ => Some(uuid.unwrap_or_else(|| Uuid::new_v4().simple().to_string())),
    };

    let mut coll = CollectionState::new(kind, options, assigned_uuid);

    // Plain collections get the implicit primary key index unless the
    // options opt out of it or define clustering instead
    let auto_index_id = coll
        .options
        .get_bool("autoIndexId")
        .unwrap_or(true);
    let clustered = coll.options.contains_key("clusteredIndex");
    if kind == CollectionKind::Collection
        && !ns.is_bucket()
        && auto_index_id
        && !clustered
    {
        coll.indexes
            .push(doc! {"v": 2, "key": {"_id": 1}, "name": "_id_"});
    }

    db.insert(ns.coll().to_string(), coll);

    // A timeseries create also materializes its bucket collection
    if kind == CollectionKind::Timeseries {
        let bucket_name = format!("{}{}", BUCKET_PREFIX, ns.coll());
        if !db.contains_key(&bucket_name) {
            let bucket = CollectionState::new(
                CollectionKind::Collection,
                doc! {},
                Some(Uuid::new_v4().simple().to_string()),
            );
            db.insert(bucket_name, bucket);
        }
    }

    Ok(db.get_mut(ns.coll()).expect("just inserted"))
}

/// Minimal filter matcher: top-level and dotted-path equality.
fn matches_filter(document: &Document, filter: &Document) -> bool {
    for (key, expected) in filter {
        let actual = lookup_path(document, key);
        if actual != Some(expected) {
            return false;
        }
    }
    true
}

fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = document;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value);
        }
        current = value.as_document()?;
    }
    None
}

/// A stable identity key for a primary key value.
fn id_key(id: &Bson) -> Vec<u8> {
    let mut wrapper = Document::new();
    wrapper.insert("k", id.clone());
    doc_to_raw(&wrapper)
}

fn doc_to_raw(document: &Document) -> Vec<u8> {
    let mut raw = Vec::new();
    document
        .to_writer(&mut raw)
        .expect("in-memory document always encodes");
    raw
}

fn raw_to_doc(raw: &[u8]) -> ServerResult<Document> {
    Document::from_reader(&mut &raw[..])
        .map_err(|e| ServerError::connection(format!("undecodable document: {}", e)))
}

impl MemoryServer {
    fn handle_create(&self, db: &str, command: &Document) -> ServerResult<Document> {
        let name = command
            .get_str("create")
            .map_err(|_| ServerError::command(2, "create requires a collection name"))?;
        let mut options = Document::new();
        for (key, value) in command {
            if key != "create" {
                options.insert(key.clone(), value.clone());
            }
        }
        let ns = Namespace::new(db, name);
        let mut state = self.lock();
        create_in_state(&mut state, &ns, options, None)?;
        Ok(doc! {"ok": 1})
    }

    fn handle_drop(&self, db: &str, command: &Document) -> ServerResult<Document> {
        let name = command
            .get_str("drop")
            .map_err(|_| ServerError::command(2, "drop requires a collection name"))?;
        let mut state = self.lock();
        let existed = state
            .databases
            .get_mut(db)
            .and_then(|d| d.remove(name))
            .is_some();
        if !existed {
            return Err(ServerError::namespace_not_found(&format!("{}.{}", db, name)));
        }
        Ok(doc! {"ok": 1})
    }

    fn handle_coll_mod(&self, db: &str, command: &Document) -> ServerResult<Document> {
        let name = command
            .get_str("collMod")
            .map_err(|_| ServerError::command(2, "collMod requires a collection name"))?;
        let allow_mixed = command
            .get_bool("timeseriesBucketsMayHaveMixedSchemaData")
            .unwrap_or(false);

        let mut state = self.lock();
        let database = state
            .databases
            .get_mut(db)
            .ok_or_else(|| ServerError::namespace_not_found(&format!("{}.{}", db, name)))?;

        let coll = database
            .get_mut(name)
            .ok_or_else(|| ServerError::namespace_not_found(&format!("{}.{}", db, name)))?;
        if allow_mixed {
            coll.mixed_schema_allowed = true;
            // Enumeration sees the flag through the collection options
            coll.options
                .insert("timeseriesBucketsMayHaveMixedSchemaData", true);
        }

        // The flag applies to the backing bucket collection as well
        let bucket_name = format!("{}{}", BUCKET_PREFIX, name);
        if let Some(bucket) = database.get_mut(&bucket_name) {
            if allow_mixed {
                bucket.mixed_schema_allowed = true;
            }
        }
        Ok(doc! {"ok": 1})
    }

    fn handle_create_indexes(&self, db: &str, command: &Document) -> ServerResult<Document> {
        let name = command
            .get_str("createIndexes")
            .map_err(|_| ServerError::command(2, "createIndexes requires a collection name"))?;
        let specs = command
            .get_array("indexes")
            .map_err(|_| ServerError::command(2, "createIndexes requires an indexes array"))?;

        let mut state = self.lock();
        let coll = state
            .databases
            .get_mut(db)
            .and_then(|d| d.get_mut(name))
            .ok_or_else(|| ServerError::namespace_not_found(&format!("{}.{}", db, name)))?;

        for spec in specs {
            let spec = spec
                .as_document()
                .ok_or_else(|| ServerError::command(2, "index spec must be a document"))?;
            let index_name = spec
                .get_str("name")
                .map_err(|_| ServerError::command(2, "index spec requires a name"))?;
            let key = spec
                .get_document("key")
                .map_err(|_| ServerError::command(2, "index spec requires a key pattern"))?;

            if let Some(existing) = coll
                .indexes
                .iter()
                .find(|e| e.get_str("name") == Ok(index_name))
            {
                let existing_key = existing.get_document("key").ok();
                if existing_key == Some(key) {
                    // Idempotent re-create
                    continue;
                }
                return Err(ServerError::command(
                    86,
                    format!("index '{}' already exists with a different key", index_name),
                ));
            }
            coll.indexes.push(spec.clone());
        }
        Ok(doc! {"ok": 1})
    }

    fn handle_apply_ops(&self, command: &Document) -> ServerResult<Document> {
        let entries = command
            .get_array("applyOps")
            .map_err(|_| ServerError::command(2, "applyOps requires an array"))?
            .clone();

        let mut applied = 0i32;
        for entry in &entries {
            let entry = entry
                .as_document()
                .ok_or_else(|| ServerError::command(2, "applyOps entry must be a document"))?;
            self.apply_one(entry)?;
            applied += 1;
        }
        Ok(doc! {"ok": 1, "applied": applied})
    }

    fn apply_one(&self, entry: &Document) -> ServerResult<()> {
        let op = entry
            .get_str("op")
            .map_err(|_| ServerError::command(2, "oplog entry requires an op"))?;
        let ns_str = entry
            .get_str("ns")
            .map_err(|_| ServerError::command(2, "oplog entry requires a namespace"))?;

        match op {
            "n" => Ok(()),
            "c" => {
                let object = entry
                    .get_document("o")
                    .map_err(|_| ServerError::command(2, "command entry requires an object"))?;
                let db = ns_str
                    .strip_suffix(".$cmd")
                    .ok_or_else(|| ServerError::command(2, "command namespace must be <db>.$cmd"))?;
                let first = object
                    .keys()
                    .next()
                    .map(|k| k.as_str())
                    .unwrap_or_default();
                match first {
                    "create" => {
                        let name = object.get_str("create").expect("checked above");
                        let mut options = Document::new();
                        for (key, value) in object {
                            if key != "create" {
                                options.insert(key.clone(), value.clone());
                            }
                        }
                        let uuid = entry
                            .get("ui")
                            .and_then(|b| match b {
                                Bson::Binary(binary) => binary_to_uuid_hex(binary),
                                _ => None,
                            });
                        let ns = Namespace::new(db, name);
                        let mut state = self.lock();
                        create_in_state(&mut state, &ns, options, uuid)?;
                        Ok(())
                    }
                    "createIndexes" => self.handle_create_indexes(db, object).map(|_| ()),
                    "drop" => self.handle_drop(db, object).map(|_| ()),
                    other => Err(ServerError::command(
                        2,
                        format!("unsupported applyOps command: {}", other),
                    )),
                }
            }
            "i" => {
                let object = entry
                    .get_document("o")
                    .map_err(|_| ServerError::command(2, "insert entry requires an object"))?;
                let ns = Namespace::parse(ns_str)
                    .map_err(|e| ServerError::command(2, e.to_string()))?;
                let mut state = self.lock();
                let coll = state
                    .databases
                    .entry(ns.db().to_string())
                    .or_default()
                    .entry(ns.coll().to_string())
                    .or_insert_with(|| CollectionState::new(CollectionKind::Collection, doc! {}, None));
                // Replays are idempotent upserts by primary key
                let id = object.get("_id");
                if let Some(id) = id {
                    if let Some(existing) = coll
                        .documents
                        .iter_mut()
                        .find(|d| d.get("_id") == Some(id))
                    {
                        *existing = object.clone();
                        return Ok(());
                    }
                }
                coll.documents.push(object.clone());
                Ok(())
            }
            "u" => {
                let object = entry
                    .get_document("o")
                    .map_err(|_| ServerError::command(2, "update entry requires an object"))?;
                let query = entry
                    .get_document("o2")
                    .map_err(|_| ServerError::command(2, "update entry requires a query"))?;
                let ns = Namespace::parse(ns_str)
                    .map_err(|e| ServerError::command(2, e.to_string()))?;
                let id = query
                    .get("_id")
                    .ok_or_else(|| ServerError::command(2, "update query requires _id"))?;
                let mut state = self.lock();
                let coll = state
                    .databases
                    .get_mut(ns.db())
                    .and_then(|d| d.get_mut(ns.coll()))
                    .ok_or_else(|| ServerError::namespace_not_found(ns_str))?;
                if let Some(existing) = coll
                    .documents
                    .iter_mut()
                    .find(|d| d.get("_id") == Some(id))
                {
                    *existing = object.clone();
                }
                Ok(())
            }
            "d" => {
                let object = entry
                    .get_document("o")
                    .map_err(|_| ServerError::command(2, "delete entry requires an object"))?;
                let ns = Namespace::parse(ns_str)
                    .map_err(|e| ServerError::command(2, e.to_string()))?;
                let id = object
                    .get("_id")
                    .ok_or_else(|| ServerError::command(2, "delete requires _id"))?;
                let mut state = self.lock();
                if let Some(coll) = state
                    .databases
                    .get_mut(ns.db())
                    .and_then(|d| d.get_mut(ns.coll()))
                {
                    coll.documents.retain(|d| d.get("_id") != Some(id));
                }
                Ok(())
            }
            other => Err(ServerError::command(
                2,
                format!("unsupported oplog op: {}", other),
            )),
        }
    }

    fn handle_merge_authz(&self, command: &Document) -> ServerResult<Document> {
        let drop = command.get_bool("drop").unwrap_or(false);
        let scope_db = command.get_str("db").unwrap_or("").to_string();

        let mut merges: Vec<(String, String)> = Vec::new();
        if let Ok(temp) = command.get_str("tempUsersCollection") {
            merges.push((temp.to_string(), "system.users".to_string()));
        }
        if let Ok(temp) = command.get_str("tempRolesCollection") {
            merges.push((temp.to_string(), "system.roles".to_string()));
        }
        if merges.is_empty() {
            return Err(ServerError::command(
                2,
                "merge requires a temp users or roles collection",
            ));
        }

        let mut state = self.lock();
        for (temp_ns, target_name) in merges {
            let temp_ns = Namespace::parse(&temp_ns)
                .map_err(|e| ServerError::command(2, e.to_string()))?;
            if temp_ns.db() != "admin" {
                return Err(ServerError::command(
                    2,
                    "temporary auth collections must live in admin",
                ));
            }
            let staged: Vec<Document> = state
                .databases
                .get(temp_ns.db())
                .and_then(|d| d.get(temp_ns.coll()))
                .map(|c| c.documents.clone())
                .unwrap_or_default();

            let in_scope = |d: &Document| -> bool {
                scope_db.is_empty() || d.get_str("db") == Ok(scope_db.as_str())
            };

            let admin = state.databases.entry("admin".to_string()).or_default();
            let target = admin
                .entry(target_name.clone())
                .or_insert_with(|| CollectionState::new(CollectionKind::Collection, doc! {}, None));

            if drop {
                target.documents.retain(|d| !in_scope(d));
            }
            for document in staged.into_iter().filter(|d| in_scope(d)) {
                let id = document.get("_id").cloned();
                match id.and_then(|id| {
                    target
                        .documents
                        .iter_mut()
                        .find(|d| d.get("_id") == Some(&id))
                }) {
                    Some(existing) => *existing = document,
                    None => target.documents.push(document),
                }
            }
        }
        Ok(doc! {"ok": 1})
    }
}

impl ServerSession for MemoryServer {
    fn info(&self) -> ServerResult<ServerInfo> {
        Ok(ServerInfo {
            version: self.version,
            topology: self.topology,
            managed_proxy: self.managed_proxy,
        })
    }

    fn list_database_names(&self) -> ServerResult<Vec<String>> {
        let state = self.lock();
        Ok(state
            .databases
            .iter()
            .filter(|(_, colls)| !colls.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn list_collections(&self, db: &str) -> ServerResult<Vec<CollectionSpec>> {
        let state = self.lock();
        let Some(database) = state.databases.get(db) else {
            return Ok(Vec::new());
        };
        Ok(database
            .iter()
            .map(|(name, coll)| CollectionSpec {
                name: name.clone(),
                kind: coll.kind,
                options: coll.options.clone(),
                uuid: coll.uuid.clone(),
            })
            .collect())
    }

    fn collection_byte_size(&self, ns: &Namespace) -> ServerResult<u64> {
        let state = self.lock();
        let Some(coll) = state.databases.get(ns.db()).and_then(|d| d.get(ns.coll())) else {
            return Ok(0);
        };
        Ok(coll
            .documents
            .iter()
            .map(|d| doc_to_raw(d).len() as u64)
            .sum())
    }

    fn list_indexes(&self, ns: &Namespace) -> ServerResult<Vec<Document>> {
        let state = self.lock();
        Ok(state
            .databases
            .get(ns.db())
            .and_then(|d| d.get(ns.coll()))
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    fn find(&self, ns: &Namespace, options: FindOptions) -> ServerResult<Box<dyn DocumentCursor>> {
        let state = self.lock();
        let Some(coll) = state.databases.get(ns.db()).and_then(|d| d.get(ns.coll())) else {
            return Ok(Box::new(VecCursor::new(Vec::new())));
        };

        // A view scan resolves against its source collection
        if coll.kind == CollectionKind::View {
            if options.hint.is_some() {
                return Err(ServerError::command(2, "hint not allowed on a view"));
            }
            let source = coll.options.get_str("viewOn").unwrap_or_default().to_string();
            let source_ns = ns.with_coll(source);
            drop(state);
            return self.find(&source_ns, FindOptions { hint: None, ..options });
        }

        let docs: Vec<Vec<u8>> = coll
            .documents
            .iter()
            .filter(|d| match &options.filter {
                Some(filter) => matches_filter(d, filter),
                None => true,
            })
            .map(doc_to_raw)
            .collect();
        Ok(Box::new(VecCursor::new(docs)))
    }

    fn insert_many(
        &self,
        ns: &Namespace,
        docs: &[Vec<u8>],
        ordered: bool,
        _bypass_validation: bool,
    ) -> ServerResult<BulkResult> {
        let mut state = self.lock();
        {
            let coll = state
                .databases
                .get(ns.db())
                .and_then(|d| d.get(ns.coll()));
            if let Some(coll) = coll {
                if coll.reject_mixed_schema && !coll.mixed_schema_allowed {
                    return Err(ServerError::command(
                        MIXED_SCHEMA_NOT_ALLOWED,
                        format!("cannot insert mixed-schema bucket into {}", ns),
                    ));
                }
            }
        }

        let mut result = BulkResult::default();
        let mut inserted_docs: Vec<(Document, Option<String>)> = Vec::new();
        {
            let coll = state
                .databases
                .entry(ns.db().to_string())
                .or_default()
                .entry(ns.coll().to_string())
                .or_insert_with(|| CollectionState::new(CollectionKind::Collection, doc! {}, None));
            let uuid = coll.uuid.clone();

            // Primary key set, rebuilt per batch so large loads stay linear
            let mut seen: std::collections::HashSet<Vec<u8>> = coll
                .documents
                .iter()
                .filter_map(|d| d.get("_id"))
                .map(id_key)
                .collect();

            for (index, raw) in docs.iter().enumerate() {
                let document = raw_to_doc(raw)?;
                let duplicate = document
                    .get("_id")
                    .is_some_and(|id| !seen.insert(id_key(id)));
                if duplicate {
                    result.failures.push(WriteFailure {
                        index,
                        code: DUPLICATE_KEY,
                        message: format!("E{} duplicate key error", DUPLICATE_KEY),
                    });
                    if ordered {
                        // Ordered writes abandon the rest of the batch
                        break;
                    }
                    continue;
                }
                coll.documents.push(document.clone());
                inserted_docs.push((document, uuid.clone()));
                result.inserted += 1;
            }
        }
        for (document, uuid) in &inserted_docs {
            Self::record_insert(&mut *state, ns, document, uuid);
        }
        Ok(result)
    }

    fn run_command(&self, db: &str, command: Document) -> ServerResult<Document> {
        let first = command
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        match first.as_str() {
            "create" => self.handle_create(db, &command),
            "drop" => self.handle_drop(db, &command),
            "collMod" => self.handle_coll_mod(db, &command),
            "createIndexes" => self.handle_create_indexes(db, &command),
            "applyOps" => self.handle_apply_ops(&command),
            "_mergeAuthzCollections" => self.handle_merge_authz(&command),
            "ping" => Ok(doc! {"ok": 1}),
            other => Err(ServerError::no_such_command(other)),
        }
    }

    fn drop_collection(&self, ns: &Namespace) -> ServerResult<()> {
        let mut state = self.lock();
        if let Some(db) = state.databases.get_mut(ns.db()) {
            db.remove(ns.coll());
        }
        Ok(())
    }

    fn latest_oplog_position(&self) -> ServerResult<Timestamp> {
        let state = self.lock();
        Ok(state
            .oplog
            .last()
            .and_then(|e| e.get_timestamp("ts").ok())
            .unwrap_or(Timestamp {
                time: state.oplog_clock,
                increment: 0,
            }))
    }

    fn oplog_since(&self, start: Timestamp) -> ServerResult<Box<dyn DocumentCursor>> {
        let state = self.lock();
        let docs: Vec<Vec<u8>> = state
            .oplog
            .iter()
            .filter(|e| {
                e.get_timestamp("ts")
                    .map(|ts| cmp_timestamps(ts, start) == std::cmp::Ordering::Greater)
                    .unwrap_or(false)
            })
            .map(doc_to_raw)
            .collect();
        Ok(Box::new(VecCursor::new(docs)))
    }
}
