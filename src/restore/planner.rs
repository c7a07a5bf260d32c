//! Restore planning
//!
//! Walks a dump directory or demultiplexes an archive into the intent
//! plan: pair data and metadata files, resolve escaped and truncated file
//! stems through the metadata's authoritative `collectionName`, attach
//! bucket streams to their timeseries collections, route users/roles/auth
//! version and the oplog to their slots, then apply include/exclude
//! filters, renames, and the `config` database scoping rules.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{ArchivePrelude, ArchiveReader};
use crate::bsonio::read_file_bytes;
use crate::catalog::{
    config_collection_recognized, truncated_hash_suffix, unescape_collection_name, Namespace,
};
use crate::intents::{DataLocation, Intent, IntentKind, IntentManager};
use crate::metadata::CollectionMetadata;
use crate::server::{CollectionKind, ServerVersion};

use super::errors::{RestoreError, RestoreResult};
use super::options::RestoreOptions;

/// Where a restore reads from.
pub enum RestoreSource {
    /// A dump output tree
    Directory(PathBuf),
    /// A multiplexed archive stream
    Archive(Box<dyn Read + Send>),
}

/// The finished plan.
#[derive(Debug)]
pub struct RestorePlan {
    pub manager: IntentManager,
    /// Server version recorded by the dump, when a prelude was found
    pub dump_server_version: Option<ServerVersion>,
}

/// One namespace's files or buffers before intent construction.
#[derive(Default)]
struct RawEntry {
    data: Option<DataLocation>,
    metadata: Option<CollectionMetadata>,
    size: u64,
}

/// Builds the restore plan from a source.
pub fn build_plan(source: RestoreSource, options: &RestoreOptions) -> RestoreResult<RestorePlan> {
    let mut collected: BTreeMap<Namespace, RawEntry> = BTreeMap::new();
    let mut oplog: Option<DataLocation> = None;
    let mut prelude: Option<ArchivePrelude> = None;

    match source {
        RestoreSource::Directory(root) => {
            scan_directory(&root, options, &mut collected, &mut oplog, &mut prelude)?;
        }
        RestoreSource::Archive(reader) => {
            scan_archive(reader, &mut collected, &mut oplog, &mut prelude)?;
        }
    }

    let dump_server_version = prelude
        .as_ref()
        .and_then(|p| p.server_version.parse::<ServerVersion>().ok());

    let manager = assemble(collected, oplog, options)?;
    Ok(RestorePlan {
        manager,
        dump_server_version,
    })
}

fn strip_suffix<'a>(name: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|s| name.strip_suffix(s))
}

fn scan_directory(
    root: &Path,
    options: &RestoreOptions,
    collected: &mut BTreeMap<Namespace, RawEntry>,
    oplog: &mut Option<DataLocation>,
    prelude: &mut Option<ArchivePrelude>,
) -> RestoreResult<()> {
    if !root.is_dir() {
        return Err(RestoreError::plan(format!(
            "restore source {} is not a directory",
            root.display()
        )));
    }

    // The prelude may sit at the root or, for a db subtree, inside it
    for candidate in ["prelude.json", "prelude.json.gz"] {
        let path = root.join(candidate);
        if path.is_file() {
            let bytes = read_file_bytes(&path)?;
            *prelude = Some(ArchivePrelude::from_json_bytes(&bytes)?);
            break;
        }
    }

    let mut db_dirs: Vec<(String, PathBuf)> = Vec::new();
    let mut root_has_data = false;

    let entries = std::fs::read_dir(root)
        .map_err(|e| RestoreError::plan(format!("cannot read {}: {}", root.display(), e)))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| RestoreError::plan(format!("cannot read dump entry: {}", e)))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            db_dirs.push((name, path));
        } else if name == "oplog.bson" || name == "oplog.bson.gz" {
            *oplog = Some(DataLocation::File(path));
        } else if name.ends_with(".bson") || name.ends_with(".bson.gz") {
            root_has_data = true;
        }
    }

    if root_has_data {
        // The target is a database subtree; the database name must come
        // from the caller
        let db = options.db.clone().ok_or_else(|| {
            RestoreError::validation(
                "a database dump directory needs a target database name",
            )
        })?;
        scan_db_dir(&db, root, collected)?;
        return Ok(());
    }

    for (db, path) in db_dirs {
        scan_db_dir(&db, &path, collected)?;
    }
    Ok(())
}

fn scan_db_dir(
    db: &str,
    dir: &Path,
    collected: &mut BTreeMap<Namespace, RawEntry>,
) -> RestoreResult<()> {
    // stem -> (data path, metadata path)
    let mut stems: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| RestoreError::plan(format!("cannot read {}: {}", dir.display(), e)))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| RestoreError::plan(format!("cannot read dump entry: {}", e)))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "prelude.json" || name == "prelude.json.gz" {
            continue;
        }

        if let Some(stem) = strip_suffix(&name, &[".metadata.json.gz", ".metadata.json"]) {
            stems.entry(stem.to_string()).or_default().1 = Some(path);
        } else if let Some(stem) = strip_suffix(&name, &[".bson.gz", ".bson"]) {
            stems.entry(stem.to_string()).or_default().0 = Some(path);
        }
    }

    for (stem, (data, metadata_path)) in stems {
        let had_metadata_file = metadata_path.is_some();
        let metadata = match metadata_path {
            Some(path) => {
                let bytes = read_file_bytes(&path)?;
                CollectionMetadata::from_json_bytes(&bytes)?
            }
            None => None,
        };

        // The metadata's collectionName wins; a truncated stem without
        // metadata cannot be resolved
        let coll = match &metadata {
            Some(meta) => meta.collection_name.clone(),
            None => {
                if truncated_hash_suffix(&stem).is_some() {
                    return Err(RestoreError::plan(format!(
                        "cannot resolve truncated file stem '{}' without its metadata file",
                        stem
                    )));
                }
                unescape_collection_name(&stem).map_err(|e| RestoreError::plan(e.to_string()))?
            }
        };

        let ns = Namespace::new(db, coll.clone());
        let entry = collected.entry(ns).or_default();
        if let Some(path) = data {
            entry.size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            entry.data = Some(DataLocation::File(path));
        }
        match metadata {
            Some(meta) => entry.metadata = Some(meta),
            // A zero-length metadata file still counts as present; the
            // collection restores with default options
            None if had_metadata_file => {
                entry.metadata = Some(CollectionMetadata::empty(coll));
            }
            None => {}
        }
    }
    Ok(())
}

fn scan_archive(
    reader: Box<dyn Read + Send>,
    collected: &mut BTreeMap<Namespace, RawEntry>,
    oplog: &mut Option<DataLocation>,
    prelude_out: &mut Option<ArchivePrelude>,
) -> RestoreResult<()> {
    let mut archive = ArchiveReader::new(reader);
    let prelude = archive.read_prelude()?.clone();
    let mut bodies = archive.read_namespace_bodies()?;

    for entry in &prelude.namespaces {
        let ns = entry.namespace();
        let body = bodies.remove(&ns).unwrap_or_default();

        if ns == Namespace::new("local", "oplog.rs") && entry.metadata.is_empty() {
            *oplog = Some(DataLocation::Buffer(Arc::new(body)));
            continue;
        }

        let metadata = CollectionMetadata::from_json_bytes(entry.metadata.as_bytes())?;
        let coll = match &metadata {
            Some(meta) => meta.collection_name.clone(),
            None => entry.collection.clone(),
        };

        let resolved = Namespace::new(entry.db.as_str(), coll);
        let raw = collected.entry(resolved).or_default();
        raw.size = entry.size;
        raw.data = Some(DataLocation::Buffer(Arc::new(body)));
        if let Some(meta) = metadata {
            raw.metadata = Some(meta);
        }
    }

    // Bodies not declared in the prelude mean the archive and prelude
    // disagree
    if let Some((ns, _)) = bodies.into_iter().next() {
        return Err(RestoreError::plan(format!(
            "archive carries a body for {} that the prelude never declared",
            ns
        )));
    }
    Ok(())
}

/// Turns collected entries into a finalized intent plan.
fn assemble(
    collected: BTreeMap<Namespace, RawEntry>,
    oplog: Option<DataLocation>,
    options: &RestoreOptions,
) -> RestoreResult<IntentManager> {
    let include = options.include_matcher();
    let exclude = options.exclude_matcher();
    let renamer = options.renamer()?;

    // Split out bucket streams first; they attach to their timeseries
    // intents rather than standing alone
    let mut buckets: BTreeMap<Namespace, RawEntry> = BTreeMap::new();
    let mut plain: BTreeMap<Namespace, RawEntry> = BTreeMap::new();
    for (ns, entry) in collected {
        if ns.is_bucket() && entry.metadata.is_none() {
            buckets.insert(ns.unbucketed(), entry);
        } else {
            plain.insert(ns, entry);
        }
    }

    // The config scoping rule needs to know whether the dump is config-only
    let config_only = !plain.is_empty() && plain.keys().all(|ns| ns.db() == "config");

    let mut manager = IntentManager::new();

    for (ns, mut entry) in plain {
        if let Some(kind) = special_kind(&ns) {
            let mut intent = Intent::new(ns, kind);
            if let Some(data) = entry.data.take() {
                intent = intent.with_data(data).with_size_hint(entry.size);
            }
            manager.insert(intent)?;
            continue;
        }

        if !include.is_empty() && !include.matches(&ns) {
            continue;
        }
        if exclude.matches(&ns) {
            continue;
        }
        if ns.db() == "config" && !config_only && !config_collection_recognized(ns.coll()) {
            options.logger.info(
                "RESTORE_SKIP_CONFIG",
                &[("namespace", &ns.to_string())],
            );
            continue;
        }

        let kind = match entry.metadata.as_ref().map(|m| m.kind) {
            Some(CollectionKind::View) => IntentKind::View,
            Some(CollectionKind::Timeseries) => IntentKind::Timeseries,
            _ => IntentKind::Normal,
        };

        if kind != IntentKind::Timeseries && entry.data.is_some() && entry.metadata.is_none() {
            return Err(RestoreError::plan(format!(
                "data for {} has no metadata file beside it",
                ns
            )));
        }

        let mut intent = Intent::new(ns.clone(), kind).with_size_hint(entry.size);
        if let Some(meta) = entry.metadata.take() {
            intent = intent.with_metadata(meta);
        }

        match kind {
            IntentKind::Timeseries => {
                // The bucket stream is the timeseries intent's data. A
                // directory dump keeps it in a sibling file; an archive
                // attaches the demultiplexed body directly.
                if let Some(bucket) = buckets.remove(&ns) {
                    if let Some(data) = bucket.data {
                        intent = intent.with_data(data).with_size_hint(bucket.size);
                    }
                } else if let Some(data) = entry.data.take() {
                    intent = intent.with_data(data);
                }
            }
            _ => {
                if let Some(data) = entry.data.take() {
                    intent = intent.with_data(data);
                }
            }
        }

        let target = renamer.rename(&ns)?;
        if target != ns {
            intent = intent.with_rename(target);
        }
        manager.insert(intent)?;
    }

    // Bucket streams whose timeseries metadata never appeared
    if let Some((ns, _)) = buckets.into_iter().next() {
        return Err(RestoreError::plan(format!(
            "found bucket data for {} but no timeseries metadata; \
             restore the dump that produced it, not the bare bucket file",
            ns.bucket()
        )));
    }

    if let Some(data) = oplog {
        manager.insert(
            Intent::new(Namespace::new("local", "oplog.rs"), IntentKind::Oplog).with_data(data),
        )?;
    }

    manager.finalize_restore();
    Ok(manager)
}

/// Users/roles/auth-version routing from the resolved collection name.
fn special_kind(ns: &Namespace) -> Option<IntentKind> {
    let coll = ns.coll();
    let unprefixed = coll.strip_prefix("$admin.").unwrap_or(coll);
    let in_admin = ns.db() == "admin" || coll.starts_with("$admin.");
    if !in_admin {
        return None;
    }
    match unprefixed {
        "system.users" => Some(IntentKind::Users),
        "system.roles" => Some(IntentKind::Roles),
        "system.version" => Some(IntentKind::AuthVersion),
        _ => None,
    }
}
