//! UUID preservation across a dump/restore cycle.

use std::sync::Arc;

use bson::doc;
use tempfile::TempDir;

use docvault::catalog::Namespace;
use docvault::dump::{DumpOptions, DumpPipeline, DumpTarget};
use docvault::observability::Logger;
use docvault::restore::{RestoreOptions, RestorePipeline, RestoreSource};
use docvault::server::{MemoryServer, ServerSession};

const UUID: &str = "699f503df64b4aa8a484a8052046fa3a";

/// A dump whose metadata declares a known collection UUID.
fn dump_with_uuid(dir: &std::path::Path) {
    let db_dir = dir.join("db1");
    std::fs::create_dir_all(&db_dir).unwrap();

    let mut data = Vec::new();
    doc! {"_id": 1}.to_writer(&mut data).unwrap();
    std::fs::write(db_dir.join("pinned.bson"), data).unwrap();

    let mut meta = docvault::metadata::CollectionMetadata::empty("pinned");
    meta.uuid = Some(UUID.to_string());
    std::fs::write(
        db_dir.join("pinned.metadata.json"),
        meta.to_json_bytes().unwrap(),
    )
    .unwrap();
}

fn options() -> RestoreOptions {
    RestoreOptions {
        logger: Logger::quiet(),
        ..RestoreOptions::default()
    }
}

#[test]
fn preserve_uuid_with_drop_pins_the_uuid() {
    let dir = TempDir::new().unwrap();
    dump_with_uuid(dir.path());

    let server = Arc::new(MemoryServer::new());
    // A stale collection with a different UUID is in the way
    server.seed_collection(&Namespace::new("db1", "pinned"), doc! {}, vec![]);

    let pipeline = RestorePipeline::new(
        Arc::clone(&server) as _,
        RestoreOptions {
            drop: true,
            preserve_uuid: true,
            ..options()
        },
    );
    pipeline
        .run(RestoreSource::Directory(dir.path().to_path_buf()))
        .unwrap();

    let snapshot = server.snapshot(&Namespace::new("db1", "pinned")).unwrap();
    assert_eq!(snapshot.uuid.as_deref(), Some(UUID));
    assert_eq!(snapshot.documents.len(), 1);
}

#[test]
fn preserve_uuid_without_drop_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    dump_with_uuid(dir.path());

    let server = Arc::new(MemoryServer::new());
    let pipeline = RestorePipeline::new(
        server,
        RestoreOptions {
            preserve_uuid: true,
            ..options()
        },
    );
    let err = pipeline
        .run(RestoreSource::Directory(dir.path().to_path_buf()))
        .unwrap_err();
    assert_eq!(err.code().as_str(), "DV_RESTORE_VALIDATION");
}

#[test]
fn dumped_uuid_survives_the_full_cycle() {
    // Dump a server-assigned UUID, restore with drop + preserve, compare
    let source = Arc::new(MemoryServer::new());
    source
        .run_command("db1", doc! {"create": "cycle"})
        .unwrap();
    let original_uuid = source
        .snapshot(&Namespace::new("db1", "cycle"))
        .unwrap()
        .uuid
        .unwrap();

    let dir = TempDir::new().unwrap();
    let dump = DumpPipeline::new(
        Arc::clone(&source) as _,
        DumpOptions {
            logger: Logger::quiet(),
            ..DumpOptions::default()
        },
    );
    dump.run(DumpTarget::Directory(dir.path().to_path_buf()))
        .unwrap();

    let target = Arc::new(MemoryServer::new());
    let restore = RestorePipeline::new(
        Arc::clone(&target) as _,
        RestoreOptions {
            drop: true,
            preserve_uuid: true,
            ..options()
        },
    );
    restore
        .run(RestoreSource::Directory(dir.path().to_path_buf()))
        .unwrap();

    assert_eq!(
        target
            .snapshot(&Namespace::new("db1", "cycle"))
            .unwrap()
            .uuid
            .unwrap(),
        original_uuid
    );
}
