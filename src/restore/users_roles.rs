//! Users and roles restoration
//!
//! Users and roles are never inserted into `admin.system.users` and
//! `admin.system.roles` directly; they go through temporary staging
//! collections and a server-side merge command. Before any of that, the
//! dump's auth schema version is checked against the server's; the
//! unsupported transitions fail before anything is modified.

use bson::doc;

use crate::bsonio::BsonSource;
use crate::catalog::Namespace;
use crate::intents::Intent;
use crate::server::{ServerSession, ServerVersion};

use super::bulk::BulkLoader;
use super::collection::KnownCollections;
use super::errors::{RestoreError, RestoreResult};
use super::options::RestoreOptions;

/// Reads the auth schema version recorded in the dump.
///
/// Dumps from servers at or past 8.1 no longer carry the document and are
/// always at version 5. Without the document, a full restore assumes the
/// ancient version 1; a single-db users/roles restore assumes 3, with the
/// documented warnings.
pub fn dump_auth_version(
    auth_intent: Option<&Intent>,
    dump_server_version: Option<ServerVersion>,
    options: &RestoreOptions,
) -> RestoreResult<i32> {
    if let Some(version) = dump_server_version {
        if version.implies_auth_schema_five() {
            return Ok(5);
        }
    }

    let Some(intent) = auth_intent else {
        if options.restore_db_users_and_roles {
            options.logger.warn(
                "RESTORE_AUTH_VERSION_ASSUMED",
                &[("assumed", "3"), ("reason", "no system.version in db dump")],
            );
            return Ok(3);
        }
        options.logger.warn(
            "RESTORE_AUTH_VERSION_ASSUMED",
            &[("assumed", "1"), ("reason", "no system.version in dump")],
        );
        return Ok(1);
    };

    let Some(reader) = intent.data().open()? else {
        return Ok(1);
    };
    let mut source = BsonSource::new(reader);
    while let Some(doc) = source.read_next()? {
        if doc.get_str("_id") == Ok("authSchema") {
            return match doc.get("currentVersion") {
                Some(bson::Bson::Int32(v)) => Ok(*v),
                Some(bson::Bson::Int64(v)) => Ok(*v as i32),
                Some(bson::Bson::Double(v)) => Ok(*v as i32),
                other => Err(RestoreError::auth(format!(
                    "authSchema currentVersion is not numeric: {:?}",
                    other
                ))),
            };
        }
    }
    Err(RestoreError::auth(
        "system.version stream has no authSchema document",
    ))
}

/// Reads the server's auth schema version.
pub fn server_auth_version(session: &dyn ServerSession) -> RestoreResult<i32> {
    let info = session.info()?;
    if info.version.implies_auth_schema_five() {
        return Ok(5);
    }

    let ns = Namespace::new("admin", "system.version");
    let mut cursor = session.find(&ns, Default::default())?;
    while let Some(raw) = cursor.next_raw()? {
        let doc = bson::Document::from_reader(&mut &raw[..])
            .map_err(|e| RestoreError::auth(format!("undecodable system.version doc: {}", e)))?;
        if doc.get_str("_id") == Ok("authSchema") {
            if let Ok(v) = doc.get_i32("currentVersion") {
                return Ok(v);
            }
            if let Ok(v) = doc.get_i64("currentVersion") {
                return Ok(v as i32);
            }
        }
    }
    // A modern server without the document is at the current schema
    Ok(5)
}

/// Rejects unsupported auth schema transitions before any modification.
pub fn validate_auth_versions(
    dump: i32,
    server: i32,
    options: &RestoreOptions,
) -> RestoreResult<()> {
    if dump == 2 || dump == 4 {
        return Err(RestoreError::auth(format!(
            "cannot restore users and roles from a dump at auth version {}; \
             finish the upgrade or roll it back",
            dump
        )));
    }
    if server == 2 || server == 4 {
        return Err(RestoreError::auth(format!(
            "cannot restore users and roles to a server at auth version {}; \
             finish the upgrade or roll it back",
            server
        )));
    }
    match (dump, server) {
        (3, 5) | (5, 5) | (3, 3) | (1, 1) => Ok(()),
        (1, 5) => Err(RestoreError::auth(
            "cannot restore users at auth version 1 to a server at auth version 5",
        )),
        (5, 3) => Err(RestoreError::auth(
            "cannot restore users at auth version 5 to a server at auth version 3",
        )),
        (1, 3) => {
            options.logger.warn(
                "RESTORE_AUTH_UPGRADE_NEEDED",
                &[("hint", "users will have to be updated with the authSchemaUpgrade command")],
            );
            Ok(())
        }
        (5, 1) | (3, 1) => Err(RestoreError::auth(
            "cannot restore a users and roles dump at auth version 3 or later \
             to a server at auth version 1",
        )),
        _ => Err(RestoreError::auth(format!(
            "invalid auth version pair: dump={}, server={}",
            dump, server
        ))),
    }
}

/// Restores users and/or roles through the staging-and-merge flow.
pub fn restore_users_roles(
    session: &dyn ServerSession,
    options: &RestoreOptions,
    users: Option<Intent>,
    roles: Option<Intent>,
    known: &KnownCollections,
) -> RestoreResult<()> {
    if users.is_none() && roles.is_none() {
        return Ok(());
    }

    if let (Some(u), Some(r)) = (&users, &roles) {
        if u.source_namespace().db() != r.source_namespace().db() {
            return Err(RestoreError::auth(format!(
                "cannot restore users and roles from different databases ({} and {})",
                u.source_namespace().db(),
                r.source_namespace().db()
            )));
        }
    }

    let source_db = users
        .as_ref()
        .or(roles.as_ref())
        .map(|i| i.source_namespace().db().to_string())
        .expect("at least one intent");

    // The merge command's empty string means "all databases"; restoring
    // the admin dump restores every database's users
    let target_db = if source_db == "admin" {
        String::new()
    } else {
        source_db
    };

    let stagings = [
        (users, "tempUsersCollection", options.temp_users_collection.clone(), "users"),
        (roles, "tempRolesCollection", options.temp_roles_collection.clone(), "roles"),
    ];

    let mut merge_args: Vec<(&'static str, String)> = Vec::new();
    let mut staged: Vec<Namespace> = Vec::new();

    let result = (|| -> RestoreResult<()> {
        for (intent, param, temp_name, what) in &stagings {
            let Some(intent) = intent else { continue };
            let Some(reader) = intent.data().open()? else {
                continue;
            };

            let staging_ns = Namespace::new("admin", temp_name.clone());

            // Retries may have left the staging collection behind
            if known.exists(session, &staging_ns)? {
                options.logger.info(
                    "RESTORE_DROP_STALE_STAGING",
                    &[("namespace", &staging_ns.to_string())],
                );
                session.drop_collection(&staging_ns)?;
                known.forget(&staging_ns);
            }

            staged.push(staging_ns.clone());
            let loader = BulkLoader::new(session, staging_ns.clone(), None, options);
            let stats = loader.load(reader)?;
            if stats.inserted == 0 {
                // Empty file: nothing to merge for this kind
                options.logger.info(
                    "RESTORE_SKIP_EMPTY_AUTH_FILE",
                    &[("kind", *what), ("source", &intent.data().describe())],
                );
                continue;
            }
            options.logger.info(
                "RESTORE_STAGED_AUTH",
                &[("kind", *what), ("documents", &stats.inserted.to_string())],
            );
            merge_args.push((*param, format!("admin.{}", temp_name)));
        }

        if merge_args.is_empty() {
            return Ok(());
        }

        let mut command = doc! {"_mergeAuthzCollections": 1};
        for (param, value) in &merge_args {
            command.insert(param.to_string(), value.clone());
        }
        command.insert("drop", options.drop);
        command.insert("db", target_db.clone());

        session.run_command("admin", command)?;
        Ok(())
    })();

    // The staging collections go away whether or not the merge succeeded
    for staging_ns in staged {
        if let Err(e) = session.drop_collection(&staging_ns) {
            options.logger.warn(
                "RESTORE_STAGING_CLEANUP_FAILED",
                &[("namespace", &staging_ns.to_string()), ("error", &e.to_string())],
            );
        }
        known.forget(&staging_ns);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::{DataLocation, IntentKind};
    use crate::observability::Logger;
    use crate::server::MemoryServer;
    use std::sync::Arc;

    fn quiet() -> RestoreOptions {
        RestoreOptions {
            logger: Logger::quiet(),
            ..RestoreOptions::default()
        }
    }

    fn buffer(docs: &[bson::Document]) -> DataLocation {
        let mut out = Vec::new();
        for d in docs {
            d.to_writer(&mut out).unwrap();
        }
        DataLocation::Buffer(Arc::new(out))
    }

    fn users_intent(db: &str, docs: &[bson::Document]) -> Intent {
        Intent::new(Namespace::new(db, "system.users"), IntentKind::Users)
            .with_data(buffer(docs))
    }

    #[test]
    fn test_validate_auth_table() {
        let options = quiet();
        for (dump, server) in [(3, 5), (5, 5), (3, 3), (1, 1), (1, 3)] {
            validate_auth_versions(dump, server, &options).unwrap();
        }
        for (dump, server) in [(2, 5), (4, 5), (5, 2), (5, 4), (1, 5), (5, 3), (3, 1), (5, 1)] {
            assert!(validate_auth_versions(dump, server, &options).is_err());
        }
    }

    #[test]
    fn test_dump_auth_version_from_stream() {
        let intent = Intent::new(
            Namespace::new("admin", "system.version"),
            IntentKind::AuthVersion,
        )
        .with_data(buffer(&[
            doc! {"_id": "featureCompatibilityVersion", "version": "8.0"},
            doc! {"_id": "authSchema", "currentVersion": 5},
        ]));

        let version = dump_auth_version(Some(&intent), None, &quiet()).unwrap();
        assert_eq!(version, 5);
    }

    #[test]
    fn test_dump_auth_version_inference() {
        // Recent dump server implies 5 without reading anything
        let version =
            dump_auth_version(None, Some(ServerVersion::new(8, 1, 0)), &quiet()).unwrap();
        assert_eq!(version, 5);

        // Full restore without the file assumes 1
        assert_eq!(dump_auth_version(None, None, &quiet()).unwrap(), 1);

        // Single-db users/roles restore assumes 3
        let options = RestoreOptions {
            restore_db_users_and_roles: true,
            db: Some("db1".into()),
            ..quiet()
        };
        assert_eq!(dump_auth_version(None, None, &options).unwrap(), 3);
    }

    #[test]
    fn test_merge_flow() {
        let server = MemoryServer::new();
        let known = KnownCollections::new();
        let users = users_intent(
            "admin",
            &[doc! {"_id": "db1.alice", "user": "alice", "db": "db1"}],
        );

        restore_users_roles(&server, &quiet(), Some(users), None, &known).unwrap();

        let merged = server
            .snapshot(&Namespace::new("admin", "system.users"))
            .unwrap();
        assert_eq!(merged.documents.len(), 1);
        assert_eq!(merged.documents[0].get_str("user"), Ok("alice"));

        // Staging collection is gone
        assert!(server
            .snapshot(&Namespace::new("admin", "tempusers"))
            .is_none());
    }

    #[test]
    fn test_empty_users_file_skips_merge() {
        let server = MemoryServer::new();
        let known = KnownCollections::new();
        server.seed_collection(
            &Namespace::new("admin", "system.users"),
            doc! {},
            vec![doc! {"_id": "db1.keep", "user": "keep", "db": "db1"}],
        );

        let users = users_intent("admin", &[]);
        let options = RestoreOptions {
            drop: true,
            ..quiet()
        };
        restore_users_roles(&server, &options, Some(users), None, &known).unwrap();

        // Nothing merged, nothing dropped
        let existing = server
            .snapshot(&Namespace::new("admin", "system.users"))
            .unwrap();
        assert_eq!(existing.documents.len(), 1);
    }

    #[test]
    fn test_stale_staging_dropped_before_load() {
        let server = MemoryServer::new();
        let known = KnownCollections::new();
        server.seed_collection(
            &Namespace::new("admin", "tempusers"),
            doc! {},
            vec![doc! {"_id": "leftover"}],
        );

        let users = users_intent(
            "admin",
            &[doc! {"_id": "db1.alice", "user": "alice", "db": "db1"}],
        );
        restore_users_roles(&server, &quiet(), Some(users), None, &known).unwrap();

        let merged = server
            .snapshot(&Namespace::new("admin", "system.users"))
            .unwrap();
        // The leftover never leaked into the merge
        assert_eq!(merged.documents.len(), 1);
        assert_eq!(merged.documents[0].get_str("user"), Ok("alice"));
    }

    #[test]
    fn test_scoped_users_use_db_argument() {
        let server = MemoryServer::new();
        let known = KnownCollections::new();
        server.seed_collection(
            &Namespace::new("admin", "system.users"),
            doc! {},
            vec![
                doc! {"_id": "db1.old", "user": "old", "db": "db1"},
                doc! {"_id": "db2.other", "user": "other", "db": "db2"},
            ],
        );

        // A $admin users file from a scoped dump carries the db in its ns
        let users = Intent::new(
            Namespace::new("db1", "$admin.system.users"),
            IntentKind::Users,
        )
        .with_data(buffer(&[
            doc! {"_id": "db1.alice", "user": "alice", "db": "db1"},
        ]));

        let options = RestoreOptions {
            drop: true,
            ..quiet()
        };
        restore_users_roles(&server, &options, Some(users), None, &known).unwrap();

        let merged = server
            .snapshot(&Namespace::new("admin", "system.users"))
            .unwrap();
        let names: Vec<&str> = merged
            .documents
            .iter()
            .map(|d| d.get_str("user").unwrap())
            .collect();
        assert!(names.contains(&"alice"));
        assert!(names.contains(&"other"));
        assert!(!names.contains(&"old"));
    }

    #[test]
    fn test_users_roles_database_mismatch_rejected() {
        let server = MemoryServer::new();
        let known = KnownCollections::new();
        let users = users_intent("admin", &[doc! {"_id": 1}]);
        let roles = Intent::new(
            Namespace::new("db1", "$admin.system.roles"),
            IntentKind::Roles,
        )
        .with_data(buffer(&[doc! {"_id": 1}]));

        let err = restore_users_roles(&server, &quiet(), Some(users), Some(roles), &known)
            .unwrap_err();
        assert_eq!(err.code().as_str(), "DV_RESTORE_AUTH");
    }
}
