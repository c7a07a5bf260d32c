//! The restore pipeline
//!
//! Plan, execute, finish: the planner turns the input tree or archive
//! into an ordered intent queue; a fixed pool of collection workers
//! drains it, each owning one intent end to end; users and roles merge
//! after every collection intent has completed; the oplog replays last.
//! The first failing worker trips the shared cancellation flag and wins
//! error reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::intents::Intent;
use crate::oplog::{OplogReplayer, ReplayOptions};
use crate::server::ServerSession;

use super::collection::{restore_intent, CollectionStats, KnownCollections};
use super::errors::{RestoreError, RestoreResult};
use super::options::RestoreOptions;
use super::planner::{build_plan, RestorePlan, RestoreSource};
use super::users_roles::{
    dump_auth_version, restore_users_roles, server_auth_version, validate_auth_versions,
};

/// Counters reported after a restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreStats {
    pub collections: u64,
    pub documents: u64,
    /// Ignorable write failures that were skipped
    pub document_failures: u64,
    pub indexes_built: u64,
    pub oplog_entries_applied: u64,
}

/// The restore tool's core.
pub struct RestorePipeline {
    session: Arc<dyn ServerSession>,
    options: RestoreOptions,
}

impl RestorePipeline {
    pub fn new(session: Arc<dyn ServerSession>, options: RestoreOptions) -> Self {
        Self { session, options }
    }

    /// Runs the restore from a directory tree or archive stream.
    pub fn run(&self, source: RestoreSource) -> RestoreResult<RestoreStats> {
        self.options.validate()?;
        let info = self.session.info()?;

        if info.managed_proxy && self.options.restore_db_users_and_roles {
            return Err(RestoreError::validation(
                "cannot restore users and roles through a managed database proxy",
            ));
        }

        let RestorePlan {
            mut manager,
            dump_server_version,
        } = build_plan(source, &self.options)?;

        self.options.logger.info(
            "RESTORE_PLANNED",
            &[
                ("collections", &manager.len().to_string()),
                (
                    "dumpServerVersion",
                    &dump_server_version
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                ),
            ],
        );

        let (users, roles) = manager.take_users_roles();
        let restore_auth = (users.is_some() || roles.is_some())
            && !self.options.skip_users_and_roles
            && !info.managed_proxy;

        // The handshake happens before any mutation of auth collections
        if restore_auth {
            let auth_intent = manager.auth_version();
            let dump_auth =
                dump_auth_version(auth_intent, dump_server_version, &self.options)?;
            let server_auth = server_auth_version(self.session.as_ref())?;
            self.options.logger.info(
                "RESTORE_AUTH_VERSIONS",
                &[
                    ("dump", &dump_auth.to_string()),
                    ("server", &server_auth.to_string()),
                ],
            );
            validate_auth_versions(dump_auth, server_auth, &self.options)?;
        }

        let oplog_intent = manager.take_oplog();
        let known = KnownCollections::new();

        let mut stats = self.run_workers(manager.drain(), &known)?;

        if restore_auth {
            restore_users_roles(self.session.as_ref(), &self.options, users, roles, &known)?;
        }

        if self.options.oplog_replay {
            if let Some(intent) = oplog_intent {
                if let Some(reader) = intent.data().open()? {
                    let replayer = OplogReplayer::new(
                        self.session.as_ref(),
                        info.version,
                        ReplayOptions {
                            limit: self.options.oplog_limit,
                            logger: self.options.logger.clone(),
                            ..ReplayOptions::default()
                        },
                    );
                    let replay = replayer.replay(reader)?;
                    stats.oplog_entries_applied = replay.entries_applied;
                }
            } else {
                self.options.logger.warn(
                    "RESTORE_NO_OPLOG",
                    &[("hint", "oplog replay requested but the dump has no oplog stream")],
                );
            }
        }

        self.options.logger.info(
            "RESTORE_DONE",
            &[
                ("collections", &stats.collections.to_string()),
                ("documents", &stats.documents.to_string()),
                ("skippedWrites", &stats.document_failures.to_string()),
            ],
        );
        Ok(stats)
    }

    fn run_workers(
        &self,
        intents: Vec<Intent>,
        known: &KnownCollections,
    ) -> RestoreResult<RestoreStats> {
        let info = self.session.info()?;
        let queue = Arc::new(Mutex::new(intents));
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_count = self.options.num_parallel_collections;

        let results: Vec<RestoreResult<RestoreStats>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(worker_count);
            for _ in 0..worker_count {
                let queue = Arc::clone(&queue);
                let cancel = Arc::clone(&cancel);
                handles.push(scope.spawn(move || {
                    let mut local = RestoreStats::default();
                    loop {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let intent = {
                            let mut queue = queue.lock().expect("restore queue poisoned");
                            if queue.is_empty() {
                                None
                            } else {
                                Some(queue.remove(0))
                            }
                        };
                        let Some(intent) = intent else { break };

                        match restore_intent(
                            self.session.as_ref(),
                            info.version,
                            &self.options,
                            known,
                            &intent,
                        ) {
                            Ok(CollectionStats {
                                documents,
                                failed,
                                indexes_built,
                            }) => {
                                local.collections += 1;
                                local.documents += documents;
                                local.document_failures += failed;
                                local.indexes_built += indexes_built;
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
                    Err(_) => Err(RestoreError::write("collection worker panicked")),
                })
                .collect()
        });

        // First error wins; later ones are consequences of the cancel
        let mut stats = RestoreStats::default();
        for result in results {
            let local = result?;
            stats.collections += local.collections;
            stats.documents += local.documents;
            stats.document_failures += local.document_failures;
            stats.indexes_built += local.indexes_built;
        }
        Ok(stats)
    }
}
