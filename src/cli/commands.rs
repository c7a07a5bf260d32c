//! CLI command dispatch
//!
//! Maps parsed arguments onto pipeline option structs and runs them. The
//! `--uri` scheme picks the server adapter: `memory://` is the built-in
//! in-process server (dry runs and tests); real drivers plug in behind
//! their own schemes.

use std::sync::Arc;

use bson::{Bson, Document, Timestamp};

use std::io::{Read, Write};
use std::path::Path;

use crate::archive::ArchiveReader;
use crate::bsonio::{create_writer, open_reader, stdin_reader, stdout_writer};
use crate::dump::{DumpOptions, DumpPipeline, DumpTarget};
use crate::observability::{Logger, Severity};
use crate::restore::{RestoreOptions, RestorePipeline, RestoreSource};
use crate::server::{MemoryServer, ServerSession};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Resolves a connection string to a server session.
fn connect(uri: &str) -> CliResult<Arc<dyn ServerSession>> {
    if uri == "memory://" || uri.starts_with("memory://") {
        return Ok(Arc::new(MemoryServer::new()));
    }
    Err(CliError::usage(format!(
        "no driver adapter for '{}'; only memory:// is built in",
        uri
    )))
}

fn parse_query(query: Option<&str>) -> CliResult<Option<Document>> {
    let Some(text) = query else { return Ok(None) };
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| CliError::usage(format!("unparseable query: {}", e)))?;
    let bson = Bson::try_from(value)
        .map_err(|e| CliError::usage(format!("unparseable query: {}", e)))?;
    match bson {
        Bson::Document(doc) => Ok(Some(doc)),
        _ => Err(CliError::usage("query must be a JSON object")),
    }
}

/// Replay bounds are written `<seconds>[:<increment>]`.
fn parse_oplog_limit(limit: Option<&str>) -> CliResult<Option<Timestamp>> {
    let Some(text) = limit else { return Ok(None) };
    let (seconds, increment) = match text.split_once(':') {
        Some((seconds, increment)) => (seconds, increment),
        None => (text, "0"),
    };
    let time = seconds
        .parse()
        .map_err(|_| CliError::usage(format!("unparseable oplog limit '{}'", text)))?;
    let increment = increment
        .parse()
        .map_err(|_| CliError::usage(format!("unparseable oplog limit '{}'", text)))?;
    Ok(Some(Timestamp { time, increment }))
}

/// `-` pipes the archive through standard input/output.
fn archive_writer(path: &Path, gzip: bool) -> CliResult<Box<dyn Write + Send>> {
    if path == Path::new("-") {
        return Ok(stdout_writer());
    }
    create_writer(path, gzip).map_err(|e| CliError::usage(e.to_string()))
}

fn archive_reader(path: &Path) -> CliResult<Box<dyn Read + Send>> {
    if path == Path::new("-") {
        return Ok(stdin_reader());
    }
    open_reader(path).map_err(|e| CliError::usage(e.to_string()))
}

fn logger_for(verbose: bool) -> Logger {
    if verbose {
        Logger::new(Severity::Trace)
    } else {
        Logger::default()
    }
}

/// Runs one parsed command to completion.
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Dump {
            uri,
            out,
            archive,
            db,
            collection,
            query,
            query_file,
            exclude_collections,
            exclude_prefixes,
            dump_db_users_and_roles,
            oplog,
            num_parallel_collections,
            gzip,
            verbose,
        } => {
            let session = connect(&uri)?;
            // Log lines must not interleave with archive bytes on a pipe
            let to_stdout = archive.as_deref() == Some(Path::new("-"));
            let query_text = match query_file {
                Some(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                    CliError::usage(format!("cannot read {}: {}", path.display(), e))
                })?),
                None => query,
            };
            let options = DumpOptions {
                db,
                collection,
                query: parse_query(query_text.as_deref())?,
                exclude_collections,
                exclude_prefixes,
                dump_users_and_roles: dump_db_users_and_roles,
                oplog,
                num_parallel_collections,
                gzip,
                logger: if to_stdout {
                    Logger::quiet()
                } else {
                    logger_for(verbose)
                },
            };
            let pipeline = DumpPipeline::new(session, options);

            let target = match archive {
                Some(path) => DumpTarget::Archive(archive_writer(&path, gzip)?),
                None => DumpTarget::Directory(out),
            };
            pipeline.run(target)?;
            Ok(())
        }

        Command::Restore {
            uri,
            dir,
            archive,
            db,
            drop,
            preserve_uuid,
            stop_on_error,
            maintain_insertion_order,
            bypass_document_validation,
            keep_index_version,
            convert_legacy_indexes,
            fix_dotted_hash_index,
            oplog_replay,
            oplog_limit,
            ns_include,
            ns_exclude,
            ns_from,
            ns_to,
            restore_db_users_and_roles,
            skip_users_and_roles,
            num_parallel_collections,
            num_insertion_workers_per_collection,
            verbose,
        } => {
            let session = connect(&uri)?;
            let options = RestoreOptions {
                drop,
                preserve_uuid,
                stop_on_error,
                maintain_insertion_order,
                bypass_document_validation,
                keep_index_version,
                fix_legacy_indexes: convert_legacy_indexes,
                fix_dotted_hashed_indexes: fix_dotted_hash_index,
                oplog_replay,
                oplog_limit: parse_oplog_limit(oplog_limit.as_deref())?,
                ns_include,
                ns_exclude,
                ns_from,
                ns_to,
                db,
                restore_db_users_and_roles,
                skip_users_and_roles,
                num_parallel_collections,
                num_insertion_workers: num_insertion_workers_per_collection,
                logger: logger_for(verbose),
                ..RestoreOptions::default()
            };
            let pipeline = RestorePipeline::new(session, options);

            let source = match archive {
                Some(path) => RestoreSource::Archive(archive_reader(&path)?),
                None => RestoreSource::Directory(dir),
            };
            pipeline.run(source)?;
            Ok(())
        }

        Command::Inspect { archive } => {
            let reader = archive_reader(&archive)?;
            let mut archive_reader = ArchiveReader::new(reader);
            let prelude = archive_reader.read_prelude()?;

            println!(
                "{}",
                serde_json::json!({
                    "toolVersion": prelude.tool_version,
                    "serverVersion": prelude.server_version,
                    "formatVersion": prelude.format_version,
                })
            );
            for (db, entries) in prelude.tree() {
                for entry in entries {
                    println!(
                        "{}",
                        serde_json::json!({
                            "db": db,
                            "collection": entry.collection,
                            "size": entry.size,
                        })
                    );
                }
            }
            Ok(())
        }
    }
}
