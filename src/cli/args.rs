//! CLI argument definitions using clap
//!
//! Commands:
//! - docvault dump --uri <uri> [--out <dir> | --archive <file>]
//! - docvault restore --uri <uri> [<dir> | --archive <file>]
//! - docvault inspect --archive <file>
//!
//! Connection establishment (authentication, TLS) belongs to the driver
//! adapter behind the `--uri` flag; everything here configures the
//! pipelines themselves.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docvault - logical backup and restore for document databases
#[derive(Parser, Debug)]
#[command(name = "docvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump collections (and optionally the oplog) from a server
    Dump {
        /// Server connection string
        #[arg(long, default_value = "memory://")]
        uri: String,

        /// Output directory for tree mode
        #[arg(long, default_value = "./dump")]
        out: PathBuf,

        /// Write a single archive file instead of a directory tree
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Dump only this database
        #[arg(long)]
        db: Option<String>,

        /// Dump only this collection (requires --db)
        #[arg(long)]
        collection: Option<String>,

        /// Filter document query as extended JSON (requires --collection)
        #[arg(long)]
        query: Option<String>,

        /// Read the filter query from a JSON file instead
        #[arg(long, conflicts_with = "query")]
        query_file: Option<PathBuf>,

        /// Exclude collections by exact name (repeatable)
        #[arg(long = "exclude-collection")]
        exclude_collections: Vec<String>,

        /// Exclude collections by name prefix (repeatable)
        #[arg(long = "exclude-collections-with-prefix")]
        exclude_prefixes: Vec<String>,

        /// Include users and roles in a db-scoped dump
        #[arg(long)]
        dump_db_users_and_roles: bool,

        /// Capture the oplog for a point-in-time dump
        #[arg(long)]
        oplog: bool,

        /// Collections dumped in parallel
        #[arg(long, default_value = "4")]
        num_parallel_collections: usize,

        /// Compress output files
        #[arg(long)]
        gzip: bool,

        /// Log everything down to per-batch detail
        #[arg(long)]
        verbose: bool,
    },

    /// Restore a dump directory or archive into a server
    Restore {
        /// Server connection string
        #[arg(long, default_value = "memory://")]
        uri: String,

        /// Dump directory to restore from
        #[arg(default_value = "./dump")]
        dir: PathBuf,

        /// Read a single archive file instead of a directory tree
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Target database for a single-db dump directory
        #[arg(long)]
        db: Option<String>,

        /// Drop target collections before restoring
        #[arg(long)]
        drop: bool,

        /// Recreate collections with their dumped UUIDs (requires --drop)
        #[arg(long)]
        preserve_uuid: bool,

        /// Stop at the first per-document failure
        #[arg(long)]
        stop_on_error: bool,

        /// Preserve document order (single insertion worker)
        #[arg(long)]
        maintain_insertion_order: bool,

        /// Skip server-side document validation
        #[arg(long)]
        bypass_document_validation: bool,

        /// Keep the dumped index versions
        #[arg(long)]
        keep_index_version: bool,

        /// Rewrite legacy index key values
        #[arg(long)]
        convert_legacy_indexes: bool,

        /// Rewrite hashed indexes on dotted fields to ascending
        #[arg(long)]
        fix_dotted_hash_index: bool,

        /// Replay the dumped oplog after loading
        #[arg(long)]
        oplog_replay: bool,

        /// Stop replay at this position, exclusive, as <seconds>[:<increment>]
        #[arg(long)]
        oplog_limit: Option<String>,

        /// Namespaces to include (repeatable, * wildcards)
        #[arg(long = "ns-include")]
        ns_include: Vec<String>,

        /// Namespaces to exclude (repeatable, * wildcards)
        #[arg(long = "ns-exclude")]
        ns_exclude: Vec<String>,

        /// Rename source patterns, paired with --ns-to (repeatable)
        #[arg(long = "ns-from")]
        ns_from: Vec<String>,

        /// Rename target patterns, paired with --ns-from (repeatable)
        #[arg(long = "ns-to")]
        ns_to: Vec<String>,

        /// Restore single-db users and roles (requires --db)
        #[arg(long)]
        restore_db_users_and_roles: bool,

        /// Skip users and roles entirely
        #[arg(long)]
        skip_users_and_roles: bool,

        /// Collections restored in parallel
        #[arg(long, default_value = "4")]
        num_parallel_collections: usize,

        /// Insertion workers per collection
        #[arg(long, default_value = "4")]
        num_insertion_workers_per_collection: usize,

        /// Log everything down to per-batch detail
        #[arg(long)]
        verbose: bool,
    },

    /// List an archive's namespaces without touching any server
    Inspect {
        /// Archive file to read
        #[arg(long)]
        archive: PathBuf,
    },
}

impl Cli {
    /// Parses process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_defaults() {
        let cli = Cli::try_parse_from(["docvault", "dump"]).unwrap();
        match cli.command {
            Command::Dump {
                uri,
                out,
                oplog,
                num_parallel_collections,
                ..
            } => {
                assert_eq!(uri, "memory://");
                assert_eq!(out, PathBuf::from("./dump"));
                assert!(!oplog);
                assert_eq!(num_parallel_collections, 4);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_restore_rename_flags() {
        let cli = Cli::try_parse_from([
            "docvault",
            "restore",
            "--ns-from",
            "test.*",
            "--ns-to",
            "prod.*",
            "--drop",
            "/dumps/nightly",
        ])
        .unwrap();
        match cli.command {
            Command::Restore {
                ns_from,
                ns_to,
                drop,
                dir,
                ..
            } => {
                assert_eq!(ns_from, vec!["test.*"]);
                assert_eq!(ns_to, vec!["prod.*"]);
                assert!(drop);
                assert_eq!(dir, PathBuf::from("/dumps/nightly"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_restore_oplog_flags() {
        let cli = Cli::try_parse_from([
            "docvault",
            "restore",
            "--oplog-replay",
            "--oplog-limit",
            "1722449400:2",
        ])
        .unwrap();
        match cli.command {
            Command::Restore {
                oplog_replay,
                oplog_limit,
                ..
            } => {
                assert!(oplog_replay);
                assert_eq!(oplog_limit.as_deref(), Some("1722449400:2"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_inspect_requires_archive() {
        assert!(Cli::try_parse_from(["docvault", "inspect"]).is_err());
        assert!(Cli::try_parse_from(["docvault", "inspect", "--archive", "a.dv"]).is_ok());
    }
}
