//! Dump output targets
//!
//! Directory mode writes `<root>/<db>/<stem>.bson[.gz]` with a sibling
//! metadata file and a `prelude.json[.gz]` at the root. Archive mode
//! multiplexes everything into one byte stream; metadata rides in the
//! prelude. Collection names become file stems through the escaping and
//! hash-truncation rules.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::archive::NamespaceSink;
use crate::bsonio::{create_writer, BsonSink};
use crate::catalog::{collection_file_stem, Namespace};

use super::errors::{DumpError, DumpResult};

/// Where a dump goes.
pub enum DumpTarget {
    /// An output tree rooted here
    Directory(PathBuf),
    /// A single multiplexed archive stream
    Archive(Box<dyn Write + Send>),
}

/// File name of the optional prelude in directory mode.
pub const PRELUDE_FILE: &str = "prelude.json";

/// File name of the oplog stream in directory mode.
pub const OPLOG_FILE: &str = "oplog.bson";

fn with_gz(name: String, gzip: bool) -> String {
    if gzip {
        format!("{}.gz", name)
    } else {
        name
    }
}

/// Path of a namespace's data file.
pub fn data_file_path(root: &Path, ns: &Namespace, gzip: bool) -> PathBuf {
    let stem = collection_file_stem(ns.coll());
    root.join(ns.db()).join(with_gz(format!("{}.bson", stem), gzip))
}

/// Path of a namespace's metadata file.
///
/// For timeseries collections the caller passes the user-visible
/// namespace; the data file uses the bucket namespace.
pub fn metadata_file_path(root: &Path, ns: &Namespace, gzip: bool) -> PathBuf {
    let stem = collection_file_stem(ns.coll());
    root.join(ns.db())
        .join(with_gz(format!("{}.metadata.json", stem), gzip))
}

/// Path of the prelude file.
pub fn prelude_file_path(root: &Path, gzip: bool) -> PathBuf {
    root.join(with_gz(PRELUDE_FILE.to_string(), gzip))
}

/// Path of the oplog stream.
pub fn oplog_file_path(root: &Path, gzip: bool) -> PathBuf {
    root.join(with_gz(OPLOG_FILE.to_string(), gzip))
}

/// One worker's document sink for one namespace.
pub enum CollectionSink {
    File(BsonSink<Box<dyn Write + Send>>),
    Archive(NamespaceSink),
}

impl CollectionSink {
    /// A file sink at the conventional data path.
    pub fn file(root: &Path, ns: &Namespace, gzip: bool) -> DumpResult<Self> {
        let path = data_file_path(root, ns, gzip);
        let writer = create_writer(&path, gzip)?;
        Ok(CollectionSink::File(BsonSink::new(writer)))
    }

    /// Writes one raw document.
    pub fn write_raw(&mut self, raw: &[u8]) -> DumpResult<()> {
        match self {
            CollectionSink::File(sink) => sink.write_raw(raw).map_err(DumpError::from),
            CollectionSink::Archive(sink) => {
                sink.write_raw(raw.to_vec()).map_err(DumpError::from)
            }
        }
    }

    /// Flushes and closes the stream.
    pub fn finish(self) -> DumpResult<u64> {
        match self {
            CollectionSink::File(sink) => {
                let written = sink.documents_written();
                sink.finish()?;
                Ok(written)
            }
            CollectionSink::Archive(sink) => {
                sink.finish()?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths() {
        let root = Path::new("/out");
        let ns = Namespace::new("sales", "orders");
        assert_eq!(
            data_file_path(root, &ns, false),
            PathBuf::from("/out/sales/orders.bson")
        );
        assert_eq!(
            data_file_path(root, &ns, true),
            PathBuf::from("/out/sales/orders.bson.gz")
        );
        assert_eq!(
            metadata_file_path(root, &ns, false),
            PathBuf::from("/out/sales/orders.metadata.json")
        );
    }

    #[test]
    fn test_escaped_collection_path() {
        let root = Path::new("/out");
        let ns = Namespace::new("db", "a/b c");
        assert_eq!(
            data_file_path(root, &ns, false),
            PathBuf::from("/out/db/a%2Fb%20c.bson")
        );
    }

    #[test]
    fn test_long_name_path_is_bounded() {
        let root = Path::new("/out");
        let ns = Namespace::new("db", "x".repeat(500));
        let path = data_file_path(root, &ns, true);
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.len() <= 255);

        let meta = metadata_file_path(root, &ns, true);
        let meta_name = meta.file_name().unwrap().to_str().unwrap();
        assert!(meta_name.len() <= 255);

        // Data and metadata share the stem
        assert_eq!(
            file_name.trim_end_matches(".bson.gz"),
            meta_name.trim_end_matches(".metadata.json.gz"),
        );
    }

    #[test]
    fn test_prelude_and_oplog_paths() {
        let root = Path::new("/out");
        assert_eq!(
            prelude_file_path(root, false),
            PathBuf::from("/out/prelude.json")
        );
        assert_eq!(
            prelude_file_path(root, true),
            PathBuf::from("/out/prelude.json.gz")
        );
        assert_eq!(oplog_file_path(root, false), PathBuf::from("/out/oplog.bson"));
    }
}
