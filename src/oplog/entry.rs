//! Replication-log entry model
//!
//! An entry carries a timestamp, an operation kind (`i`/`u`/`d`/`c`/`n`),
//! a namespace, optionally the collection UUID, and the document or
//! command payload. Index build commands additionally carry a build
//! identifier, which replay drops.

use bson::{Document, Timestamp};

use super::errors::{OplogError, OplogResult};

/// Operation kinds appearing in the replication log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Command,
    Noop,
}

impl OpKind {
    /// Parses the single-letter wire form.
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "i" => Some(OpKind::Insert),
            "u" => Some(OpKind::Update),
            "d" => Some(OpKind::Delete),
            "c" => Some(OpKind::Command),
            "n" => Some(OpKind::Noop),
            _ => None,
        }
    }
}

/// One replication-log entry, kept in wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct OplogEntry {
    doc: Document,
}

impl OplogEntry {
    /// Wraps a raw entry, validating the fields replay depends on.
    pub fn from_document(doc: Document) -> OplogResult<Self> {
        let op = doc
            .get_str("op")
            .map_err(|_| OplogError::entry("entry missing 'op'"))?;
        if OpKind::parse(op).is_none() {
            return Err(OplogError::entry(format!("unknown op kind '{}'", op)));
        }
        doc.get_str("ns")
            .map_err(|_| OplogError::entry("entry missing 'ns'"))?;
        Ok(Self { doc })
    }

    /// The entry's operation kind.
    pub fn op(&self) -> OpKind {
        OpKind::parse(self.doc.get_str("op").expect("validated")).expect("validated")
    }

    /// The entry's namespace string.
    pub fn ns(&self) -> &str {
        self.doc.get_str("ns").expect("validated")
    }

    /// The entry's timestamp, when present.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.doc.get_timestamp("ts").ok()
    }

    /// The document or command payload.
    pub fn object(&self) -> Option<&Document> {
        self.doc.get_document("o").ok()
    }

    /// For command entries, the command name (the payload's first key).
    pub fn command_name(&self) -> Option<&str> {
        if self.op() != OpKind::Command {
            return None;
        }
        self.object()?.keys().next().map(|k| k.as_str())
    }

    /// The database part of the namespace.
    pub fn db(&self) -> &str {
        self.ns().split('.').next().unwrap_or_default()
    }

    /// The wire document.
    pub fn as_document(&self) -> &Document {
        &self.doc
    }

    /// Consumes the entry, returning the wire document.
    pub fn into_document(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_parse_requires_op_and_ns() {
        assert!(OplogEntry::from_document(doc! {"ns": "a.b"}).is_err());
        assert!(OplogEntry::from_document(doc! {"op": "i"}).is_err());
        assert!(OplogEntry::from_document(doc! {"op": "x", "ns": "a.b"}).is_err());
        assert!(OplogEntry::from_document(doc! {"op": "i", "ns": "a.b", "o": {}}).is_ok());
    }

    #[test]
    fn test_accessors() {
        let entry = OplogEntry::from_document(doc! {
            "ts": Timestamp { time: 5, increment: 1 },
            "op": "c",
            "ns": "db1.$cmd",
            "o": {"create": "users"},
        })
        .unwrap();

        assert_eq!(entry.op(), OpKind::Command);
        assert_eq!(entry.ns(), "db1.$cmd");
        assert_eq!(entry.db(), "db1");
        assert_eq!(
            entry.timestamp(),
            Some(Timestamp { time: 5, increment: 1 })
        );
        assert_eq!(entry.command_name(), Some("create"));
    }

    #[test]
    fn test_command_name_only_for_commands() {
        let entry =
            OplogEntry::from_document(doc! {"op": "i", "ns": "a.b", "o": {"create": "x"}}).unwrap();
        assert_eq!(entry.command_name(), None);
    }
}
