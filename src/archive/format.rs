//! Archive wire framing
//!
//! The archive is a sequence of length-prefixed messages:
//!
//! ```text
//! +--------------------+----------------------+------------------+
//! | Total length (u32) | Kind magic (4 bytes) | Payload document |
//! +--------------------+----------------------+------------------+
//! ```
//!
//! Control messages (prelude, namespace header, namespace terminator)
//! carry one of the magics below after the length prefix. Body chunks are
//! raw BSON documents written verbatim; their native length prefix doubles
//! as the message length. The two never collide: byte 4 of a BSON document
//! is an element type (0x00-0x13), while every magic starts with an ASCII
//! letter.
//!
//! Short reads at a message boundary are EOF; short reads inside a message
//! are format errors.

use std::io::{ErrorKind, Read, Write};

use bson::Document;

use crate::bsonio::{MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};
use crate::catalog::Namespace;

use super::errors::{ArchiveError, ArchiveResult};

/// Magic for the one prelude message opening the archive.
pub const PRELUDE_MAGIC: [u8; 4] = *b"DVPR";

/// Magic for a namespace header opening a body segment.
pub const NAMESPACE_MAGIC: [u8; 4] = *b"DVNS";

/// Magic for an end-of-namespace terminator.
pub const TERMINATOR_MAGIC: [u8; 4] = *b"DVTE";

/// Control message header size: length prefix plus magic.
const CONTROL_HEADER_LEN: usize = 8;

/// One parsed archive message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The archive prelude document
    Prelude(Document),
    /// Opens a body segment; `eof` marks a namespace with no body at all
    NamespaceHeader { ns: Namespace, eof: bool },
    /// Ends a namespace's body stream
    Terminator { ns: Namespace },
    /// One raw BSON document belonging to the open segment
    BodyChunk(Vec<u8>),
}

fn ns_payload(ns: &Namespace, eof: Option<bool>) -> Document {
    let mut doc = Document::new();
    doc.insert("db", ns.db());
    doc.insert("collection", ns.coll());
    if let Some(eof) = eof {
        doc.insert("eof", eof);
    }
    doc
}

fn parse_ns_payload(doc: &Document) -> ArchiveResult<Namespace> {
    let db = doc
        .get_str("db")
        .map_err(|_| ArchiveError::format("namespace message missing 'db'"))?;
    let coll = doc
        .get_str("collection")
        .map_err(|_| ArchiveError::format("namespace message missing 'collection'"))?;
    Ok(Namespace::new(db, coll))
}

fn write_control<W: Write>(
    writer: &mut W,
    magic: [u8; 4],
    payload: &Document,
) -> ArchiveResult<()> {
    let mut body = Vec::new();
    payload
        .to_writer(&mut body)
        .map_err(|e| ArchiveError::format(format!("unencodable control payload: {}", e)))?;
    let total = (CONTROL_HEADER_LEN + body.len()) as u32;
    writer
        .write_all(&total.to_le_bytes())
        .and_then(|_| writer.write_all(&magic))
        .and_then(|_| writer.write_all(&body))
        .map_err(|e| ArchiveError::io("failed to write control message", e))
}

/// Writes the prelude message.
pub fn write_prelude<W: Write>(writer: &mut W, prelude: &Document) -> ArchiveResult<()> {
    write_control(writer, PRELUDE_MAGIC, prelude)
}

/// Writes a namespace header.
pub fn write_namespace_header<W: Write>(
    writer: &mut W,
    ns: &Namespace,
    eof: bool,
) -> ArchiveResult<()> {
    write_control(writer, NAMESPACE_MAGIC, &ns_payload(ns, Some(eof)))
}

/// Writes an end-of-namespace terminator.
pub fn write_terminator<W: Write>(writer: &mut W, ns: &Namespace) -> ArchiveResult<()> {
    write_control(writer, TERMINATOR_MAGIC, &ns_payload(ns, None))
}

/// Writes one raw BSON body chunk.
pub fn write_body_chunk<W: Write>(writer: &mut W, raw: &[u8]) -> ArchiveResult<()> {
    writer
        .write_all(raw)
        .map_err(|e| ArchiveError::io("failed to write body chunk", e))
}

/// Reads the next message, or `None` at a clean EOF.
pub fn read_message<R: Read>(reader: &mut R) -> ArchiveResult<Option<Message>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ArchiveError::format(format!(
                    "archive ended after {} of 4 length bytes",
                    filled
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::io("failed to read message length", e)),
        }
    }

    let total_len = u32::from_le_bytes(len_buf) as usize;
    if !(MIN_DOCUMENT_SIZE..=MAX_DOCUMENT_SIZE).contains(&total_len) {
        return Err(ArchiveError::format(format!(
            "message length {} out of range",
            total_len
        )));
    }

    let mut rest = vec![0u8; total_len - 4];
    reader.read_exact(&mut rest).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ArchiveError::format(format!("archive ended inside a {}-byte message", total_len))
        } else {
            ArchiveError::io("failed to read message body", e)
        }
    })?;

    // Control messages carry a magic where a BSON document would have its
    // first element type byte. Messages shorter than the magic (an empty
    // document body chunk) can only be chunks.
    let discriminator: [u8; 4] = match rest.get(0..4) {
        Some(slice) => [slice[0], slice[1], slice[2], slice[3]],
        None => {
            let mut raw = Vec::with_capacity(total_len);
            raw.extend_from_slice(&len_buf);
            raw.extend_from_slice(&rest);
            if raw[total_len - 1] != 0 {
                return Err(ArchiveError::format(
                    "body chunk does not end with a zero byte",
                ));
            }
            return Ok(Some(Message::BodyChunk(raw)));
        }
    };

    if discriminator == PRELUDE_MAGIC
        || discriminator == NAMESPACE_MAGIC
        || discriminator == TERMINATOR_MAGIC
    {
        let payload = Document::from_reader(&mut &rest[4..])
            .map_err(|e| ArchiveError::format(format!("undecodable control payload: {}", e)))?;
        if discriminator == PRELUDE_MAGIC {
            return Ok(Some(Message::Prelude(payload)));
        }
        let ns = parse_ns_payload(&payload)?;
        if discriminator == NAMESPACE_MAGIC {
            let eof = payload.get_bool("eof").unwrap_or(false);
            return Ok(Some(Message::NamespaceHeader { ns, eof }));
        }
        return Ok(Some(Message::Terminator { ns }));
    }

    // A control-message magic always starts with an ASCII letter; any other
    // discriminator must be the start of a BSON document.
    if discriminator[0].is_ascii_uppercase() {
        return Err(ArchiveError::format(format!(
            "unknown message kind {:02x}{:02x}{:02x}{:02x}",
            discriminator[0], discriminator[1], discriminator[2], discriminator[3]
        )));
    }

    let mut raw = Vec::with_capacity(total_len);
    raw.extend_from_slice(&len_buf);
    raw.extend_from_slice(&rest);
    if raw[total_len - 1] != 0 {
        return Err(ArchiveError::format(
            "body chunk does not end with a zero byte",
        ));
    }
    Ok(Some(Message::BodyChunk(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn roundtrip(bytes: &[u8]) -> Vec<Message> {
        let mut reader = bytes;
        let mut messages = Vec::new();
        while let Some(m) = read_message(&mut reader).unwrap() {
            messages.push(m);
        }
        messages
    }

    #[test]
    fn test_control_roundtrip() {
        let ns = Namespace::new("db", "users");
        let mut out = Vec::new();
        write_prelude(&mut out, &doc! {"toolVersion": "0.4.0"}).unwrap();
        write_namespace_header(&mut out, &ns, false).unwrap();
        write_terminator(&mut out, &ns).unwrap();

        let messages = roundtrip(&out);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], Message::Prelude(_)));
        assert!(
            matches!(&messages[1], Message::NamespaceHeader { ns: h, eof: false } if *h == ns)
        );
        assert!(matches!(&messages[2], Message::Terminator { ns: t } if *t == ns));
    }

    #[test]
    fn test_body_chunk_roundtrip() {
        let mut chunk = Vec::new();
        doc! {"_id": 7}.to_writer(&mut chunk).unwrap();

        let mut out = Vec::new();
        write_body_chunk(&mut out, &chunk).unwrap();

        let messages = roundtrip(&out);
        assert_eq!(messages, vec![Message::BodyChunk(chunk)]);
    }

    #[test]
    fn test_empty_stream_is_eof() {
        let mut reader: &[u8] = &[];
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_short_read_at_boundary_is_error() {
        let mut out = Vec::new();
        write_terminator(&mut out, &Namespace::new("a", "b")).unwrap();
        let mut reader = &out[..2];
        let err = read_message(&mut reader).unwrap_err();
        assert_eq!(err.code().as_str(), "DV_ARCHIVE_FORMAT");
    }

    #[test]
    fn test_short_read_mid_message_is_error() {
        let mut out = Vec::new();
        write_namespace_header(&mut out, &Namespace::new("a", "b"), false).unwrap();
        let mut reader = &out[..out.len() - 2];
        let err = read_message(&mut reader).unwrap_err();
        assert_eq!(err.code().as_str(), "DV_ARCHIVE_FORMAT");
    }

    #[test]
    fn test_unknown_magic_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&13u32.to_le_bytes());
        out.extend_from_slice(b"XXQQ");
        out.extend_from_slice(&[0; 5]);
        let mut reader = &out[..];
        let err = read_message(&mut reader).unwrap_err();
        assert!(err.message().contains("unknown message kind"));
    }

    #[test]
    fn test_namespace_with_newlines_survives_framing() {
        let ns = Namespace::new("db", "line1\nline2\r\n");
        let mut out = Vec::new();
        write_namespace_header(&mut out, &ns, true).unwrap();

        let messages = roundtrip(&out);
        assert!(matches!(&messages[0], Message::NamespaceHeader { ns: h, eof: true } if *h == ns));
    }
}
