//! Archive reader and demultiplexer
//!
//! The reader walks the message sequence: prelude first, then body
//! segments attributed to the namespace whose header opened them, until
//! each namespace's end-of-namespace marker. Two markers exist on the
//! wire: a terminator message for the open segment, and a header with the
//! EOF sentinel for a namespace closing without (more) chunks; an EOF
//! header does not disturb a different namespace's open segment.
//!
//! Progress for a namespace is never reported past a terminator the reader
//! has not yet seen: chunks after a namespace closed are format errors.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crate::catalog::Namespace;

use super::errors::{ArchiveError, ArchiveResult};
use super::format::{read_message, Message};
use super::prelude::ArchivePrelude;

/// One parsed reader event.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveEvent {
    /// A body segment opened for this namespace
    SegmentStart(Namespace),
    /// One document belonging to the open segment
    Chunk(Vec<u8>),
    /// This namespace's body stream ended
    NamespaceEnd(Namespace),
}

/// Sequential archive reader with state checking.
pub struct ArchiveReader<R: Read> {
    reader: R,
    prelude: Option<ArchivePrelude>,
    current: Option<Namespace>,
    closed: BTreeSet<Namespace>,
}

impl<R: Read> ArchiveReader<R> {
    /// Creates a reader over the given byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            prelude: None,
            current: None,
            closed: BTreeSet::new(),
        }
    }

    /// Reads the prelude, which must be the first message.
    pub fn read_prelude(&mut self) -> ArchiveResult<&ArchivePrelude> {
        if self.prelude.is_none() {
            match read_message(&mut self.reader)? {
                Some(Message::Prelude(doc)) => {
                    self.prelude = Some(ArchivePrelude::from_document(&doc)?);
                }
                Some(_) => {
                    return Err(ArchiveError::format(
                        "archive does not start with a prelude",
                    ));
                }
                None => return Err(ArchiveError::format("archive is empty")),
            }
        }
        Ok(self.prelude.as_ref().expect("just set"))
    }

    /// Returns true once the namespace's end marker has been seen.
    pub fn is_closed(&self, ns: &Namespace) -> bool {
        self.closed.contains(ns)
    }

    /// Returns the namespace owning the open segment, if any.
    pub fn open_namespace(&self) -> Option<&Namespace> {
        self.current.as_ref()
    }

    /// Reads the next event, or `None` at the end of the archive.
    pub fn next_event(&mut self) -> ArchiveResult<Option<ArchiveEvent>> {
        if self.prelude.is_none() {
            self.read_prelude()?;
        }
        let message = match read_message(&mut self.reader)? {
            Some(message) => message,
            None => {
                if let Some(ns) = &self.current {
                    return Err(ArchiveError::format(format!(
                        "archive ended with namespace {} still open",
                        ns
                    )));
                }
                return Ok(None);
            }
        };

        match message {
            Message::Prelude(_) => Err(ArchiveError::format("duplicate prelude")),
            Message::NamespaceHeader { ns, eof } => {
                if self.closed.contains(&ns) {
                    return Err(ArchiveError::format(format!(
                        "namespace {} reopened after its terminator",
                        ns
                    )));
                }
                if eof {
                    if self.current.as_ref() == Some(&ns) {
                        self.current = None;
                    }
                    self.closed.insert(ns.clone());
                    Ok(Some(ArchiveEvent::NamespaceEnd(ns)))
                } else {
                    self.current = Some(ns.clone());
                    Ok(Some(ArchiveEvent::SegmentStart(ns)))
                }
            }
            Message::Terminator { ns } => {
                if self.closed.contains(&ns) {
                    return Err(ArchiveError::format(format!(
                        "duplicate terminator for namespace {}",
                        ns
                    )));
                }
                if self.current.as_ref() != Some(&ns) {
                    return Err(ArchiveError::format(format!(
                        "terminator for {} while it has no open segment",
                        ns
                    )));
                }
                self.current = None;
                self.closed.insert(ns.clone());
                Ok(Some(ArchiveEvent::NamespaceEnd(ns)))
            }
            Message::BodyChunk(raw) => {
                if self.current.is_none() {
                    return Err(ArchiveError::format("body chunk outside any segment"));
                }
                Ok(Some(ArchiveEvent::Chunk(raw)))
            }
        }
    }

    /// Drains the archive, concatenating each namespace's body bytes.
    ///
    /// This is the demultiplexer behind restore planning: every namespace
    /// comes back as the sequential bytes of its body stream, exactly as a
    /// per-namespace reader would have seen them.
    pub fn read_namespace_bodies(&mut self) -> ArchiveResult<BTreeMap<Namespace, Vec<u8>>> {
        let mut bodies: BTreeMap<Namespace, Vec<u8>> = BTreeMap::new();
        while let Some(event) = self.next_event()? {
            match event {
                ArchiveEvent::SegmentStart(ns) => {
                    bodies.entry(ns).or_default();
                }
                ArchiveEvent::Chunk(raw) => {
                    let ns = self.current.clone().expect("chunk implies open segment");
                    bodies.entry(ns).or_default().extend_from_slice(&raw);
                }
                ArchiveEvent::NamespaceEnd(ns) => {
                    bodies.entry(ns).or_default();
                }
            }
        }
        Ok(bodies)
    }
}
