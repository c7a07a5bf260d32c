//! Archive writer and multiplexer
//!
//! [`ArchiveWriter`] enforces the wire discipline for a single thread:
//! prelude first, one open body segment at a time, each namespace closed
//! exactly once. [`ArchiveMultiplexer`] wraps it for concurrent dumps: a
//! single serializer thread drains a bounded channel of chunks, so
//! collection workers produce in parallel while the wire stays
//! one-namespace-at-a-time. No lock-free interleaving; the format demands
//! the serializer.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::catalog::Namespace;

use super::errors::{ArchiveError, ArchiveResult};
use super::format::{
    write_body_chunk, write_namespace_header, write_prelude, write_terminator,
};
use super::prelude::ArchivePrelude;

/// Sequential archive writer with state checking.
pub struct ArchiveWriter<W: Write> {
    writer: W,
    prelude_written: bool,
    /// Namespace owning the open body segment, if any
    current: Option<Namespace>,
    closed: BTreeSet<Namespace>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Creates a writer over the given byte stream.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            prelude_written: false,
            current: None,
            closed: BTreeSet::new(),
        }
    }

    /// Writes the prelude. Must come first and exactly once.
    pub fn write_prelude(&mut self, prelude: &ArchivePrelude) -> ArchiveResult<()> {
        if self.prelude_written {
            return Err(ArchiveError::state("prelude already written"));
        }
        write_prelude(&mut self.writer, &prelude.to_document()?)?;
        self.prelude_written = true;
        Ok(())
    }

    fn check_open(&mut self, ns: &Namespace) -> ArchiveResult<()> {
        if !self.prelude_written {
            return Err(ArchiveError::state("prelude must be written first"));
        }
        if self.closed.contains(ns) {
            return Err(ArchiveError::state(format!(
                "namespace {} already terminated",
                ns
            )));
        }
        Ok(())
    }

    /// Writes one body chunk for `ns`, opening a new segment if another
    /// namespace (or none) was current.
    pub fn write_chunk(&mut self, ns: &Namespace, raw: &[u8]) -> ArchiveResult<()> {
        self.check_open(ns)?;
        if self.current.as_ref() != Some(ns) {
            write_namespace_header(&mut self.writer, ns, false)?;
            self.current = Some(ns.clone());
        }
        write_body_chunk(&mut self.writer, raw)
    }

    /// Ends a namespace's body stream.
    ///
    /// A namespace that never produced a chunk is recorded as an empty
    /// body via a header with the EOF sentinel set.
    pub fn close_namespace(&mut self, ns: &Namespace) -> ArchiveResult<()> {
        self.check_open(ns)?;
        if self.current.as_ref() == Some(ns) {
            write_terminator(&mut self.writer, ns)?;
            self.current = None;
        } else {
            write_namespace_header(&mut self.writer, ns, true)?;
        }
        self.closed.insert(ns.clone());
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> ArchiveResult<W> {
        if let Some(ns) = &self.current {
            return Err(ArchiveError::state(format!(
                "namespace {} still open at archive end",
                ns
            )));
        }
        self.writer
            .flush()
            .map_err(|e| ArchiveError::io("failed to flush archive", e))?;
        Ok(self.writer)
    }
}

enum MuxMessage {
    Chunk(Namespace, Vec<u8>),
    Done(Namespace),
}

/// Concurrent front end over [`ArchiveWriter`].
///
/// Workers hold a [`NamespaceSink`] each; one serializer thread drains the
/// shared bounded channel and owns the wire.
pub struct ArchiveMultiplexer<W: Write + Send + 'static> {
    sender: SyncSender<MuxMessage>,
    handle: JoinHandle<ArchiveResult<W>>,
}

impl<W: Write + Send + 'static> ArchiveMultiplexer<W> {
    /// Writes the prelude, then starts the serializer thread.
    ///
    /// `channel_capacity` bounds in-flight chunks so a slow output stalls
    /// producers instead of growing memory.
    pub fn start(
        writer: W,
        prelude: &ArchivePrelude,
        channel_capacity: usize,
    ) -> ArchiveResult<Self> {
        let mut archive = ArchiveWriter::new(writer);
        archive.write_prelude(prelude)?;

        let (sender, receiver): (SyncSender<MuxMessage>, Receiver<MuxMessage>) =
            sync_channel(channel_capacity.max(1));

        let handle = thread::Builder::new()
            .name("archive-mux".to_string())
            .spawn(move || -> ArchiveResult<W> {
                while let Ok(message) = receiver.recv() {
                    match message {
                        MuxMessage::Chunk(ns, raw) => archive.write_chunk(&ns, &raw)?,
                        MuxMessage::Done(ns) => archive.close_namespace(&ns)?,
                    }
                }
                archive.finish()
            })
            .map_err(|e| ArchiveError::io("failed to spawn archive serializer", e))?;

        Ok(Self { sender, handle })
    }

    /// A sink for one namespace's body stream.
    pub fn sink(&self, ns: Namespace) -> NamespaceSink {
        NamespaceSink {
            ns,
            sender: self.sender.clone(),
            done: false,
        }
    }

    /// Waits for the serializer to drain and returns the byte stream.
    ///
    /// All sinks must be finished or dropped first; the channel closing is
    /// what ends the serializer.
    pub fn finish(self) -> ArchiveResult<W> {
        drop(self.sender);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(ArchiveError::state("archive serializer panicked")),
        }
    }
}

/// A collection worker's handle on the archive.
pub struct NamespaceSink {
    ns: Namespace,
    sender: SyncSender<MuxMessage>,
    done: bool,
}

impl NamespaceSink {
    /// Queues one raw document for the serializer.
    pub fn write_raw(&mut self, raw: Vec<u8>) -> ArchiveResult<()> {
        if self.done {
            return Err(ArchiveError::state("namespace sink already finished"));
        }
        self.sender
            .send(MuxMessage::Chunk(self.ns.clone(), raw))
            .map_err(|_| ArchiveError::state("archive serializer stopped"))
    }

    /// Marks the namespace complete.
    pub fn finish(mut self) -> ArchiveResult<()> {
        self.done = true;
        self.sender
            .send(MuxMessage::Done(self.ns.clone()))
            .map_err(|_| ArchiveError::state("archive serializer stopped"))
    }
}
