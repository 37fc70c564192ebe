//! NDJSON and archival JSON record writers.

use crate::Result;
use crate::log::Entry;

use anyhow::Context;
use std::io::Write;

/// Newline-delimited JSON: one self-contained object per line, no framing.
/// A consumer can process the stream line by line without buffering the
/// whole file, and resume from any line boundary.
pub struct NdjsonWriter<W> {
    out: W,
}

impl<W: Write> NdjsonWriter<W> {
    /// NDJSON has no prologue.
    pub fn open(out: W) -> Result<NdjsonWriter<W>> {
        Ok(NdjsonWriter { out })
    }

    pub fn write(&mut self, entry: &Entry) -> Result<()> {
        serde_json::to_writer(&mut self.out, entry).context("serialize record")?;
        self.out.write_all(b"\n")?;
        // Flush per record so a tailing consumer sees whole lines promptly.
        self.out.flush()?;
        Ok(())
    }

    /// No epilogue either; just make sure everything reached the sink.
    pub fn close(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Archival JSON: `{"entries":[ ... ]}`. Streams incrementally, but the
/// output is a valid document only after `close` writes the closing bracket.
pub struct JsonArchiveWriter<W> {
    out: W,
    count: u64,
}

impl<W: Write> JsonArchiveWriter<W> {
    pub fn open(mut out: W) -> Result<JsonArchiveWriter<W>> {
        out.write_all(b"{\"entries\":[")?;
        Ok(JsonArchiveWriter { out, count: 0 })
    }

    pub fn write(&mut self, entry: &Entry) -> Result<()> {
        if self.count > 0 {
            self.out.write_all(b",\n")?;
        } else {
            self.out.write_all(b"\n")?;
        }
        self.count += 1;
        serde_json::to_writer(&mut self.out, entry).context("serialize record")?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.out.write_all(b"]}")?;
        self.out.flush()?;
        Ok(())
    }
}
