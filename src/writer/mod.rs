//! Record serialization behind one open/write/close capability.
//!
//! The writer variants form a closed set selected once at construction; all
//! of them stream incrementally, but only NDJSON output is valid at every
//! line boundary — the archival layouts need `close` to finish the document.

pub mod json;
pub mod xml;

pub use json::{JsonArchiveWriter, NdjsonWriter};
pub use xml::XmlWriter;

use crate::Result;
use crate::log::Entry;

use anyhow::{Context, bail};
use clap::ValueEnum;
use nix::fcntl::{Flock, FlockArg};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Output encodings for the record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One self-contained JSON object per line; restartable mid-stream.
    Ndjson,
    /// `{"entries":[...]}`; valid JSON only once closed.
    Json,
    /// `<archive><logs>...` with one `<log>` element per record.
    Xml,
}

/// An open destination. File destinations hold an exclusive advisory lock
/// for the writer's lifetime; the standard-output pseudo-path takes none.
pub enum Sink {
    Stdout(io::Stdout),
    File(Flock<File>),
}

impl Sink {
    /// Open and lock the destination. `None` or `-` selects standard output.
    /// Failure to open or lock is fatal to the run.
    pub fn open(path: Option<&str>) -> Result<Sink> {
        match path {
            None | Some("-") => Ok(Sink::Stdout(io::stdout())),
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("cannot open output file {}", path))?;
                match Flock::lock(file, FlockArg::LockExclusive) {
                    Ok(lock) => Ok(Sink::File(lock)),
                    Err((_, errno)) => bail!("cannot lock output file {}: {}", path, errno),
                }
            }
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Stdout(out) => out.write(buf),
            Sink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout(out) => out.flush(),
            Sink::File(file) => file.flush(),
        }
    }
}

/// The closed set of record writers behind the shared lifecycle contract.
pub enum RecordWriter {
    Ndjson(NdjsonWriter<BufWriter<Sink>>),
    Json(JsonArchiveWriter<BufWriter<Sink>>),
    Xml(XmlWriter<BufWriter<Sink>>),
}

impl RecordWriter {
    /// Open the destination (acquiring the lock for real files) and write the
    /// format's prologue. `window` becomes archive metadata where the format
    /// has a place for it.
    pub fn open(
        format: Format,
        path: Option<&str>,
        window: Option<(i64, i64)>,
    ) -> Result<RecordWriter> {
        let out = BufWriter::new(Sink::open(path)?);
        Ok(match format {
            Format::Ndjson => RecordWriter::Ndjson(NdjsonWriter::open(out)?),
            Format::Json => RecordWriter::Json(JsonArchiveWriter::open(out)?),
            Format::Xml => RecordWriter::Xml(XmlWriter::open(out, window)?),
        })
    }

    pub fn write(&mut self, entry: &Entry) -> Result<()> {
        match self {
            RecordWriter::Ndjson(w) => w.write(entry),
            RecordWriter::Json(w) => w.write(entry),
            RecordWriter::Xml(w) => w.write(entry),
        }
    }

    /// Finish the document and flush. Dropping the underlying sink releases
    /// the file lock; consuming `self` makes the close terminal.
    pub fn close(self) -> Result<()> {
        match self {
            RecordWriter::Ndjson(w) => w.close(),
            RecordWriter::Json(w) => w.close(),
            RecordWriter::Xml(w) => w.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Params;
    use std::fs;

    fn entry(start: i64) -> Entry {
        let mut params = Params::default();
        params.insert("Query_time", "1.0".to_string());
        params.body = "SELECT 1;\n".to_string();
        Entry {
            start,
            end: Some(start as f64 + 1.0),
            command: Some("SELECT".to_string()),
            table: None,
            params,
        }
    }

    #[test]
    fn file_destination_is_written_and_unlocked_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let path = path.to_str().unwrap();

        let mut writer = RecordWriter::open(Format::Ndjson, Some(path), None).unwrap();
        writer.write(&entry(100)).unwrap();
        writer.write(&entry(200)).unwrap();
        writer.close().unwrap();

        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["start"].is_i64());
        }

        // The lock is gone: a second writer can take the same path.
        let again = RecordWriter::open(Format::Ndjson, Some(path), None).unwrap();
        again.close().unwrap();
    }

    #[test]
    fn json_archive_document_is_complete_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let path = path.to_str().unwrap();

        let mut writer = RecordWriter::open(Format::Json, Some(path), None).unwrap();
        writer.write(&entry(100)).unwrap();
        writer.close().unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["entries"].as_array().unwrap().len(), 1);
    }
}
