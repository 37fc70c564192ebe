use crate::Result;
use crate::log::entry::{Entry, Params};

use anyhow::Context;
use chrono::NaiveDateTime;
use regex::Regex;
use std::io::BufRead;
use std::mem;

/// Where the parser is inside the line stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Header lines are accumulating (or nothing is buffered yet). The first
    /// non-`#` line starts the SQL body.
    Seeking,
    /// The body has started; the next `#` line opens a new record and
    /// finalizes the buffered one.
    InRecord,
}

/// Reconstructs discrete records from a slow-query-log line stream.
///
/// Records are delimited by runs of `#` header lines; everything up to the
/// next run is the record's SQL body. Consumption is a single forward pass:
/// call [`read_entry`](LogParser::read_entry) until it yields `None`, or use
/// the `Iterator` impl.
pub struct LogParser<R> {
    input: R,
    buffer: Vec<String>,
    state: ParseState,
    /// Logs omit `Time` when it has not changed; the last parsed value
    /// carries forward.
    last_time: Option<i64>,
    done: bool,
    re_time: Regex,
    re_user_host: Regex,
    re_command: Regex,
    re_table: Regex,
}

impl<R: BufRead> LogParser<R> {
    pub fn new(input: R) -> Result<LogParser<R>> {
        Ok(LogParser {
            input,
            buffer: Vec::new(),
            state: ParseState::Seeking,
            last_time: None,
            done: false,
            re_time: Regex::new(r"^Time: ([0-9: ]+)$")?,
            re_user_host: Regex::new(r"^User@Host: (.*)$")?,
            // Capture: 1) the SQL verb following the timestamp-set preamble.
            re_command: Regex::new(r"SET timestamp=\d+;\s*([a-zA-Z]+)\s")?,
            // Capture: 1) clause keyword 2) table identifier.
            // WARN: this may be inaccurate when a query has a subquery.
            re_table: Regex::new(
                r"SET timestamp=\d+;\s*.+(FROM|INTO|DESCRIBE)\s+`?([a-zA-Z0-9_]+)`?",
            )?,
        })
    }

    /// Pull the next record. `Ok(None)` means the stream is exhausted; any
    /// buffered tail has been finalized by then.
    pub fn read_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let mut line = String::new();
            let n = self
                .input
                .read_line(&mut line)
                .context("read log input")?;
            if n == 0 {
                self.done = true;
                return Ok(self.finalize());
            }

            match self.state {
                ParseState::Seeking => {
                    if line.starts_with('#') {
                        self.buffer.push(line);
                    } else if self.buffer.is_empty() {
                        // Pre-record noise (e.g. the server banner).
                    } else {
                        self.buffer.push(line);
                        self.state = ParseState::InRecord;
                    }
                }
                ParseState::InRecord => {
                    if line.starts_with('#') {
                        let entry = self.finalize();
                        self.buffer.push(line);
                        if let Some(entry) = entry {
                            return Ok(Some(entry));
                        }
                    } else {
                        self.buffer.push(line);
                    }
                }
            }
        }
    }

    /// Turn the buffered lines into an Entry, or nothing when the buffer is
    /// not a record (empty, noise-led, or no resolvable timestamp).
    fn finalize(&mut self) -> Option<Entry> {
        let buffer = mem::take(&mut self.buffer);
        self.state = ParseState::Seeking;
        if !buffer.first()?.starts_with('#') {
            return None;
        }

        let mut params = Params::default();
        let mut idx = 0;
        while idx < buffer.len() && buffer[idx].starts_with('#') {
            let header = buffer[idx].trim().trim_start_matches('#').trim_start();
            self.parse_header(header, &mut params);
            idx += 1;
        }
        // Everything from the first non-`#` line on is the SQL body,
        // verbatim, line terminators included.
        params.body = buffer[idx..].concat();

        let parsed = params.time.as_deref().and_then(|raw| {
            let t = parse_time(raw);
            if t.is_none() {
                tracing::debug!(raw, "unparseable Time header; using carried-forward timestamp");
            }
            t
        });
        let start = match parsed {
            Some(t) => {
                self.last_time = Some(t);
                t
            }
            None => match self.last_time {
                Some(t) => t,
                None => {
                    tracing::debug!("record dropped: no resolvable timestamp");
                    return None;
                }
            },
        };

        let end = params
            .query_time
            .as_deref()
            .and_then(|qt| qt.trim().parse::<f64>().ok())
            .map(|qt| start as f64 + qt);

        let command = self
            .re_command
            .captures(&params.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        let table = self
            .re_table
            .captures(&params.body)
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str().to_string());

        Some(Entry {
            start,
            end,
            command,
            table,
            params,
        })
    }

    /// Interpret one header line with the `#` marker already stripped.
    fn parse_header(&self, line: &str, params: &mut Params) {
        if let Some(caps) = self.re_time.captures(line) {
            params.insert("Time", caps[1].to_string());
        } else if let Some(caps) = self.re_user_host.captures(line) {
            params.insert("User@Host", caps[1].to_string());
        } else {
            // Generic `Key: Value  Key2: Value2` line, two-space delimited.
            // Fragments without a separator are dropped.
            for pair in line.split("  ") {
                if let Some((key, value)) = pair.split_once(": ") {
                    params.insert(key, value.to_string());
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for LogParser<R> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_entry().transpose()
    }
}

/// `%y%m%d %H:%M:%S`, resolved as UTC.
fn parse_time(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw.trim(), "%y%m%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc().timestamp())
}
