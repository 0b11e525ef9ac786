//! Parsing of `.mdd` modem data dump files.
//!
//! A dump file is a sequence of sections. Each section starts with ASCII tag
//! lines, one per line, in order `NODE`, `PORT`, `STARTOFFSET`, `ENDOFFSET`,
//! `TIME`, followed immediately by the section's raw payload bytes. Offsets
//! are byte positions within the logical telemetry stream for the node/port
//! pair; `ENDOFFSET` is inclusive. The tag lines are link metadata only and
//! are stripped here, before any payload byte reaches an accumulation file.

pub mod summary;

use std::io::{ErrorKind, Read};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Error, Result};

/// One contiguous run of stream bytes recovered from a dump file.
///
/// Sections from different dump files routinely describe overlapping or
/// identical ranges of the same stream; dedup happens at merge time, by
/// offset only.
#[derive(Debug, Clone)]
pub struct Section {
    pub node: u16,
    pub port: u16,
    /// Byte range within the logical stream, half-open.
    pub start: u64,
    pub end: u64,
    /// Controller-reported retrieval time.
    pub time: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// Section metadata without the payload, for batch diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SectionInfo {
    pub node: u16,
    pub port: u16,
    pub start: u64,
    pub end: u64,
    pub time: DateTime<Utc>,
}

impl Section {
    /// Name of the accumulation file this section belongs to, e.g.
    /// `node58p1.dat`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("node{}p{}.dat", self.node, self.port)
    }

    #[must_use]
    pub fn info(&self) -> SectionInfo {
        SectionInfo {
            node: self.node,
            port: self.port,
            start: self.start,
            end: self.end,
            time: self.time,
        }
    }

    /// Read a single [Section].
    ///
    /// Returns `Ok(None)` on a clean EOF before the first tag line.
    ///
    /// # Errors
    /// [`Error::DumpHeader`] for missing or malformed tag lines,
    /// [`Error::InvalidRange`] for an offset pair with `STARTOFFSET` past
    /// `ENDOFFSET`, or any `std::io::Error` reading.
    pub fn read<R>(mut r: R) -> Result<Option<Section>>
    where
        R: Read,
    {
        let Some(line) = read_line(&mut r)? else {
            return Ok(None);
        };
        let node = tag_value(&line, "NODE")?;
        let port = tag_value(&require_line(&mut r)?, "PORT")?;
        let start = tag_value(&require_line(&mut r)?, "STARTOFFSET")?;
        let end_incl = tag_value(&require_line(&mut r)?, "ENDOFFSET")?;
        let secs = tag_value(&require_line(&mut r)?, "TIME")?;

        let end = end_incl
            .checked_add(1)
            .ok_or_else(|| Error::DumpHeader(format!("ENDOFFSET {end_incl} out of range")))?;
        if start > end_incl {
            return Err(Error::InvalidRange { start, end });
        }
        let node = u16::try_from(node)
            .map_err(|_| Error::DumpHeader(format!("node id {node} out of range")))?;
        let port = u16::try_from(port)
            .map_err(|_| Error::DumpHeader(format!("port id {port} out of range")))?;
        let time = i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| Error::DumpHeader(format!("bad section time {secs}")))?;

        let size = usize::try_from(end - start)
            .map_err(|_| Error::DumpHeader(format!("section size {} too large", end - start)))?;
        let mut data = vec![0u8; size];
        r.read_exact(&mut data).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                Error::DumpHeader(format!("section payload truncated at {start}..{end}"))
            } else {
                Error::Io(err)
            }
        })?;

        Ok(Some(Section {
            node,
            port,
            start,
            end,
            time,
            data,
        }))
    }
}

fn require_line<R: Read>(r: &mut R) -> Result<String> {
    read_line(r)?.ok_or_else(|| Error::DumpHeader("unexpected eof in section header".to_string()))
}

/// Read one LF-terminated ASCII header line, tolerating a trailing CR.
/// Returns `Ok(None)` on EOF before any byte is read.
fn read_line<R: Read>(r: &mut R) -> Result<Option<String>> {
    let mut line: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        match r.read(&mut buf) {
            Ok(0) => {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(Error::DumpHeader(
                    "unexpected eof in section header".to_string(),
                ));
            }
            Ok(_) => {
                if buf[0] == b'\n' {
                    break;
                }
                line.push(buf[0]);
                // Tag lines are short; anything longer means we are lost in
                // payload bytes.
                if line.len() > 64 {
                    return Err(Error::DumpHeader("header line too long".to_string()));
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map(Some).map_err(|_| {
        Error::DumpHeader("non-ascii bytes in section header".to_string())
    })
}

fn tag_value(line: &str, tag: &str) -> Result<u64> {
    let Some(value) = line.strip_prefix(tag).and_then(|v| v.strip_prefix(':')) else {
        return Err(Error::DumpHeader(format!(
            "expected {tag} tag, got {line:?}"
        )));
    };
    value
        .trim()
        .parse()
        .map_err(|_| Error::DumpHeader(format!("bad {tag} value {value:?}")))
}

pub struct SectionReaderIter<R>
where
    R: Read,
{
    reader: R,
    done: bool,
}

impl<R> Iterator for SectionReaderIter<R>
where
    R: Read,
{
    type Item = Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match Section::read(&mut self.reader) {
            Ok(Some(section)) => Some(Ok(section)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // A header error leaves the reader position unknown, so
                // there is no recovering the rest of this file.
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Return an iterator over the [Section]s in a dump file.
///
/// Iteration ends after the first error; a malformed header leaves no way to
/// find the next section boundary.
pub fn read_sections<R>(reader: R) -> SectionReaderIter<R>
where
    R: Read,
{
    SectionReaderIter {
        reader,
        done: false,
    }
}
