//! SIO block grammar and escape decoding.
//!
//! A block is a 33 byte ASCII header bracketed by `0x01`/`0x02`, followed by
//! the declared number of payload bytes and a single `0x03`. The declared
//! length counts *decoded* bytes; on the wire the payload may be longer
//! because the modem link stuffs `0x2b` as `0x18 0x6b` and `0x18` as
//! `0x18 0x58`.

use tracing::trace;

/// Start-of-header marker.
pub const BLOCK_START: u8 = 0x01;
/// End-of-header marker; payload bytes follow.
pub const HEADER_END: u8 = 0x02;
/// Terminal byte closing a block.
pub const BLOCK_END: u8 = 0x03;
/// Escape byte introducing a stuffed two-byte sequence.
pub const ESCAPE: u8 = 0x18;

/// Decoded SIO block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SioHeader {
    /// Two-letter instrument identifier, e.g. `PS`, `WA`.
    pub id: String,
    /// Controller id + inductive id digits, e.g. `1236801`. Used verbatim in
    /// category output file names.
    pub equipment: String,
    /// Declared payload length in decoded bytes.
    pub data_len: usize,
    /// Controller POSIX timestamp.
    pub time: u32,
    pub block_number: u8,
}

impl SioHeader {
    /// Header length including both markers.
    pub const LEN: usize = 33;

    /// Decode from bytes. Returns `None` if there are not enough bytes or
    /// any field fails validation; a failed candidate is simply not a block.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<SioHeader> {
        if buf.len() < Self::LEN {
            return None;
        }
        if buf[0] != BLOCK_START || buf[32] != HEADER_END {
            return None;
        }
        if buf[10] != b'_' || buf[24] != b'_' || buf[27] != b'_' {
            return None;
        }
        if !buf[1..3].iter().all(u8::is_ascii_uppercase) {
            return None;
        }
        if !buf[3..10].iter().all(u8::is_ascii_digit) {
            return None;
        }
        if !buf[15].is_ascii_alphanumeric() {
            return None;
        }
        let data_len = parse_hex(&buf[11..15])? as usize;
        let time = parse_hex(&buf[16..24])?;
        let block_number = u8::try_from(parse_hex(&buf[25..27])?).ok()?;
        // checksum field must be well-formed hex, but is not verified
        parse_hex(&buf[28..32])?;

        Some(SioHeader {
            id: String::from_utf8_lossy(&buf[1..3]).to_string(),
            equipment: String::from_utf8_lossy(&buf[3..10]).to_string(),
            data_len,
            time,
            block_number,
        })
    }
}

fn parse_hex(buf: &[u8]) -> Option<u32> {
    if !buf.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(std::str::from_utf8(buf).ok()?, 16).ok()
}

/// Reverse the link-layer byte stuffing over the nominal block span.
///
/// `nominal` is the declared payload length plus the terminal byte. The pass
/// replaces each stuffed pair found wholly within the nominal span; each
/// replacement shortens the output by one byte, so the same number of raw
/// bytes from immediately beyond the span are appended *undecoded* to
/// restore the declared length. Returns the decoded block and the number of
/// extra raw bytes consumed, or `None` if `buf` does not hold the full
/// extended span.
pub(crate) fn unstuff(buf: &[u8], nominal: usize) -> Option<(Vec<u8>, usize)> {
    if buf.len() < nominal {
        return None;
    }
    let mut out = Vec::with_capacity(nominal);
    let mut i = 0;
    while i < nominal {
        if buf[i] == ESCAPE && i + 1 < nominal {
            match buf[i + 1] {
                0x6b => {
                    out.push(0x2b);
                    i += 2;
                    continue;
                }
                0x58 => {
                    out.push(ESCAPE);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(buf[i]);
        i += 1;
    }
    let extra = nominal - out.len();
    if buf.len() < nominal + extra {
        return None;
    }
    out.extend_from_slice(&buf[nominal..nominal + extra]);
    Some((out, extra))
}

/// One complete block found in an accumulation.
#[derive(Debug)]
pub struct ResolvedFrame<'a> {
    pub header: SioHeader,
    /// Raw header bytes, written to category output ahead of the block.
    pub header_bytes: &'a [u8],
    /// Decoded payload plus terminal byte, `data_len + 1` bytes.
    pub block: Vec<u8>,
    /// Raw byte range consumed from the accumulation, half-open. `end` is
    /// past the terminal byte and accounts for escape extension.
    pub start: u64,
    pub end: u64,
}

/// Scans one unresolved span of an accumulation for complete blocks.
///
/// Candidates whose payload would run past the end of the accumulation are
/// left in place for a future run to complete; candidates that fail header
/// validation or the terminal-byte check are skipped one byte at a time.
pub struct FrameScanner<'a> {
    acc: &'a [u8],
    pos: usize,
    end: usize,
    /// True when the span ends at the accumulation end, i.e. more bytes may
    /// still arrive for a trailing partial block.
    at_eof: bool,
}

impl<'a> FrameScanner<'a> {
    #[must_use]
    pub fn new(acc: &'a [u8], start: usize, end: usize) -> Self {
        let end = end.min(acc.len());
        FrameScanner {
            acc,
            pos: start,
            end,
            at_eof: end == acc.len(),
        }
    }
}

impl<'a> Iterator for FrameScanner<'a> {
    type Item = ResolvedFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.end {
            let Some(off) = self.acc[self.pos..self.end]
                .iter()
                .position(|&b| b == BLOCK_START)
            else {
                self.pos = self.end;
                return None;
            };
            let idx = self.pos + off;

            if idx + SioHeader::LEN > self.end {
                if self.at_eof {
                    // truncated header at the end of data; may complete later
                    trace!(offset = idx, "partial header at accumulation end");
                    self.pos = self.end;
                    return None;
                }
                self.pos = idx + 1;
                continue;
            }

            let Some(header) = SioHeader::decode(&self.acc[idx..]) else {
                self.pos = idx + 1;
                continue;
            };

            let nominal = header.data_len + 1;
            match unstuff(&self.acc[idx + SioHeader::LEN..self.end], nominal) {
                None => {
                    if self.at_eof {
                        trace!(
                            offset = idx,
                            id = %header.id,
                            data_len = header.data_len,
                            "incomplete block at accumulation end"
                        );
                        self.pos = self.end;
                        return None;
                    }
                    // does not fit before already-resolved data; not a block
                    self.pos = idx + 1;
                }
                Some((block, extra)) => {
                    if block.last() == Some(&BLOCK_END) {
                        let end = idx + SioHeader::LEN + nominal + extra;
                        self.pos = end;
                        return Some(ResolvedFrame {
                            header_bytes: &self.acc[idx..idx + SioHeader::LEN],
                            header,
                            block,
                            start: idx as u64,
                            end: end as u64,
                        });
                    }
                    self.pos = idx + 1;
                }
            }
        }
        None
    }
}
