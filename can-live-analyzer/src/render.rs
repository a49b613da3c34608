//! Frame payload rendering
//!
//! Turns the latest payload of a [`FrameSummary`] into text in one of several
//! numeric domains. Raw and U8 output also mark which bytes changed compared to
//! the previous frame of the same identifier.
//!
//! Rendering is a pure function of the summary; nothing is cached between calls.

use crate::types::{AnalyzerError, FrameSummary, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder for a 32-bit group that does not decode as a signed varint
pub const S32_PLACEHOLDER: &str = "??????????";

/// Numeric domain used to display a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Two hex digits per byte
    Raw,
    /// Three decimal digits per byte
    U8,
    /// 16-bit little-endian words
    U16LE,
    /// 16-bit big-endian words
    U16BE,
    /// 32-bit little-endian words
    U32LE,
    /// 32-bit big-endian words
    U32BE,
    /// Zig-zag varint decoded from each 4-byte group
    S32,
    /// Printable characters, `.` for everything else
    Ascii,
}

impl DisplayMode {
    /// Every mode, in column order
    pub const ALL: [DisplayMode; 8] = [
        DisplayMode::Raw,
        DisplayMode::U8,
        DisplayMode::U16LE,
        DisplayMode::U16BE,
        DisplayMode::U32LE,
        DisplayMode::U32BE,
        DisplayMode::S32,
        DisplayMode::Ascii,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Raw => "raw",
            DisplayMode::U8 => "u8",
            DisplayMode::U16LE => "u16le",
            DisplayMode::U16BE => "u16be",
            DisplayMode::U32LE => "u32le",
            DisplayMode::U32BE => "u32be",
            DisplayMode::S32 => "s32",
            DisplayMode::Ascii => "ascii",
        }
    }

    /// Column header for this mode
    pub fn label(&self) -> &'static str {
        match self {
            DisplayMode::Raw => "RAW",
            DisplayMode::U8 => "U8",
            DisplayMode::U16LE => "U16LE",
            DisplayMode::U16BE => "U16BE",
            DisplayMode::U32LE => "U32LE",
            DisplayMode::U32BE => "U32BE",
            DisplayMode::S32 => "S32",
            DisplayMode::Ascii => "ASCII",
        }
    }

    /// True for the per-byte modes that carry change highlighting
    pub fn highlights_changes(&self) -> bool {
        matches!(self, DisplayMode::Raw | DisplayMode::U8)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        DisplayMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalyzerError::InvalidDisplayMode(s.to_string()))
    }
}

/// One rendered unit (a byte, a word or the ASCII run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Set when the byte differs from the previous frame
    pub changed: bool,
}

impl Segment {
    fn plain(text: String) -> Self {
        Self { text, changed: false }
    }
}

/// Structured rendering of one payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedData {
    pub segments: Vec<Segment>,
}

impl RenderedData {
    /// Positions of the segments marked as changed
    pub fn changed_positions(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.changed)
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for RenderedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&segment.text)?;
        }
        Ok(())
    }
}

/// Render the latest payload of `summary` as plain text
pub fn render(summary: &FrameSummary, mode: DisplayMode) -> String {
    render_segments(summary, mode).to_string()
}

/// Render the latest payload of `summary` with per-segment change marks
pub fn render_segments(summary: &FrameSummary, mode: DisplayMode) -> RenderedData {
    let data = summary.latest_frame.data();

    let segments = match mode {
        DisplayMode::Raw | DisplayMode::U8 => {
            let changed = changed_bytes(summary);
            data.iter()
                .enumerate()
                .map(|(i, b)| Segment {
                    text: if mode == DisplayMode::Raw {
                        format!("{:02X}", b)
                    } else {
                        format!("{:03}", b)
                    },
                    changed: changed.as_ref().map(|mask| mask[i]).unwrap_or(false),
                })
                .collect()
        }
        DisplayMode::U16LE => words(data, 2, |w| format!("{:>6}", LittleEndian::read_u16(w))),
        DisplayMode::U16BE => words(data, 2, |w| format!("{:>6}", BigEndian::read_u16(w))),
        DisplayMode::U32LE => words(data, 4, |w| format!("{:>11}", LittleEndian::read_u32(w))),
        DisplayMode::U32BE => words(data, 4, |w| format!("{:>11}", BigEndian::read_u32(w))),
        DisplayMode::S32 => words(data, 4, |w| match decode_varint(w) {
            Ok(value) => format!("{:>11}", value),
            Err(e) => {
                log::trace!("{}", e);
                S32_PLACEHOLDER.to_string()
            }
        }),
        DisplayMode::Ascii => vec![Segment::plain(data.iter().map(|&b| printable(b)).collect())],
    };

    RenderedData { segments }
}

/// Per-byte change mask against the previous frame
///
/// Only computed when the previous payload is at least as long as the current
/// one; otherwise there is nothing to compare against.
fn changed_bytes(summary: &FrameSummary) -> Option<Vec<bool>> {
    let previous = summary.previous_frame.as_ref()?;
    let latest = summary.latest_frame.data();

    if previous.len() < latest.len() {
        return None;
    }

    Some(
        latest
            .iter()
            .zip(previous.data())
            .map(|(now, before)| now != before)
            .collect(),
    )
}

/// Format non-overlapping groups of `size` bytes, dropping any trailing remainder
fn words(data: &[u8], size: usize, format: impl Fn(&[u8]) -> String) -> Vec<Segment> {
    data.chunks_exact(size)
        .map(|word| Segment::plain(format(word)))
        .collect()
}

fn printable(b: u8) -> char {
    if b > 32 && b < 127 {
        b as char
    } else {
        '.'
    }
}

/// Decode a zig-zag encoded signed varint from the front of `bytes`
///
/// Bytes after the terminating byte are ignored. Fails if no byte terminates
/// the value or the value does not fit in 64 bits.
pub fn decode_varint(bytes: &[u8]) -> Result<i64> {
    const MAX_VARINT_LEN: usize = 10;

    let mut value: u64 = 0;
    let mut shift = 0u32;

    for (i, &b) in bytes.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(AnalyzerError::Varint("value overflows 64 bits".to_string()));
        }
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(AnalyzerError::Varint("value overflows 64 bits".to_string()));
            }
            value |= u64::from(b) << shift;

            let magnitude = (value >> 1) as i64;
            return Ok(if value & 1 != 0 { !magnitude } else { magnitude });
        }
        value |= u64::from(b & 0x7F) << shift;
        shift += 7;
    }

    Err(AnalyzerError::Varint(format!(
        "unterminated varint in {} bytes",
        bytes.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use chrono::Utc;
    use std::sync::Arc;

    fn summary(previous: Option<&[u8]>, latest: &[u8]) -> FrameSummary {
        let first = previous.map(|data| {
            FrameSummary::advance(None, Arc::new(Frame::new(0x123, data).unwrap()), Utc::now())
        });
        let latest = Arc::new(Frame::new(0x123, latest).unwrap());
        FrameSummary::advance(first.as_ref(), latest, Utc::now())
    }

    #[test]
    fn test_raw_and_u8() {
        let s = summary(None, &[0x0A, 0xFF, 0x00]);
        assert_eq!(render(&s, DisplayMode::Raw), "0A FF 00");
        assert_eq!(render(&s, DisplayMode::U8), "010 255 000");
    }

    #[test]
    fn test_sixteen_bit_words() {
        let s = summary(None, &[0x01, 0x02]);
        assert_eq!(render(&s, DisplayMode::U16LE).trim(), "513");
        assert_eq!(render(&s, DisplayMode::U16BE).trim(), "258");
        assert_eq!(render(&s, DisplayMode::U16LE), "   513");
    }

    #[test]
    fn test_trailing_bytes_are_dropped() {
        let s = summary(None, &[0x01, 0x00, 0x02, 0x00, 0x03]);
        assert_eq!(render_segments(&s, DisplayMode::U16LE).segments.len(), 2);
        assert_eq!(render(&s, DisplayMode::U16LE), "     1      2");

        let s = summary(None, &[0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0xFF]);
        assert_eq!(render(&s, DisplayMode::U32LE).trim(), "65536");
        assert_eq!(render(&s, DisplayMode::U32BE).trim(), "256");

        let s = summary(None, &[0x01]);
        assert_eq!(render(&s, DisplayMode::U16BE), "");
        assert_eq!(render(&s, DisplayMode::U32BE), "");
    }

    #[test]
    fn test_signed_varint_groups() {
        // 0x02 -> 1, 0x03 -> -2, trailing bytes of the group are ignored
        let s = summary(None, &[0x02, 0x00, 0x00, 0x00, 0x03, 0x7F, 0x7F, 0x7F]);
        let rendered = render_segments(&s, DisplayMode::S32);
        assert_eq!(rendered.segments[0].text.trim(), "1");
        assert_eq!(rendered.segments[1].text.trim(), "-2");
        assert_eq!(rendered.segments[0].text.len(), 11);
    }

    #[test]
    fn test_signed_varint_failure_uses_placeholder() {
        let s = summary(None, &[0x80, 0x80, 0x80, 0x80, 0x04, 0x00, 0x00, 0x00]);
        let rendered = render_segments(&s, DisplayMode::S32);
        assert_eq!(rendered.segments.len(), 2);
        assert_eq!(rendered.segments[0].text, S32_PLACEHOLDER);
        assert_eq!(rendered.segments[1].text.trim(), "2");
    }

    #[test]
    fn test_decode_varint() {
        assert_eq!(decode_varint(&[0x00]).unwrap(), 0);
        assert_eq!(decode_varint(&[0x01]).unwrap(), -1);
        assert_eq!(decode_varint(&[0xAC, 0x02]).unwrap(), 150);
        assert_eq!(decode_varint(&[0x81, 0x01, 0xFF]).unwrap(), -65);
        assert!(decode_varint(&[0xFF, 0xFF]).is_err());
        assert!(decode_varint(&[]).is_err());
    }

    #[test]
    fn test_ascii() {
        let s = summary(None, &[0x41, 0x00, 0x7F]);
        assert_eq!(render(&s, DisplayMode::Ascii), "A..");

        let s = summary(None, &[0x20, 0x21, 0x7E]);
        assert_eq!(render(&s, DisplayMode::Ascii), ".!~");
    }

    #[test]
    fn test_change_highlighting() {
        let s = summary(Some(&[0x01, 0x02]), &[0x01, 0x03]);
        assert_eq!(render_segments(&s, DisplayMode::Raw).changed_positions(), vec![1]);
        assert_eq!(render_segments(&s, DisplayMode::U8).changed_positions(), vec![1]);
        assert!(render_segments(&s, DisplayMode::U16LE).changed_positions().is_empty());
    }

    #[test]
    fn test_no_highlighting_without_comparable_previous() {
        let s = summary(None, &[0x01, 0x03]);
        assert!(render_segments(&s, DisplayMode::Raw).changed_positions().is_empty());

        let s = summary(Some(&[0x09]), &[0x01, 0x03]);
        assert!(render_segments(&s, DisplayMode::Raw).changed_positions().is_empty());
        assert_eq!(render(&s, DisplayMode::Raw), "01 03");

        // A longer previous frame is still compared position by position
        let s = summary(Some(&[0x01, 0x02, 0x03]), &[0x00, 0x02]);
        assert_eq!(render_segments(&s, DisplayMode::Raw).changed_positions(), vec![0]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let s = summary(Some(&[1, 2, 3, 4]), &[1, 9, 3, 4, 5, 6, 7, 8]);
        for mode in DisplayMode::ALL {
            assert_eq!(render_segments(&s, mode), render_segments(&s, mode));
        }
    }

    #[test]
    fn test_empty_payload() {
        let s = summary(None, &[]);
        for mode in DisplayMode::ALL {
            assert_eq!(render(&s, mode), "");
        }
    }

    #[test]
    fn test_mode_names() {
        for mode in DisplayMode::ALL {
            assert_eq!(mode.as_str().parse::<DisplayMode>().unwrap(), mode);
        }
        assert_eq!("U16LE".parse::<DisplayMode>().unwrap(), DisplayMode::U16LE);
        assert!("hex".parse::<DisplayMode>().is_err());
    }
}
