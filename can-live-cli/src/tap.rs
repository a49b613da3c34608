//! Live tap printer
//!
//! Prints frames handed over by the analyzer's live tap, either candump-style
//! or as one JSON object per line. Frames arriving while the printer is busy
//! are dropped by the tap, never queued.

use anyhow::Result;
use can_live_analyzer::Frame;
use chrono::Utc;
use flume::{Receiver, RecvTimeoutError};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Largest standard (11-bit) arbitration ID
const MAX_STANDARD_ID: u32 = 0x7FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapFormat {
    Candump,
    Json,
}

#[derive(Serialize)]
struct TapRecord<'a> {
    device: &'a str,
    timestamp_ms: i64,
    #[serde(flatten)]
    frame: &'a Frame,
}

/// One candump-style line: `  can0  1A0   [2]  01 02`
pub fn format_candump(device: &str, frame: &Frame) -> String {
    let id = if frame.id() > MAX_STANDARD_ID {
        format!("{:08X}", frame.id())
    } else {
        format!("{:03X}", frame.id())
    };
    let data: Vec<String> = frame.data().iter().map(|b| format!("{:02X}", b)).collect();

    format!("  {}  {}   [{}]  {}", device, id, frame.len(), data.join(" "))
        .trim_end()
        .to_string()
}

pub fn format_json(device: &str, frame: &Frame) -> Result<String> {
    let record = TapRecord {
        device,
        timestamp_ms: Utc::now().timestamp_millis(),
        frame,
    };
    Ok(serde_json::to_string(&record)?)
}

/// Print tapped frames until `should_stop` says so, the tap closes, or
/// `max_frames` frames have been printed
///
/// Returns the number of frames printed.
pub fn print_frames<W: Write>(
    frames: &Receiver<Arc<Frame>>,
    device: &str,
    format: TapFormat,
    max_frames: Option<usize>,
    out: &mut W,
    should_stop: impl Fn() -> bool,
) -> Result<usize> {
    let mut printed = 0;

    while !should_stop() && max_frames.map_or(true, |max| printed < max) {
        match frames.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                let line = match format {
                    TapFormat::Candump => format_candump(device, &frame),
                    TapFormat::Json => format_json(device, &frame)?,
                };
                writeln!(out, "{}", line)?;
                printed += 1;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    out.flush()?;
    log::debug!("Tap printer finished after {} frames", printed);
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candump_format() {
        let frame = Frame::new(0x1A0, &[0x01, 0x02]).unwrap();
        assert_eq!(format_candump("can0", &frame), "  can0  1A0   [2]  01 02");

        let frame = Frame::new(0x18DAF110, &[0xFF]).unwrap();
        assert_eq!(format_candump("can1", &frame), "  can1  18DAF110   [1]  FF");

        let frame = Frame::new(0x7, &[]).unwrap();
        assert_eq!(format_candump("vcan0", &frame), "  vcan0  007   [0]");
    }

    #[test]
    fn test_json_format() {
        let frame = Frame::new(0x123, &[1, 2, 3]).unwrap();
        let line = format_json("vcan0", &frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["device"], "vcan0");
        assert_eq!(value["id"], 0x123);
        assert_eq!(value["length"], 3);
        assert_eq!(value["data"], serde_json::json!([1, 2, 3]));
        assert!(value["timestamp_ms"].is_i64());
    }

    #[test]
    fn test_print_frames_stops_at_max() {
        let (tx, rx) = flume::unbounded();
        for id in 0..5 {
            tx.send(Arc::new(Frame::new(id, &[0xAB]).unwrap())).unwrap();
        }

        let mut out = Vec::new();
        let printed =
            print_frames(&rx, "vcan0", TapFormat::Candump, Some(3), &mut out, || false).unwrap();

        assert_eq!(printed, 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("  vcan0  000   [1]  AB"));
    }

    #[test]
    fn test_print_frames_ends_when_tap_closes() {
        let (tx, rx) = flume::unbounded::<Arc<Frame>>();
        tx.send(Arc::new(Frame::new(0x10, &[]).unwrap())).unwrap();
        drop(tx);

        let mut out = Vec::new();
        let printed =
            print_frames(&rx, "vcan0", TapFormat::Json, None, &mut out, || false).unwrap();
        assert_eq!(printed, 1);
    }
}
