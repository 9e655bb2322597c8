use std::sync::OnceLock;

use regex::Regex;

use crate::types::Sample;

/// Substring that marks a device fault anywhere in the tester output.
pub const FAULT_MARKER: &str = "CUDA error";

/// Grammar of one telemetry line, searched unanchored so banners or
/// timestamps around the payload do not matter:
///
/// ```text
/// [Chunk 12 | Mode 3] Time: 2.51 ms | Bandwidth: 601.20 GB/s | New errors: 0 | Total errors: 4
/// ```
const LINE_PATTERN: &str = r"\[Chunk\s+(\d+)\s*\|\s*Mode\s+(\d+)\]\s+Time:\s+([\d.]+)\s+ms\s+\|\s+Bandwidth:\s+([\d.]+)\s+GB/s\s+\|\s+New errors:\s+(\d+)\s+\|\s+Total errors:\s+(\d+)";

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("telemetry line pattern compiles"))
}

/// Outcome of scanning one line of tester output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// The line matched the telemetry grammar.
    Sample(Sample),
    /// The line carried the fault marker; payload is the raw line.
    Fault(String),
    /// Expected noise (banners, warnings, progress chatter).
    Ignored,
}

/// Scans one line. Pure: no state, no side effects beyond a trace log when
/// a structurally matching line carries an unparseable number.
pub fn parse_line(line: &str) -> ParsedLine {
    if let Some(caps) = line_regex().captures(line) {
        return match build_sample(&caps) {
            Some(sample) => ParsedLine::Sample(sample),
            None => {
                log::trace!("dropping line with malformed numeric field: {line}");
                ParsedLine::Ignored
            }
        };
    }
    if line.contains(FAULT_MARKER) {
        return ParsedLine::Fault(line.trim().to_string());
    }
    ParsedLine::Ignored
}

fn build_sample(caps: &regex::Captures<'_>) -> Option<Sample> {
    Some(Sample {
        chunk: caps[1].parse().ok()?,
        mode: caps[2].parse().ok()?,
        elapsed_ms: caps[3].parse().ok()?,
        bandwidth_gbps: caps[4].parse().ok()?,
        new_errors: caps[5].parse().ok()?,
        total_errors: caps[6].parse().ok()?,
    })
}
