//! SRT subtitle sidecar support
//!
//! Parses SubRip files into a cue list queried by playback time. Parsing is
//! lenient: byte-order marks, CRLF line endings, missing index lines, and
//! dot-separated milliseconds are all accepted, and malformed blocks are
//! skipped with a warning rather than failing the whole file.

use crate::utils::error::{PlayerError, Result};
use log::{debug, warn};
use std::path::Path;

/// One subtitle cue with its display window in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// A parsed subtitle file, cues ordered by start time
#[derive(Debug, Clone, Default)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    /// Read and parse an SRT file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let track = Self::parse(&content)?;
        debug!(
            "Loaded {} subtitle cues from {}",
            track.cues.len(),
            path.display()
        );
        Ok(track)
    }

    /// Parse SRT content into a track
    ///
    /// Empty input yields an empty track. Input with content but no
    /// parseable cue is an error so callers can surface the bad file.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}');
        let mut cues = Vec::new();
        let mut skipped = 0usize;

        for block in split_blocks(content) {
            match parse_block(&block) {
                Some(cue) => cues.push(cue),
                None => {
                    skipped += 1;
                    warn!("Skipping malformed subtitle block: {:?}", block.first());
                }
            }
        }

        if cues.is_empty() && skipped > 0 {
            return Err(PlayerError::Subtitle(
                "no parseable cues in subtitle file".to_string(),
            ));
        }

        cues.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
        Ok(Self { cues })
    }

    /// The cue whose window contains `secs`, boundaries inclusive
    pub fn cue_at(&self, secs: f64) -> Option<&SubtitleCue> {
        self.cues
            .iter()
            .find(|cue| cue.start_secs <= secs && secs <= cue.end_secs)
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

/// Split into blocks of non-blank lines
fn split_blocks(content: &str) -> Vec<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Parse one block: optional index line, timing line, text lines
fn parse_block(lines: &[String]) -> Option<SubtitleCue> {
    let mut iter = lines.iter();
    let mut line = iter.next()?;

    // The numeric counter line is optional in the wild
    if line.chars().all(|c| c.is_ascii_digit()) {
        line = iter.next()?;
    }

    let (start_secs, end_secs) = parse_timing_line(line)?;
    let text = iter.map(String::as_str).collect::<Vec<_>>().join("\n");
    if text.trim().is_empty() {
        return None;
    }

    Some(SubtitleCue {
        start_secs,
        end_secs,
        text,
    })
}

/// Parse `HH:MM:SS,mmm --> HH:MM:SS,mmm`, tolerating trailing coordinates
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (lhs, rhs) = line.split_once("-->")?;
    let start = parse_timestamp(lhs.trim())?;
    let end = parse_timestamp(rhs.trim().split_whitespace().next()?)?;
    if end < start {
        return None;
    }
    Some((start, end))
}

/// Parse `HH:MM:SS,mmm` (or `.mmm`) into seconds
fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.splitn(3, ':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().replace(',', ".").parse().ok()?;
    if seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}
