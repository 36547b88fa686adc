use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{AnisubError, Result};

/// A whole line holding a timing range; tolerates `.` as the millisecond separator
/// and trailing cue settings.
static TIMING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d+:\d{2}:\d{2}[,.]\d{3})")
        .expect("timing line pattern is valid")
});

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("blank line pattern is valid"));

/// One timed subtitle entry. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleBlock {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Ordered sequence of blocks, serialized as SRT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleDocument {
    pub blocks: Vec<SubtitleBlock>,
}

impl SubtitleBlock {
    /// Move both endpoints by `offset_ms`, clamping at zero.
    pub fn shift(&mut self, offset_ms: i64) {
        self.start_ms = shift_ms(self.start_ms, offset_ms);
        self.end_ms = shift_ms(self.end_ms, offset_ms);
    }
}

impl fmt::Display for SubtitleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_srt_time(self.start_ms),
            format_srt_time(self.end_ms),
            self.text
        )
    }
}

impl SubtitleDocument {
    /// Parse SRT text block by block: optional sequence line, timing line, then text
    /// lines up to the next blank line. The sequence line is only recognised when it
    /// directly precedes a timing line, so numeric dialogue is kept as text.
    /// Blocks without a timing line are skipped.
    pub fn parse(content: &str) -> Self {
        let normalized = normalize_newlines(content);
        let lines: Vec<&str> = normalized.lines().collect();
        let mut blocks = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].trim().is_empty() {
                i += 1;
                continue;
            }

            let mut index = None;
            if i + 1 < lines.len() && TIMING_LINE.is_match(lines[i + 1]) {
                match lines[i].trim().parse::<usize>() {
                    Ok(n) => {
                        index = Some(n);
                        i += 1;
                    }
                    Err(_) => {
                        debug!("Ignoring non-numeric sequence line: {}", lines[i]);
                        i += 1;
                    }
                }
            }

            let timing = TIMING_LINE
                .captures(lines[i])
                .and_then(|caps| Some((parse_srt_time(&caps[1]).ok()?, parse_srt_time(&caps[2]).ok()?)));

            let Some((start_ms, end_ms)) = timing else {
                warn!("Skipping malformed subtitle block at line {}", i + 1);
                while i < lines.len() && !lines[i].trim().is_empty() {
                    i += 1;
                }
                continue;
            };
            i += 1;

            let mut text_lines = Vec::new();
            while i < lines.len() && !lines[i].trim().is_empty() {
                text_lines.push(lines[i]);
                i += 1;
            }

            blocks.push(SubtitleBlock {
                index: index.unwrap_or(blocks.len() + 1),
                start_ms,
                end_ms,
                text: text_lines.join("\n"),
            });
        }

        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Assign consecutive sequence numbers starting at `first`; returns the next free number.
    pub fn renumber_from(&mut self, first: usize) -> usize {
        let mut counter = first;
        for block in &mut self.blocks {
            block.index = counter;
            counter += 1;
        }
        counter
    }

    /// Move every block by `offset_ms`. Text is left untouched.
    pub fn shift(&mut self, offset_ms: i64) {
        for block in &mut self.blocks {
            block.shift(offset_ms);
        }
    }

    pub fn to_srt(&self) -> String {
        self.blocks
            .iter()
            .map(|block| block.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split SRT text into raw blocks on blank-line separators.
pub fn split_blocks(content: &str) -> Vec<String> {
    let normalized = normalize_newlines(content);
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    BLANK_LINE
        .split(trimmed)
        .map(|block| block.trim_matches('\n').to_string())
        .filter(|block| !block.trim().is_empty())
        .collect()
}

/// Parse `HH:MM:SS,mmm` (or `HH:MM:SS.mmm`) into milliseconds
pub fn parse_srt_time(value: &str) -> Result<u64> {
    let invalid = || AnisubError::Subtitle(format!("Invalid SRT timestamp: {}", value));

    let (clock, millis) = value
        .trim()
        .split_once([',', '.'])
        .ok_or_else(invalid)?;
    let mut parts = clock.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: u64 = s.parse().map_err(|_| invalid())?;
    let millis: u64 = millis.parse().map_err(|_| invalid())?;

    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(invalid());
    }

    Ok(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Format milliseconds as `HH:MM:SS,mmm`; hours are not wrapped at 24
pub fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

pub fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn shift_ms(value: u64, offset_ms: i64) -> u64 {
    if offset_ms >= 0 {
        value.saturating_add(offset_ms as u64)
    } else {
        value.saturating_sub(offset_ms.unsigned_abs())
    }
}

fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Write SRT text to `output_path`, creating the parent directory
pub async fn write_srt<P: AsRef<Path>>(content: &str, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Writing SRT file: {}", output_path.display());

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(output_path, content).await?;

    Ok(())
}

pub async fn read_srt<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnisubError::FileNotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:05,000\nHello there\n\n2\n00:00:06,500 --> 00:00:08,250\nSecond line\nwith a break\n";

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(65_123), "00:01:05,123");
        assert_eq!(format_srt_time(3_661_500), "01:01:01,500");
        assert_eq!(format_srt_time(100 * 3_600_000), "100:00:00,000");
    }

    #[test]
    fn test_parse_srt_time() {
        assert_eq!(parse_srt_time("00:01:05,123").unwrap(), 65_123);
        assert_eq!(parse_srt_time("01:01:01.500").unwrap(), 3_661_500);
        assert!(parse_srt_time("00:61:00,000").is_err());
        assert!(parse_srt_time("garbage").is_err());
    }

    fn shifted(input: &str, offset_seconds: f64) -> String {
        let mut doc = SubtitleDocument::parse(input);
        doc.shift(seconds_to_ms(offset_seconds));
        doc.to_srt()
    }

    #[test]
    fn test_shift_by_sixty_seconds() {
        assert_eq!(
            shifted("1\n00:00:01,000 --> 00:00:05,000\nHi\n", 60.0),
            "1\n00:01:01,000 --> 00:01:05,000\nHi\n"
        );
    }

    #[test]
    fn test_shift_by_zero_is_identity() {
        assert_eq!(shifted(SAMPLE, 0.0), SAMPLE);
    }

    #[test]
    fn test_shift_leaves_text_untouched() {
        let input = "7\n00:59:59,900 --> 01:00:00,100\nIt is 10:00 now --> really\n";
        assert_eq!(
            shifted(input, 0.5),
            "7\n01:00:00,400 --> 01:00:00,600\nIt is 10:00 now --> really\n"
        );
    }

    #[test]
    fn test_shift_fractional_offset_and_unbounded_hours() {
        assert_eq!(
            shifted("1\n23:59:59,999 --> 23:59:59,999\nx\n", 3600.0 + 0.001),
            "1\n25:00:00,000 --> 25:00:00,000\nx\n"
        );
    }

    #[test]
    fn test_shift_normalizes_dot_millis_and_short_hours() {
        assert_eq!(
            shifted("1\n0:00:01.250 --> 0:00:02.000\nx\n", 60.0),
            "1\n00:01:01,250 --> 00:01:02,000\nx\n"
        );
    }

    #[test]
    fn test_parse_and_serialize_roundtrip() {
        let doc = SubtitleDocument::parse(SAMPLE);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks[1].text, "Second line\nwith a break");
        assert_eq!(doc.blocks[1].start_ms, 6_500);
        assert_eq!(doc.to_srt(), SAMPLE);
    }

    #[test]
    fn test_numeric_dialogue_is_not_a_sequence_line() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\n42\n\n2\n00:00:03,000 --> 00:00:04,000\n1999\n2000\n";
        let mut doc = SubtitleDocument::parse(input);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks[0].text, "42");
        assert_eq!(doc.blocks[1].text, "1999\n2000");

        doc.renumber_from(10);
        assert_eq!(doc.blocks[0].index, 10);
        assert_eq!(doc.blocks[1].index, 11);
        assert!(doc.to_srt().contains("\n42\n"));
    }

    #[test]
    fn test_parse_tolerates_crlf_and_missing_index() {
        let input = "00:00:01,000 --> 00:00:02,000\r\nNo index\r\n\r\n5\r\n00:00:03.000 --> 00:00:04.000 X1:10\r\nDot millis\r\n";
        let doc = SubtitleDocument::parse(input);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks[0].index, 1);
        assert_eq!(doc.blocks[0].text, "No index");
        assert_eq!(doc.blocks[1].index, 5);
        assert_eq!(doc.blocks[1].start_ms, 3_000);
    }

    #[test]
    fn test_parse_skips_block_without_timing() {
        let input = "WEBVTT header junk\n\n1\n00:00:01,000 --> 00:00:02,000\nKept\n";
        let doc = SubtitleDocument::parse(input);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.blocks[0].text, "Kept");
    }

    #[test]
    fn test_split_blocks() {
        let blocks = split_blocks("\n\n1\nA\n\n2\nB\r\n  \r\n3\nC\n\n\n");
        assert_eq!(blocks, vec!["1\nA", "2\nB", "3\nC"]);
        assert!(split_blocks("  \n\n ").is_empty());
    }

    #[tokio::test]
    async fn test_write_and_read_srt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.srt");
        write_srt(SAMPLE, &path).await.unwrap();
        assert_eq!(read_srt(&path).await.unwrap(), SAMPLE);
        assert!(matches!(
            read_srt(dir.path().join("missing.srt")).await,
            Err(AnisubError::FileNotFound(_))
        ));
    }
}
