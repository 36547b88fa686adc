//! Re-stitches independently transcribed chunks into one timeline.
//!
//! Each chunk's SRT starts at zero with its own local sequence numbers. Merging
//! parses the chunk, shifts every block by the chunk's offset and renumbers blocks
//! with a single running counter. Chunks must be pushed in ascending chunk order; the counter is a
//! plain local because merging is sequential.

use tracing::{debug, warn};

use crate::subtitle::{SubtitleDocument, seconds_to_ms};

pub struct TimelineMerger {
    segment_seconds: f64,
    next_index: usize,
    document: SubtitleDocument,
    chunks_merged: usize,
    chunks_skipped: usize,
}

impl TimelineMerger {
    pub fn new(segment_seconds: f64) -> Self {
        Self {
            segment_seconds,
            next_index: 1,
            document: SubtitleDocument::default(),
            chunks_merged: 0,
            chunks_skipped: 0,
        }
    }

    /// Offset applied to chunk `chunk_index`
    pub fn offset_for(&self, chunk_index: usize) -> f64 {
        chunk_index as f64 * self.segment_seconds
    }

    /// Append the partial result of chunk `chunk_index`. Empty partials contribute nothing.
    pub fn push(&mut self, chunk_index: usize, partial: &str) {
        if partial.trim().is_empty() {
            debug!("Chunk {} produced no subtitles", chunk_index);
            self.chunks_skipped += 1;
            return;
        }

        let mut part = SubtitleDocument::parse(partial);
        if part.is_empty() {
            warn!("Chunk {} contained no parseable subtitle blocks", chunk_index);
            self.chunks_skipped += 1;
            return;
        }

        let offset = self.offset_for(chunk_index);
        part.shift(seconds_to_ms(offset));

        self.next_index = part.renumber_from(self.next_index);
        debug!(
            "Merged chunk {} at offset {}s ({} blocks)",
            chunk_index,
            offset,
            part.len()
        );
        self.document.blocks.append(&mut part.blocks);
        self.chunks_merged += 1;
    }

    pub fn chunks_merged(&self) -> usize {
        self.chunks_merged
    }

    pub fn chunks_skipped(&self) -> usize {
        self.chunks_skipped
    }

    pub fn finish(self) -> SubtitleDocument {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_partials(partials: &[String], segment_seconds: f64) -> SubtitleDocument {
        let mut merger = TimelineMerger::new(segment_seconds);
        for (index, partial) in partials.iter().enumerate() {
            merger.push(index, partial);
        }
        merger.finish()
    }

    fn chunk(lines: &[(&str, &str, &str)]) -> String {
        lines
            .iter()
            .enumerate()
            .map(|(i, (start, end, text))| format!("{}\n{} --> {}\n{}\n", i + 1, start, end, text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assert_gapless_and_ordered(doc: &SubtitleDocument) {
        for (i, block) in doc.blocks.iter().enumerate() {
            assert_eq!(block.index, i + 1);
            assert!(block.end_ms >= block.start_ms);
        }
        for pair in doc.blocks.windows(2) {
            assert!(pair[0].start_ms <= pair[1].start_ms);
        }
    }

    #[test]
    fn test_three_chunks_are_shifted_and_renumbered() {
        let partials = vec![
            chunk(&[("00:00:01,000", "00:00:05,000", "a"), ("00:00:30,000", "00:00:35,000", "b")]),
            chunk(&[("00:00:00,500", "00:00:02,000", "c")]),
            chunk(&[("00:00:10,000", "00:00:12,000", "d"), ("00:00:50,000", "00:00:59,999", "e")]),
        ];

        let doc = merge_partials(&partials, 60.0);
        assert_eq!(doc.len(), 5);
        assert_gapless_and_ordered(&doc);
        assert_eq!(doc.blocks[2].start_ms, 60_500);
        assert_eq!(doc.blocks[4].end_ms, 179_999);
        assert_eq!(doc.blocks[4].text, "e");
    }

    #[test]
    fn test_failed_middle_chunk_leaves_no_gap() {
        let partials = vec![
            chunk(&[("00:00:01,000", "00:00:02,000", "first")]),
            String::new(),
            chunk(&[("00:00:01,000", "00:00:02,000", "third")]),
        ];

        let mut merger = TimelineMerger::new(60.0);
        for (i, partial) in partials.iter().enumerate() {
            merger.push(i, partial);
        }
        assert_eq!(merger.chunks_merged(), 2);
        assert_eq!(merger.chunks_skipped(), 1);

        let doc = merger.finish();
        assert_eq!(doc.len(), 2);
        assert_gapless_and_ordered(&doc);
        assert_eq!(doc.blocks[1].index, 2);
        assert_eq!(doc.blocks[1].start_ms, 121_000);
        assert_eq!(doc.blocks[1].text, "third");
    }

    #[test]
    fn test_all_empty_yields_empty_document() {
        let doc = merge_partials(&[String::new(), "  \n".to_string()], 60.0);
        assert!(doc.is_empty());
        assert_eq!(doc.to_srt(), "");
    }

    #[test]
    fn test_single_zero_offset_chunk_roundtrips() {
        let original = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n";
        let doc = merge_partials(&[original.to_string()], 60.0);
        assert_eq!(doc.to_srt(), original);
    }

    #[test]
    fn test_provider_numbering_is_replaced() {
        let partial = "7\n00:00:01,000 --> 00:00:02,000\n3\n\n9\n00:00:03,000 --> 00:00:04,000\nx\n";
        let doc = merge_partials(&[partial.to_string()], 60.0);
        assert_eq!(doc.blocks[0].index, 1);
        assert_eq!(doc.blocks[0].text, "3");
        assert_eq!(doc.blocks[1].index, 2);
    }

    #[test]
    fn test_dot_millis_and_short_hours_are_shifted() {
        let partials = vec![
            chunk(&[("00:00:01,000", "00:00:02,000", "first")]),
            chunk(&[("00:00:01.000", "00:00:02.000", "second")]),
            chunk(&[("0:00:01,000", "0:00:02,000", "third")]),
        ];

        let doc = merge_partials(&partials, 60.0);
        assert_eq!(doc.len(), 3);
        assert_gapless_and_ordered(&doc);
        assert_eq!(doc.blocks[1].start_ms, 61_000);
        assert_eq!(doc.blocks[1].end_ms, 62_000);
        assert_eq!(doc.blocks[2].start_ms, 121_000);
        assert!(doc.to_srt().contains("2\n00:01:01,000 --> 00:01:02,000\nsecond\n"));
    }
}
