use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{AnisubError, Result};

/// One fixed-length slice of the source audio.
///
/// Chunk `index` covers `[index * segment_seconds, (index + 1) * segment_seconds)`
/// of the source; the last chunk may be shorter.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub index: usize,
    pub path: PathBuf,
    pub segment_seconds: f64,
}

impl AudioChunk {
    pub fn offset_seconds(&self) -> f64 {
        self.index as f64 * self.segment_seconds
    }
}

/// ffmpeg output pattern for the chunks of `audio_path`: `<stem>_%03d.<ext>`
pub fn chunk_pattern(audio_path: &Path, output_dir: &Path, extension: &str) -> Result<PathBuf> {
    let stem = file_stem(audio_path)?;
    Ok(output_dir.join(format!("{}_%03d.{}", stem, extension)))
}

/// Collect the chunk files written for `audio_path` into `output_dir`, ordered by
/// their numeric suffix. Zero chunks is a media processing error.
pub fn collect_chunks(
    audio_path: &Path,
    output_dir: &Path,
    extension: &str,
    segment_seconds: f64,
) -> Result<Vec<AudioChunk>> {
    let stem = file_stem(audio_path)?;
    let prefix = format!("{}_", stem);
    let source_name = audio_path.file_name().map(|n| n.to_os_string());

    let mut numbered: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.file_name().map(|n| n.to_os_string()) == source_name {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = name.strip_prefix(&prefix) else {
            continue;
        };
        match number.parse::<u64>() {
            Ok(n) => numbered.push((n, path)),
            Err(_) => debug!("Ignoring unrelated file in chunk directory: {}", path.display()),
        }
    }

    if numbered.is_empty() {
        return Err(AnisubError::Media(format!(
            "Audio split produced no chunks for {}",
            audio_path.display()
        )));
    }

    numbered.sort_by_key(|(n, _)| *n);
    if let Some((last, _)) = numbered.last() {
        if *last as usize + 1 != numbered.len() {
            warn!("Chunk numbering has gaps; offsets follow sorted position");
        }
    }

    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(index, (_, path))| AudioChunk {
            index,
            path,
            segment_seconds,
        })
        .collect())
}

/// Delete the chunk files and their directory. Failures are logged only.
pub async fn remove_chunks(chunks: &[AudioChunk], chunk_dir: &Path) {
    for chunk in chunks {
        if let Err(e) = tokio::fs::remove_file(&chunk.path).await {
            warn!("Failed to remove chunk {}: {}", chunk.path.display(), e);
        }
    }
    if let Err(e) = tokio::fs::remove_dir(chunk_dir).await {
        warn!("Failed to remove chunk directory {}: {}", chunk_dir.display(), e);
    }
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| AnisubError::Media(format!("Invalid audio filename: {}", path.display())))
}
