//! Anisub - chunked, parallel video-to-translated-subtitle pipeline
//!
//! Splits a video's audio into fixed-length chunks, transcribes them in
//! parallel, merges the partial subtitles onto one timeline and translates the
//! result in parallel groups, using ffmpeg and hosted speech/LLM providers.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod subtitle;
pub mod task;
pub mod transcribe;
pub mod translate;
