//! Streaming account handles
//!
//! Players link a streaming handle so match summaries can offer a single
//! multi-stream link covering everyone who is live.

use crate::error::{MatchmakingError, Result};

const STREAM_HOST: &str = "twitch.tv/";
const MULTISTREAM_BASE: &str = "https://multitwitch.tv/";
const MIN_HANDLE_LEN: usize = 3;
const MAX_HANDLE_LEN: usize = 25;

/// Extract and validate a handle from a bare name, `@name` or a channel URL
pub fn normalize_handle(input: &str) -> Result<String> {
    let invalid = || MatchmakingError::InvalidHandle {
        handle: input.to_string(),
    };

    let trimmed = input.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let candidate = match lowered.find(STREAM_HOST) {
        Some(start) => {
            let rest = &trimmed[start + STREAM_HOST.len()..];
            rest.split(|c: char| c == '/' || c == '?' || c == '@' || c.is_whitespace())
                .next()
                .unwrap_or_default()
        }
        None => trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_start_matches('@'),
    };

    let valid_chars = candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_chars || !(MIN_HANDLE_LEN..=MAX_HANDLE_LEN).contains(&candidate.len()) {
        return Err(invalid());
    }
    Ok(candidate.to_string())
}

/// Channel URL for a linked handle
pub fn channel_url(handle: &str) -> String {
    format!("https://{}{}", STREAM_HOST, handle)
}

/// Multi-stream URL for the given handles, `None` when nobody is linked
pub fn multistream_url<'a, I>(handles: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let handles: Vec<&str> = handles.into_iter().filter(|h| !h.is_empty()).collect();
    if handles.is_empty() {
        return None;
    }
    Some(format!("{}{}", MULTISTREAM_BASE, handles.join("/")))
}
