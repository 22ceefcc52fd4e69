//! Video search suggestions for knowledge gaps.
//!
//! No model call: each gap becomes a YouTube search link.

use serde::{Deserialize, Serialize};

use histnote_core::HistoryDocument;

/// At most this many suggestions are returned.
pub const MAX_SUGGESTIONS: usize = 3;

/// Topics used when the caller names no gaps.
pub const DEFAULT_TOPICS: [&str; 3] = ["nguyên nhân", "diễn biến", "ý nghĩa"];

const SEARCH_URL: &str = "https://www.youtube.com/results?search_query=";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoSuggestion {
    pub title: String,
    pub goal: String,
    pub url: String,
    pub id: usize,
}

/// One search link per gap, in the order given.
///
/// Blank gaps are ignored; with none left the default topics are used.
pub fn suggest_videos(document: &HistoryDocument, gaps: &[String]) -> Vec<VideoSuggestion> {
    let named: Vec<&str> = gaps
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect();
    let topics = if named.is_empty() {
        DEFAULT_TOPICS.to_vec()
    } else {
        named
    };

    topics
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .enumerate()
        .map(|(id, topic)| {
            let query = format!("{} lịch sử tóm tắt {}", document.event_name, topic);
            VideoSuggestion {
                title: format!("Video mục tiêu: {topic}"),
                goal: format!("Xem để trả lời: {topic}"),
                url: format!("{SEARCH_URL}{}", urlencoding::encode(&query)),
                id,
            }
        })
        .collect()
}
