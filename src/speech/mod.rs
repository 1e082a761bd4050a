//! Speech-to-text and text-to-speech.
//!
//! Both directions are optional collaborators of a conversation: the CLI
//! and HTTP server use them for voice input and spoken replies.

mod openai;

pub use openai::OpenAISpeech;

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Converts recorded audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// `file_name` carries the audio format through its extension.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String>;
}

/// Converts text into mp3 audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Remove parenthesised fragments (source annotations and the like) and
/// collapse whitespace, so replies read naturally when spoken.
pub fn strip_citations(text: &str) -> String {
    static PARENS: OnceLock<Regex> = OnceLock::new();
    static SPACE_BEFORE_PUNCT: OnceLock<Regex> = OnceLock::new();

    let parens = PARENS.get_or_init(|| Regex::new(r"\([^()]*\)").expect("valid regex"));
    let space_before_punct =
        SPACE_BEFORE_PUNCT.get_or_init(|| Regex::new(r"\s+([.,;:!?])").expect("valid regex"));

    let stripped = parens.replace_all(text, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    space_before_punct.replace_all(&collapsed, "$1").into_owned()
}
