//! Whisper transcription and OpenAI text-to-speech.

use super::{SpeechToText, TextToSpeech};
use crate::config::SpeechSettings;
use crate::error::{ParleyError, Result};
use crate::openai::{create_client_with, map_error};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AudioInput, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel,
    SpeechResponseFormat, Voice,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// OpenAI-backed speech in both directions.
pub struct OpenAISpeech {
    client: Client<OpenAIConfig>,
    transcription_model: String,
    tts_model: SpeechModel,
    voice: Voice,
}

impl OpenAISpeech {
    pub fn from_settings(settings: &SpeechSettings, api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with(api_base, timeout)?,
            transcription_model: settings.transcription_model.clone(),
            tts_model: parse_model(&settings.tts_model),
            voice: parse_voice(&settings.voice)?,
        })
    }
}

fn parse_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn parse_voice(name: &str) -> Result<Voice> {
    match name.to_lowercase().as_str() {
        "alloy" => Ok(Voice::Alloy),
        "echo" => Ok(Voice::Echo),
        "fable" => Ok(Voice::Fable),
        "onyx" => Ok(Voice::Onyx),
        "nova" => Ok(Voice::Nova),
        "shimmer" => Ok(Voice::Shimmer),
        other => Err(ParleyError::Config(format!("Unknown voice: {}", other))),
    }
}

#[async_trait]
impl SpeechToText for OpenAISpeech {
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(ParleyError::Speech("audio is empty".to_string()));
        }

        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(file_name.to_string(), audio))
            .model(&self.transcription_model)
            .build()
            .map_err(|e| ParleyError::Speech(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| map_error("Transcription API error", e))?;

        debug!("Transcribed {} characters", response.text.len());
        Ok(response.text.trim().to_string())
    }
}

#[async_trait]
impl TextToSpeech for OpenAISpeech {
    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(ParleyError::Speech("nothing to say".to_string()));
        }

        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.tts_model.clone())
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| ParleyError::Speech(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| map_error("Speech API error", e))?;

        Ok(response.bytes.to_vec())
    }
}
