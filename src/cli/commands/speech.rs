//! Transcribe and speak commands.

use super::check_ready;
use crate::cli::preflight::Operation;
use crate::cli::Output;
use crate::config::Settings;
use crate::speech::{strip_citations, OpenAISpeech, SpeechToText, TextToSpeech};
use anyhow::{Context, Result};
use std::path::Path;

fn speech(settings: &Settings) -> Result<OpenAISpeech> {
    check_ready(Operation::Speech)?;
    Ok(OpenAISpeech::from_settings(
        &settings.speech,
        settings.llm.api_base.as_deref(),
        settings.llm.request_timeout(),
    )?)
}

/// Print the transcription of an audio file.
pub async fn run_transcribe(file: &Path, settings: Settings) -> Result<()> {
    let speech = speech(&settings)?;

    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio.mp3".to_string());

    let spinner = Output::spinner("Transcribing...");
    let result = speech.transcribe(audio, &file_name).await;
    spinner.finish_and_clear();

    println!("{}", result?);
    Ok(())
}

/// Write spoken text to an mp3 file.
pub async fn run_speak(text: &str, output: &Path, settings: Settings) -> Result<()> {
    let speech = speech(&settings)?;

    let spinner = Output::spinner("Synthesizing...");
    let result = speech.synthesize(&strip_citations(text)).await;
    spinner.finish_and_clear();

    let audio = result?;
    tokio::fs::write(output, &audio)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Output::success(&format!("Wrote {} bytes to {}", audio.len(), output.display()));
    Ok(())
}
