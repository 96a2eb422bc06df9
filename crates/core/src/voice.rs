//! Speech-to-text and text-to-speech collaborators.

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AudioInput, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel,
        SpeechResponseFormat, Voice,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error};

/// File name handed to the transcription API; its extension selects the decoder.
const RECORDING_FILE_NAME: &str = "recording.webm";

/// Turns a complete recording into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: Bytes,
        language: &str,
        vocabulary: Option<&str>,
    ) -> Result<String>;
}

/// Turns reply text into playable audio. `None` means synthesis failed.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Option<Bytes>;
}

/// Whisper transcription and TTS over an OpenAI-compatible API.
pub struct OpenAIVoice {
    client: Client<OpenAIConfig>,
    transcription_model: String,
    speech_model: SpeechModel,
    voice: Voice,
}

impl OpenAIVoice {
    pub fn new(config: OpenAIConfig, transcription_model: String, speech_model: &str, voice: &str) -> Self {
        Self {
            client: Client::with_config(config),
            transcription_model,
            speech_model: parse_speech_model(speech_model),
            voice: parse_voice(voice),
        }
    }
}

fn parse_speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn parse_voice(name: &str) -> Voice {
    match name.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        _ => Voice::Shimmer,
    }
}

#[async_trait]
impl Transcriber for OpenAIVoice {
    async fn transcribe(
        &self,
        audio: Bytes,
        language: &str,
        vocabulary: Option<&str>,
    ) -> Result<String> {
        debug!(bytes = audio.len(), %language, "Sending recording for transcription");
        let mut args = CreateTranscriptionRequestArgs::default();
        args.file(AudioInput::from_bytes(RECORDING_FILE_NAME.to_string(), audio))
            .model(&self.transcription_model)
            .language(language);
        if let Some(vocabulary) = vocabulary {
            args.prompt(vocabulary);
        }
        let response = self
            .client
            .audio()
            .transcribe(args.build()?)
            .await
            .context("transcription request failed")?;
        Ok(response.text)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAIVoice {
    async fn synthesize(&self, text: &str) -> Option<Bytes> {
        let preview: String = text.chars().take(50).collect();
        debug!(%preview, "Generating speech");
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.speech_model.clone())
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Mp3)
            .build();
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Invalid speech request");
                return None;
            }
        };
        match self.client.audio().speech(request).await {
            Ok(response) => Some(response.bytes),
            Err(e) => {
                error!(error = %e, "Speech synthesis failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speech_model() {
        assert!(matches!(parse_speech_model("tts-1-hd"), SpeechModel::Tts1Hd));
        assert!(matches!(parse_speech_model("tts-1"), SpeechModel::Tts1));
        assert!(matches!(parse_speech_model("gpt-4o-mini-tts"), SpeechModel::Other(m) if m == "gpt-4o-mini-tts"));
    }

    #[test]
    fn test_unknown_voice_defaults_to_shimmer() {
        assert!(matches!(parse_voice("ALLOY"), Voice::Alloy));
        assert!(matches!(parse_voice("robot"), Voice::Shimmer));
    }
}
