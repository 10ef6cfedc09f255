//! Speech synthesis behind an ordered list of providers.
//!
//! Providers are tried in order with the same text; the first one that
//! produces a probe-able audio file wins. A failed attempt never leaves a
//! file behind.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::{fs, process::Command};
use tracing::{info, warn};
use whatlang::Lang;

use crate::{
    artifact_store::delete_file_if_exists,
    config::Config,
    error::{PipelineError, PipelineResult},
    media::{MediaToolkit, StreamKind},
};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no audio")]
    EmptyAudio,

    #[error("{program} exited with status {exit_code:?}: {stderr}")]
    Process {
        program: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("audio could not be probed: {0}")]
    Unusable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One speech backend: writes `text` as audio to `output`.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI `audio/speech` endpoint.
pub struct OpenAiSpeech {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(base_url: String, api_key: String, model: String, voice: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            voice,
        }
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), ProviderError> {
        let url = format!("{}/audio/speech", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OpenAiSpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: text,
                response_format: "mp3",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::EmptyAudio);
        }
        fs::write(output, &audio).await?;
        Ok(())
    }
}

/// Regional Edge voices keyed by detected script language.
const EDGE_VOICES: &[(Lang, &str)] = &[
    (Lang::Fra, "fr-FR-DeniseNeural"),
    (Lang::Spa, "es-ES-ElviraNeural"),
    (Lang::Deu, "de-DE-KatjaNeural"),
    (Lang::Ita, "it-IT-ElsaNeural"),
    (Lang::Por, "pt-BR-FranciscaNeural"),
    (Lang::Nld, "nl-NL-ColetteNeural"),
    (Lang::Pol, "pl-PL-ZofiaNeural"),
    (Lang::Rus, "ru-RU-SvetlanaNeural"),
    (Lang::Tur, "tr-TR-EmelNeural"),
    (Lang::Ara, "ar-SA-ZariyahNeural"),
    (Lang::Hin, "hi-IN-SwaraNeural"),
    (Lang::Jpn, "ja-JP-NanamiNeural"),
    (Lang::Kor, "ko-KR-SunHiNeural"),
    (Lang::Cmn, "zh-CN-XiaoxiaoNeural"),
];

/// Picks a regional voice for the script's language. English, unmapped
/// languages and unreliable detections keep `default_voice`.
pub fn edge_voice_for(text: &str, default_voice: &str) -> String {
    whatlang::detect(text)
        .filter(|info| info.is_reliable())
        .and_then(|info| {
            EDGE_VOICES
                .iter()
                .find(|(lang, _)| *lang == info.lang())
                .map(|(_, voice)| (*voice).to_string())
        })
        .unwrap_or_else(|| default_voice.to_string())
}

/// Microsoft Edge voices through the `edge-tts` command-line tool.
pub struct EdgeSpeech {
    program: String,
    default_voice: String,
}

impl EdgeSpeech {
    pub fn new(program: String, default_voice: String) -> Self {
        Self {
            program,
            default_voice,
        }
    }
}

#[async_trait]
impl SpeechProvider for EdgeSpeech {
    fn name(&self) -> &str {
        "edge-tts"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), ProviderError> {
        let voice = edge_voice_for(text, &self.default_voice);
        info!(voice = %voice, "Using Edge TTS voice");
        // Attached form so a script starting with '-' is not read as a flag.
        let result = Command::new(&self.program)
            .arg(format!("--voice={voice}"))
            .arg(format!("--text={text}"))
            .arg("--write-media")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            return Err(ProviderError::Process {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
                exit_code: result.status.code(),
            });
        }

        match fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ProviderError::EmptyAudio),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub provider: String,
}

pub struct SpeechSynthesizer {
    providers: Vec<Arc<dyn SpeechProvider>>,
    media: Arc<dyn MediaToolkit>,
    max_chars: usize,
    attempt_timeout: Duration,
    probe_timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        providers: Vec<Arc<dyn SpeechProvider>>,
        media: Arc<dyn MediaToolkit>,
        max_chars: usize,
        attempt_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            media,
            max_chars,
            attempt_timeout,
            probe_timeout,
        }
    }

    /// OpenAI first when a key is configured, Edge TTS always last.
    pub fn from_config(config: &Config, media: Arc<dyn MediaToolkit>) -> Self {
        let mut providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();
        if let Some(api_key) = &config.openai_api_key {
            providers.push(Arc::new(OpenAiSpeech::new(
                config.openai_base_url.clone(),
                api_key.clone(),
                config.openai_tts_model.clone(),
                config.openai_voice.clone(),
            )));
        } else {
            info!("OPENAI_API_KEY not set, speech synthesis will use Edge TTS only");
        }
        providers.push(Arc::new(EdgeSpeech::new(
            config.edge_tts_bin.clone(),
            config.edge_voice.clone(),
        )));

        Self::new(
            providers,
            media,
            config.max_script_chars,
            config.tts_timeout,
            config.probe_timeout,
        )
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Rejects blank or oversized scripts without touching any provider.
    pub fn validate(&self, text: &str) -> PipelineResult<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::invalid_input("Script cannot be empty"));
        }
        let chars = trimmed.chars().count();
        if chars > self.max_chars {
            return Err(PipelineError::script_too_long(chars, self.max_chars));
        }
        Ok(())
    }

    pub async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<SynthesizedAudio> {
        self.validate(text)?;
        let text = text.trim();

        if self.providers.is_empty() {
            return Err(PipelineError::synthesis(
                "Voice generation failed",
                Some("no speech providers configured".to_string()),
            ));
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            let partial = partial_path(output, provider.name());
            match self.attempt(provider.as_ref(), text, &partial).await {
                Ok(duration_seconds) => {
                    fs::rename(&partial, output).await.map_err(|err| {
                        PipelineError::synthesis(
                            "Voice generation failed",
                            Some(format!("failed to move audio into place: {err}")),
                        )
                    })?;
                    info!(
                        provider = provider.name(),
                        duration_seconds,
                        output = %output.display(),
                        "Speech synthesized"
                    );
                    return Ok(SynthesizedAudio {
                        path: output.to_path_buf(),
                        duration_seconds,
                        provider: provider.name().to_string(),
                    });
                }
                Err(err) => {
                    warn!(provider = provider.name(), "Speech provider failed: {err}");
                    if let Err(cleanup) = delete_file_if_exists(&partial).await {
                        warn!("Failed removing partial audio: {cleanup:#}");
                    }
                    failures.push(format!("{}: {err}", provider.name()));
                }
            }
        }

        Err(PipelineError::synthesis(
            "Voice generation failed",
            Some(failures.join("; ")),
        ))
    }

    async fn attempt(
        &self,
        provider: &dyn SpeechProvider,
        text: &str,
        partial: &Path,
    ) -> Result<f64, ProviderError> {
        delete_file_if_exists(partial)
            .await
            .map_err(|err| ProviderError::Unusable(format!("{err:#}")))?;

        match tokio::time::timeout(self.attempt_timeout, provider.synthesize(text, partial)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(ProviderError::Timeout(self.attempt_timeout)),
        }

        self.media
            .probe_duration(partial, StreamKind::Audio, self.probe_timeout)
            .await
            .map_err(|err| ProviderError::Unusable(err.to_string()))
    }
}

fn partial_path(output: &Path, provider: &str) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "voice".to_string());
    output.with_file_name(format!("{file_name}.{provider}.partial"))
}
