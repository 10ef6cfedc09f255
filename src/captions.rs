//! Word-level caption timing.
//!
//! Cues come from an even split of the audio duration unless a word timing
//! source (Whisper transcription) reports one window per script word.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{PipelineError, PipelineResult},
    models::CaptionCue,
};

/// Splits a script into whitespace-delimited words, punctuation kept attached.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Spreads `duration_seconds` evenly over `words`.
///
/// Cue `i` spans `[i*d/n, (i+1)*d/n)`; the final end is pinned to exactly
/// `duration_seconds`. Each start equals the previous end, so the cues tile
/// the whole track.
pub fn compute_cues(words: &[String], duration_seconds: f64) -> PipelineResult<Vec<CaptionCue>> {
    if words.is_empty() {
        return Err(PipelineError::invalid_input("Script has no speakable words"));
    }
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(PipelineError::invalid_input(format!(
            "Audio duration must be positive, got {duration_seconds}"
        )));
    }

    let n = words.len();
    let slice = duration_seconds / n as f64;
    let mut cues = Vec::with_capacity(n);
    let mut start = 0.0;

    for (i, word) in words.iter().enumerate() {
        let end = if i + 1 == n {
            duration_seconds
        } else {
            ((i + 1) as f64 * slice).max(start)
        };
        cues.push(CaptionCue {
            word: word.clone(),
            start_seconds: start,
            end_seconds: end,
        });
        start = end;
    }

    Ok(cues)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedWord {
    pub word: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transcription returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transcription returned no word timestamps")]
    NoWords,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reports when each spoken word starts and ends in an audio file.
#[async_trait]
pub trait WordTimingSource: Send + Sync {
    fn name(&self) -> &str;

    async fn word_timings(&self, audio: &Path) -> Result<Vec<TimedWord>, TimingError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    words: Vec<TranscribedWord>,
}

#[derive(Debug, Deserialize)]
struct TranscribedWord {
    word: String,
    start: f64,
    end: f64,
}

/// OpenAI `audio/transcriptions` with word granularity.
pub struct WhisperTimings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperTimings {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl WordTimingSource for WhisperTimings {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn word_timings(&self, audio: &Path) -> Result<Vec<TimedWord>, TimingError> {
        let bytes = fs::read(audio).await?;
        let file = Part::bytes(bytes)
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TimingError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        let words: Vec<TimedWord> = transcription
            .words
            .into_iter()
            .filter(|w| !w.word.trim().is_empty())
            .map(|w| TimedWord {
                word: w.word.trim().to_string(),
                start_seconds: w.start,
                end_seconds: w.end,
            })
            .collect();
        if words.is_empty() {
            return Err(TimingError::NoWords);
        }
        Ok(words)
    }
}

/// Produces caption cues, preferring a word timing source when one is
/// configured and its result lines up with the script.
pub struct CaptionTimer {
    source: Option<Arc<dyn WordTimingSource>>,
    timeout: Duration,
}

impl CaptionTimer {
    /// Even split only.
    pub fn even() -> Self {
        Self {
            source: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn new(source: Arc<dyn WordTimingSource>, timeout: Duration) -> Self {
        Self {
            source: Some(source),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        match &config.openai_api_key {
            Some(api_key) => Self::new(
                Arc::new(WhisperTimings::new(
                    config.openai_base_url.clone(),
                    api_key.clone(),
                    config.openai_whisper_model.clone(),
                )),
                config.tts_timeout,
            ),
            None => Self::even(),
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name())
    }

    /// Same contract as [`compute_cues`]: one cue per script word, tiling
    /// `[0, duration_seconds]`. Any timing source failure, timeout or word
    /// count mismatch falls back to the even split.
    pub async fn cues(
        &self,
        words: &[String],
        audio: &Path,
        duration_seconds: f64,
    ) -> PipelineResult<Vec<CaptionCue>> {
        let even = compute_cues(words, duration_seconds)?;
        let Some(source) = &self.source else {
            return Ok(even);
        };

        match tokio::time::timeout(self.timeout, source.word_timings(audio)).await {
            Ok(Ok(timed)) => match align_cues(words, &timed, duration_seconds) {
                Some(cues) => {
                    info!(source = source.name(), words = cues.len(), "Using transcribed word timings");
                    return Ok(cues);
                }
                None => warn!(
                    source = source.name(),
                    script_words = words.len(),
                    timed_words = timed.len(),
                    "Transcribed words do not match the script, using even split"
                ),
            },
            Ok(Err(err)) => warn!(source = source.name(), "Word timing failed, using even split: {err}"),
            Err(_) => warn!(
                source = source.name(),
                timeout_secs = self.timeout.as_secs(),
                "Word timing timed out, using even split"
            ),
        }
        Ok(even)
    }
}

/// Maps transcribed start times onto the script words. Each cue ends where
/// the next begins, the first starts at 0 and the last ends at the duration.
fn align_cues(words: &[String], timed: &[TimedWord], duration_seconds: f64) -> Option<Vec<CaptionCue>> {
    if timed.len() != words.len() || timed.iter().any(|w| !w.start_seconds.is_finite()) {
        return None;
    }

    let mut starts = Vec::with_capacity(timed.len());
    let mut previous = 0.0;
    for (i, word) in timed.iter().enumerate() {
        let start = if i == 0 {
            0.0
        } else {
            word.start_seconds.clamp(previous, duration_seconds)
        };
        starts.push(start);
        previous = start;
    }

    let cues = words
        .iter()
        .enumerate()
        .map(|(i, word)| CaptionCue {
            word: word.clone(),
            start_seconds: starts[i],
            end_seconds: starts.get(i + 1).copied().unwrap_or(duration_seconds),
        })
        .collect();
    Some(cues)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        tokenize(text)
    }

    #[test]
    fn tokenize_keeps_punctuation() {
        assert_eq!(
            tokenize("  Hello,   world!\nIt's\tme. "),
            vec!["Hello,", "world!", "It's", "me."]
        );
        assert!(tokenize(" \n\t ").is_empty());
    }

    #[test]
    fn two_words_split_the_track_in_half() {
        let cues = compute_cues(&words("Hello world"), 3.0).expect("cues");
        assert_eq!(
            cues,
            vec![
                CaptionCue {
                    word: "Hello".to_string(),
                    start_seconds: 0.0,
                    end_seconds: 1.5,
                },
                CaptionCue {
                    word: "world".to_string(),
                    start_seconds: 1.5,
                    end_seconds: 3.0,
                },
            ]
        );
    }

    #[test]
    fn cues_tile_the_duration_for_many_shapes() {
        for n in [1usize, 2, 3, 7, 10, 97, 500] {
            for duration in [0.001, 0.1, 1.0 / 3.0, 4.21, 59.97, 1234.5678] {
                let ws: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
                let cues = compute_cues(&ws, duration).expect("cues");

                assert_eq!(cues.len(), n);
                assert_eq!(cues[0].start_seconds, 0.0);
                assert_eq!(cues[n - 1].end_seconds, duration);
                for cue in &cues {
                    assert!(cue.start_seconds <= cue.end_seconds);
                }
                for pair in cues.windows(2) {
                    assert_eq!(pair[0].end_seconds, pair[1].start_seconds);
                }
            }
        }
    }

    #[test]
    fn no_words_is_invalid_input() {
        let err = compute_cues(&[], 3.0).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(compute_cues(&words("one"), bad).is_err());
        }
    }

    struct FixedTimings {
        result: Result<Vec<(&'static str, f64)>, ()>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl WordTimingSource for FixedTimings {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn word_timings(&self, _audio: &Path) -> Result<Vec<TimedWord>, TimingError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.result {
                Ok(words) => Ok(words
                    .iter()
                    .map(|(word, start)| TimedWord {
                        word: word.to_string(),
                        start_seconds: *start,
                        end_seconds: start + 0.2,
                    })
                    .collect()),
                Err(()) => Err(TimingError::NoWords),
            }
        }
    }

    fn timer(result: Result<Vec<(&'static str, f64)>, ()>, delay: Option<Duration>) -> CaptionTimer {
        CaptionTimer::new(
            Arc::new(FixedTimings { result, delay }),
            Duration::from_millis(100),
        )
    }

    fn spans(cues: &[CaptionCue]) -> Vec<(&str, f64, f64)> {
        cues.iter()
            .map(|c| (c.word.as_str(), c.start_seconds, c.end_seconds))
            .collect()
    }

    #[tokio::test]
    async fn transcribed_starts_drive_script_words() {
        let timer = timer(
            Ok(vec![("hello", 0.4), ("there", 0.9), ("friend", 2.5)]),
            None,
        );
        let cues = timer
            .cues(&words("Hello, there friend!"), Path::new("voice.mp3"), 4.0)
            .await
            .expect("cues");
        assert_eq!(
            spans(&cues),
            vec![("Hello,", 0.0, 0.9), ("there", 0.9, 2.5), ("friend!", 2.5, 4.0)]
        );
    }

    #[tokio::test]
    async fn out_of_order_or_overlong_starts_are_clamped() {
        let timer = timer(Ok(vec![("a", 0.0), ("b", 2.0), ("c", 1.0), ("d", 9.0)]), None);
        let cues = timer
            .cues(&words("a b c d"), Path::new("voice.mp3"), 3.0)
            .await
            .expect("cues");
        assert_eq!(
            spans(&cues),
            vec![("a", 0.0, 2.0), ("b", 2.0, 2.0), ("c", 2.0, 3.0), ("d", 3.0, 3.0)]
        );
    }

    #[tokio::test]
    async fn timing_failures_fall_back_to_even_split() {
        let expected = compute_cues(&words("Hello world"), 3.0).expect("even");
        for timer in [
            timer(Err(()), None),
            timer(Ok(vec![("hello", 0.1)]), None),
            timer(Ok(vec![("hello", 0.1), ("world", f64::NAN)]), None),
            timer(Ok(vec![("hello", 0.1), ("world", 1.0)]), Some(Duration::from_secs(5))),
        ] {
            let cues = timer
                .cues(&words("Hello world"), Path::new("voice.mp3"), 3.0)
                .await
                .expect("cues");
            assert_eq!(cues, expected);
        }
    }

    #[tokio::test]
    async fn timer_keeps_degenerate_input_errors() {
        let timer = timer(Ok(vec![("hello", 0.1)]), None);
        let err = timer
            .cues(&[], Path::new("voice.mp3"), 3.0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(timer
            .cues(&words("hello"), Path::new("voice.mp3"), 0.0)
            .await
            .is_err());
    }

    #[test]
    fn whisper_is_used_only_with_an_api_key() {
        assert_eq!(CaptionTimer::from_config(&Config::default()).source_name(), None);
        let config = Config {
            openai_api_key: Some("sk-test".to_string()),
            ..Config::default()
        };
        assert_eq!(CaptionTimer::from_config(&config).source_name(), Some("whisper"));
    }

    #[tokio::test]
    async fn whisper_posts_audio_and_reads_word_timestamps() {
        use axum::{
            extract::Request,
            http::{header, StatusCode},
            routing::post,
            Json, Router,
        };
        use serde_json::json;

        async fn transcribe(request: Request) -> Result<Json<serde_json::Value>, StatusCode> {
            let authorized = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk-test");
            let multipart = request
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("multipart/form-data"));
            if !authorized || !multipart {
                return Err(StatusCode::UNAUTHORIZED);
            }
            let body = axum::body::to_bytes(request.into_body(), usize::MAX)
                .await
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            let body = String::from_utf8_lossy(&body);
            for needle in ["whisper-1", "verbose_json", "timestamp_granularities[]", "audio.mp3", "ID3"] {
                if !body.contains(needle) {
                    return Err(StatusCode::BAD_REQUEST);
                }
            }
            Ok(Json(json!({
                "text": "Hello world",
                "words": [
                    { "word": " Hello", "start": 0.0, "end": 0.6 },
                    { "word": "  ", "start": 0.6, "end": 0.7 },
                    { "word": "world", "start": 0.7, "end": 1.3 }
                ]
            })))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().route("/v1/audio/transcriptions", post(transcribe));
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("voice.mp3");
        fs::write(&audio, b"ID3fake").await.expect("write audio");

        let whisper = WhisperTimings::new(
            format!("http://{addr}/v1/"),
            "sk-test".to_string(),
            "whisper-1".to_string(),
        );
        let timed = whisper.word_timings(&audio).await.expect("timings");
        assert_eq!(
            timed,
            vec![
                TimedWord {
                    word: "Hello".to_string(),
                    start_seconds: 0.0,
                    end_seconds: 0.6,
                },
                TimedWord {
                    word: "world".to_string(),
                    start_seconds: 0.7,
                    end_seconds: 1.3,
                },
            ]
        );

        let rejected = WhisperTimings::new(
            format!("http://{addr}/v1"),
            "sk-wrong".to_string(),
            "whisper-1".to_string(),
        );
        assert!(matches!(
            rejected.word_timings(&audio).await,
            Err(TimingError::Status { status: 401, .. })
        ));
    }
}
