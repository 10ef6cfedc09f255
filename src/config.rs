use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_tts_model: String,
    pub openai_voice: String,
    pub openai_whisper_model: String,
    pub edge_tts_bin: String,
    pub edge_voice: String,
    pub background_path: PathBuf,
    pub background_url: Option<String>,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub max_script_chars: usize,
    pub storage_root: PathBuf,
    pub cleanup_interval: Duration,
    pub retention: Duration,
    pub job_retention: Duration,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub tts_timeout: Duration,
    pub render_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_tts_model: "tts-1".to_string(),
            openai_voice: "nova".to_string(),
            openai_whisper_model: "whisper-1".to_string(),
            edge_tts_bin: "edge-tts".to_string(),
            edge_voice: "en-US-JennyNeural".to_string(),
            background_path: PathBuf::from("./assets/background.mp4"),
            background_url: None,
            font_path: PathBuf::from("./assets/Anton.ttf"),
            font_size: 90,
            max_script_chars: 2200,
            storage_root: PathBuf::from("/tmp/clipforge"),
            cleanup_interval: Duration::from_secs(30 * 60),
            retention: Duration::from_secs(60 * 60),
            job_retention: Duration::from_secs(24 * 60 * 60),
            max_concurrent_jobs: 2,
            queue_capacity: 128,
            tts_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = env::var("CLIPFORGE_BIND_ADDR")
            .ok()
            .map(|raw| raw.trim().trim_matches('"').trim_matches('\'').to_string())
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or(defaults.bind_addr);

        let font_size = parse_number("FONT_SIZE", defaults.font_size)?;
        let max_script_chars = parse_number("MAX_SCRIPT_CHARS", defaults.max_script_chars)?;
        if max_script_chars == 0 {
            anyhow::bail!("MAX_SCRIPT_CHARS must be greater than zero");
        }

        Ok(Self {
            bind_addr,
            openai_api_key: non_blank("OPENAI_API_KEY"),
            openai_base_url: non_blank("CLIPFORGE_OPENAI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            openai_tts_model: non_blank("CLIPFORGE_OPENAI_TTS_MODEL")
                .unwrap_or(defaults.openai_tts_model),
            openai_voice: non_blank("TTS_VOICE").unwrap_or(defaults.openai_voice),
            openai_whisper_model: non_blank("CLIPFORGE_WHISPER_MODEL")
                .unwrap_or(defaults.openai_whisper_model),
            edge_tts_bin: non_blank("CLIPFORGE_EDGE_TTS_BIN").unwrap_or(defaults.edge_tts_bin),
            edge_voice: non_blank("CLIPFORGE_EDGE_VOICE").unwrap_or(defaults.edge_voice),
            background_path: non_blank("BACKGROUND_VIDEO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.background_path),
            background_url: non_blank("BACKGROUND_VIDEO_URL"),
            font_path: non_blank("CLIPFORGE_FONT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.font_path),
            font_size,
            max_script_chars,
            storage_root: non_blank("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            cleanup_interval: parse_seconds(
                "CLIPFORGE_CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval,
            )?,
            retention: parse_seconds("CLIPFORGE_RETENTION_SECONDS", defaults.retention)?,
            job_retention: parse_seconds("CLIPFORGE_JOB_RETENTION_SECONDS", defaults.job_retention)?,
            max_concurrent_jobs: parse_number(
                "CLIPFORGE_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            )?
            .max(1),
            queue_capacity: parse_number("CLIPFORGE_QUEUE_CAPACITY", defaults.queue_capacity)?
                .max(1),
            tts_timeout: parse_seconds("CLIPFORGE_TTS_TIMEOUT_SECONDS", defaults.tts_timeout)?,
            render_timeout: parse_seconds(
                "CLIPFORGE_RENDER_TIMEOUT_SECONDS",
                defaults.render_timeout,
            )?,
            probe_timeout: parse_seconds("CLIPFORGE_PROBE_TIMEOUT_SECONDS", defaults.probe_timeout)?,
        })
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_blank(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a non-negative integer, got `{raw}`")),
        None => Ok(default),
    }
}

fn parse_seconds(key: &str, default: Duration) -> Result<Duration> {
    let seconds = parse_number(key, default.as_secs())?;
    if seconds == 0 {
        anyhow::bail!("{key} must be at least one second");
    }
    Ok(Duration::from_secs(seconds))
}
