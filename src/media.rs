//! FFmpeg/FFprobe invocation: command building, bounded execution, probing.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound on how much stderr is kept as a diagnostic.
const STDERR_TAIL_CHARS: usize = 4000;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} exited with status {exit_code:?}")]
    Failed {
        tool: &'static str,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("{tool} timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        tool: &'static str,
        timeout: Duration,
    },

    #[error("malformed output: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Raw tool output worth surfacing to operators.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { stderr, .. } if !stderr.trim().is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    fn codec_type(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    fn selector(self) -> &'static str {
        match self {
            Self::Audio => "a:0",
            Self::Video => "v:0",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(Vec::<String>::new(), path)
    }

    /// Add an input preceded by its own options (`-ss`, `-stream_loop`, ...).
    pub fn input_with_args<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{seconds:.3}"))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn input_paths(&self) -> Vec<&Path> {
        self.inputs.iter().map(|i| i.path.as_path()).collect()
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// External media tool seam; the production implementation shells out to
/// FFmpeg/FFprobe.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn run(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()>;

    async fn probe_duration(
        &self,
        path: &Path,
        stream: StreamKind,
        timeout: Duration,
    ) -> MediaResult<f64>;
}

#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Resolve both binaries from `PATH`.
    pub fn locate() -> MediaResult<Self> {
        let ffmpeg = which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg"))?;
        let ffprobe = which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe"))?;
        Ok(Self::new(ffmpeg, ffprobe))
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn run(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut command = Command::new(&self.ffmpeg);
        command.args(&args);
        let output = run_bounded("ffmpeg", command, timeout).await?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: "ffmpeg",
                stderr: stderr_tail(&output.stderr),
                exit_code: output.status.code(),
            });
        }
        Ok(())
    }

    async fn probe_duration(
        &self,
        path: &Path,
        stream: StreamKind,
        timeout: Duration,
    ) -> MediaResult<f64> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                stream.selector(),
            ])
            .arg(path);
        let output = run_bounded("ffprobe", command, timeout).await?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: "ffprobe",
                stderr: stderr_tail(&output.stderr),
                exit_code: output.status.code(),
            });
        }

        parse_probe_duration(&output.stdout, stream)
    }
}

/// Runs a process to completion, killing it if `timeout` elapses first.
async fn run_bounded(
    tool: &'static str,
    mut command: Command,
    timeout: Duration,
) -> MediaResult<std::process::Output> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => {
            warn!("{tool} timed out after {} seconds, killing process", timeout.as_secs());
            Err(MediaError::Timeout { tool, timeout })
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

/// Extracts a positive duration, preferring the stream over the container.
fn parse_probe_duration(stdout: &[u8], stream: StreamKind) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let from_stream = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref().map_or(true, |t| t == stream.codec_type()))
        .filter_map(|s| s.duration.as_deref())
        .find_map(parse_positive_seconds);

    let from_format = || {
        probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_positive_seconds)
    };

    from_stream.or_else(from_format).ok_or_else(|| {
        MediaError::MalformedOutput(format!("no {} duration reported", stream.codec_type()))
    })
}

fn parse_positive_seconds(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
