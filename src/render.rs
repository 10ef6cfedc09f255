//! Two-pass video rendering: background preparation, then composition of
//! the voice track and per-word captions.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rand::{seq::SliceRandom, Rng};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{PipelineError, PipelineResult},
    media::{FfmpegCommand, MediaError, MediaToolkit, StreamKind},
    models::CaptionCue,
};

const BACKGROUND_EXTENSIONS: [&str; 2] = ["mp4", "mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

/// Fixed look applied to every caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_path: Option<PathBuf>,
    pub font_size: u32,
    pub font_color: String,
    pub border_color: String,
    pub border_width: u32,
    pub uppercase: bool,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 90,
            font_color: "white".to_string(),
            border_color: "black".to_string(),
            border_width: 3,
            uppercase: true,
        }
    }
}

impl CaptionStyle {
    /// Uses the configured typeface only if the file is actually there.
    pub fn from_config(config: &Config) -> Self {
        let font_path = if config.font_path.is_file() {
            Some(config.font_path.clone())
        } else {
            warn!(
                font = %config.font_path.display(),
                "Caption font not found, FFmpeg default font will be used"
            );
            None
        };
        Self {
            font_path,
            font_size: config.font_size,
            ..Self::default()
        }
    }
}

/// Text shown on screen for `[start_seconds, end_seconds)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOverlay {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl From<&CaptionCue> for TimedOverlay {
    fn from(cue: &CaptionCue) -> Self {
        Self {
            text: cue.word.clone(),
            start_seconds: cue.start_seconds,
            end_seconds: cue.end_seconds,
        }
    }
}

/// Where pass 1 starts reading the source, and whether it must loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundPlan {
    pub start_offset: f64,
    pub looped: bool,
}

/// A source whose probed length is zero, negative or not a number is
/// looped from its start.
pub fn plan_background<R: Rng>(source_duration: f64, target_duration: f64, rng: &mut R) -> BackgroundPlan {
    if !source_duration.is_finite() || source_duration <= 0.0 {
        return BackgroundPlan {
            start_offset: 0.0,
            looped: true,
        };
    }
    let target_duration = target_duration.max(0.0);
    if source_duration >= target_duration {
        BackgroundPlan {
            start_offset: rng.gen_range(0.0..=(source_duration - target_duration)),
            looped: false,
        }
    } else {
        BackgroundPlan {
            start_offset: rng.gen_range(0.0..source_duration),
            looped: true,
        }
    }
}

pub fn build_background_command(
    source: &Path,
    output: &Path,
    plan: BackgroundPlan,
    duration_seconds: f64,
    resolution: Resolution,
) -> FfmpegCommand {
    let mut input_args = Vec::new();
    if plan.looped {
        input_args.extend(["-stream_loop".to_string(), "-1".to_string()]);
    }
    input_args.extend(["-ss".to_string(), format!("{:.3}", plan.start_offset)]);

    let Resolution { width, height } = resolution;
    FfmpegCommand::new(output)
        .input_with_args(input_args, source)
        .duration(duration_seconds)
        .video_filter(format!(
            "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height}"
        ))
        .video_codec("libx264")
        .preset("fast")
        .no_audio()
}

pub fn build_composite_command(
    background: &Path,
    audio: &Path,
    overlays: &[TimedOverlay],
    style: &CaptionStyle,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output)
        .input(background)
        .input(audio)
        .output_arg("-map")
        .output_arg("0:v:0")
        .output_arg("-map")
        .output_arg("1:a:0");

    let filter = build_caption_filter(overlays, style);
    if !filter.is_empty() {
        cmd = cmd.video_filter(filter);
    }

    cmd.video_codec("libx264")
        .preset("fast")
        .crf(23)
        .audio_codec("aac")
        .audio_bitrate("192k")
        .faststart()
        .shortest()
}

/// One `drawtext` per overlay, each enabled only inside its own window.
///
/// Every filter's option string goes through both FFmpeg escaping levels:
/// option values first, then the whole string for the filtergraph, so
/// quotes, colons and commas in a word stay part of that word.
pub fn build_caption_filter(overlays: &[TimedOverlay], style: &CaptionStyle) -> String {
    let font_part = style
        .font_path
        .as_ref()
        .map(|p| format!("fontfile={}:", escape_option_value(&p.to_string_lossy())))
        .unwrap_or_default();

    overlays
        .iter()
        .map(|overlay| {
            let text = if style.uppercase {
                overlay.text.to_uppercase()
            } else {
                overlay.text.clone()
            };
            let options = format!(
                "{font_part}text={text}:fontsize={size}:fontcolor={color}:\
                 bordercolor={border}:borderw={border_w}:x=(w-text_w)/2:y=(h-text_h)/2:\
                 enable=gte(t,{start:.3})*lt(t,{end:.3})",
                text = escape_option_value(&escape_drawtext(&text)),
                size = style.font_size,
                color = style.font_color,
                border = style.border_color,
                border_w = style.border_width,
                start = overlay.start_seconds,
                end = overlay.end_seconds,
            );
            format!("drawtext={}", escape_filtergraph(&options))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Escapes drawtext's own text expansion (`%{..}` sequences and
/// backslashes). Line breaks become spaces.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

/// Escapes a single `key=value` option value.
fn escape_option_value(value: &str) -> String {
    backslash_escape(value, &['\\', '\'', ':'])
}

/// Escapes a filter's whole option string for the filtergraph parser.
fn escape_filtergraph(options: &str) -> String {
    backslash_escape(options, &['\\', '\'', '[', ']', ',', ';'])
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub struct RenderEngine {
    media: Arc<dyn MediaToolkit>,
    background: PathBuf,
    resolution: Resolution,
    style: CaptionStyle,
    encode_timeout: Duration,
    probe_timeout: Duration,
}

impl RenderEngine {
    pub fn new(
        media: Arc<dyn MediaToolkit>,
        background: PathBuf,
        resolution: Resolution,
        style: CaptionStyle,
        encode_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            media,
            background,
            resolution,
            style,
            encode_timeout,
            probe_timeout,
        }
    }

    pub fn from_config(config: &Config, media: Arc<dyn MediaToolkit>) -> Self {
        Self::new(
            media,
            config.background_path.clone(),
            Resolution::default(),
            CaptionStyle::from_config(config),
            config.render_timeout,
            config.probe_timeout,
        )
    }

    /// The configured file, or a uniformly random `.mp4`/`.mov` from the
    /// configured directory.
    pub async fn select_source_clip(&self) -> PipelineResult<PathBuf> {
        let meta = fs::metadata(&self.background).await.map_err(|err| {
            PipelineError::encoding(
                "Background video not found",
                Some(format!("{}: {err}", self.background.display())),
            )
        })?;

        if !meta.is_dir() {
            return Ok(self.background.clone());
        }

        let mut candidates = Vec::new();
        let mut entries = fs::read_dir(&self.background)
            .await
            .map_err(|err| PipelineError::encoding("Background directory unreadable", Some(err.to_string())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| PipelineError::encoding("Background directory unreadable", Some(err.to_string())))?
        {
            let path = entry.path();
            let is_clip = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| BACKGROUND_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_clip && path.is_file() {
                candidates.push(path);
            }
        }
        candidates.sort();

        candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                PipelineError::encoding(
                    "No background clips available",
                    Some(format!("no .mp4/.mov files in {}", self.background.display())),
                )
            })
    }

    /// Pass 1: a silent clip exactly `duration_seconds` long at the target
    /// resolution.
    pub async fn render_background(&self, output: &Path, duration_seconds: f64) -> PipelineResult<PathBuf> {
        let source = self.select_source_clip().await?;
        let source_duration = self
            .media
            .probe_duration(&source, StreamKind::Video, self.probe_timeout)
            .await
            .map_err(|err| encoding_failure("Could not read background video", &err))?;

        let plan = plan_background(source_duration, duration_seconds, &mut rand::thread_rng());
        info!(
            source = %source.display(),
            source_duration,
            start_offset = plan.start_offset,
            looped = plan.looped,
            "Preparing background clip"
        );

        let cmd = build_background_command(&source, output, plan, duration_seconds, self.resolution);
        self.media
            .run(&cmd, self.encode_timeout)
            .await
            .map_err(|err| encoding_failure("Background render failed", &err))?;

        verify_output(output, "Background render produced no output").await?;
        Ok(output.to_path_buf())
    }

    /// Pass 2: voice track plus one caption per cue over the background.
    pub async fn composite(
        &self,
        background: &Path,
        audio: &Path,
        cues: &[CaptionCue],
        output: &Path,
    ) -> PipelineResult<PathBuf> {
        let overlays: Vec<TimedOverlay> = cues.iter().map(TimedOverlay::from).collect();
        let cmd = build_composite_command(background, audio, &overlays, &self.style, output);

        self.media
            .run(&cmd, self.encode_timeout)
            .await
            .map_err(|err| encoding_failure("Video render failed", &err))?;

        verify_output(output, "Video render produced no output").await?;
        Ok(output.to_path_buf())
    }
}

fn encoding_failure(message: &str, err: &MediaError) -> PipelineError {
    PipelineError::encoding(message, Some(err.diagnostic()))
}

async fn verify_output(path: &Path, message: &str) -> PipelineResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(PipelineError::encoding(
            message,
            Some(format!("{} is empty", path.display())),
        )),
        Err(err) => Err(PipelineError::encoding(
            message,
            Some(format!("{}: {err}", path.display())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::media::MediaResult;

    /// Records every command and writes a stub output file.
    #[derive(Default)]
    struct RecordingMedia {
        commands: Mutex<Vec<FfmpegCommand>>,
        fail_with: Option<String>,
        skip_output: bool,
        source_duration: f64,
    }

    #[async_trait]
    impl MediaToolkit for RecordingMedia {
        async fn run(&self, cmd: &FfmpegCommand, _timeout: Duration) -> MediaResult<()> {
            self.commands.lock().expect("lock").push(cmd.clone());
            if let Some(stderr) = &self.fail_with {
                return Err(MediaError::Failed {
                    tool: "ffmpeg",
                    stderr: stderr.clone(),
                    exit_code: Some(1),
                });
            }
            if !self.skip_output {
                fs::write(cmd.output(), b"video").await?;
            }
            Ok(())
        }

        async fn probe_duration(
            &self,
            _path: &Path,
            _stream: StreamKind,
            _timeout: Duration,
        ) -> MediaResult<f64> {
            Ok(self.source_duration)
        }
    }

    fn engine(media: Arc<RecordingMedia>, background: PathBuf) -> RenderEngine {
        RenderEngine::new(
            media,
            background,
            Resolution::default(),
            CaptionStyle::default(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn cue(word: &str, start: f64, end: f64) -> CaptionCue {
        CaptionCue {
            word: word.to_string(),
            start_seconds: start,
            end_seconds: end,
        }
    }

    #[test]
    fn long_source_is_trimmed_from_random_offset() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let plan = plan_background(60.0, 12.5, &mut rng);
            assert!(!plan.looped);
            assert!(plan.start_offset >= 0.0 && plan.start_offset <= 47.5);
        }
        let exact = plan_background(12.5, 12.5, &mut rng);
        assert_eq!(exact, BackgroundPlan { start_offset: 0.0, looped: false });
    }

    #[test]
    fn short_source_loops() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let plan = plan_background(4.0, 30.0, &mut rng);
            assert!(plan.looped);
            assert!(plan.start_offset >= 0.0 && plan.start_offset < 4.0);
        }
    }

    #[test]
    fn degenerate_source_duration_loops_from_start() {
        let mut rng = StdRng::seed_from_u64(11);
        for source in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let plan = plan_background(source, 12.5, &mut rng);
            assert_eq!(
                plan,
                BackgroundPlan {
                    start_offset: 0.0,
                    looped: true
                },
                "{source}"
            );
        }
    }

    #[test]
    fn background_command_targets_portrait_and_strips_audio() {
        let plan = BackgroundPlan {
            start_offset: 3.25,
            looped: true,
        };
        let args = build_background_command(
            Path::new("src.mp4"),
            Path::new("bg.mp4"),
            plan,
            9.0,
            Resolution::default(),
        )
        .build_args();

        let joined = args.join(" ");
        assert!(joined.contains("-stream_loop -1 -ss 3.250 -i src.mp4"));
        assert!(joined.contains("-t 9.000"));
        assert!(joined.contains("scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"));
        assert!(args.contains(&"-an".to_string()));
    }

    /// FFmpeg's `av_get_token`: a backslash protects the next character,
    /// single quotes protect a literal span, and unprotected trailing
    /// whitespace is dropped.
    fn get_token<'a>(input: &'a str, term: &str) -> (String, &'a str) {
        let input = input.trim_start_matches([' ', '\n', '\t', '\r']);
        let mut out = String::new();
        let mut protected = 0;
        let mut chars = input.char_indices().peekable();
        let rest = loop {
            let Some(&(i, c)) = chars.peek() else {
                break "";
            };
            if term.contains(c) {
                break &input[i..];
            }
            chars.next();
            match c {
                '\\' => match chars.next() {
                    Some((_, next)) => {
                        out.push(next);
                        protected = out.len();
                    }
                    None => out.push('\\'),
                },
                '\'' => {
                    for (_, quoted) in chars.by_ref() {
                        if quoted == '\'' {
                            break;
                        }
                        out.push(quoted);
                    }
                    protected = out.len();
                }
                other => out.push(other),
            }
        };
        while out.len() > protected && out.ends_with([' ', '\n', '\t', '\r']) {
            out.pop();
        }
        (out, rest)
    }

    /// Splits a linear filter chain into `(name, options)` the way the
    /// filtergraph and option parsers do.
    fn parse_chain(graph: &str) -> Vec<(String, Vec<(String, String)>)> {
        let mut filters = Vec::new();
        let mut rest = graph;
        while !rest.is_empty() {
            let (name, after) = get_token(rest, "=,;[");
            let (args, after) = match after.strip_prefix('=') {
                Some(args) => get_token(args, "[],;"),
                None => (String::new(), after),
            };

            let mut options = Vec::new();
            let mut remaining = args.as_str();
            while !remaining.is_empty() {
                let (key, value) = remaining.split_once('=').expect("key=value");
                let (value, after_value) = get_token(value, ":");
                options.push((key.to_string(), value));
                remaining = after_value.strip_prefix(':').unwrap_or(after_value);
            }
            filters.push((name, options));

            assert!(
                rest.len() > after.len(),
                "filter chain parser made no progress at {after}"
            );
            assert!(
                after.is_empty() || after.starts_with(','),
                "chain broken at {after}"
            );
            rest = after.strip_prefix(',').unwrap_or(after);
        }
        filters
    }

    /// drawtext's text expansion: backslash protects the next character and
    /// a bare `%` would start an expansion sequence.
    fn expand_text(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.extend(chars.next()),
                '%' => panic!("unescaped % in {text}"),
                other => out.push(other),
            }
        }
        out
    }

    fn option<'a>(options: &'a [(String, String)], key: &str) -> &'a str {
        options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing option {key}"))
    }

    #[test]
    fn caption_filter_has_one_window_per_cue() {
        let overlays: Vec<TimedOverlay> = [cue("Hello", 0.0, 1.5), cue("world", 1.5, 3.0)]
            .iter()
            .map(TimedOverlay::from)
            .collect();
        let filter = build_caption_filter(&overlays, &CaptionStyle::default());

        let filters = parse_chain(&filter);
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|(name, _)| name == "drawtext"));
        assert_eq!(option(&filters[0].1, "text"), "HELLO");
        assert_eq!(option(&filters[0].1, "enable"), "gte(t,0.000)*lt(t,1.500)");
        assert_eq!(option(&filters[1].1, "text"), "WORLD");
        assert_eq!(option(&filters[1].1, "enable"), "gte(t,1.500)*lt(t,3.000)");
        assert_eq!(option(&filters[0].1, "fontsize"), "90");
        assert_eq!(option(&filters[0].1, "x"), "(w-text_w)/2");
        assert!(!filter.contains("fontfile"));
    }

    #[test]
    fn punctuated_words_survive_filtergraph_unescaping() {
        let words = [
            "It's",
            "don't,",
            "a:b,c",
            "100%",
            "[x];y",
            "back\\slash",
            "'quoted'",
        ];
        let style = CaptionStyle {
            font_path: Some(PathBuf::from("/opt/fonts/Bob's Font:1.ttf")),
            uppercase: false,
            ..CaptionStyle::default()
        };
        let overlays: Vec<TimedOverlay> = words
            .iter()
            .enumerate()
            .map(|(i, word)| TimedOverlay {
                text: word.to_string(),
                start_seconds: i as f64,
                end_seconds: (i + 1) as f64,
            })
            .collect();

        let filters = parse_chain(&build_caption_filter(&overlays, &style));

        assert_eq!(filters.len(), words.len());
        for (i, ((name, options), word)) in filters.iter().zip(words).enumerate() {
            assert_eq!(name, "drawtext");
            assert_eq!(expand_text(option(options, "text")), word);
            assert_eq!(option(options, "fontfile"), "/opt/fonts/Bob's Font:1.ttf");
            assert_eq!(
                option(options, "enable"),
                format!("gte(t,{:.3})*lt(t,{:.3})", i as f64, (i + 1) as f64)
            );
        }
    }

    #[test]
    fn uppercased_apostrophe_word_stays_whole() {
        let overlays = vec![TimedOverlay {
            text: "It's".to_string(),
            start_seconds: 0.0,
            end_seconds: 1.0,
        }];
        let filters = parse_chain(&build_caption_filter(&overlays, &CaptionStyle::default()));
        assert_eq!(filters.len(), 1);
        assert_eq!(expand_text(option(&filters[0].1, "text")), "IT'S");
    }

    #[test]
    fn drawtext_escape_handles_expansion_and_line_breaks() {
        assert_eq!(escape_drawtext("a\\b"), "a\\\\b");
        assert_eq!(escape_drawtext("50%"), "50\\%");
        assert_eq!(escape_drawtext("line\r\nbreak"), "line break");
    }

    #[tokio::test]
    async fn directory_source_picks_only_video_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.mp4"), b"x").await.expect("write");
        fs::write(dir.path().join("b.MOV"), b"x").await.expect("write");
        fs::write(dir.path().join("notes.txt"), b"x").await.expect("write");

        let engine = engine(Arc::new(RecordingMedia::default()), dir.path().to_path_buf());
        for _ in 0..20 {
            let picked = engine.select_source_clip().await.expect("clip");
            let name = picked.file_name().and_then(|n| n.to_str()).expect("name");
            assert!(name == "a.mp4" || name == "b.MOV");
        }
    }

    #[tokio::test]
    async fn empty_directory_is_encoding_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine(Arc::new(RecordingMedia::default()), dir.path().to_path_buf());
        let err = engine.select_source_clip().await.unwrap_err();
        assert_eq!(err.code(), "ENCODING_FAILURE");
        assert_eq!(err.public_message(), "No background clips available");
    }

    #[tokio::test]
    async fn missing_background_is_encoding_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine(
            Arc::new(RecordingMedia::default()),
            dir.path().join("missing.mp4"),
        );
        let err = engine.render_background(&dir.path().join("bg.mp4"), 3.0).await.unwrap_err();
        assert_eq!(err.code(), "ENCODING_FAILURE");
    }

    #[tokio::test]
    async fn both_passes_run_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("source.mp4");
        fs::write(&source, b"x").await.expect("write");
        let media = Arc::new(RecordingMedia {
            source_duration: 20.0,
            ..RecordingMedia::default()
        });
        let engine = engine(media.clone(), source.clone());

        let bg = engine
            .render_background(&dir.path().join("bg.mp4"), 3.0)
            .await
            .expect("background");
        let audio = dir.path().join("voice.mp3");
        let out = engine
            .composite(
                &bg,
                &audio,
                &[cue("Hello", 0.0, 1.5), cue("world", 1.5, 3.0)],
                &dir.path().join("final.mp4"),
            )
            .await
            .expect("composite");

        assert!(out.exists());
        let commands = media.commands.lock().expect("lock");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].input_paths(), vec![source.as_path()]);
        assert_eq!(commands[1].input_paths(), vec![bg.as_path(), audio.as_path()]);
        assert!(commands[1].build_args().contains(&"-shortest".to_string()));
    }

    #[tokio::test]
    async fn tool_failure_carries_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = Arc::new(RecordingMedia {
            fail_with: Some("Invalid data found when processing input".to_string()),
            ..RecordingMedia::default()
        });
        let engine = engine(media, dir.path().join("unused.mp4"));

        let err = engine
            .composite(
                Path::new("bg.mp4"),
                Path::new("voice.mp3"),
                &[cue("Hi", 0.0, 1.0)],
                &dir.path().join("final.mp4"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENCODING_FAILURE");
        assert_eq!(err.diagnostic(), Some("Invalid data found when processing input"));
    }

    #[tokio::test]
    async fn missing_output_is_encoding_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = Arc::new(RecordingMedia {
            skip_output: true,
            ..RecordingMedia::default()
        });
        let engine = engine(media, dir.path().join("unused.mp4"));
        let err = engine
            .composite(
                Path::new("bg.mp4"),
                Path::new("voice.mp3"),
                &[cue("Hi", 0.0, 1.0)],
                &dir.path().join("final.mp4"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Video render produced no output");
    }
}
