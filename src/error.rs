use std::fmt;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

#[derive(Debug)]
pub enum BeatboxError {
    Range(RangeError),
    Import(ImportError),
    Playback(PlaybackError),
    Config(ConfigError),
}

/// A value outside the bounds the sequencer accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeError {
    Tempo { value: u32, min: u32, max: u32 },
    Bars { value: u32, max: u32 },
    EnvelopeTime { param: &'static str, value: f64 },
    Sustain { value: f64 },
}

/// A state payload that could not be imported. The current state is kept.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    Empty,
    Json {
        message: String,
        line: usize,
        column: usize,
    },
    OutOfRange(RangeError),
    DuplicateTrackId(String),
    InvalidEnvelope {
        track: String,
        reason: RangeError,
    },
}

/// The audio output could not be started or refused a hit.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    Closed,
    ResumeDenied(String),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Json(String),
    Invalid(String),
}

impl fmt::Display for BeatboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatboxError::Range(e) => write!(f, "Invalid range: {e}"),
            BeatboxError::Import(e) => write!(f, "Malformed import: {e}"),
            BeatboxError::Playback(e) => write!(f, "Playback unavailable: {e}"),
            BeatboxError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for BeatboxError {}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Tempo { value, min, max } => {
                write!(f, "tempo {value} BPM is outside {min}..={max}")
            }
            RangeError::Bars { value, max } => write!(f, "bar count {value} is outside 1..={max}"),
            RangeError::EnvelopeTime { param, value } => {
                write!(f, "envelope {param} must be a finite, non-negative time, got {value}")
            }
            RangeError::Sustain { value } => write!(f, "sustain must be within 0..=1, got {value}"),
        }
    }
}

impl std::error::Error for RangeError {}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Empty => write!(f, "nothing to import"),
            ImportError::Json { message, .. } => write!(f, "{message}"),
            ImportError::OutOfRange(e) => write!(f, "{e}"),
            ImportError::DuplicateTrackId(id) => {
                write!(f, "track id '{id}' is used more than once")
            }
            ImportError::InvalidEnvelope { track, reason } => {
                write!(f, "track '{track}': {reason}")
            }
        }
    }
}

impl std::error::Error for ImportError {}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::Closed => write!(f, "audio output is closed"),
            PlaybackError::ResumeDenied(why) => write!(f, "audio output could not resume: {why}"),
            PlaybackError::Rejected(why) => write!(f, "audio output rejected a hit: {why}"),
        }
    }
}

impl std::error::Error for PlaybackError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Json(message) => write!(f, "{message}"),
            ConfigError::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<RangeError> for BeatboxError {
    fn from(e: RangeError) -> Self {
        BeatboxError::Range(e)
    }
}

impl From<ImportError> for BeatboxError {
    fn from(e: ImportError) -> Self {
        BeatboxError::Import(e)
    }
}

impl From<PlaybackError> for BeatboxError {
    fn from(e: PlaybackError) -> Self {
        BeatboxError::Playback(e)
    }
}

impl From<ConfigError> for BeatboxError {
    fn from(e: ConfigError) -> Self {
        BeatboxError::Config(e)
    }
}

impl From<RangeError> for ImportError {
    fn from(e: RangeError) -> Self {
        ImportError::OutOfRange(e)
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(e: serde_json::Error) -> Self {
        ImportError::Json {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        }
    }
}

impl ImportError {
    /// Render a plain-text diagnostic for the host's notification.
    ///
    /// JSON errors carry a label pointing at the offending byte of `source`;
    /// semantic errors are reported without a location.
    pub fn report(&self, source: &str) -> String {
        let span = match self {
            ImportError::Json { line, column, .. } => {
                char_span(source, byte_offset(source, *line, *column))
            }
            _ => 0..0,
        };

        let mut builder = Report::build(ReportKind::Error, span.clone())
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_message(format!("import rejected: {self}"));
        if matches!(self, ImportError::Json { .. }) {
            builder = builder.with_label(Label::new(span).with_message("here"));
        }

        let mut out = Vec::new();
        if builder.finish().write(Source::from(source), &mut out).is_err() {
            return format!("import rejected: {self}");
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Convert serde_json's 1-based line/column into a byte offset.
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (i, text) in source.split('\n').enumerate() {
        if i + 1 == line {
            return (offset + column.saturating_sub(1)).min(source.len());
        }
        offset += text.len() + 1;
    }
    source.len()
}

/// The span of the character containing byte `at`, empty at the end.
fn char_span(source: &str, at: usize) -> std::ops::Range<usize> {
    let mut start = at.min(source.len());
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let end = source[start..]
        .chars()
        .next()
        .map_or(start, |c| start + c.len_utf8());
    start..end
}
