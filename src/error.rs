use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum MuseError {
    #[error("Transcription failed: {0}")]
    Transcription(#[source] ServiceError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Instrumental generation failed: {0}")]
    Instrumental(#[source] ServiceError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from external generation/analysis services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("{0} not found - please install it")]
    BinaryNotFound(String),

    #[error("{program} failed with status {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Song analysis errors
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Malformed analysis response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Analysis response is missing `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Audio processing errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("ffmpeg not found - please install ffmpeg")]
    FfmpegNotFound,

    #[error("ffmpeg failed with status {0}")]
    FfmpegFailed(std::process::ExitStatus),

    #[error("ffmpeg error: {0}")]
    FfmpegError(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Empty audio - no samples decoded from {0}")]
    Empty(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// HTTP server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for memomuse operations
pub type Result<T> = std::result::Result<T, MuseError>;

impl MuseError {
    /// Check if this error came from a required pipeline stage
    /// talking to an external service (as opposed to local processing)
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            MuseError::Transcription(_)
                | MuseError::Instrumental(_)
                | MuseError::Analysis(AnalysisError::Service(_))
        )
    }
}
