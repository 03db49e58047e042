use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::StudioConfig;
use crate::audio::OutputFormat;
use crate::error::{MuseError, ServerError};
use crate::pipeline::{Pipeline, PipelineRequest};

const DEFAULT_GENRE: &str = "pop";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DOWNLOAD_NAME: &str = "MemoMuse_Track";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub started: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            started: Instant::now(),
        }
    }

    fn work_dir(&self) -> &Path {
        self.pipeline.work_dir()
    }
}

/// Errors a handler reports as `{"error": ...}`
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    MissingAudio,
    NotFound,
    Pipeline(MuseError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MissingAudio => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Missing `audio` file field".to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "File not found".to_string()),
            ApiError::Pipeline(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub audio_url: String,
    pub title: String,
    pub lyrics: String,
    pub mood: String,
    pub bpm: u32,
    pub genre: String,
    pub key: String,
    pub vocals_omitted: bool,
    pub lyrics_refined: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/audio/:filename", get(audio))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind `addr` and serve until the process ends
pub async fn serve(state: AppState, addr: &str) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Fields pulled out of the upload form
struct Upload {
    audio: PathBuf,
    genre: String,
    studio: StudioConfig,
}

/// Keep only a short alphanumeric extension from an uploaded name
fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "webm".to_string())
}

async fn read_upload(work_dir: &Path, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut audio = None;
    let mut genre = None;
    let mut studio = StudioConfig::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("audio") => {
                let ext = upload_extension(field.file_name());
                audio = Some((ext, field.bytes().await?));
            }
            Some("genre") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    genre = Some(text.trim().to_string());
                }
            }
            Some("studio") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    studio = serde_json::from_str(&text)
                        .map_err(|e| ApiError::BadRequest(format!("Invalid studio config: {}", e)))?;
                }
            }
            _ => {}
        }
    }

    let (ext, bytes) = audio.ok_or(ApiError::MissingAudio)?;
    let audio = work_dir.join(format!("input_{}.{}", Uuid::new_v4().simple(), ext));
    tokio::fs::write(&audio, &bytes)
        .await
        .map_err(|e| ApiError::Pipeline(e.into()))?;

    Ok(Upload {
        audio,
        genre: genre.unwrap_or_else(|| DEFAULT_GENRE.to_string()),
        studio,
    })
}

/// POST /generate
#[instrument(skip_all)]
async fn generate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let upload = match read_upload(state.work_dir(), multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!(error = ?e, "Rejected upload");
            return Err(e);
        }
    };
    info!(genre = %upload.genre, "Generation requested");

    let request = PipelineRequest::new(&upload.audio, upload.genre).with_studio(upload.studio);
    let result = state.pipeline.run(request).await;
    let _ = tokio::fs::remove_file(&upload.audio).await;

    let result = result.map_err(|e| {
        error!(error = %e, upstream = e.is_upstream(), "Generation failed");
        ApiError::Pipeline(e)
    })?;

    let file_name = result
        .output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Json(GenerateResponse {
        audio_url: format!("/audio/{}", file_name),
        title: result.title,
        lyrics: result.lyrics,
        mood: result.mood,
        bpm: result.bpm,
        genre: result.genre,
        key: result.key,
        vocals_omitted: result.vocals_omitted,
        lyrics_refined: result.lyrics_refined,
    }))
}

/// Only plain rendered-song names may be served
fn is_servable(filename: &str) -> bool {
    filename.starts_with("song_")
        && !filename.contains("..")
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// GET /audio/:filename
async fn audio(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    if !is_servable(&filename) {
        return Err(ApiError::NotFound);
    }
    let path = state.work_dir().join(&filename);
    let format = OutputFormat::from_path(&path).ok_or(ApiError::NotFound)?;
    let bytes = tokio::fs::read(&path).await.map_err(|_| ApiError::NotFound)?;

    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        DOWNLOAD_NAME,
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}
