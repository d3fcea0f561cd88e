/**
 * Transcription
 *
 * One-shot inference over an audio file using an already-downloaded
 * Whisper checkpoint. The inference itself is delegated to a
 * `Transcriber`; the server only validates inputs and times the call.
 */

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::catalog::Feature;
use crate::error::AppError;
use crate::AppState;

const AUDIO_EXTENSIONS: [&str; 4] = ["wav", "mp3", "flac", "m4a"];

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Return the transcript of `audio` using the checkpoint at `model_path`.
    async fn transcribe(&self, model_path: &Path, audio: &Path) -> anyhow::Result<String>;
}

/// Runs an external program as `<program> <args..> --model <path> <audio>`
/// and takes its stdout as the transcript.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, model_path: &Path, audio: &Path) -> anyhow::Result<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg("--model")
            .arg(model_path)
            .arg(audio)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscribeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscribeResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            time_elapsed: None,
            error: Some(error.into()),
        }
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext))
}

/// Validate the request; on success returns the audio and checkpoint paths.
fn validate(state: &AppState, req: &TranscribeRequest) -> Result<(PathBuf, PathBuf), String> {
    let audio = PathBuf::from(&req.filename);
    if req.filename.is_empty() || !audio.exists() {
        return Err("File does not exist".to_string());
    }
    if !is_audio_file(&audio) {
        let basename = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Err(format!("{} is not an audio file", basename));
    }

    let Some(entry) = state.store.catalog().get(Feature::Transcribe, &req.model) else {
        return Err(format!("Invalid model: {}", req.model));
    };
    if !state.store.exists(Feature::Transcribe, &req.model) {
        return Err(format!(
            "You must download the model \"{}\" before you can use it",
            req.model
        ));
    }
    Ok((audio, state.store.path(entry)))
}

/// POST /transcribe
pub async fn transcribe(
    State(state): State<AppState>,
    Json(req): Json<TranscribeRequest>,
) -> Result<Json<TranscribeResponse>, AppError> {
    let (audio, model_path) = match validate(&state, &req) {
        Ok(paths) => paths,
        Err(message) => return Ok(Json(TranscribeResponse::failure(message))),
    };

    let Some(transcriber) = state.transcriber.clone() else {
        return Ok(Json(TranscribeResponse::failure(
            "Transcription backend is not configured",
        )));
    };

    tracing::info!("[Transcribe] {} with model {}", audio.display(), req.model);
    let start = Instant::now();
    let text = transcriber.transcribe(&model_path, &audio).await?;
    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!("[Transcribe] Finished in {:.2}s", elapsed);

    Ok(Json(TranscribeResponse {
        success: true,
        result: Some(text),
        time_elapsed: Some(elapsed),
        error: None,
    }))
}
