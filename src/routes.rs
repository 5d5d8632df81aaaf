use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    gemini::CreativeBackend,
    media::{decode_data_url, image_input},
    models::{ImageSlot, OptionsUpdate, PoseImageState, StudioOptions, StudioSnapshot},
    studio::Studio,
};

pub const DOWNLOAD_FILE_NAME: &str = "concept-preview.png";

#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
    pub backend: Arc<dyn CreativeBackend>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/options", get(list_options))
        .route("/api/studio", post(create_session))
        .route("/api/studio/:id", get(get_session).delete(delete_session))
        .route(
            "/api/studio/:id/images/:slot",
            put(upload_image).get(preview_image).delete(remove_image),
        )
        .route("/api/studio/:id/options", put(update_options))
        .route("/api/studio/:id/generate", post(generate_concepts))
        .route("/api/studio/:id/back", post(back_to_form))
        .route("/api/studio/:id/reset", post(reset_session))
        .route(
            "/api/studio/:id/concepts/:concept/poses/:pose/image",
            post(generate_pose_image).get(preview_pose_image),
        )
        .route(
            "/api/studio/:id/concepts/:concept/poses/:pose/image/download",
            get(download_pose_image),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn list_options() -> Json<StudioOptions> {
    Json(StudioOptions::catalog())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<StudioSnapshot>) {
    let snapshot = state.studio.create();
    info!("🎨 Created studio session {} ({} active)", snapshot.id, state.studio.len());
    (StatusCode::CREATED, Json(snapshot))
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    state.studio.read(id, |s| s.snapshot()).map(Json)
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.studio.remove(id)?;
    info!("🗑️ Discarded studio session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_image(
    Path((id, slot)): Path<(Uuid, ImageSlot)>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StudioSnapshot>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        upload = Some(image_input(content_type.as_deref(), data, file_name));
        break;
    }

    let image = upload.ok_or_else(|| ApiError::BadRequest("multipart field 'file' is required".into()))?;
    if image.data.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }
    info!(
        "📎 Session {}: {} <- {} ({} bytes)",
        id,
        slot.as_str(),
        image.mime_type,
        image.data.len()
    );

    state
        .studio
        .update(id, |s| {
            s.set_image(slot, image);
            s.snapshot()
        })
        .map(Json)
}

pub async fn preview_image(
    Path((id, slot)): Path<(Uuid, ImageSlot)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let image = state
        .studio
        .read(id, |s| s.inputs().slot(slot).cloned())?
        .ok_or_else(|| ApiError::ImageNotFound(slot.as_str().to_string()))?;
    let content_type =
        HeaderValue::from_str(&image.mime_type).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, content_type)], image.data).into_response())
}

pub async fn remove_image(
    Path((id, slot)): Path<(Uuid, ImageSlot)>,
    State(state): State<AppState>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    state
        .studio
        .update(id, |s| {
            s.clear_image(slot);
            s.snapshot()
        })
        .map(Json)
}

pub async fn update_options(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<OptionsUpdate>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    state
        .studio
        .update(id, |s| {
            s.apply_options(body);
            s.snapshot()
        })
        .map(Json)
}

/// Runs the concept call. The session shows `loading` until it resolves; the
/// returned snapshot carries either three concepts or the generic error.
pub async fn generate_concepts(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    let (request, ticket) = state.studio.update(id, |s| s.begin_generation())??;
    info!("🚀 Session {}: generating concepts", id);

    // Lock released: the remote call may take a while.
    let result = state.backend.generate_concepts(&request).await;
    if let Err(e) = &result {
        warn!("❌ Session {}: {}", id, e);
    }

    let snapshot = state.studio.update(id, |s| {
        s.finish_generation(ticket, result);
        s.snapshot()
    })?;
    Ok(Json(snapshot))
}

pub async fn back_to_form(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    state
        .studio
        .update(id, |s| {
            s.back();
            s.snapshot()
        })
        .map(Json)
}

pub async fn reset_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<StudioSnapshot>, ApiError> {
    info!("🔄 Session {}: reset", id);
    state
        .studio
        .update(id, |s| {
            s.reset();
            s.snapshot()
        })
        .map(Json)
}

pub async fn generate_pose_image(
    Path((id, concept, pose)): Path<(Uuid, usize, usize)>,
    State(state): State<AppState>,
) -> Result<Json<PoseImageState>, ApiError> {
    let (prompt, ticket) = state.studio.update(id, |s| s.begin_pose(concept, pose))??;
    info!("🎯 Session {}: materializing concept {} pose {}", id, concept, pose);

    let result = state.backend.generate_image(&prompt).await;
    if let Err(e) = &result {
        warn!("❌ Session {}: concept {} pose {}: {}", id, concept, pose, e);
    }

    state
        .studio
        .update(id, |s| {
            if !s.finish_pose(ticket, result) {
                return Err(ApiError::PoseDiscarded);
            }
            s.card(concept).map(|card| card.pose_state(pose))
        })?
        .map(Json)
}

fn pose_image(state: &AppState, id: Uuid, concept: usize, pose: usize) -> Result<(HeaderValue, Vec<u8>), ApiError> {
    let url = state
        .studio
        .read(id, |s| s.card(concept).map(|card| card.image(pose).map(str::to_string)))??
        .ok_or_else(|| ApiError::ImageNotFound(format!("concept {concept} pose {pose}")))?;
    let (mime, bytes) = decode_data_url(&url).map_err(|e| ApiError::Internal(e.to_string()))?;
    let content_type = HeaderValue::from_str(&mime).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((content_type, bytes))
}

pub async fn preview_pose_image(
    Path((id, concept, pose)): Path<(Uuid, usize, usize)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let (content_type, bytes) = pose_image(&state, id, concept, pose)?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn download_pose_image(
    Path((id, concept, pose)): Path<(Uuid, usize, usize)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let (content_type, bytes) = pose_image(&state, id, concept, pose)?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("⬇️ Session {}: download concept {} pose {} as {}", id, concept, pose, DOWNLOAD_FILE_NAME);
    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}
