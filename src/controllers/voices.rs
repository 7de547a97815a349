use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use std::sync::Arc;

use crate::{
    domain::tts::{GatewayApi, GatewayService, UploadReceipt, VoiceListing, VoiceUpload},
    error::{AppError, AppResult},
};

/// Largest accepted voice sample upload
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct VoiceController {
    gateway: Arc<GatewayService>,
}

impl VoiceController {
    pub fn new(gateway: Arc<GatewayService>) -> Self {
        Self { gateway }
    }

    /// GET /api/voices - Best-effort voice listing
    pub async fn list_voices(State(controller): State<Arc<VoiceController>>) -> Json<VoiceListing> {
        Json(controller.gateway.list_voices().await)
    }

    /// POST /api/upload-voice - Multipart `name` + `file` (or `audio`)
    pub async fn upload_voice(
        State(controller): State<Arc<VoiceController>>,
        multipart: Result<Multipart, MultipartRejection>,
    ) -> AppResult<Json<UploadReceipt>> {
        let mut multipart = multipart?;
        let mut upload = VoiceUpload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            match field.name() {
                Some("name") | Some("voice_name") => {
                    let name = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    upload.name = Some(name);
                }
                Some("file") | Some("audio") | Some("voice_file") => {
                    upload.file_name = field.file_name().map(str::to_string);
                    upload.content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    upload.bytes = Some(bytes);
                }
                other => {
                    tracing::debug!(field = ?other, "Ignoring unknown upload field");
                }
            }
        }

        let receipt = controller.gateway.upload_voice(upload).await?;
        Ok(Json(receipt))
    }
}
