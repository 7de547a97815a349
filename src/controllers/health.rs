use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::domain::tts::{GatewayApi, GatewayHealth, GatewayService};

pub struct HealthController {
    gateway: Arc<GatewayService>,
    requirements: Value,
}

impl HealthController {
    pub fn new(gateway: Arc<GatewayService>, requirements: Value) -> Self {
        Self {
            gateway,
            requirements,
        }
    }

    /// GET /health - Composite status, always 200
    pub async fn health(State(controller): State<Arc<HealthController>>) -> Json<GatewayHealth> {
        Json(controller.gateway.health().await)
    }

    /// GET /api/requirements - What an upstream backend must implement
    pub async fn requirements(State(controller): State<Arc<HealthController>>) -> Json<Value> {
        Json(controller.requirements.clone())
    }
}
