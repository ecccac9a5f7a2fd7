use std::{io, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{error::PricingError, serving::DecisionService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DecisionService>,
    pub model_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct DiscountRequest {
    #[serde(default)]
    product_id: Option<Value>,
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid product ID" })),
            )
                .into_response();
        }
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .route("/get_discount", post(discount_handler))
        .route("/reload", post(reload_handler))
        .with_state(state)
}

async fn ready_handler() -> &'static str {
    "ok"
}

/// Ids may arrive as JSON strings or numbers; both are matched as text.
/// Whole numbers are written without a fraction so `101.0` finds `101`.
fn product_id(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id),
        Value::Number(id) => {
            if let Some(int) = id.as_i64() {
                return Some(int.to_string());
            }
            if let Some(uint) = id.as_u64() {
                return Some(uint.to_string());
            }
            match id.as_f64() {
                Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
                    Some((float as i64).to_string())
                }
                _ => Some(id.to_string()),
            }
        }
        _ => None,
    }
}

async fn discount_handler(
    State(state): State<AppState>,
    Json(req): Json<DiscountRequest>,
) -> Result<Json<Value>, PricingError> {
    let Some(id) = product_id(req.product_id) else {
        warn!("discount request without a usable product_id");
        return Err(PricingError::UnknownItem(String::new()));
    };
    match state.service.decide(&id) {
        Ok(decision) => Ok(Json(json!({ "discount": decision.discount }))),
        Err(err) => {
            if err.is_client_error() {
                warn!(product_id = %id, "rejected unknown product id");
            } else {
                error!(product_id = %id, %err, "discount lookup failed");
            }
            Err(err)
        }
    }
}

async fn reload_handler(State(state): State<AppState>) -> Result<Json<Value>, PricingError> {
    let AppState {
        service,
        model_path,
    } = state;
    let reloaded = tokio::task::spawn_blocking(move || service.reload(&model_path))
        .await
        .unwrap_or_else(|err| Err(PricingError::Io(io::Error::other(err))));
    if let Err(err) = reloaded {
        error!(%err, "model reload failed; keeping the current table");
        return Err(err);
    }
    Ok(Json(json!({ "status": "reloaded" })))
}

/// Serves decisions on `addr` until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "decision api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
