//! HTTP control surface.
//!
//! Thin axum layer over [`ControlHandle`]: every route validates its query
//! string, forwards one [`ControlRequest`] and renders the reply as the JSON
//! shapes the web UI expects.

use std::io;
use std::path::Path;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clock_core::time::ClockTime;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::control::{
    ControlError, ControlHandle, ControlRequest, parse_flag, parse_interval, parse_time,
};

#[derive(Debug, Default, Deserialize)]
struct TimeQuery {
    time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModeQuery {
    use_real_time: Option<String>,
}

/// `{status, message, time?}` body shared by every mutating route.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl StatusBody {
    fn success(message: &str) -> Self {
        Self {
            status: "success",
            message: message.to_owned(),
            time: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: "failed",
            message,
            time: None,
        }
    }

    fn with_time(mut self, time: ClockTime) -> Self {
        self.time = Some(time.to_hhmm().as_str().to_owned());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PollBody {
    current_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigBody {
    interval_time: u32,
    last_time: String,
    use_real_time: bool,
}

impl ControlError {
    /// Status code reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Missing(_)
            | ControlError::InvalidTime
            | ControlError::InvalidInterval
            | ControlError::InvalidFlag
            | ControlError::RealTimeActive => StatusCode::BAD_REQUEST,
            ControlError::Busy | ControlError::Persist(_) | ControlError::Unavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(StatusBody::failed(self.to_string()))).into_response()
    }
}

/// Builds the control router, optionally serving a web UI for non-API paths.
pub fn router(control: ControlHandle, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/poll", get(poll))
        .route("/api/tickToTime", post(tick_to_time))
        .route("/api/overrideTime", post(override_time))
        .route("/api/setIntervalTime", post(set_interval_time))
        .route("/api/setUseRealTime", post(set_use_real_time))
        .route("/api/getConfig", get(get_config))
        .with_state(control);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };
    app.layer(TraceLayer::new_for_http())
}

/// Serves `router` on `listener` until the listener fails.
pub async fn serve(listener: TcpListener, router: Router) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "control surface listening");
    axum::serve(listener, router).await
}

async fn poll(State(control): State<ControlHandle>) -> Result<Json<PollBody>, ControlError> {
    let time = control.current_time().await?;
    Ok(Json(PollBody {
        current_time: time.to_hhmm().as_str().to_owned(),
    }))
}

async fn tick_to_time(
    State(control): State<ControlHandle>,
    Query(query): Query<TimeQuery>,
) -> Result<Json<StatusBody>, ControlError> {
    let time = parse_time(query.time.as_deref())?;
    control.call(ControlRequest::TickToTime(time)).await?;
    Ok(Json(StatusBody::success("Time set successfully").with_time(time)))
}

async fn override_time(
    State(control): State<ControlHandle>,
    Query(query): Query<TimeQuery>,
) -> Result<Json<StatusBody>, ControlError> {
    let time = parse_time(query.time.as_deref())?;
    control.call(ControlRequest::OverrideTime(time)).await?;
    Ok(Json(StatusBody::success("Time set successfully").with_time(time)))
}

async fn set_interval_time(
    State(control): State<ControlHandle>,
    Query(query): Query<TimeQuery>,
) -> Result<Json<StatusBody>, ControlError> {
    let interval = parse_interval(query.time.as_deref())?;
    control.call(ControlRequest::SetInterval(interval)).await?;
    Ok(Json(StatusBody::success("Interval time set successfully")))
}

async fn set_use_real_time(
    State(control): State<ControlHandle>,
    Query(query): Query<ModeQuery>,
) -> Result<Json<StatusBody>, ControlError> {
    let enabled = parse_flag(query.use_real_time.as_deref())?;
    control.call(ControlRequest::SetUseRealTime(enabled)).await?;
    Ok(Json(StatusBody::success("Use real time set successfully")))
}

async fn get_config(State(control): State<ControlHandle>) -> Result<Json<ConfigBody>, ControlError> {
    let config = control.config().await?;
    Ok(Json(ConfigBody {
        interval_time: config.interval.as_millis(),
        last_time: config.last_time.to_hhmm().as_str().to_owned(),
        use_real_time: config.use_real_time,
    }))
}
