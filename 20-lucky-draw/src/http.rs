//! JSON API over a [`LuckyDraw`].
//!
//! Admin routes require `Authorization: Bearer <admin password>`. Every
//! request runs under a deadline and is traced.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::allocator::WinnerMap;
use crate::draw::LuckyDraw;
use crate::error::DrawError;
use crate::profile::{IdentityProvider, Profile};
use crate::state::DrawState;
use crate::store::KeyValueStore;
use crate::winners::WinnerRecord;

pub struct AppState<S, P> {
    draw: Arc<LuckyDraw<S, P>>,
    admin_password: Option<Arc<str>>,
}

impl<S, P> Clone for AppState<S, P> {
    fn clone(&self) -> Self {
        Self {
            draw: Arc::clone(&self.draw),
            admin_password: self.admin_password.clone(),
        }
    }
}

pub fn router<S, P>(
    draw: Arc<LuckyDraw<S, P>>,
    admin_password: Option<String>,
    request_timeout: Duration,
) -> Router
where
    S: KeyValueStore,
    P: IdentityProvider,
{
    let state = AppState {
        draw,
        admin_password: admin_password.map(Arc::from),
    };

    Router::new()
        .route("/", get(overview::<S, P>))
        .route("/state", get(current_state::<S, P>))
        .route("/enter/:identity", get(enter::<S, P>))
        .route("/winners", get(winners::<S, P>))
        .route("/startdraw", post(start_draw::<S, P>))
        .route("/enddraw", post(end_draw::<S, P>))
        .route("/drawprizes", post(draw_prizes::<S, P>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("admin authentication required")]
    Unauthorized,

    #[error(transparent)]
    Draw(#[from] DrawError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::Draw(err) => match err {
                DrawError::NotOpen => StatusCode::FORBIDDEN,
                DrawError::IdentityNotFound(_) => StatusCode::NOT_FOUND,
                DrawError::AlreadyRegistered(_) => StatusCode::BAD_REQUEST,
                DrawError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                DrawError::AllocationInProgress => StatusCode::CONFLICT,
                DrawError::AllocationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                DrawError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DrawError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, %status, "request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn require_admin<S, P>(state: &AppState<S, P>, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match (&state.admin_password, presented) {
        (Some(expected), Some(presented)) if presented == &**expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Overview {
    pub state: DrawState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prizes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winners: Option<Vec<WinnerRecord>>,
}

async fn overview<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
) -> Result<Json<Overview>, ApiError> {
    let draw_state = state.draw.state().await?;
    let prizes = if draw_state.is_open() {
        Some(state.draw.prizes().await?)
    } else {
        None
    };
    let winners = if draw_state == DrawState::Won {
        state.draw.winners().await?
    } else {
        None
    };
    Ok(Json(Overview {
        state: draw_state,
        prizes,
        winners,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateBody {
    pub state: DrawState,
}

async fn current_state<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
) -> Result<Json<StateBody>, ApiError> {
    let draw_state = state.draw.state().await?;
    Ok(Json(StateBody { state: draw_state }))
}

async fn enter<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
    Path(identity): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.draw.register(&identity).await?))
}

async fn winners<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
) -> Result<Json<Vec<WinnerRecord>>, ApiError> {
    Ok(Json(state.draw.winners().await?.unwrap_or_default()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartDraw {
    pub prizes: Vec<String>,
    /// Seconds the draw stays open; zero or absent means until closed.
    #[serde(default)]
    pub duration: u64,
}

async fn start_draw<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
    headers: HeaderMap,
    Json(request): Json<StartDraw>,
) -> Result<&'static str, ApiError> {
    require_admin(&state, &headers)?;
    state.draw.open_draw(request.prizes, request.duration).await?;
    Ok("OK")
}

async fn end_draw<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
    headers: HeaderMap,
) -> Result<&'static str, ApiError> {
    require_admin(&state, &headers)?;
    state.draw.close_draw().await?;
    Ok("OK")
}

async fn draw_prizes<S: KeyValueStore, P: IdentityProvider>(
    State(state): State<AppState<S, P>>,
    headers: HeaderMap,
) -> Result<Json<WinnerMap>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.draw.allocate().await?))
}
