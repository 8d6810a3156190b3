//! HTTP endpoints that trigger a reconciliation pass and report usage.
//!
//! Both endpoints take the shared secret as the entire request body.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::WatchStore;
use crate::reconcile::Reconciler;

pub const INCORRECT_TOKEN: &str = "incorrect token";
pub const PASS_OK: &str = "Repos updated successfully with no funky business";
pub const PASS_BUSY: &str = "a reconciliation pass is already running";

#[derive(Clone)]
pub struct AppState {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn WatchStore>,
    token: Arc<str>,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, store: Arc<dyn WatchStore>, token: &str) -> Self {
        Self {
            reconciler,
            store,
            token: Arc::from(token),
        }
    }

    fn authorized(&self, body: &str) -> bool {
        body == &*self.token
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/updateRepos", post(update_repos))
        .route("/stats", post(stats))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("trigger endpoint listening on {}", bind);
    axum::serve(listener, router(state)).await
}

async fn update_repos(State(state): State<AppState>, body: String) -> Response {
    if !state.authorized(&body) {
        warn!("rejected pass trigger with incorrect token");
        return (StatusCode::UNAUTHORIZED, INCORRECT_TOKEN).into_response();
    }

    // The pass runs to completion even if the client disconnects.
    let reconciler = state.reconciler.clone();
    let outcome = tokio::spawn(async move { reconciler.try_run_pass().await }).await;
    let report = match outcome {
        Ok(Some(report)) => report,
        Ok(None) => return (StatusCode::CONFLICT, PASS_BUSY).into_response(),
        Err(err) => {
            error!(?err, "reconciliation pass task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    if report.is_clean() {
        return (StatusCode::OK, PASS_OK).into_response();
    }
    let status = if report.aborted {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(report.failures)).into_response()
}

async fn stats(State(state): State<AppState>, body: String) -> Response {
    if !state.authorized(&body) {
        return (StatusCode::UNAUTHORIZED, INCORRECT_TOKEN).into_response();
    }

    match state.store.list_all().await {
        Ok(entries) => {
            let chats: HashSet<&str> = entries.iter().map(|e| e.chat_id.as_str()).collect();
            let repos: HashSet<&str> = entries.iter().map(|e| e.repo_id.as_str()).collect();
            let text = format!(
                "Currently serving {} users, watching {} unique repos",
                chats.len(),
                repos.len()
            );
            (StatusCode::OK, text).into_response()
        }
        Err(err) => {
            error!(?err, "failed to compute stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong querying the database: {}", err),
            )
                .into_response()
        }
    }
}
