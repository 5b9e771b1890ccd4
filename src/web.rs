use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{self, ConfirmCodeForm, SendCodeForm};
use crate::cleanup::{self, CleanupForm, CleanupRequest, CleanupSummary};
use crate::error::PanelError;
use crate::output::{StateView, render_index};
use crate::session::SessionStore;
use crate::telegram::ClientFactory;

pub struct PanelState {
    pub store: SessionStore,
    pub last_summary: Option<CleanupSummary>,
}

/// Shared by every route. The lock is held for the whole operation, so
/// logins and cleanups never interleave.
pub struct Panel {
    state: Mutex<PanelState>,
    factory: Arc<dyn ClientFactory>,
}

impl Panel {
    pub fn new(store: SessionStore, factory: Arc<dyn ClientFactory>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PanelState {
                store,
                last_summary: None,
            }),
            factory,
        })
    }

    async fn view(&self) -> StateView {
        let state = self.state.lock().await;
        StateView::new(state.store.record(), state.last_summary.as_ref())
    }
}

pub fn router(panel: Arc<Panel>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/send_code", post(send_code))
        .route("/confirm_code", post(confirm_code))
        .route("/cleanup", post(run_cleanup))
        .route("/reset", post(reset))
        .route("/health", get(health))
        .route("/api/state", get(api_state))
        .layer(TraceLayer::new_for_http())
        .with_state(panel)
}

async fn index(State(panel): State<Arc<Panel>>) -> Html<String> {
    Html(render_index(&panel.view().await))
}

async fn api_state(State(panel): State<Arc<Panel>>) -> Json<StateView> {
    Json(panel.view().await)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn send_code(State(panel): State<Arc<Panel>>, Form(form): Form<SendCodeForm>) -> Redirect {
    let mut state = panel.state.lock().await;
    auth::request_code(&mut state.store, panel.factory.as_ref(), &form).await;
    Redirect::to("/")
}

async fn confirm_code(State(panel): State<Arc<Panel>>, Form(form): Form<ConfirmCodeForm>) -> Redirect {
    let mut state = panel.state.lock().await;
    auth::confirm_code(&mut state.store, panel.factory.as_ref(), &form).await;
    Redirect::to("/")
}

async fn reset(State(panel): State<Arc<Panel>>) -> Redirect {
    let mut state = panel.state.lock().await;
    auth::reset(&mut state.store).await;
    state.last_summary = None;
    Redirect::to("/")
}

/// Renders the page directly so the summary shows up next to the form.
async fn run_cleanup(State(panel): State<Arc<Panel>>, Form(form): Form<CleanupForm>) -> Html<String> {
    let request = CleanupRequest::from_form(&form);
    let mut guard = panel.state.lock().await;
    let state = &mut *guard;

    match cleanup::cleanup(&mut state.store, panel.factory.as_ref(), &request).await {
        Ok(summary) => {
            state.store.record_mut().last_error = None;
            state.last_summary = Some(summary);
        }
        Err(err) => {
            warn!(error = %err, "cleanup failed");
            state.store.record_mut().last_error = Some(match err {
                PanelError::Precondition(message) => message,
                other => format!("cleanup failed: {other}"),
            });
            state.last_summary = Some(CleanupSummary::default());
        }
    }

    Html(render_index(&StateView::new(state.store.record(), state.last_summary.as_ref())))
}
