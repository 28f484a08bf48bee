use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::completion::Provider;
use crate::constants;
use crate::credentials::{Credentials, SecretStore};
use crate::error::ReportError;
use crate::pipeline::{Report, ReportEvent, ReportPipeline};
use crate::prompt::OutputFormat;
use crate::transcript::Transcript;

// Messages pushed to every connected WebSocket client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
}

type SessionMap = HashMap<Uuid, Arc<Mutex<Transcript>>>;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    sessions: Arc<Mutex<SessionMap>>,
    pipeline: Arc<ReportPipeline>,
    secrets: Arc<SecretStore>,
}

impl AppState {
    pub fn new(pipeline: ReportPipeline, secrets: SecretStore) -> Self {
        let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
        Self {
            templates: Arc::new(create_minijinja_env(constants::TEMPLATES_DIR.clone())),
            broadcast_tx,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            pipeline: Arc::new(pipeline),
            secrets: Arc::new(secrets),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Transcript>>, ApiError> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(ApiError::SessionNotFound(id))
    }
}

// Page templates are reloaded from disk when they change
fn create_minijinja_env(dir: String) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

/// Error body shown to the user for a failed interaction.
#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(Uuid),
    Report(ReportError),
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        ApiError::Report(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Unknown session {}", id))
            }
            ApiError::Report(e) if e.is_user_error() => {
                (StatusCode::BAD_REQUEST, format!("❌ {}", e))
            }
            ApiError::Report(e) => (StatusCode::BAD_GATEWAY, format!("出错啦: {}", e)),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportForm {
    pub request: String,
    #[serde(default)]
    pub provider: Option<String>,
    // Fallbacks for keys absent from the secret store
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub search_api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let settings = state.pipeline.settings();
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "FoodHunter - 餐饮情报官",
                    providers => [Provider::DeepSeek, Provider::OpenAI, Provider::Moonshot]
                        .iter()
                        .map(|p| minijinja::context! { id => p, name => p.display_name() })
                        .collect::<Vec<_>>(),
                    default_provider => settings.provider,
                    html_output => settings.format == OutputFormat::Html,
                    has_llm_key => state.secrets.get(constants::LLM_API_KEY_VAR).is_some(),
                    has_search_key => state.secrets.get(constants::SEARCH_API_KEY_VAR).is_some(),
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let transcript = Transcript::new();
    let session_id = transcript.id();
    state
        .sessions
        .lock()
        .await
        .insert(session_id, Arc::new(Mutex::new(transcript)));
    info!(%session_id, "Session created");
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn report_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(form): Json<ReportForm>,
) -> Result<Json<Report>, ApiError> {
    let session = state.session(session_id).await?;

    let custom;
    let pipeline: &ReportPipeline = match form.provider.as_deref() {
        Some(p) if !p.trim().is_empty() => {
            custom = state.pipeline.with_provider(p.parse::<Provider>()?)?;
            &custom
        }
        _ => state.pipeline.as_ref(),
    };
    let credentials = Credentials::resolve(&state.secrets, form.llm_api_key, form.search_api_key);

    // Relay pipeline progress to WebSocket clients, tagged with the session.
    let (tx, mut rx) = mpsc::channel::<ReportEvent>(16);
    let broadcast_tx = state.broadcast_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let msg = BroadcastMessage {
                message_type: "Progress".to_string(),
                payload: serde_json::json!({ "session_id": session_id, "event": event }),
            };
            // No subscribers is fine
            let _ = broadcast_tx.send(msg);
        }
    });

    let result = {
        let mut transcript = session.lock().await;
        pipeline
            .run(&mut transcript, &form.request, &credentials, Some(&tx))
            .await
    };
    drop(tx);
    if let Err(e) = forwarder.await {
        warn!("Progress forwarder failed: {:?}", e);
    }

    match result {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!(%session_id, "Report failed: {}", e);
            Err(e.into())
        }
    }
}

async fn transcript_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Transcript>, ApiError> {
    let session = state.session(session_id).await?;
    let transcript = session.lock().await.clone();
    Ok(Json(transcript))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .lock()
        .await
        .remove(&session_id)
        .ok_or(ApiError::SessionNotFound(session_id))?;
    info!(%session_id, "Session closed");
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = state.session(session_id).await?;
    session.lock().await.clear();
    info!(%session_id, "Transcript cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct WsParams {
    session: Option<Uuid>,
}

// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!(session = ?params.session, "WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.session))
}

// Progress belongs to one session; everything else goes to every client.
fn is_visible_to(msg: &BroadcastMessage, session: Option<Uuid>) -> bool {
    if msg.message_type != "Progress" {
        return true;
    }
    match (session, msg.payload.get("session_id")) {
        (Some(id), Some(owner)) => owner.as_str() == Some(id.to_string().as_str()),
        _ => false,
    }
}

// Pushes progress broadcasts to one client until either side goes away
async fn handle_socket(socket: WebSocket, state: AppState, session: Option<Uuid>) {
    info!("New WebSocket connection established");
    let mut broadcast_rx = state.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome_msg = BroadcastMessage {
        message_type: "Info".to_string(),
        payload: serde_json::json!({"message": "Connected to FoodHunter"}),
    };
    if let Ok(json_msg) = serde_json::to_string(&welcome_msg) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send welcome message to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            received = broadcast_rx.recv() => {
                match received {
                    Ok(msg) if !is_visible_to(&msg, session) => {}
                    Ok(msg) => {
                        let Ok(json_msg) = serde_json::to_string(&msg) else {
                            error!("Failed to serialize broadcast message");
                            continue;
                        };
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging behind broadcasts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Clients only listen; requests go through the JSON API.
                        info!("Ignoring text message from client: {}", text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed");
}

pub fn build_router(state: AppState) -> Router {
    let static_files_service = ServeDir::new(constants::STATIC_DIR.as_str());

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route("/api/sessions/:id/report", post(report_handler))
        .route(
            "/api/sessions/:id/transcript",
            get(transcript_handler).delete(clear_handler),
        )
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, pipeline: ReportPipeline, secrets: SecretStore) -> Result<()> {
    let app = build_router(AppState::new(pipeline, secrets));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
