//! Gateway HTTP server.

use crate::channels::{EvolutionChannel, Messenger, WebhookEnvelope};
use crate::config::{self, Config};
use crate::dialogue::{Engine, Replies};
use crate::directory::{CustomerGateway, FileDirectory};
use crate::dispatch::{Dispatcher, Ticket};
use crate::gateway::protocol::{EventResult, HealthChecks, HealthReport, WebhookResponse};
use crate::handoff::{Handoff, HttpHandoff, LogHandoff};
use crate::identity;
use crate::session::{SessionStore, SessionSummary};
use crate::validate::{self, Rejection};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const SERVICE_NAME: &str = "wabot";

/// Upper bound between two sweeps of finished sessions.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub directory: Arc<dyn CustomerGateway>,
    pub messenger: Arc<dyn Messenger>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        config: Config,
        dispatcher: Dispatcher,
        directory: Arc<dyn CustomerGateway>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            directory,
            messenger,
            started_at: Instant::now(),
        }
    }

    fn sessions(&self) -> &Arc<SessionStore> {
        self.dispatcher.engine().sessions()
    }

    fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build the axum router over `state`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/webhook/message", post(webhook_message))
        .route("/webhook/status", get(webhook_status))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:phone", delete(delete_session))
        .with_state(state)
}

pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let directory_path = config::resolve_directory_path(&config, &config_path);
    let records_path = config::resolve_records_path(&config, &config_path);
    let directory: Arc<dyn CustomerGateway> = Arc::new(
        FileDirectory::load(&directory_path, &records_path)
            .await
            .with_context(|| format!("loading customer directory {}", directory_path.display()))?,
    );

    let base_url = config::resolve_evolution_url(&config);
    if base_url.is_none() {
        log::warn!("evolution base url not configured; replies cannot be delivered");
    }
    let evolution = Arc::new(EvolutionChannel::new(
        base_url,
        config::resolve_evolution_key(&config),
        config::resolve_evolution_instance(&config),
        Some(config.evolution.timeout_secs),
    ));

    if let Some(public_url) = config::resolve_webhook_url(&config) {
        let url = format!("{}/webhook/message", public_url.trim_end_matches('/'));
        match evolution.set_webhook(&url).await {
            Ok(()) => log::info!("evolution webhook registered: {}", url),
            Err(e) => log::warn!("evolution set_webhook failed: {}", e),
        }
    }

    let handoff: Arc<dyn Handoff> = match config.handoff.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            log::info!("handoff endpoint: {}", endpoint);
            Arc::new(HttpHandoff::new(endpoint, config.handoff.queue_id.clone()))
        }
        _ => Arc::new(LogHandoff),
    };

    let company = config::resolve_company_name(&config);
    let sessions = Arc::new(SessionStore::new());
    let messenger: Arc<dyn Messenger> = evolution;
    let engine = Engine::new(
        sessions.clone(),
        directory.clone(),
        messenger.clone(),
        handoff,
        Replies::new(company),
    );
    let dispatcher = Dispatcher::new(Arc::new(engine));

    let sweeper = spawn_sweeper(sessions, config.sessions.finished_ttl_secs);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::new(config, dispatcher, directory, messenger);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited");
    if let Some(handle) = sweeper {
        handle.abort();
    }
    served?;
    log::info!("gateway stopped");
    Ok(())
}

/// Periodically clear finished sessions older than `ttl_secs`. None when disabled (0).
fn spawn_sweeper(sessions: Arc<SessionStore>, ttl_secs: u64) -> Option<JoinHandle<()>> {
    if ttl_secs == 0 {
        log::info!("finished-session sweeper disabled");
        return None;
    }
    let ttl = Duration::from_secs(ttl_secs);
    let period = ttl.min(MAX_SWEEP_INTERVAL);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(cutoff) = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|age| Utc::now().checked_sub_signed(age))
            else {
                continue;
            };
            let cleared = sessions.remove_finished_before(cutoff).await;
            if !cleared.is_empty() {
                log::info!("sweeper: cleared {} finished session(s)", cleared.len());
            }
        }
    }))
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns the service banner.
async fn banner(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

/// GET /health checks the directory and the messaging gateway; 503 when either fails.
async fn health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthReport>) {
    let (directory, messenger) = tokio::join!(state.directory.ping(), state.messenger.ping());
    let healthy = directory.is_ok() && messenger.is_ok();
    let check = |r: Result<(), String>| match r {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        checks: HealthChecks {
            directory: check(directory.map_err(|e| e.to_string())),
            messenger: check(messenger.map_err(|e| e.to_string())),
        },
        active_sessions: state.sessions().len().await,
        uptime_secs: state.uptime_secs(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

async fn info(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "company": config::resolve_company_name(&state.config),
        "uptimeSecs": state.uptime_secs(),
        "activeSessions": state.sessions().len().await,
        "activeWorkers": state.dispatcher.active_workers().await,
    }))
}

enum Pending {
    Done(EventResult),
    Queued(String, Ticket),
}

/// POST /webhook/message: validate each event, run eligible ones through the engine
/// and report a per-event outcome.
async fn webhook_message(State(state): State<GatewayState>, body: Bytes) -> Response {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => return bad_request(format!("invalid webhook payload: {}", e)),
    };
    if !envelope.is_message_event() {
        log::debug!("webhook: event {} skipped", envelope.event);
        return Json(WebhookResponse::from_results(Vec::new())).into_response();
    }
    // Submit everything first so same-phone events queue in delivery order.
    let now = Utc::now().timestamp();
    let events = envelope.events();
    let mut pending = Vec::with_capacity(events.len());
    for item in events {
        let event = match item {
            Ok(event) => event,
            Err(bad) => {
                log::info!("webhook: event {} ignored: malformed ({})", bad.message_id, bad.error);
                pending.push(Pending::Done(EventResult::ignored(
                    bad.message_id,
                    Rejection::Malformed.reason(),
                )));
                continue;
            }
        };
        let id = event.message_id().to_string();
        match validate::validate(&event, now) {
            Ok(msg) => {
                let ticket = state.dispatcher.submit(msg).await;
                pending.push(Pending::Queued(id, ticket));
            }
            Err(rejection) => {
                log::info!("webhook: event {} ignored: {}", id, rejection);
                pending.push(Pending::Done(EventResult::ignored(id, rejection.reason())));
            }
        }
    }

    let mut results = Vec::with_capacity(pending.len());
    for p in pending {
        let result = match p {
            Pending::Done(result) => result,
            Pending::Queued(id, ticket) => match ticket.wait().await {
                Ok(report) => {
                    log::info!(
                        "webhook: event {} processed, {} now {} ({} sent)",
                        id,
                        report.phone,
                        report.state,
                        report.sent
                    );
                    EventResult::processed(id)
                }
                Err(e) => {
                    log::warn!("webhook: event {} failed: {}", id, e);
                    EventResult::error(id, e.to_string())
                }
            },
        };
        results.push(result);
    }
    Json(WebhookResponse::from_results(results)).into_response()
}

fn bad_request(error: String) -> Response {
    log::warn!("webhook: {}", error);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": error })),
    )
        .into_response()
}

async fn webhook_status() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "message": "webhook endpoint is ready",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn list_sessions(State(state): State<GatewayState>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions().summaries().await)
}

/// DELETE /sessions/:phone clears the session so the next message starts over.
async fn delete_session(State(state): State<GatewayState>, Path(phone): Path<String>) -> StatusCode {
    let canonical = identity::normalize_phone(&phone);
    if state.dispatcher.engine().clear_session(&canonical).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::testing::{FakeDirectory, FakeHandoff, FakeMessenger};
    use crate::session::ConversationState;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (GatewayState, Arc<FakeMessenger>) {
        let directory = Arc::new(FakeDirectory::default());
        let messenger = Arc::new(FakeMessenger::default());
        let engine = Engine::new(
            Arc::new(SessionStore::new()),
            directory.clone(),
            messenger.clone(),
            Arc::new(FakeHandoff::default()),
            Replies::new("ACME"),
        );
        let state = GatewayState::new(
            Config::default(),
            Dispatcher::new(Arc::new(engine)),
            directory,
            messenger.clone(),
        );
        (state, messenger)
    }

    fn event(id: &str, jid: &str, text: &str) -> serde_json::Value {
        json!({
            "key": { "remoteJid": jid, "id": id, "fromMe": false },
            "messageTimestamp": Utc::now().timestamp(),
            "message": { "conversation": text }
        })
    }

    async fn post_webhook(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(
                Request::post("/webhook/message")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn webhook_reports_each_event_in_order() {
        let (state, messenger) = state();
        let sessions = state.sessions().clone();
        let body = json!({
            "event": "messages.upsert",
            "data": [
                event("A", "5531988887777@s.whatsapp.net", "oi"),
                event("B", "120363000000@g.us", "oi"),
                event("C", "5531988887777@s.whatsapp.net", "123"),
            ]
        });
        let (status, v) = post_webhook(router(state), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total"], 3);
        assert_eq!(v["processed"], 2);
        assert_eq!(v["results"][0]["status"], "processed");
        assert_eq!(v["results"][1]["status"], "ignored");
        assert_eq!(v["results"][1]["reason"], "group");
        assert_eq!(v["results"][2]["messageId"], "C");
        assert_eq!(messenger.count(), 2);
        let session = sessions.get("5531988887777").await.unwrap();
        assert_eq!(session.state, ConversationState::AwaitingTaxId);
    }

    #[tokio::test]
    async fn other_events_are_acknowledged_without_processing() {
        let (state, messenger) = state();
        let body = json!({
            "event": "connection.update",
            "data": { "state": "open" }
        });
        let (status, v) = post_webhook(router(state), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total"], 0);
        assert_eq!(messenger.count(), 0);
    }

    #[tokio::test]
    async fn malformed_items_do_not_sink_the_batch() {
        let (state, messenger) = state();
        let mut null_from_me = event("D", "5531977776666@s.whatsapp.net", "oi");
        null_from_me["key"]["fromMe"] = serde_json::Value::Null;
        let body = json!({
            "event": "messages.upsert",
            "data": [
                null,
                event("A", "5531988887777@s.whatsapp.net", "oi"),
                { "key": { "id": "S" }, "message": "text" },
                null_from_me,
            ]
        });
        let (status, v) = post_webhook(router(state), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total"], 4);
        assert_eq!(v["processed"], 2);
        assert_eq!(v["results"][0]["status"], "ignored");
        assert_eq!(v["results"][0]["reason"], "malformed");
        assert_eq!(v["results"][1]["status"], "processed");
        assert_eq!(v["results"][2]["messageId"], "S");
        assert_eq!(v["results"][2]["reason"], "malformed");
        assert_eq!(v["results"][3]["status"], "processed");
        assert_eq!(messenger.count(), 2);
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected() {
        let (state, _) = state();
        let res = router(state)
            .oneshot(
                Request::post("/webhook/message")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_session_resets_by_phone() {
        let (state, _) = state();
        let app = router(state.clone());
        let body = json!({
            "event": "MESSAGES_UPSERT",
            "data": event("A", "553188887777@s.whatsapp.net", "oi")
        });
        let (_, v) = post_webhook(app.clone(), body).await;
        assert_eq!(v["processed"], 1);

        // Legacy 12-digit number and canonical form address the same session.
        let res = app
            .clone()
            .oneshot(
                Request::delete("/sessions/553188887777")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(state.sessions().is_empty().await);

        let res = app
            .oneshot(
                Request::delete("/sessions/5531988887777")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
