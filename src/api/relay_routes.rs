use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use warp::http::StatusCode;
use warp::Filter;

use crate::error::SignalError;
use crate::session::{CandidatePayload, SessionStore, SignalKind};

#[derive(Debug, Deserialize)]
pub struct SdpBody {
    pub sdp: String,
}

#[derive(Debug, Deserialize)]
pub struct SignalsQuery {
    #[serde(default)]
    pub since: u64,
}

/// All signaling routes: session lifecycle, signal appends, and the
/// backlog poll. The store is injected rather than reached as a global so
/// handlers stay testable in-process.
pub fn signal_routes(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    start_session(store.clone())
        .or(end_session(store.clone()))
        .or(post_offer(store.clone()))
        .or(post_answer(store.clone()))
        .or(post_candidate(store.clone()))
        .or(get_signals(store.clone()))
        .or(get_session(store))
}

pub fn health_check(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_store(store))
        .and_then(|store: Arc<SessionStore>| async move {
            Ok::<_, Infallible>(warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Signal Relay",
                "version": env!("CARGO_PKG_VERSION"),
                "active_sessions": store.active_sessions().await,
            })))
        })
}

pub fn config_endpoint() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone
{
    warp::path("config")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            use std::env;

            let config = serde_json::json!({
                "POLL_INTERVAL_MS": env::var("POLL_INTERVAL_MS").ok(),
                "STUN_SERVER_URL": env::var("STUN_SERVER_URL").ok(),
                "SESSION_TTL_SECS": env::var("SESSION_TTL_SECS").ok(),
            });

            warp::reply::json(&config)
        })
}

fn start_session(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "start")
        .and(warp::post())
        .and(with_store(store))
        .and_then(handle_start)
}

fn end_session(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "end")
        .and(warp::post())
        .and(with_store(store))
        .and_then(handle_end)
}

fn post_offer(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "offer")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(|session_id: String, body: SdpBody, store: Arc<SessionStore>| async move {
            append_reply(
                &store,
                &session_id,
                SignalKind::Offer,
                serde_json::Value::String(body.sdp),
            )
            .await
        })
}

fn post_answer(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "answer")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(|session_id: String, body: SdpBody, store: Arc<SessionStore>| async move {
            append_reply(
                &store,
                &session_id,
                SignalKind::Answer,
                serde_json::Value::String(body.sdp),
            )
            .await
        })
}

fn post_candidate(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "candidate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(
            |session_id: String, body: CandidatePayload, store: Arc<SessionStore>| async move {
                let payload = serde_json::json!({
                    "candidate": body.candidate,
                    "sdp_mid": body.sdp_mid,
                    "sdp_mline_index": body.sdp_mline_index,
                });
                append_reply(&store, &session_id, SignalKind::IceCandidate, payload).await
            },
        )
}

fn get_signals(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String / "signals")
        .and(warp::get())
        .and(warp::query::<SignalsQuery>())
        .and(with_store(store))
        .and_then(handle_signals)
}

fn get_session(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / String)
        .and(warp::get())
        .and(with_store(store))
        .and_then(handle_session_info)
}

async fn handle_start(
    session_id: String,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, Infallible> {
    store.start_session(&session_id).await;
    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "session_id": session_id,
            "status": "active",
        })),
        StatusCode::OK,
    ))
}

async fn handle_end(
    session_id: String,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, Infallible> {
    store.end_session(&session_id).await;
    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "session_id": session_id,
            "status": "ended",
        })),
        StatusCode::OK,
    ))
}

async fn handle_signals(
    session_id: String,
    query: SignalsQuery,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, Infallible> {
    match store.read_signals(&session_id, query.since).await {
        Ok(signals) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "session_id": session_id,
                "signals": signals,
            })),
            StatusCode::OK,
        )),
        Err(e) => Ok(session_error_reply(&session_id, e)),
    }
}

async fn handle_session_info(
    session_id: String,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, Infallible> {
    match store.session_info(&session_id).await {
        Some(info) => Ok(warp::reply::with_status(
            warp::reply::json(&info),
            StatusCode::OK,
        )),
        None => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": format!("session {session_id} not found"),
            })),
            StatusCode::NOT_FOUND,
        )),
    }
}

async fn append_reply(
    store: &Arc<SessionStore>,
    session_id: &str,
    kind: SignalKind,
    payload: serde_json::Value,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    match store.append_signal(session_id, kind, payload).await {
        Ok(sequence) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "sequence": sequence })),
            StatusCode::OK,
        )),
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Rejected signal append");
            Ok(session_error_reply(session_id, e))
        }
    }
}

fn session_error_reply(
    session_id: &str,
    error: SignalError,
) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = match error {
        SignalError::SessionNotActive(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "session_id": session_id,
            "error": error.to_string(),
        })),
        status,
    )
}

fn with_store(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = (Arc<SessionStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}
