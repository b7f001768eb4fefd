//! §6 optional HTTP control surface: `POST /trade` (manual order placement),
//! `GET /provenance?order_id=...`, `GET /health`. Bound to loopback by
//! default. Grounded on the teacher's `api/routes.rs` handler shape
//! (`Query`/`State` extractors, `Json<...>` responses, `StatusCode` errors)
//! and `middleware::rate_limit` for request throttling.

use std::sync::Arc;

use axum::{
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::{OrderResult, OrderStatus, Side};
use crate::orchestrator::{ManualTradeOutcome, ManualTradeRequest};
use crate::persistence::PersistenceStore;
use crate::supervision::HealthRegistry;

pub type ManualTradeInbox = mpsc::Sender<(ManualTradeRequest, oneshot::Sender<ManualTradeOutcome>)>;

#[derive(Clone)]
pub struct HttpState {
    pub persistence: PersistenceStore,
    pub health: HealthRegistry,
    pub inbox: Arc<ManualTradeInbox>,
}

/// Wire shape for the manual order endpoint, per the External Interfaces
/// section: `{symbol, side, volume, price?, sl?, tp?}`.
#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: String,
    pub volume: f64,
    pub price: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
}

fn parse_side(s: &str) -> Option<Side> {
    match s.to_uppercase().as_str() {
        "BUY" => Some(Side::Long),
        "SELL" => Some(Side::Short),
        _ => None,
    }
}

async fn post_trade(
    AxumState(state): AxumState<HttpState>,
    Json(request): Json<TradeRequest>,
) -> Result<Json<OrderResult>, StatusCode> {
    let side = parse_side(&request.side).ok_or(StatusCode::BAD_REQUEST)?;
    if !(request.volume.is_finite() && request.volume > 0.0) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let manual_request = ManualTradeRequest {
        symbol: request.symbol,
        side,
        volume: request.volume,
        price: request.price,
        stop_loss: request.sl,
        take_profit: request.tp,
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if state.inbox.send((manual_request, reply_tx)).await.is_err() {
        info!("manual trade inbox closed, orchestrator not accepting trade requests");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    match reply_rx.await {
        Ok(ManualTradeOutcome::Placed(result)) => {
            if result.status == OrderStatus::Rejected {
                Err(StatusCode::FORBIDDEN)
            } else {
                Ok(Json(result))
            }
        }
        Ok(ManualTradeOutcome::RiskRejected(reason)) => {
            info!(reason, "manual trade rejected by risk evaluator");
            Err(StatusCode::FORBIDDEN)
        }
        Ok(ManualTradeOutcome::RateLimited) => Err(StatusCode::TOO_MANY_REQUESTS),
        Ok(ManualTradeOutcome::Failed(reason)) => {
            info!(reason, "manual trade failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProvenanceQuery {
    pub order_id: String,
}

async fn get_provenance(
    Query(params): Query<ProvenanceQuery>,
    AxumState(state): AxumState<HttpState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.persistence.provenance_for_order(&params.order_id).await {
        Ok(Some(record)) => Ok(Json(serde_json::json!(record))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn get_health(AxumState(state): AxumState<HttpState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.health.snapshot()))
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/trade", post(post_trade))
        .route("/provenance", get(get_provenance))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_inbox() -> (HttpState, mpsc::Receiver<(ManualTradeRequest, oneshot::Sender<ManualTradeOutcome>)>) {
        let (tx, rx) = mpsc::channel(8);
        let state = HttpState {
            persistence: PersistenceStore::open_in_memory().unwrap(),
            health: HealthRegistry::default(),
            inbox: Arc::new(tx),
        };
        (state, rx)
    }

    #[tokio::test]
    async fn rejects_unknown_side() {
        let (state, _rx) = state_with_inbox();
        let request = TradeRequest { symbol: "EURUSD".to_string(), side: "HOLD".to_string(), volume: 0.01, price: None, sl: None, tp: None };
        let result = post_trade(AxumState(state), Json(request)).await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_positive_volume() {
        let (state, _rx) = state_with_inbox();
        let request = TradeRequest { symbol: "EURUSD".to_string(), side: "BUY".to_string(), volume: 0.0, price: None, sl: None, tp: None };
        let result = post_trade(AxumState(state), Json(request)).await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forwards_valid_request_and_maps_risk_rejection_to_403() {
        let (state, mut rx) = state_with_inbox();
        let request = TradeRequest { symbol: "EURUSD".to_string(), side: "BUY".to_string(), volume: 0.01, price: Some(1.10), sl: Some(1.095), tp: Some(1.13) };

        let handler = tokio::spawn(post_trade(AxumState(state), Json(request)));
        let (manual_request, reply) = rx.recv().await.unwrap();
        assert_eq!(manual_request.symbol, "EURUSD");
        reply.send(ManualTradeOutcome::RiskRejected("daily loss limit reached".to_string())).unwrap();

        let result = handler.await.unwrap();
        assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn returns_503_when_orchestrator_not_draining_inbox() {
        let (state, rx) = state_with_inbox();
        drop(rx);
        let request = TradeRequest { symbol: "EURUSD".to_string(), side: "BUY".to_string(), volume: 0.01, price: None, sl: None, tp: None };
        let result = post_trade(AxumState(state), Json(request)).await;
        assert_eq!(result.unwrap_err(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
