// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::with_metrics;
use crate::{
    error::OracleError,
    metrics::OracleMetrics,
    server::handler::{
        CasinoRequestHandlerTrait, ConvertBonusRequest, GameNoBonusRequest,
        SignTransactionResponse,
    },
};
use crate::bonus::PlayerStats;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use daobet_types::SignedTransaction;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub mod handler;

pub const PING_PATH: &str = "/ping";
pub const WHO_PATH: &str = "/who";
pub const METRICS_PATH: &str = "/metrics";
pub const SIGN_TRANSACTION_PATH: &str = "/sign_transaction";
pub const BONUS_PLAYERS_PATH: &str = "/admin/bonus_players";
pub const CONVERT_BONUS_PATH: &str = "/admin/convert_bonus";
pub const ADD_GAME_NO_BONUS_PATH: &str = "/admin/add_game_no_bonus";
pub const REMOVE_GAME_NO_BONUS_PATH: &str = "/admin/remove_game_no_bonus";

/// Name reported by `/who`.
pub const SERVICE_NAME: &str = "casino";

type ServerState<H> = (Arc<H>, Arc<OracleMetrics>);

pub fn run_server<H>(
    socket_address: &SocketAddr,
    handler: H,
    metrics: Arc<OracleMetrics>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<anyhow::Result<()>>
where
    H: CasinoRequestHandlerTrait + Sync + Send + 'static,
{
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address).await?;
        info!("HTTP server listening on {}", socket_address);
        axum::serve(
            listener,
            make_router(Arc::new(handler), metrics).into_make_service(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
        info!("HTTP server stopped");
        Ok(())
    })
}

pub(crate) fn make_router<H>(handler: Arc<H>, metrics: Arc<OracleMetrics>) -> Router
where
    H: CasinoRequestHandlerTrait + Sync + Send + 'static,
{
    Router::new()
        .route(PING_PATH, get(ping))
        .route(WHO_PATH, get(who))
        .route(METRICS_PATH, get(metrics_text::<H>))
        .route(SIGN_TRANSACTION_PATH, post(sign_transaction::<H>))
        .route(BONUS_PLAYERS_PATH, get(bonus_players::<H>))
        .route(CONVERT_BONUS_PATH, post(convert_bonus::<H>))
        .route(ADD_GAME_NO_BONUS_PATH, post(add_game_no_bonus::<H>))
        .route(REMOVE_GAME_NO_BONUS_PATH, post(remove_game_no_bonus::<H>))
        .with_state((handler, metrics))
}

impl axum::response::IntoResponse for OracleError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl<E> From<E> for OracleError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Generic(err.into().to_string())
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, OracleError> {
    serde_json::from_slice(body)
        .map_err(|_| OracleError::InvalidRequest(format!("failed to deserialize {}", what)))
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "result": "pong" }))
}

async fn who() -> &'static str {
    SERVICE_NAME
}

async fn metrics_text<H>(
    State((_, metrics)): State<ServerState<H>>,
) -> Result<String, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    metrics
        .encode()
        .map_err(|e| OracleError::Generic(format!("failed to encode metrics: {}", e)))
}

#[instrument(level = "error", skip_all)]
async fn sign_transaction<H>(
    State((handler, metrics)): State<ServerState<H>>,
    body: Bytes,
) -> Result<Json<SignTransactionResponse>, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    let future = async {
        let tx: SignedTransaction = parse_body(&body, "transaction")?;
        handler.handle_sign_transaction(tx).await
    };
    with_metrics!(metrics.clone(), "sign_transaction", future).await
}

async fn bonus_players<H>(
    State((handler, metrics)): State<ServerState<H>>,
) -> Result<Json<Vec<PlayerStats>>, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    let future = async { handler.handle_bonus_players().await };
    with_metrics!(metrics.clone(), "bonus_players", future).await
}

async fn convert_bonus<H>(
    State((handler, metrics)): State<ServerState<H>>,
    body: Bytes,
) -> Result<Json<()>, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    let future = async {
        let request: ConvertBonusRequest = parse_body(&body, "request")?;
        handler.handle_convert_bonus(request).await
    };
    with_metrics!(metrics.clone(), "convert_bonus", future).await
}

async fn add_game_no_bonus<H>(
    State((handler, metrics)): State<ServerState<H>>,
    body: Bytes,
) -> Result<Json<()>, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    let future = async {
        let request: GameNoBonusRequest = parse_body(&body, "request")?;
        handler.handle_add_game_no_bonus(request).await
    };
    with_metrics!(metrics.clone(), "add_game_no_bonus", future).await
}

async fn remove_game_no_bonus<H>(
    State((handler, metrics)): State<ServerState<H>>,
    body: Bytes,
) -> Result<Json<()>, OracleError>
where
    H: CasinoRequestHandlerTrait + Sync + Send,
{
    let future = async {
        let request: GameNoBonusRequest = parse_body(&body, "request")?;
        handler.handle_remove_game_no_bonus(request).await
    };
    with_metrics!(metrics.clone(), "remove_game_no_bonus", future).await
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            info!("Received {} request", $type_);
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    info!("{} request succeeded", $type_);
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    info!("{} request failed: {}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}
