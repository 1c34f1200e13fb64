// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

// HTTP JSON client for the chain API (`/v1/chain/*`, `/v1/history/*`).

use crate::chain_client::{
    ApiErrorResponse, ChainApiError, ChainClientInner, ChainInfo, GetTableRowsRequest,
    GetTableRowsResponse, GetTransactionResponse, PushTransactionResponse,
};
use async_trait::async_trait;
use daobet_types::{Checksum256, PackedTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const GET_INFO_PATH: &str = "/v1/chain/get_info";
const PUSH_TRANSACTION_PATH: &str = "/v1/chain/push_transaction";
const GET_TABLE_ROWS_PATH: &str = "/v1/chain/get_table_rows";
const GET_TRANSACTION_PATH: &str = "/v1/history/get_transaction";

#[derive(Clone, Debug)]
pub struct EosioRpcClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl EosioRpcClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        fn shared_http_client() -> reqwest::Client {
            static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
            CLIENT
                .get_or_init(|| {
                    reqwest::Client::builder()
                        .pool_max_idle_per_host(64)
                        .tcp_keepalive(Some(Duration::from_secs(30)))
                        .connect_timeout(Duration::from_secs(2))
                        .build()
                        .unwrap_or_default()
                })
                .clone()
        }

        let base_url: String = base_url.into();
        Self {
            http_client: shared_http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ChainApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Chain API request: {}", url);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChainApiError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChainApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ApiErrorResponse>(&bytes) {
                Ok(api_error) => ChainApiError::Api(api_error),
                Err(_) => ChainApiError::Transport(format!(
                    "HTTP {}: {}",
                    status,
                    String::from_utf8_lossy(&bytes)
                )),
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| ChainApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChainClientInner for EosioRpcClient {
    async fn get_info(&self) -> Result<ChainInfo, ChainApiError> {
        self.post(GET_INFO_PATH, &json!({})).await
    }

    async fn push_transaction(
        &self,
        tx: &PackedTransaction,
    ) -> Result<PushTransactionResponse, ChainApiError> {
        self.post(PUSH_TRANSACTION_PATH, tx).await
    }

    async fn get_transaction(
        &self,
        id: &Checksum256,
    ) -> Result<GetTransactionResponse, ChainApiError> {
        self.post(GET_TRANSACTION_PATH, &json!({ "id": id })).await
    }

    async fn get_table_rows(
        &self,
        request: &GetTableRowsRequest,
    ) -> Result<GetTableRowsResponse, ChainApiError> {
        self.post(GET_TABLE_ROWS_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_client::EOS_DUPLICATE_TRANSACTION_CODE;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use casino_oracle_config::local_ip_utils::{get_available_port, localhost_for_testing};
    use daobet_types::Name;
    use serde_json::Value;
    use std::net::SocketAddr;

    const CHAIN_ID: &str = "cda75f235aef76ad91ef0503421514d80d8dbb584cd07178022f0bc7deb964ff";
    const LIB_ID: &str = "0001e2406d5c0a3b8b1f5de4bd9a63a2b60fd2e2b2a2cd74c6f1f5a1aa0b0c0d";

    async fn get_info() -> Json<Value> {
        Json(json!({
            "server_version": "c7f09e8b",
            "chain_id": CHAIN_ID,
            "head_block_num": 123460,
            "head_block_id": "0001e2446d5c0a3b8b1f5de4bd9a63a2b60fd2e2b2a2cd74c6f1f5a1aa0b0c0d",
            "last_irreversible_block_num": 123456,
            "last_irreversible_block_id": LIB_ID,
            "head_block_producer": "producer1"
        }))
    }

    async fn push_duplicate(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(body["compression"], "none");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "code": 500,
                "message": "Internal Service Error",
                "error": {
                    "code": EOS_DUPLICATE_TRANSACTION_CODE,
                    "name": "tx_duplicate",
                    "what": "Duplicate transaction",
                    "details": []
                }
            })),
        )
    }

    async fn table_rows(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["table"], "playerstats");
        assert_eq!(body["json"], true);
        Json(json!({ "rows": [{"player": "alice"}], "more": false, "next_key": "" }))
    }

    async fn start_node() -> String {
        let host = localhost_for_testing();
        let port = get_available_port(&host);
        let addr = SocketAddr::new(host, port);
        let router = Router::new()
            .route(GET_INFO_PATH, post(get_info))
            .route(PUSH_TRANSACTION_PATH, post(push_duplicate))
            .route(GET_TABLE_ROWS_PATH, post(table_rows));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_get_info_decodes_node_response() {
        let client = EosioRpcClient::new(start_node().await);
        assert!(!client.base_url().ends_with('/'));

        let info = client.get_info().await.unwrap();
        assert_eq!(info.chain_id.to_string(), CHAIN_ID);
        assert_eq!(info.last_irreversible_block_id.to_string(), LIB_ID);
        assert_eq!(info.last_irreversible_block_num, 123456);
    }

    #[tokio::test]
    async fn test_push_error_body_is_structured() {
        let client = EosioRpcClient::new(start_node().await);
        let tx = daobet_types::SignedTransaction::default().pack();

        let err = client.push_transaction(&tx).await.unwrap_err();
        assert!(err.is_duplicate_transaction(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_table_rows_and_missing_route() {
        let client = EosioRpcClient::new(start_node().await);
        let casino = Name::from_static("daocasinoxxx");
        let request = GetTableRowsRequest::new(casino, casino, Name::from_static("playerstats"));

        let response = client.get_table_rows(&request).await.unwrap();
        assert_eq!(response.rows.len(), 1);
        assert!(!response.more);

        // history plugin is not served by the test node
        let err = client
            .get_transaction(&Checksum256::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainApiError::Transport(_)), "{:?}", err);
    }
}
