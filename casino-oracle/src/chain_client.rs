// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::eosio_rpc::EosioRpcClient;
use crate::metrics::OracleMetrics;
use async_trait::async_trait;
use daobet_types::{Checksum256, Name, PackedTransaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// HTTP status the chain API uses for failed requests.
pub const EOS_INTERNAL_ERROR_CODE: u16 = 500;
/// Inner error code of `tx_duplicate`: the transaction was already applied.
pub const EOS_DUPLICATE_TRANSACTION_CODE: u64 = 3040008;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    #[serde(default)]
    pub server_version: String,
    pub chain_id: Checksum256,
    pub head_block_num: u32,
    pub head_block_id: Checksum256,
    pub last_irreversible_block_num: u32,
    pub last_irreversible_block_id: Checksum256,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushTransactionResponse {
    pub transaction_id: Checksum256,
    #[serde(default)]
    pub processed: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetTransactionResponse {
    pub id: Checksum256,
    #[serde(default)]
    pub block_num: u32,
    #[serde(default)]
    pub trx: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTableRowsRequest {
    pub code: Name,
    pub scope: String,
    pub table: Name,
    pub json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<String>,
    pub limit: u32,
}

impl GetTableRowsRequest {
    pub fn new(code: Name, scope: Name, table: Name) -> Self {
        Self {
            code,
            scope: scope.to_string(),
            table,
            json: true,
            lower_bound: None,
            upper_bound: None,
            limit: 100,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTableRowsResponse {
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub next_key: String,
}

/// Error body returned by the chain API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: u16,
    pub message: String,
    pub error: ApiErrorDetail,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub what: String,
    #[serde(default)]
    pub details: Vec<ApiErrorMessage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub message: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line_number: u32,
    #[serde(default)]
    pub method: String,
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (code {}, inner code {})",
            self.message, self.error.what, self.code, self.error.code
        )?;
        if let Some(detail) = self.error.details.first() {
            write!(f, ": {}", detail.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Api(ApiErrorResponse),
}

impl ChainApiError {
    /// True when the chain rejected a push because the same transaction was
    /// already applied.
    pub fn is_duplicate_transaction(&self) -> bool {
        matches!(
            self,
            ChainApiError::Api(resp)
                if resp.code == EOS_INTERNAL_ERROR_CODE
                    && resp.error.code == EOS_DUPLICATE_TRANSACTION_CODE
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ChainApiError::Transport(_) => "transport",
            ChainApiError::Decode(_) => "decode",
            ChainApiError::Api(_) => "api",
        }
    }
}

/// Chain API surface the oracle depends on.
#[async_trait]
pub trait ChainClientInner: Send + Sync {
    async fn get_info(&self) -> Result<ChainInfo, ChainApiError>;

    async fn push_transaction(
        &self,
        tx: &PackedTransaction,
    ) -> Result<PushTransactionResponse, ChainApiError>;

    async fn get_transaction(
        &self,
        id: &Checksum256,
    ) -> Result<GetTransactionResponse, ChainApiError>;

    async fn get_table_rows(
        &self,
        request: &GetTableRowsRequest,
    ) -> Result<GetTableRowsResponse, ChainApiError>;
}

pub struct ChainClient<P> {
    inner: P,
    metrics: Arc<OracleMetrics>,
}

pub type CasinoChainClient = ChainClient<EosioRpcClient>;

impl CasinoChainClient {
    pub fn with_metrics(rpc_url: &str, metrics: Arc<OracleMetrics>) -> Self {
        Self {
            inner: EosioRpcClient::new(rpc_url),
            metrics,
        }
    }
}

impl<P> ChainClient<P>
where
    P: ChainClientInner,
{
    pub fn new(inner: P, metrics: Arc<OracleMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn new_for_testing(inner: P) -> Self {
        Self {
            inner,
            metrics: Arc::new(OracleMetrics::new_for_testing()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn observe<T>(&self, method: &str, result: &Result<T, ChainApiError>) {
        self.metrics
            .chain_rpc_queries
            .with_label_values(&[method])
            .inc();
        if let Err(e) = result {
            if !e.is_duplicate_transaction() {
                warn!("Chain rpc {} failed: {}", method, e);
            }
            self.metrics
                .chain_rpc_errors
                .with_label_values(&[method])
                .inc();
        }
    }

    pub async fn get_info(&self) -> Result<ChainInfo, ChainApiError> {
        let result = self.inner.get_info().await;
        self.observe("get_info", &result);
        result
    }

    pub async fn push_transaction(
        &self,
        tx: &PackedTransaction,
    ) -> Result<PushTransactionResponse, ChainApiError> {
        let result = self.inner.push_transaction(tx).await;
        self.observe("push_transaction", &result);
        result
    }

    pub async fn get_transaction(
        &self,
        id: &Checksum256,
    ) -> Result<GetTransactionResponse, ChainApiError> {
        let result = self.inner.get_transaction(id).await;
        self.observe("get_transaction", &result);
        result
    }

    pub async fn get_table_rows(
        &self,
        request: &GetTableRowsRequest,
    ) -> Result<GetTableRowsResponse, ChainApiError> {
        let result = self.inner.get_table_rows(request).await;
        self.observe("get_table_rows", &result);
        result
    }
}
