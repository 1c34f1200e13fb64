// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mock implementation of the chain API client.

use crate::chain_client::{
    ChainApiError, ChainClientInner, ChainInfo, GetTableRowsRequest, GetTableRowsResponse,
    GetTransactionResponse, PushTransactionResponse,
};
use async_trait::async_trait;
use daobet_types::{Checksum256, Name, PackedTransaction, Transaction};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type PushResult = Result<(), ChainApiError>;

// Mock client used in test environments.
#[allow(clippy::type_complexity)]
#[derive(Clone, Debug)]
pub struct ChainMockClient {
    info: Arc<Mutex<Result<ChainInfo, ChainApiError>>>,
    info_calls: Arc<AtomicUsize>,
    push_calls: Arc<AtomicUsize>,
    push_responses: Arc<Mutex<VecDeque<PushResult>>>,
    wildcard_push_response: Arc<Mutex<Option<PushResult>>>,
    push_delay: Arc<Mutex<Option<Duration>>>,
    // Every transaction the chain accepted, by id
    transactions: Arc<Mutex<HashMap<Checksum256, PackedTransaction>>>,
    // rows of each table keyed by primary key
    table_rows: Arc<Mutex<HashMap<(Name, String, Name), BTreeMap<u64, serde_json::Value>>>>,
    table_page_size: Arc<AtomicUsize>,
    pushed_transactions_tx: tokio::sync::broadcast::Sender<Checksum256>,
}

pub fn mock_chain_info(chain_id: Checksum256) -> ChainInfo {
    let mut lib = [0u8; 32];
    lib[..4].copy_from_slice(&100u32.to_be_bytes());
    lib[8..12].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    let mut head = lib;
    head[..4].copy_from_slice(&104u32.to_be_bytes());
    ChainInfo {
        server_version: "mock".to_string(),
        chain_id,
        head_block_num: 104,
        head_block_id: Checksum256::new(head),
        last_irreversible_block_num: 100,
        last_irreversible_block_id: Checksum256::new(lib),
    }
}

impl Default for ChainMockClient {
    fn default() -> Self {
        Self::new(Checksum256::hash(b"mock chain"))
    }
}

impl ChainMockClient {
    pub fn new(chain_id: Checksum256) -> Self {
        Self {
            info: Arc::new(Mutex::new(Ok(mock_chain_info(chain_id)))),
            info_calls: Default::default(),
            push_calls: Default::default(),
            push_responses: Default::default(),
            wildcard_push_response: Default::default(),
            push_delay: Default::default(),
            transactions: Default::default(),
            table_rows: Default::default(),
            table_page_size: Arc::new(AtomicUsize::new(usize::MAX)),
            pushed_transactions_tx: tokio::sync::broadcast::channel(10000).0,
        }
    }

    pub fn set_info(&self, info: ChainInfo) {
        *self.info.lock().unwrap() = Ok(info);
    }

    pub fn set_info_error(&self, err: ChainApiError) {
        *self.info.lock().unwrap() = Err(err);
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    /// Queue a result for the next push. Queued results are used before the
    /// wildcard one.
    pub fn add_push_response(&self, response: PushResult) {
        self.push_responses.lock().unwrap().push_back(response);
    }

    pub fn set_wildcard_push_response(&self, response: PushResult) {
        *self.wildcard_push_response.lock().unwrap() = Some(response);
    }

    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn accepted_transactions(&self) -> Vec<Checksum256> {
        self.transactions.lock().unwrap().keys().copied().collect()
    }

    /// Decoded body of an accepted transaction.
    pub fn pushed_transaction(&self, id: &Checksum256) -> Option<Transaction> {
        self.transactions
            .lock()
            .unwrap()
            .get(id)
            .and_then(|packed| packed.unpack().ok())
    }

    pub fn pushed_packed_transaction(&self, id: &Checksum256) -> Option<PackedTransaction> {
        self.transactions.lock().unwrap().get(id).cloned()
    }

    pub fn subscribe_to_pushed_transactions(
        &self,
    ) -> tokio::sync::broadcast::Receiver<Checksum256> {
        self.pushed_transactions_tx.subscribe()
    }

    pub fn add_table_rows(
        &self,
        code: Name,
        scope: Name,
        table: Name,
        rows: Vec<(u64, serde_json::Value)>,
    ) {
        self.table_rows
            .lock()
            .unwrap()
            .entry((code, scope.to_string(), table))
            .or_default()
            .extend(rows);
    }

    /// Limit the number of rows returned per `get_table_rows` call so that
    /// pagination is exercised.
    pub fn set_table_page_size(&self, size: usize) {
        self.table_page_size.store(size, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClientInner for ChainMockClient {
    async fn get_info(&self) -> Result<ChainInfo, ChainApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info.lock().unwrap().clone()
    }

    async fn push_transaction(
        &self,
        tx: &PackedTransaction,
    ) -> Result<PushTransactionResponse, ChainApiError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .push_responses
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.wildcard_push_response.lock().unwrap().clone());
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        let id = tx.id();
        self.transactions.lock().unwrap().insert(id, tx.clone());
        let _ = self.pushed_transactions_tx.send(id);
        Ok(PushTransactionResponse {
            transaction_id: id,
            processed: serde_json::Value::Null,
        })
    }

    async fn get_transaction(
        &self,
        id: &Checksum256,
    ) -> Result<GetTransactionResponse, ChainApiError> {
        let transactions = self.transactions.lock().unwrap();
        let packed = transactions
            .get(id)
            .ok_or_else(|| ChainApiError::Transport(format!("unknown transaction {}", id)))?;
        let trx = packed
            .unpack()
            .map_err(|e| ChainApiError::Decode(e.to_string()))?;
        Ok(GetTransactionResponse {
            id: *id,
            block_num: 101,
            trx: serde_json::to_value(trx).map_err(|e| ChainApiError::Decode(e.to_string()))?,
        })
    }

    async fn get_table_rows(
        &self,
        request: &GetTableRowsRequest,
    ) -> Result<GetTableRowsResponse, ChainApiError> {
        let tables = self.table_rows.lock().unwrap();
        let Some(rows) = tables.get(&(request.code, request.scope.clone(), request.table)) else {
            return Ok(GetTableRowsResponse::default());
        };
        let parse_bound = |bound: &Option<String>, default: u64| {
            bound
                .as_deref()
                .filter(|b| !b.is_empty())
                .map(|b| {
                    b.parse::<u64>()
                        .map_err(|e| ChainApiError::Decode(format!("bad bound {}: {}", b, e)))
                })
                .transpose()
                .map(|b| b.unwrap_or(default))
        };
        let lower = parse_bound(&request.lower_bound, 0)?;
        let upper = parse_bound(&request.upper_bound, u64::MAX)?;
        let page_size = self
            .table_page_size
            .load(Ordering::SeqCst)
            .min(request.limit.max(1) as usize);
        let mut matching = rows.range(lower..=upper);
        let page: Vec<_> = matching
            .by_ref()
            .take(page_size)
            .map(|(_, row)| row.clone())
            .collect();
        let next_key = matching.next().map(|(key, _)| key.to_string());
        Ok(GetTableRowsResponse {
            rows: page,
            more: next_key.is_some(),
            next_key: next_key.unwrap_or_default(),
        })
    }
}
