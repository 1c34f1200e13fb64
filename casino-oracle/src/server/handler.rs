// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::bonus::{BonusManager, PlayerStats};
use crate::broadcaster::TransactionBroadcaster;
use crate::chain_client::ChainClientInner;
use crate::deposit_validator::DepositPolicy;
use crate::error::{OracleError, OracleResult};
use crate::key_bag::SigningRole;
use crate::metrics::OracleMetrics;
use async_trait::async_trait;
use axum::Json;
use daobet_types::{Checksum256, Name, SignedTransaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTransactionResponse {
    pub txid: Checksum256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertBonusRequest {
    pub player: Name,
    #[serde(default)]
    pub force: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameNoBonusRequest {
    pub game_account: Name,
}

#[async_trait]
pub trait CasinoRequestHandlerTrait {
    // Validates a player's deposit transaction, co-signs it with the deposit
    // key and pushes it to the chain.
    async fn handle_sign_transaction(
        &self,
        tx: SignedTransaction,
    ) -> OracleResult<Json<SignTransactionResponse>>;

    async fn handle_bonus_players(&self) -> OracleResult<Json<Vec<PlayerStats>>>;

    async fn handle_convert_bonus(&self, request: ConvertBonusRequest) -> OracleResult<Json<()>>;

    async fn handle_add_game_no_bonus(&self, request: GameNoBonusRequest)
        -> OracleResult<Json<()>>;

    async fn handle_remove_game_no_bonus(
        &self,
        request: GameNoBonusRequest,
    ) -> OracleResult<Json<()>>;
}

pub struct CasinoRequestHandler<P> {
    broadcaster: Arc<TransactionBroadcaster<P>>,
    bonus: Arc<BonusManager<P>>,
    deposit_policy: DepositPolicy,
    metrics: Arc<OracleMetrics>,
}

impl<P> CasinoRequestHandler<P>
where
    P: ChainClientInner,
{
    pub fn new(
        broadcaster: Arc<TransactionBroadcaster<P>>,
        bonus: Arc<BonusManager<P>>,
        deposit_policy: DepositPolicy,
        metrics: Arc<OracleMetrics>,
    ) -> Self {
        Self {
            broadcaster,
            bonus,
            deposit_policy,
            metrics,
        }
    }

    async fn sign_deposit(&self, tx: SignedTransaction) -> OracleResult<Checksum256> {
        if let Err(e) = self.deposit_policy.validate(&tx) {
            warn!("Rejected deposit transaction: {}", e);
            self.metrics
                .deposit_rejections
                .with_label_values(&[e.reason()])
                .inc();
            return Err(OracleError::InvalidTransaction(e.to_string()));
        }
        self.broadcaster
            .cosign_and_broadcast(tx, SigningRole::Deposit, &self.deposit_policy.chain_id)
            .await
    }
}

// Admin failures are reported as server errors whatever their cause.
fn admin_error(e: OracleError) -> OracleError {
    OracleError::Generic(e.to_string())
}

#[async_trait]
impl<P> CasinoRequestHandlerTrait for CasinoRequestHandler<P>
where
    P: ChainClientInner + 'static,
{
    async fn handle_sign_transaction(
        &self,
        tx: SignedTransaction,
    ) -> OracleResult<Json<SignTransactionResponse>> {
        let started = Instant::now();
        let result = self.sign_deposit(tx).await;
        self.metrics
            .http_sign_transaction_ms
            .observe(started.elapsed().as_millis() as f64);
        let txid = result?;
        info!("Successfully sent deposit txn, txid: {}", txid);
        Ok(Json(SignTransactionResponse { txid }))
    }

    async fn handle_bonus_players(&self) -> OracleResult<Json<Vec<PlayerStats>>> {
        let players = self.bonus.get_bonus_players().await.map_err(admin_error)?;
        Ok(Json(players))
    }

    async fn handle_convert_bonus(&self, request: ConvertBonusRequest) -> OracleResult<Json<()>> {
        self.bonus
            .convert_bonus(request.player, request.force)
            .await
            .map_err(admin_error)?;
        Ok(Json(()))
    }

    async fn handle_add_game_no_bonus(
        &self,
        request: GameNoBonusRequest,
    ) -> OracleResult<Json<()>> {
        self.bonus
            .add_game_no_bonus(request.game_account)
            .await
            .map_err(admin_error)?;
        Ok(Json(()))
    }

    async fn handle_remove_game_no_bonus(
        &self,
        request: GameNoBonusRequest,
    ) -> OracleResult<Json<()>> {
        self.bonus
            .remove_game_no_bonus(request.game_account)
            .await
            .map_err(admin_error)?;
        Ok(Json(()))
    }
}
