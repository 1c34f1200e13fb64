// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bonus administration: reads the casino's player statistics and pushes
//! bonus management actions signed by the bonus admin key.

use crate::broadcaster::TransactionBroadcaster;
use crate::chain_client::{ChainClientInner, GetTableRowsRequest};
use crate::chain_state::ChainStateCache;
use crate::error::{OracleError, OracleResult};
use crate::key_bag::SigningRole;
use crate::retry::{retry_with_timeout, RetryPolicy};
use daobet_types::{Action, Asset, Checksum256, Encoder, Name, Pack, PermissionLevel};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::sync::Arc;
use tracing::{debug, info};

pub const PLAYER_STATS_TABLE: Name = Name::from_static("playerstats");
pub const CONVERT_BONUS: Name = Name::from_static("convertbon");
pub const ADD_GAME_NO_BONUS: Name = Name::from_static("addgamenobon");
pub const REMOVE_GAME_NO_BONUS: Name = Name::from_static("rmgamenobon");
const ADMIN_PERMISSION: Name = Name::from_static("active");

/// Row of the casino's `playerstats` table.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player: Name,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub sessions_created: u64,
    pub volume_real: Asset,
    pub volume_bonus: Asset,
    pub profit_real: Asset,
    pub profit_bonus: Asset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertBonusData {
    pub name: Name,
    pub memo: String,
}

impl Pack for ConvertBonusData {
    fn pack(&self, enc: &mut Encoder) {
        self.name.pack(enc);
        self.memo.pack(enc);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameNoBonusData {
    pub game_account: Name,
}

impl Pack for GameNoBonusData {
    fn pack(&self, enc: &mut Encoder) {
        self.game_account.pack(enc);
    }
}

pub struct BonusManager<P> {
    broadcaster: Arc<TransactionBroadcaster<P>>,
    chain_state: Arc<ChainStateCache<P>>,
    casino_account: Name,
    admin_account: Name,
    retry_policy: RetryPolicy,
}

impl<P> BonusManager<P>
where
    P: ChainClientInner,
{
    pub fn new(
        broadcaster: Arc<TransactionBroadcaster<P>>,
        chain_state: Arc<ChainStateCache<P>>,
        casino_account: Name,
        admin_account: Name,
    ) -> Self {
        let retry_policy = *broadcaster.retry_policy();
        Self {
            broadcaster,
            chain_state,
            casino_account,
            admin_account,
            retry_policy,
        }
    }

    async fn query_player_stats(
        &self,
        request: &GetTableRowsRequest,
    ) -> OracleResult<(Vec<PlayerStats>, Option<String>)> {
        let client = self.broadcaster.client();
        let response = retry_with_timeout(&self.retry_policy, || client.get_table_rows(request))
            .await
            .map_err(|e| OracleError::ChainApiError(e.to_string()))?;
        let rows = response
            .rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<PlayerStats>, _>>()
            .map_err(|e| {
                OracleError::ChainApiError(format!("malformed {} row: {}", PLAYER_STATS_TABLE, e))
            })?;
        let next_key = (response.more && !response.next_key.is_empty()).then_some(response.next_key);
        Ok((rows, next_key))
    }

    /// Every row of the `playerstats` table, following pagination.
    pub async fn get_bonus_players(&self) -> OracleResult<Vec<PlayerStats>> {
        let mut request =
            GetTableRowsRequest::new(self.casino_account, self.casino_account, PLAYER_STATS_TABLE);
        let mut players = Vec::new();
        loop {
            let (rows, next_key) = self.query_player_stats(&request).await?;
            players.extend(rows);
            match next_key {
                Some(key) => request.lower_bound = Some(key),
                None => break,
            }
        }
        debug!("Fetched {} bonus players", players.len());
        Ok(players)
    }

    /// Whether `player` has statistics recorded by the casino.
    pub async fn meets_requirements(&self, player: Name) -> OracleResult<bool> {
        let key = player.as_u64().to_string();
        let mut request =
            GetTableRowsRequest::new(self.casino_account, self.casino_account, PLAYER_STATS_TABLE);
        request.lower_bound = Some(key.clone());
        request.upper_bound = Some(key);
        request.limit = 1;
        let (rows, _) = self.query_player_stats(&request).await?;
        Ok(rows.iter().any(|row| row.player == player))
    }

    pub async fn convert_bonus(&self, player: Name, force: bool) -> OracleResult<Checksum256> {
        if !force && !self.meets_requirements(player).await? {
            return Err(OracleError::RequirementsNotMet);
        }
        let tx_id = self
            .push_admin_action(
                CONVERT_BONUS,
                &ConvertBonusData {
                    name: player,
                    memo: String::new(),
                },
            )
            .await?;
        info!("Converted bonus of {}, txid: {}", player, tx_id);
        Ok(tx_id)
    }

    pub async fn add_game_no_bonus(&self, game_account: Name) -> OracleResult<Checksum256> {
        let tx_id = self
            .push_admin_action(ADD_GAME_NO_BONUS, &GameNoBonusData { game_account })
            .await?;
        info!("Excluded game {} from bonuses, txid: {}", game_account, tx_id);
        Ok(tx_id)
    }

    pub async fn remove_game_no_bonus(&self, game_account: Name) -> OracleResult<Checksum256> {
        let tx_id = self
            .push_admin_action(REMOVE_GAME_NO_BONUS, &GameNoBonusData { game_account })
            .await?;
        info!("Re-enabled bonuses for game {}, txid: {}", game_account, tx_id);
        Ok(tx_id)
    }

    async fn push_admin_action<T: Pack>(&self, name: Name, data: &T) -> OracleResult<Checksum256> {
        let chain_state = &self.chain_state;
        let opts = retry_with_timeout(&self.retry_policy, || chain_state.get_tx_options())
            .await
            .map_err(|e| OracleError::ChainStateUnavailable(e.to_string()))?;
        let action = Action::new(
            self.casino_account,
            name,
            vec![PermissionLevel::new(self.admin_account, ADMIN_PERMISSION)],
            data,
        );
        self.broadcaster
            .sign_and_broadcast(vec![action], SigningRole::BonusAdmin, &opts)
            .await
    }
}
