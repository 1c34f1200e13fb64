// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::{ApiErrorDetail, ApiErrorResponse, ChainApiError};
use crate::chain_mock_client::mock_chain_info;
use crate::deposit_validator::{DepositPolicy, GAME_ACTION_PERMISSION, TRANSFER};
use crate::signidice::{SgdiceSecondData, SGDICE_SECOND, SIGNIDICE_PERMISSION};
use daobet_types::{
    Action, Asset, Checksum256, Encoder, Name, Pack, PermissionLevel, PrivateKey,
    SignedTransaction, Transaction, TxOptions, TOKEN_CONTRACT,
};
use rsa::RsaPrivateKey;
use std::sync::OnceLock;

pub const TEST_CASINO: Name = Name::from_static("dicegame1111");
pub const TEST_PLATFORM: Name = Name::from_static("platform");
pub const TEST_PLAYER: Name = Name::from_static("lordofdao");
pub const TEST_SIGNIDICE: Name = Name::from_static("casinosgdice");

/// The chain's answer to a push of an already applied transaction.
pub fn duplicate_transaction_error() -> ChainApiError {
    ChainApiError::Api(ApiErrorResponse {
        code: 500,
        message: "Internal Service Error".to_string(),
        error: ApiErrorDetail {
            code: 3040008,
            name: "tx_duplicate".to_string(),
            what: "Duplicate transaction".to_string(),
            details: vec![],
        },
    })
}

/// Options matching what a default `ChainMockClient` reports.
pub fn test_tx_options() -> TxOptions {
    let info = mock_chain_info(Checksum256::hash(b"mock chain"));
    TxOptions::new(info.chain_id, info.last_irreversible_block_id)
}

pub fn signidice_action(req_id: u64) -> Action {
    Action::new(
        TEST_CASINO,
        SGDICE_SECOND,
        vec![PermissionLevel::new(TEST_SIGNIDICE, SIGNIDICE_PERMISSION)],
        &SgdiceSecondData {
            req_id,
            sign: "c2lnbg==".to_string(),
        },
    )
}

// 1024 bits keeps key generation fast enough for unit tests.
pub fn test_rsa_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("rsa key generation")
    })
    .clone()
}

pub struct TransferData {
    pub from: Name,
    pub to: Name,
    pub quantity: Asset,
    pub memo: String,
}

impl Pack for TransferData {
    fn pack(&self, enc: &mut Encoder) {
        self.from.pack(enc);
        self.to.pack(enc);
        self.quantity.pack(enc);
        self.memo.pack(enc);
    }
}

/// Accounts and keys for building deposit transactions the way a game
/// frontend does.
pub struct DepositFixture {
    pub casino: Name,
    pub platform: Name,
    pub player: Name,
    pub platform_key: PrivateKey,
    pub player_key: PrivateKey,
    pub opts: TxOptions,
}

impl DepositFixture {
    pub fn new() -> Self {
        Self {
            casino: TEST_CASINO,
            platform: TEST_PLATFORM,
            player: TEST_PLAYER,
            platform_key: PrivateKey::generate(),
            player_key: PrivateKey::generate(),
            opts: test_tx_options(),
        }
    }

    /// Player's deposit authorized through the casino-named permission.
    pub fn transfer(&self) -> Action {
        Action::new(
            TOKEN_CONTRACT,
            TRANSFER,
            vec![PermissionLevel::new(self.player, self.casino)],
            &TransferData {
                from: self.player,
                to: self.casino,
                quantity: Asset::bet("10").expect("valid amount"),
                memo: String::new(),
            },
        )
    }

    pub fn game_action(&self, name: Name) -> Action {
        Action::new(
            self.casino,
            name,
            vec![PermissionLevel::new(self.platform, GAME_ACTION_PERMISSION)],
            &42u64,
        )
    }

    pub fn signed(&self, actions: Vec<Action>, keys: &[&PrivateKey]) -> SignedTransaction {
        let mut tx = SignedTransaction::new(Transaction::new(actions, &self.opts));
        for key in keys {
            tx.sign(key, &self.opts.chain_id).expect("signing succeeds");
        }
        tx
    }

    pub fn policy(&self) -> DepositPolicy {
        DepositPolicy {
            casino_account: self.casino,
            platform_account: self.platform,
            platform_pub_key: self.platform_key.public_key(),
            chain_id: self.opts.chain_id,
        }
    }
}
