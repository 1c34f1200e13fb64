// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Policy gate for deposit transactions submitted to `/sign_transaction`.
//!
//! A deposit may only move funds to the casino and perform one game action
//! authorized by the platform, in one of a few fixed shapes, and it must
//! already carry the platform's signature.

use daobet_types::{Action, Checksum256, Name, PublicKey, SignedTransaction, TOKEN_CONTRACT};
use std::fmt;

pub const TRANSFER: Name = Name::from_static("transfer");
pub const DEPOSIT_BON: Name = Name::from_static("depositbon");
pub const NEW_GAME: Name = Name::from_static("newgame");
pub const NEW_GAME_AFFILIATE: Name = Name::from_static("newgameaffl");
pub const NEW_GAME_BON: Name = Name::from_static("newgamebon");
pub const GAME_ACTION: Name = Name::from_static("gameaction");
/// Permission the platform uses to authorize game actions.
pub const GAME_ACTION_PERMISSION: Name = Name::from_static("gameaction");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Transfer,
    DepositBon,
    NewGame,
    NewGameBon,
    GameAction,
    Unknown,
}

impl ActionKind {
    pub fn classify(name: Name) -> Self {
        match name {
            TRANSFER => ActionKind::Transfer,
            DEPOSIT_BON => ActionKind::DepositBon,
            NEW_GAME | NEW_GAME_AFFILIATE => ActionKind::NewGame,
            NEW_GAME_BON => ActionKind::NewGameBon,
            GAME_ACTION => ActionKind::GameAction,
            _ => ActionKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Transfer => "transfer",
            ActionKind::DepositBon => "depositbon",
            ActionKind::NewGame => "newgame",
            ActionKind::NewGameBon => "newgamebon",
            ActionKind::GameAction => "gameaction",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use self::ActionKind::{DepositBon, GameAction, NewGame, NewGameBon, Transfer};

/// Every permitted ordered action shape.
pub const ALLOWED_ACTION_SEQUENCES: &[&[ActionKind]] = &[
    &[Transfer, NewGame],
    &[Transfer, NewGame, GameAction],
    &[Transfer, GameAction],
    &[Transfer, NewGameBon, GameAction],
    &[NewGameBon, GameAction],
    &[Transfer, DepositBon, GameAction],
    &[DepositBon, GameAction],
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid actions amount: {0}")]
    InvalidActionCount(usize),
    #[error("unknown action in deposit txn: {0}")]
    UnknownAction(Name),
    #[error("incorrect tx actions")]
    IncorrectActions,
    #[error("transfer must be sent to {expected}, got {actual}")]
    TransferWrongContract { expected: Name, actual: Name },
    #[error("transfer action name must be transfer, got {0}")]
    TransferWrongName(Name),
    #[error("{kind} action must have exactly one authorization, got {count}")]
    InvalidAuthorizationCount { kind: ActionKind, count: usize },
    #[error("transfer must be authorized with {expected} permission, got {actual}")]
    TransferWrongPermission { expected: Name, actual: Name },
    #[error("{kind} action must be authorized by {expected}, got {actual}")]
    WrongActor {
        kind: ActionKind,
        expected: Name,
        actual: Name,
    },
    #[error("{kind} action must use gameaction permission, got {actual}")]
    WrongPermission { kind: ActionKind, actual: Name },
    #[error("failed to recover signing keys: {0}")]
    KeyRecovery(String),
    #[error("invalid signatures amount: {0}")]
    InvalidSignerCount(usize),
    #[error("platform pub key not found in deposit txn")]
    PlatformKeyNotFound,
}

impl ValidationError {
    /// Metric label for the rejection reason.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::InvalidActionCount(_) => "invalid_action_count",
            ValidationError::UnknownAction(_) => "unknown_action",
            ValidationError::IncorrectActions => "incorrect_actions",
            ValidationError::TransferWrongContract { .. } => "transfer_wrong_contract",
            ValidationError::TransferWrongName(_) => "transfer_wrong_name",
            ValidationError::InvalidAuthorizationCount { .. } => "invalid_authorization_count",
            ValidationError::TransferWrongPermission { .. } => "transfer_wrong_permission",
            ValidationError::WrongActor { .. } => "wrong_actor",
            ValidationError::WrongPermission { .. } => "wrong_permission",
            ValidationError::KeyRecovery(_) => "key_recovery",
            ValidationError::InvalidSignerCount(_) => "invalid_signer_count",
            ValidationError::PlatformKeyNotFound => "platform_key_not_found",
        }
    }
}

/// Accounts and keys a deposit transaction is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPolicy {
    pub casino_account: Name,
    pub platform_account: Name,
    pub platform_pub_key: PublicKey,
    pub chain_id: Checksum256,
}

impl DepositPolicy {
    pub fn validate(&self, tx: &SignedTransaction) -> Result<(), ValidationError> {
        validate_deposit_transaction(
            tx,
            self.casino_account,
            self.platform_account,
            &self.platform_pub_key,
            &self.chain_id,
        )
    }
}

pub fn validate_deposit_transaction(
    tx: &SignedTransaction,
    casino_account: Name,
    platform_account: Name,
    platform_pub_key: &PublicKey,
    chain_id: &Checksum256,
) -> Result<(), ValidationError> {
    let actions = &tx.transaction.actions;
    if !(2..=3).contains(&actions.len()) {
        return Err(ValidationError::InvalidActionCount(actions.len()));
    }

    let kinds = actions
        .iter()
        .map(|action| match ActionKind::classify(action.name) {
            ActionKind::Unknown => Err(ValidationError::UnknownAction(action.name)),
            kind => Ok(kind),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if !ALLOWED_ACTION_SEQUENCES
        .iter()
        .any(|allowed| *allowed == kinds.as_slice())
    {
        return Err(ValidationError::IncorrectActions);
    }

    for (action, kind) in actions.iter().zip(&kinds) {
        check_authorization(action, *kind, casino_account, platform_account)?;
    }

    let signers = tx
        .recover_keys(chain_id)
        .map_err(|e| ValidationError::KeyRecovery(e.to_string()))?;
    if !(2..=3).contains(&signers.len()) {
        return Err(ValidationError::InvalidSignerCount(signers.len()));
    }
    if !signers.contains(platform_pub_key) {
        return Err(ValidationError::PlatformKeyNotFound);
    }
    Ok(())
}

fn check_authorization(
    action: &Action,
    kind: ActionKind,
    casino_account: Name,
    platform_account: Name,
) -> Result<(), ValidationError> {
    let auth = match action.authorization.as_slice() {
        [auth] => auth,
        other => {
            return Err(ValidationError::InvalidAuthorizationCount {
                kind,
                count: other.len(),
            })
        }
    };
    match kind {
        ActionKind::Transfer => {
            if action.account != TOKEN_CONTRACT {
                return Err(ValidationError::TransferWrongContract {
                    expected: TOKEN_CONTRACT,
                    actual: action.account,
                });
            }
            if action.name != TRANSFER {
                return Err(ValidationError::TransferWrongName(action.name));
            }
            if auth.permission != casino_account {
                return Err(ValidationError::TransferWrongPermission {
                    expected: casino_account,
                    actual: auth.permission,
                });
            }
        }
        _ => {
            if auth.actor != platform_account {
                return Err(ValidationError::WrongActor {
                    kind,
                    expected: platform_account,
                    actual: auth.actor,
                });
            }
            if auth.permission != GAME_ACTION_PERMISSION {
                return Err(ValidationError::WrongPermission {
                    kind,
                    actual: auth.permission,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::DepositFixture;
    use daobet_types::{PermissionLevel, PrivateKey};

    #[test]
    fn test_classify_action_names() {
        assert_eq!(ActionKind::classify(TRANSFER), ActionKind::Transfer);
        assert_eq!(ActionKind::classify(NEW_GAME_AFFILIATE), ActionKind::NewGame);
        assert_eq!(ActionKind::classify(NEW_GAME_BON), ActionKind::NewGameBon);
        assert_eq!(
            ActionKind::classify(Name::from_static("sgdicesecond")),
            ActionKind::Unknown
        );
    }

    #[test]
    fn test_accepts_transfer_and_newgame() {
        let fixture = DepositFixture::new();
        let tx = fixture.signed(
            vec![fixture.transfer(), fixture.game_action(NEW_GAME)],
            &[&fixture.platform_key, &fixture.player_key],
        );
        assert_eq!(fixture.policy().validate(&tx), Ok(()));
    }

    #[test]
    fn test_accepts_every_allowed_shape() {
        let fixture = DepositFixture::new();
        let shapes: Vec<Vec<Action>> = vec![
            vec![
                fixture.transfer(),
                fixture.game_action(NEW_GAME_AFFILIATE),
                fixture.game_action(GAME_ACTION),
            ],
            vec![fixture.transfer(), fixture.game_action(GAME_ACTION)],
            vec![
                fixture.transfer(),
                fixture.game_action(NEW_GAME_BON),
                fixture.game_action(GAME_ACTION),
            ],
            vec![
                fixture.game_action(NEW_GAME_BON),
                fixture.game_action(GAME_ACTION),
            ],
            vec![
                fixture.transfer(),
                fixture.game_action(DEPOSIT_BON),
                fixture.game_action(GAME_ACTION),
            ],
            vec![
                fixture.game_action(DEPOSIT_BON),
                fixture.game_action(GAME_ACTION),
            ],
        ];
        for actions in shapes {
            let names: Vec<_> = actions.iter().map(|a| a.name.to_string()).collect();
            let tx = fixture.signed(actions, &[&fixture.platform_key, &fixture.player_key]);
            assert_eq!(fixture.policy().validate(&tx), Ok(()), "{:?}", names);
        }
    }

    #[test]
    fn test_rejects_bad_action_count() {
        let fixture = DepositFixture::new();
        let keys = [&fixture.platform_key, &fixture.player_key];
        let tx = fixture.signed(vec![fixture.transfer()], &keys);
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::InvalidActionCount(1))
        );

        let tx = fixture.signed(vec![fixture.transfer(); 4], &keys);
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::InvalidActionCount(4))
        );
    }

    #[test]
    fn test_rejects_unknown_action_before_shape_check() {
        let fixture = DepositFixture::new();
        let tx = fixture.signed(
            vec![
                fixture.transfer(),
                fixture.game_action(Name::from_static("withdraw")),
            ],
            &[&fixture.platform_key, &fixture.player_key],
        );
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::UnknownAction(Name::from_static("withdraw")))
        );
    }

    #[test]
    fn test_rejects_shape_outside_allow_list() {
        let fixture = DepositFixture::new();
        let keys = [&fixture.platform_key, &fixture.player_key];
        let tx = fixture.signed(
            vec![
                fixture.transfer(),
                fixture.game_action(NEW_GAME),
                fixture.game_action(NEW_GAME),
            ],
            &keys,
        );
        let err = fixture.policy().validate(&tx).unwrap_err();
        assert_eq!(err, ValidationError::IncorrectActions);
        assert_eq!(err.to_string(), "incorrect tx actions");

        // same kinds, wrong order
        let tx = fixture.signed(
            vec![fixture.game_action(NEW_GAME), fixture.transfer()],
            &keys,
        );
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::IncorrectActions)
        );
    }

    #[test]
    fn test_rejects_transfer_with_non_casino_permission() {
        let fixture = DepositFixture::new();
        let mut transfer = fixture.transfer();
        transfer.authorization[0].permission = Name::from_static("active");
        let tx = fixture.signed(
            vec![transfer, fixture.game_action(NEW_GAME)],
            &[&fixture.platform_key, &fixture.player_key],
        );
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::TransferWrongPermission {
                expected: fixture.casino,
                actual: Name::from_static("active"),
            })
        );
    }

    #[test]
    fn test_rejects_transfer_on_other_token_contract() {
        let fixture = DepositFixture::new();
        let mut transfer = fixture.transfer();
        transfer.account = Name::from_static("fake.token");
        let tx = fixture.signed(
            vec![transfer, fixture.game_action(NEW_GAME)],
            &[&fixture.platform_key, &fixture.player_key],
        );
        assert!(matches!(
            fixture.policy().validate(&tx),
            Err(ValidationError::TransferWrongContract { .. })
        ));
    }

    #[test]
    fn test_rejects_game_action_not_authorized_by_platform() {
        let fixture = DepositFixture::new();
        let keys = [&fixture.platform_key, &fixture.player_key];

        let mut newgame = fixture.game_action(NEW_GAME);
        newgame.authorization[0].actor = Name::from_static("intruder");
        let tx = fixture.signed(vec![fixture.transfer(), newgame], &keys);
        assert!(matches!(
            fixture.policy().validate(&tx),
            Err(ValidationError::WrongActor {
                kind: ActionKind::NewGame,
                ..
            })
        ));

        let mut newgame = fixture.game_action(NEW_GAME);
        newgame.authorization[0].permission = Name::from_static("active");
        let tx = fixture.signed(vec![fixture.transfer(), newgame], &keys);
        assert!(matches!(
            fixture.policy().validate(&tx),
            Err(ValidationError::WrongPermission { .. })
        ));

        let mut newgame = fixture.game_action(NEW_GAME);
        newgame.authorization.push(PermissionLevel::new(
            fixture.platform,
            GAME_ACTION_PERMISSION,
        ));
        let tx = fixture.signed(vec![fixture.transfer(), newgame], &keys);
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::InvalidAuthorizationCount {
                kind: ActionKind::NewGame,
                count: 2
            })
        );
    }

    #[test]
    fn test_rejects_missing_platform_signature() {
        let fixture = DepositFixture::new();
        let sponsor = PrivateKey::generate();
        let tx = fixture.signed(
            vec![fixture.transfer(), fixture.game_action(NEW_GAME)],
            &[&fixture.player_key, &sponsor],
        );
        let err = fixture.policy().validate(&tx).unwrap_err();
        assert_eq!(err, ValidationError::PlatformKeyNotFound);
        assert_eq!(err.to_string(), "platform pub key not found in deposit txn");
    }

    #[test]
    fn test_signer_count_bounds() {
        let fixture = DepositFixture::new();
        let actions = vec![fixture.transfer(), fixture.game_action(NEW_GAME)];

        let tx = fixture.signed(actions.clone(), &[&fixture.platform_key]);
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::InvalidSignerCount(1))
        );

        let sponsor = PrivateKey::generate();
        let tx = fixture.signed(
            actions.clone(),
            &[&fixture.platform_key, &fixture.player_key, &sponsor],
        );
        assert_eq!(fixture.policy().validate(&tx), Ok(()));

        let extra = PrivateKey::generate();
        let tx = fixture.signed(
            actions,
            &[&fixture.platform_key, &fixture.player_key, &sponsor, &extra],
        );
        assert_eq!(
            fixture.policy().validate(&tx),
            Err(ValidationError::InvalidSignerCount(4))
        );
    }

    #[test]
    fn test_signatures_over_other_chain_do_not_count() {
        let fixture = DepositFixture::new();
        let tx = fixture.signed(
            vec![fixture.transfer(), fixture.game_action(NEW_GAME)],
            &[&fixture.platform_key, &fixture.player_key],
        );
        let mut policy = fixture.policy();
        policy.chain_id = Checksum256::hash(b"another chain");
        // recovery yields unrelated keys, so the platform key is absent
        assert_eq!(
            policy.validate(&tx),
            Err(ValidationError::PlatformKeyNotFound)
        );
    }
}
