// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{OracleError, OracleResult};
use daobet_types::{PrivateKey, PublicKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which of the oracle's identities signs a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SigningRole {
    // Co-signs player deposit transactions received over HTTP
    Deposit,
    // Signs sgdicesecond actions for the game contracts
    Signidice,
    // Signs bonus administration actions
    BonusAdmin,
}

impl SigningRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningRole::Deposit => "deposit",
            SigningRole::Signidice => "signidice",
            SigningRole::BonusAdmin => "bonus_admin",
        }
    }
}

impl fmt::Display for SigningRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role to key mapping. Looking up a role that has no key is an error; a key
/// configured for one role is never used for another.
#[derive(Clone, Default)]
pub struct KeyBag {
    keys: HashMap<SigningRole, Arc<PrivateKey>>,
}

impl KeyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, role: SigningRole, key: PrivateKey) -> Self {
        self.insert(role, key);
        self
    }

    pub fn insert(&mut self, role: SigningRole, key: PrivateKey) {
        self.keys.insert(role, Arc::new(key));
    }

    pub fn get(&self, role: SigningRole) -> OracleResult<&PrivateKey> {
        self.keys
            .get(&role)
            .map(|key| key.as_ref())
            .ok_or(OracleError::MissingKey(role.as_str()))
    }

    pub fn public_key(&self, role: SigningRole) -> OracleResult<PublicKey> {
        self.get(role).map(PrivateKey::public_key)
    }

    pub fn contains(&self, role: SigningRole) -> bool {
        self.keys.contains_key(&role)
    }
}

impl fmt::Debug for KeyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut roles: Vec<_> = self.keys.iter().collect();
        roles.sort_by_key(|(role, _)| **role);
        f.debug_map()
            .entries(roles.into_iter().map(|(role, key)| (role, key.public_key())))
            .finish()
    }
}
