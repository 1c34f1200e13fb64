// DAOBet Chain Types
// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

// =============================================================================
// Primitive values
// =============================================================================

pub mod asset;
pub mod checksum;
pub mod name;

pub use asset::{Asset, Symbol};
pub use checksum::Checksum256;
pub use name::Name;

// =============================================================================
// Wire encoding
// =============================================================================

pub mod encoding;
pub use encoding::{Decoder, Encoder, Pack, Unpack};

// =============================================================================
// Keys, signatures and transactions
// =============================================================================

pub mod crypto;
pub mod transaction;

pub use crypto::{PrivateKey, PublicKey, Signature};
pub use transaction::{
    Action, PackedTransaction, PermissionLevel, SignedTransaction, TimePointSec, Transaction,
    TxOptions,
};

pub mod error;
pub use error::{TypesError, TypesResult};

/// System contract that owns the platform's fungible token.
pub const TOKEN_CONTRACT: Name = Name::from_static("eosio.token");
