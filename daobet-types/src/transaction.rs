// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::checksum::Checksum256;
use crate::crypto::{PrivateKey, PublicKey, Signature};
use crate::encoding::{Decoder, Encoder, Pack, Unpack};
use crate::error::{TypesError, TypesResult};
use crate::name::Name;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_with::hex::Hex;
use serde_with::serde_as;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How long a freshly built transaction stays valid.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30);

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Seconds since the unix epoch, rendered as `YYYY-MM-DDTHH:MM:SS` (UTC).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePointSec(u32);

impl TimePointSec {
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u32 {
        self.0
    }

    pub fn now_plus(offset: Duration) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self(now.saturating_add(offset.as_secs()).min(u64::from(u32::MAX)) as u32)
    }
}

impl FromStr for TimePointSec {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| TypesError::InvalidTime(format!("{}: {}", s, e)))?;
        let secs = u32::try_from(parsed.and_utc().timestamp())
            .map_err(|_| TypesError::InvalidTime(s.to_string()))?;
        Ok(Self(secs))
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(i64::from(self.0), 0) {
            Some(dt) => write!(f, "{}", dt.format(TIME_FORMAT)),
            None => write!(f, "{}", self.0),
        }
    }
}

impl fmt::Debug for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimePointSec({})", self)
    }
}

impl Serialize for TimePointSec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimePointSec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

impl PermissionLevel {
    pub fn new(actor: Name, permission: Name) -> Self {
        Self { actor, permission }
    }
}

impl Pack for PermissionLevel {
    fn pack(&self, enc: &mut Encoder) {
        self.actor.pack(enc);
        self.permission.pack(enc);
    }
}

impl Unpack for PermissionLevel {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self {
            actor: Name::unpack(dec)?,
            permission: Name::unpack(dec)?,
        })
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    #[serde(default)]
    pub authorization: Vec<PermissionLevel>,
    /// Action arguments in binary form.
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Action {
    pub fn new<T: Pack + ?Sized>(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        data: &T,
    ) -> Self {
        Self {
            account,
            name,
            authorization,
            data: data.pack_to_vec(),
        }
    }
}

impl Pack for Action {
    fn pack(&self, enc: &mut Encoder) {
        self.account.pack(enc);
        self.name.pack(enc);
        self.authorization.pack(enc);
        enc.write_bytes(&self.data);
    }
}

impl Unpack for Action {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self {
            account: Name::unpack(dec)?,
            name: Name::unpack(dec)?,
            authorization: Vec::unpack(dec)?,
            data: dec.read_bytes()?,
        })
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionExtension {
    #[serde(rename = "type")]
    pub ext_type: u16,
    #[serde_as(as = "Hex")]
    pub data: Vec<u8>,
}

impl Pack for TransactionExtension {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_u16(self.ext_type);
        enc.write_bytes(&self.data);
    }
}

impl Unpack for TransactionExtension {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self {
            ext_type: dec.read_u16()?,
            data: dec.read_bytes()?,
        })
    }
}

/// Chain reference data needed to build a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOptions {
    pub chain_id: Checksum256,
    /// Block used as the TAPOS reference.
    pub head_block_id: Checksum256,
    pub expire_in: Duration,
}

impl TxOptions {
    pub fn new(chain_id: Checksum256, head_block_id: Checksum256) -> Self {
        Self {
            chain_id,
            head_block_id,
            expire_in: DEFAULT_EXPIRATION,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub expiration: TimePointSec,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    #[serde(default)]
    pub max_net_usage_words: u32,
    #[serde(default)]
    pub max_cpu_usage_ms: u8,
    #[serde(default)]
    pub delay_sec: u32,
    #[serde(default)]
    pub context_free_actions: Vec<Action>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub transaction_extensions: Vec<TransactionExtension>,
}

impl Transaction {
    pub fn new(actions: Vec<Action>, opts: &TxOptions) -> Self {
        let mut tx = Self {
            expiration: TimePointSec::now_plus(opts.expire_in),
            actions,
            ..Default::default()
        };
        tx.set_tapos(&opts.head_block_id);
        tx
    }

    /// References `block_id`: the low 16 bits of its block number and
    /// bytes 8..12 of the id as a little-endian prefix.
    pub fn set_tapos(&mut self, block_id: &Checksum256) {
        let id = block_id.as_bytes();
        let block_num = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
        self.ref_block_num = (block_num & 0xffff) as u16;
        self.ref_block_prefix = u32::from_le_bytes([id[8], id[9], id[10], id[11]]);
    }

    pub fn id(&self) -> Checksum256 {
        Checksum256::hash(self.pack_to_vec())
    }
}

impl Pack for Transaction {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_u32(self.expiration.secs());
        enc.write_u16(self.ref_block_num);
        enc.write_u32(self.ref_block_prefix);
        enc.write_varuint32(self.max_net_usage_words);
        enc.write_u8(self.max_cpu_usage_ms);
        enc.write_varuint32(self.delay_sec);
        self.context_free_actions.pack(enc);
        self.actions.pack(enc);
        self.transaction_extensions.pack(enc);
    }
}

impl Unpack for Transaction {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self {
            expiration: TimePointSec::from_secs(dec.read_u32()?),
            ref_block_num: dec.read_u16()?,
            ref_block_prefix: dec.read_u32()?,
            max_net_usage_words: dec.read_varuint32()?,
            max_cpu_usage_ms: dec.read_u8()?,
            delay_sec: dec.read_varuint32()?,
            context_free_actions: Vec::unpack(dec)?,
            actions: Vec::unpack(dec)?,
            transaction_extensions: Vec::unpack(dec)?,
        })
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    #[serde_as(as = "Vec<Hex>")]
    #[serde(default)]
    pub context_free_data: Vec<Vec<u8>>,
}

impl SignedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            ..Default::default()
        }
    }

    fn packed_context_free_data(&self) -> Vec<u8> {
        if self.context_free_data.is_empty() {
            Vec::new()
        } else {
            self.context_free_data.pack_to_vec()
        }
    }

    /// Digest covered by every signature:
    /// `sha256(chain_id | packed_trx | sha256(packed_cfd) or 32 zero bytes)`.
    pub fn signing_digest(&self, chain_id: &Checksum256) -> Checksum256 {
        let cfd_digest = if self.context_free_data.is_empty() {
            Checksum256::default()
        } else {
            Checksum256::hash(self.packed_context_free_data())
        };
        let mut enc = Encoder::new();
        chain_id.pack(&mut enc);
        self.transaction.pack(&mut enc);
        cfd_digest.pack(&mut enc);
        Checksum256::hash(enc.into_bytes())
    }

    pub fn sign(&mut self, key: &PrivateKey, chain_id: &Checksum256) -> TypesResult<()> {
        let signature = key.sign_digest(&self.signing_digest(chain_id))?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Public keys behind the attached signatures, duplicates removed,
    /// in signature order.
    pub fn recover_keys(&self, chain_id: &Checksum256) -> TypesResult<Vec<PublicKey>> {
        let digest = self.signing_digest(chain_id);
        let mut keys = Vec::with_capacity(self.signatures.len());
        for signature in &self.signatures {
            let key = signature.recover(&digest)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    pub fn pack(&self) -> PackedTransaction {
        PackedTransaction {
            signatures: self.signatures.clone(),
            compression: Compression::None,
            packed_context_free_data: self.packed_context_free_data(),
            packed_trx: self.transaction.pack_to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
}

/// Wire form accepted by the chain's `push_transaction` endpoint.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedTransaction {
    pub signatures: Vec<Signature>,
    pub compression: Compression,
    #[serde_as(as = "Hex")]
    pub packed_context_free_data: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub packed_trx: Vec<u8>,
}

impl PackedTransaction {
    /// Transaction id: `sha256(packed_trx)`. Signatures do not affect it.
    pub fn id(&self) -> Checksum256 {
        Checksum256::hash(&self.packed_trx)
    }

    pub fn unpack(&self) -> TypesResult<Transaction> {
        Transaction::unpack_exact(&self.packed_trx)
    }
}
