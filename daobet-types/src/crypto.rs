// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! secp256k1 ("K1") keys and signatures in the chain's string formats.
//!
//! - private keys: WIF (`5...`) or `PVT_K1_...`
//! - public keys: legacy `EOS...` or `PUB_K1_...`
//! - signatures: `SIG_K1_...`, 65 bytes `[recid + 31 | r | s]`

use crate::checksum::Checksum256;
use crate::encoding::{Decoder, Encoder, Pack, Unpack};
use crate::error::{TypesError, TypesResult};
use k256::ecdsa::signature::hazmat::RandomizedPrehashSigner;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const LEGACY_PUBLIC_KEY_PREFIX: &str = "EOS";
pub const PUBLIC_KEY_K1_PREFIX: &str = "PUB_K1_";
pub const PRIVATE_KEY_K1_PREFIX: &str = "PVT_K1_";
pub const SIGNATURE_K1_PREFIX: &str = "SIG_K1_";

const K1_SUFFIX: &[u8] = b"K1";
const WIF_VERSION: u8 = 0x80;
const KEY_TYPE_K1: u8 = 0;
const COMPACT_RECOVERY_OFFSET: u8 = 27 + 4;
const MAX_CANONICAL_ATTEMPTS: usize = 256;

fn ripemd_checksum(data: &[u8], suffix: &[u8]) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(suffix);
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

fn encode_with_checksum(data: &[u8], suffix: &[u8]) -> String {
    let mut raw = data.to_vec();
    raw.extend_from_slice(&ripemd_checksum(data, suffix));
    bs58::encode(raw).into_string()
}

fn decode_with_checksum<const N: usize>(s: &str, suffix: &[u8]) -> TypesResult<[u8; N]> {
    let raw = bs58::decode(s)
        .into_vec()
        .map_err(|e| TypesError::InvalidKey(e.to_string()))?;
    if raw.len() != N + 4 {
        return Err(TypesError::InvalidLength {
            expected: N + 4,
            actual: raw.len(),
        });
    }
    let (data, checksum) = raw.split_at(N);
    if ripemd_checksum(data, suffix) != checksum {
        return Err(TypesError::ChecksumMismatch);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(data);
    Ok(out)
}

// =============================================================================
// Private key
// =============================================================================

#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn from_bytes(bytes: &[u8]) -> TypesResult<Self> {
        SigningKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| TypesError::InvalidKey(e.to_string()))
    }

    pub fn from_wif(wif: &str) -> TypesResult<Self> {
        let raw = bs58::decode(wif.trim())
            .into_vec()
            .map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        if raw.len() != 37 {
            return Err(TypesError::InvalidLength {
                expected: 37,
                actual: raw.len(),
            });
        }
        if raw[0] != WIF_VERSION {
            return Err(TypesError::InvalidKey(format!(
                "unexpected WIF version byte {:#04x}",
                raw[0]
            )));
        }
        let digest = Sha256::digest(Sha256::digest(&raw[..33]));
        if digest[..4] != raw[33..] {
            return Err(TypesError::ChecksumMismatch);
        }
        Self::from_bytes(&raw[1..33])
    }

    pub fn to_wif(&self) -> String {
        let mut raw = Vec::with_capacity(37);
        raw.push(WIF_VERSION);
        raw.extend_from_slice(&self.0.to_bytes());
        let digest = Sha256::digest(Sha256::digest(&raw));
        raw.extend_from_slice(&digest[..4]);
        bs58::encode(raw).into_string()
    }

    pub fn to_k1_string(&self) -> String {
        format!(
            "{}{}",
            PRIVATE_KEY_K1_PREFIX,
            encode_with_checksum(&self.0.to_bytes(), K1_SUFFIX)
        )
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.0.verifying_key())
    }

    /// Signs a 32-byte digest, retrying with fresh nonces until the result
    /// passes the chain's canonical signature check.
    pub fn sign_digest(&self, digest: &Checksum256) -> TypesResult<Signature> {
        let verifying_key = self.0.verifying_key();
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CANONICAL_ATTEMPTS {
            let sig: EcdsaSignature = self
                .0
                .sign_prehash_with_rng(&mut rng, digest.as_bytes())
                .map_err(|e| TypesError::Signing(e.to_string()))?;
            let sig = sig.normalize_s().unwrap_or(sig);
            let recid =
                RecoveryId::trial_recovery_from_prehash(verifying_key, digest.as_bytes(), &sig)
                    .map_err(|e| TypesError::Signing(e.to_string()))?;
            let mut bytes = [0u8; 65];
            bytes[0] = recid.to_byte() + COMPACT_RECOVERY_OFFSET;
            bytes[1..].copy_from_slice(&sig.to_bytes());
            if Signature::is_canonical(&bytes) {
                return Ok(Signature(bytes));
            }
        }
        Err(TypesError::Signing(
            "could not produce a canonical signature".to_string(),
        ))
    }
}

impl FromStr for PrivateKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix(PRIVATE_KEY_K1_PREFIX) {
            Some(rest) => Self::from_bytes(&decode_with_checksum::<32>(rest, K1_SUFFIX)?),
            None => Self::from_wif(s),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(pub={})", self.public_key())
    }
}

// =============================================================================
// Public key
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> TypesResult<Self> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        Ok(Self::from_verifying_key(&key))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_k1_string(&self) -> String {
        format!(
            "{}{}",
            PUBLIC_KEY_K1_PREFIX,
            encode_with_checksum(&self.0, K1_SUFFIX)
        )
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = if let Some(rest) = s.strip_prefix(PUBLIC_KEY_K1_PREFIX) {
            decode_with_checksum::<33>(rest, K1_SUFFIX)?
        } else if let Some(rest) = s.strip_prefix(LEGACY_PUBLIC_KEY_PREFIX) {
            decode_with_checksum::<33>(rest, b"")?
        } else {
            return Err(TypesError::InvalidKey(format!("unknown public key format {}", s)));
        };
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            LEGACY_PUBLIC_KEY_PREFIX,
            encode_with_checksum(&self.0, b"")
        )
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Pack for PublicKey {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_u8(KEY_TYPE_K1);
        enc.write_raw(&self.0);
    }
}

impl Unpack for PublicKey {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        let key_type = dec.read_u8()?;
        if key_type != KEY_TYPE_K1 {
            return Err(TypesError::InvalidKey(format!("unsupported key type {}", key_type)));
        }
        Self::from_bytes(dec.read_raw(33)?)
    }
}

// =============================================================================
// Signature
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Canonical form required by the chain: neither `r` nor `s` may have the
    /// high bit set or a redundant leading zero byte.
    pub fn is_canonical(sig: &[u8; 65]) -> bool {
        sig[1] & 0x80 == 0
            && !(sig[1] == 0 && sig[2] & 0x80 == 0)
            && sig[33] & 0x80 == 0
            && !(sig[33] == 0 && sig[34] & 0x80 == 0)
    }

    /// Recovers the public key that produced this signature over `digest`.
    pub fn recover(&self, digest: &Checksum256) -> TypesResult<PublicKey> {
        let recid_byte = self.0[0]
            .checked_sub(27)
            .map(|b| b & 3)
            .ok_or_else(|| TypesError::InvalidSignature("bad recovery byte".to_string()))?;
        let recid = RecoveryId::from_byte(recid_byte)
            .ok_or_else(|| TypesError::InvalidSignature("bad recovery id".to_string()))?;
        let sig = EcdsaSignature::from_slice(&self.0[1..])
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recid)
            .map_err(|e| TypesError::Recovery(e.to_string()))?;
        Ok(PublicKey::from_verifying_key(&key))
    }
}

impl FromStr for Signature {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix(SIGNATURE_K1_PREFIX).ok_or_else(|| {
            TypesError::InvalidSignature(format!("unknown signature format {}", s))
        })?;
        let bytes = decode_with_checksum::<65>(rest, K1_SUFFIX)
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            SIGNATURE_K1_PREFIX,
            encode_with_checksum(&self.0, K1_SUFFIX)
        )
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Pack for Signature {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_u8(KEY_TYPE_K1);
        enc.write_raw(&self.0);
    }
}
