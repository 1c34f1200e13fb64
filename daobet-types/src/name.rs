// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! 64-bit chain names used for accounts, actions, tables and permissions.
//!
//! A name is up to 13 characters from `.12345abcdefghijklmnopqrstuvwxyz`.
//! The first 12 characters take 5 bits each, most significant first, and the
//! 13th character takes the remaining low 4 bits.

use crate::encoding::{Decoder, Encoder, Pack, Unpack};
use crate::error::{TypesError, TypesResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const MAX_NAME_LEN: usize = 13;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u64);

const fn symbol_value(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

const fn encode(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > MAX_NAME_LEN {
        return None;
    }
    let mut value = 0u64;
    let mut i = 0;
    while i < bytes.len() {
        let sym = match symbol_value(bytes[i]) {
            Some(sym) => sym,
            None => return None,
        };
        if i < 12 {
            value |= (sym & 0x1f) << (64 - 5 * (i as u32 + 1));
        } else {
            if sym > 0x0f {
                return None;
            }
            value |= sym;
        }
        i += 1;
    }
    Some(value)
}

impl Name {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Builds a name from a literal at compile time. Panics on invalid input,
    /// so only use it for constants.
    pub const fn from_static(s: &str) -> Self {
        match encode(s.as_bytes()) {
            Some(value) => Self(value),
            None => panic!("invalid chain name literal"),
        }
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Name {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        encode(s.as_bytes())
            .map(Self)
            .ok_or_else(|| TypesError::InvalidName(s.to_string()))
    }
}

impl TryFrom<&str> for Name {
    type Error = TypesError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [b'.'; MAX_NAME_LEN];
        let mut tmp = self.0;
        for i in 0..MAX_NAME_LEN {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            out[MAX_NAME_LEN - 1 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let len = out.iter().rposition(|c| *c != b'.').map_or(0, |p| p + 1);
        // CHARMAP is ASCII
        f.write_str(std::str::from_utf8(&out[..len]).unwrap_or_default())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Pack for Name {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_u64(self.0);
    }
}

impl Unpack for Name {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self(dec.read_u64()?))
    }
}
