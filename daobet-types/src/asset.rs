// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::encoding::{Decoder, Encoder, Pack, Unpack};
use crate::error::{TypesError, TypesResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const BET_SYMBOL_CODE: &str = "BET";
pub const BET_PRECISION: u8 = 4;

const MAX_SYMBOL_CODE_LEN: usize = 7;
const MAX_PRECISION: u8 = 18;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    precision: u8,
    code: String,
}

impl Symbol {
    pub fn new(precision: u8, code: &str) -> TypesResult<Self> {
        if precision > MAX_PRECISION {
            return Err(TypesError::InvalidAsset(format!(
                "precision {} exceeds {}",
                precision, MAX_PRECISION
            )));
        }
        if code.is_empty()
            || code.len() > MAX_SYMBOL_CODE_LEN
            || !code.bytes().all(|c| c.is_ascii_uppercase())
        {
            return Err(TypesError::InvalidAsset(format!("bad symbol code {:?}", code)));
        }
        Ok(Self {
            precision,
            code: code.to_string(),
        })
    }

    pub fn bet() -> Self {
        Self {
            precision: BET_PRECISION,
            code: BET_SYMBOL_CODE.to_string(),
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn to_u64(&self) -> u64 {
        self.code
            .bytes()
            .enumerate()
            .fold(u64::from(self.precision), |acc, (i, c)| {
                acc | (u64::from(c) << (8 * (i + 1)))
            })
    }

    pub fn from_u64(value: u64) -> TypesResult<Self> {
        let precision = (value & 0xff) as u8;
        let code: String = (1..8)
            .map(|i| ((value >> (8 * i)) & 0xff) as u8)
            .take_while(|c| *c != 0)
            .map(char::from)
            .collect();
        Self::new(precision, &code)
    }
}

/// Token quantity with a fixed-precision symbol, e.g. `10.0000 BET`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Asset {
    pub amount: i64,
    pub symbol: Symbol,
}

impl Asset {
    pub fn new(amount: i64, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }

    /// Parses a plain decimal amount (`"12"`, `"0.5"`) as a BET quantity.
    pub fn bet(amount: &str) -> TypesResult<Self> {
        let symbol = Symbol::bet();
        let amount = parse_fixed(amount.trim(), symbol.precision, true)?;
        Ok(Self { amount, symbol })
    }
}

fn parse_fixed(s: &str, precision: u8, pad: bool) -> TypesResult<i64> {
    let bad = || TypesError::InvalidAsset(s.to_string());
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    if !frac_part.bytes().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let precision = precision as usize;
    if frac_part.len() > precision || (!pad && frac_part.len() != precision) {
        return Err(bad());
    }
    let mut raw = String::with_capacity(int_part.len() + precision);
    raw.push_str(int_part);
    raw.push_str(frac_part);
    raw.extend(std::iter::repeat('0').take(precision - frac_part.len()));
    let value: i64 = raw.parse().map_err(|_| bad())?;
    Ok(if negative { -value } else { value })
}

impl FromStr for Asset {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, code) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| TypesError::InvalidAsset(s.to_string()))?;
        let precision = amount.split_once('.').map_or(0, |(_, frac)| frac.len());
        let precision = u8::try_from(precision).map_err(|_| TypesError::InvalidAsset(s.to_string()))?;
        let symbol = Symbol::new(precision, code.trim())?;
        let amount = parse_fixed(amount, precision, false)?;
        Ok(Self { amount, symbol })
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        let precision = u32::from(self.symbol.precision);
        if precision == 0 {
            return write!(f, "{}{} {}", sign, abs, self.symbol.code);
        }
        let scale = 10u64.pow(precision);
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            abs / scale,
            abs % scale,
            self.symbol.code,
            width = precision as usize
        )
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Pack for Asset {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_i64(self.amount);
        enc.write_u64(self.symbol.to_u64());
    }
}

impl Unpack for Asset {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        let amount = dec.read_i64()?;
        let symbol = Symbol::from_u64(dec.read_u64()?)?;
        Ok(Self { amount, symbol })
    }
}
