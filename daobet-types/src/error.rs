// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid string: {0}")]
    InvalidString(String),

    #[error("invalid asset: {0}")]
    InvalidAsset(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("varuint32 overflow")]
    VarIntOverflow,

    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("key recovery failed: {0}")]
    Recovery(String),
}

pub type TypesResult<T> = Result<T, TypesError>;
