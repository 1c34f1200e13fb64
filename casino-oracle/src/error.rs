// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use daobet_types::Checksum256;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    // Request body could not be decoded
    InvalidRequest(String),
    // Deposit transaction rejected by the deposit policy
    InvalidTransaction(String),
    // No private key configured for the requested signing role
    MissingKey(&'static str),
    // Local signing of a transaction or digest failed
    SigningFailed(String),
    // Transaction was signed but could not be pushed to the chain
    BroadcastFailed { tx_id: Checksum256, reason: String },
    // Chain reference data (chain id, TAPOS block) could not be fetched
    ChainStateUnavailable(String),
    // Chain RPC returned an error
    ChainApiError(String),
    // Player is not eligible for bonus conversion
    RequirementsNotMet,
    // Offset checkpoint could not be read or written
    StorageError(String),
    // Uncategorized error
    Generic(String),
}

impl OracleError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            OracleError::InvalidRequest(_) => "invalid_request",
            OracleError::InvalidTransaction(_) => "invalid_transaction",
            OracleError::MissingKey(_) => "missing_key",
            OracleError::SigningFailed(_) => "signing_failed",
            OracleError::BroadcastFailed { .. } => "broadcast_failed",
            OracleError::ChainStateUnavailable(_) => "chain_state_unavailable",
            OracleError::ChainApiError(_) => "chain_api_error",
            OracleError::RequirementsNotMet => "requirements_not_met",
            OracleError::StorageError(_) => "storage_error",
            OracleError::Generic(_) => "generic",
        }
    }

    /// Errors caused by the caller's input rather than by the oracle.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OracleError::InvalidRequest(_)
                | OracleError::InvalidTransaction(_)
                | OracleError::BroadcastFailed { .. }
        )
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::InvalidRequest(msg) => f.write_str(msg),
            OracleError::InvalidTransaction(reason) => {
                write!(f, "invalid transaction supplied: {}", reason)
            }
            OracleError::MissingKey(role) => {
                write!(f, "no signing key configured for role {}", role)
            }
            OracleError::SigningFailed(reason) => {
                write!(f, "failed to sign transaction: {}", reason)
            }
            OracleError::BroadcastFailed { reason, .. } => write!(
                f,
                "failed to send transaction to the blockchain, reason: {}",
                reason
            ),
            OracleError::ChainStateUnavailable(reason) => {
                write!(f, "failed to get blockchain state: {}", reason)
            }
            OracleError::ChainApiError(reason) => write!(f, "chain api error: {}", reason),
            OracleError::RequirementsNotMet => f.write_str("player doesn't meet requirements"),
            OracleError::StorageError(reason) => write!(f, "storage error: {}", reason),
            OracleError::Generic(reason) => f.write_str(reason),
        }
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
