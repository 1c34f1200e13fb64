// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod bonus;
pub mod broadcaster;
pub mod broker;
pub mod chain_client;
pub mod chain_state;
pub mod config;
pub mod deposit_validator;
pub mod eosio_rpc;
pub mod error;
pub mod key_bag;
pub mod metrics;
pub mod node;
pub mod offset_store;
pub mod retry;
pub mod server;
pub mod signidice;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod chain_mock_client;
#[cfg(test)]
pub(crate) mod test_utils;
