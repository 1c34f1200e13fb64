// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{OracleError, OracleResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Broker offset checkpoint kept as a single decimal integer in a file.
///
/// A missing file reads as offset 0. Writes replace the whole file through a
/// temporary file and a rename, so a crash never leaves a partial value.
#[derive(Debug, Clone)]
pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> OracleResult<u64> {
        debug!("Reading offset from {:?}", self.path);
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No offset file at {:?}, starting from 0", self.path);
                return Ok(0);
            }
            Err(e) => {
                return Err(OracleError::StorageError(format!(
                    "failed to read offset from {:?}: {}",
                    self.path, e
                )))
            }
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|e| {
            OracleError::StorageError(format!(
                "failed to parse offset from {:?}: {}",
                self.path, e
            ))
        })
    }

    pub async fn write(&self, offset: u64) -> OracleResult<()> {
        debug!("Writing offset, value: {}", offset);
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, offset.to_string())
            .await
            .map_err(|e| {
                OracleError::StorageError(format!("failed to write offset to {:?}: {}", tmp, e))
            })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            OracleError::StorageError(format!(
                "failed to move offset into {:?}: {}",
                self.path, e
            ))
        })
    }
}
