// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Tokio based file reading for blob-browser.
//!
//! Workload identity hands the server a federated token through a file that
//! the platform rotates in place, so it is read again on every token request.
//!
//! ```no_run
//! use blob_browser_core::{Context, OsEnv};
//! use blob_browser_file_read_tokio::TokioFileRead;
//!
//! # async fn example() -> blob_browser_core::Result<()> {
//! let ctx = Context::new().with_file_read(TokioFileRead).with_env(OsEnv);
//! let token = ctx
//!     .file_read_as_string("/var/run/secrets/azure/tokens/azure-identity-token")
//!     .await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use blob_browser_core::{Error, FileRead, Result};

/// Tokio-based implementation of the `FileRead` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileRead;

#[async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::unexpected(format!("failed to read file {path}")).with_source(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_browser_core::Context;

    #[tokio::test]
    async fn test_read_existing_file() {
        let path = std::env::temp_dir().join("blob-browser-file-read-tokio-test-token");
        tokio::fs::write(&path, b"federated-token").await.unwrap();

        let ctx = Context::new().with_file_read(TokioFileRead);
        let content = ctx
            .file_read_as_string(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(content, "federated-token");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let err = TokioFileRead
            .file_read("/nonexistent/blob-browser/token")
            .await
            .unwrap_err();
        assert!(err.message().contains("/nonexistent/blob-browser/token"));
    }
}
