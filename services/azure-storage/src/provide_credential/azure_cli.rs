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

use crate::constants::STORAGE_RESOURCE;
use crate::Credential;
use async_trait::async_trait;
use blob_browser_core::time::DateTime;
use blob_browser_core::{Context, Error, ProvideCredential, Result};
use serde::Deserialize;

/// Load credential from the Azure CLI session of the current user.
///
/// Runs `az account get-access-token`. A missing `az` binary or a user who
/// is not logged in yields nothing, so the chain can move on.
#[derive(Debug, Default, Clone)]
pub struct AzureCliCredentialProvider;

impl AzureCliCredentialProvider {
    /// Create a new Azure CLI provider.
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCliToken {
    access_token: String,
    /// Local time, e.g. `2023-10-31 21:59:10.000000`.
    expires_on: Option<String>,
    /// Unix seconds, only sent by newer CLI versions.
    #[serde(rename = "expires_on")]
    expires_on_timestamp: Option<i64>,
}

impl AzureCliToken {
    fn expires_at(&self) -> Option<DateTime> {
        if let Some(timestamp) = self.expires_on_timestamp {
            return DateTime::from_timestamp(timestamp, 0);
        }

        let local = chrono::NaiveDateTime::parse_from_str(
            self.expires_on.as_deref()?,
            "%Y-%m-%d %H:%M:%S%.f",
        )
        .ok()?;
        local
            .and_local_timezone(chrono::Local)
            .earliest()
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

#[async_trait]
impl ProvideCredential for AzureCliCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let output = match ctx
            .command_execute(
                "az",
                &[
                    "account",
                    "get-access-token",
                    "--resource",
                    STORAGE_RESOURCE,
                    "--output",
                    "json",
                ],
            )
            .await
        {
            Ok(output) => output,
            Err(err) => {
                log::debug!("azure cli is not available: {err}");
                return Ok(None);
            }
        };

        if !output.success() {
            log::debug!(
                "azure cli exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let token: AzureCliToken = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::credential("failed to parse azure cli output").with_source(e))?;
        Ok(Some(Credential::with_bearer_token(
            &token.access_token,
            token.expires_at(),
        )))
    }
}
