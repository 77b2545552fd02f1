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

use super::{fetch_token, OAuthTokenResponse};
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use blob_browser_core::{Context, Error, ProvideCredential, Result};
use bytes::Bytes;

/// Load credential from Azure Workload Identity.
///
/// Kubernetes workloads get a federated token projected into a file; it is
/// exchanged for a storage token at the tenant's token endpoint. The provider
/// yields nothing unless `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_FEDERATED_TOKEN_FILE` are all set.
///
/// Reference: <https://learn.microsoft.com/en-us/azure/aks/workload-identity-overview>
#[derive(Debug, Default, Clone)]
pub struct WorkloadIdentityCredentialProvider;

impl WorkloadIdentityCredentialProvider {
    /// Create a new workload identity provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for WorkloadIdentityCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let (Some(tenant_id), Some(client_id), Some(token_file)) = (
            ctx.env_var_non_empty(AZURE_TENANT_ID),
            ctx.env_var_non_empty(AZURE_CLIENT_ID),
            ctx.env_var_non_empty(AZURE_FEDERATED_TOKEN_FILE),
        ) else {
            return Ok(None);
        };
        let authority_host = ctx
            .env_var_non_empty(AZURE_AUTHORITY_HOST)
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        let federated_token = ctx.file_read_as_string(&token_file).await.map_err(|e| {
            Error::credential(format!("failed to read federated token file {token_file}"))
                .with_source(e)
        })?;
        let federated_token = federated_token.trim();
        if federated_token.is_empty() {
            return Err(Error::credential(format!(
                "federated token file {token_file} is empty"
            )));
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("scope", STORAGE_SCOPE)
            .append_pair("client_id", &client_id)
            .append_pair(
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            )
            .append_pair("client_assertion", federated_token)
            .append_pair("grant_type", "client_credentials")
            .finish();

        let req = http::Request::post(&url)
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(body))
            .map_err(|e| {
                Error::credential("failed to build workload identity request").with_source(e)
            })?;

        let token: OAuthTokenResponse = fetch_token(ctx, "workload identity", req).await?;
        token.into_credential().map(Some)
    }
}
