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

/// Load credential from a service principal client secret.
///
/// Uses `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`; yields
/// nothing unless all three are set.
///
/// Reference: <https://learn.microsoft.com/en-us/entra/identity-platform/v2-oauth2-client-creds-grant-flow>
#[derive(Debug, Default, Clone)]
pub struct ClientSecretCredentialProvider;

impl ClientSecretCredentialProvider {
    /// Create a new client secret provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for ClientSecretCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let (Some(tenant_id), Some(client_id), Some(client_secret)) = (
            ctx.env_var_non_empty(AZURE_TENANT_ID),
            ctx.env_var_non_empty(AZURE_CLIENT_ID),
            ctx.env_var_non_empty(AZURE_CLIENT_SECRET),
        ) else {
            return Ok(None);
        };
        let authority_host = ctx
            .env_var_non_empty(AZURE_AUTHORITY_HOST)
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("scope", STORAGE_SCOPE)
            .append_pair("client_id", &client_id)
            .append_pair("client_secret", &client_secret)
            .append_pair("grant_type", "client_credentials")
            .finish();

        let req = http::Request::post(&url)
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(body))
            .map_err(|e| Error::credential("failed to build client secret request").with_source(e))?;

        let token: OAuthTokenResponse = fetch_token(ctx, "client secret", req).await?;
        token.into_credential().map(Some)
    }
}
