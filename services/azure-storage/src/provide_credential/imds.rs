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

use super::fetch_token;
use crate::constants::*;
use crate::credential::ExpiresOn;
use crate::Credential;
use async_trait::async_trait;
use blob_browser_core::{Context, Error, ProvideCredential, Result};
use bytes::Bytes;

/// Load credential from the managed identity of the hosting environment.
///
/// Virtual machines and container hosts expose the Instance Metadata Service
/// (IMDS); App Service and Container Apps expose `IDENTITY_ENDPOINT` and
/// `IDENTITY_HEADER` instead. Both return a token for the storage resource.
///
/// A user assigned identity is selected with `AZURE_CLIENT_ID`,
/// `AZURE_OBJECT_ID` or `AZURE_MSI_RES_ID`.
///
/// Reference: <https://learn.microsoft.com/en-us/entra/identity/managed-identities-azure-resources/how-to-use-vm-token>
#[derive(Debug, Default, Clone)]
pub struct ImdsCredentialProvider {
    endpoint: Option<String>,
}

impl ImdsCredentialProvider {
    /// Create a new IMDS provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the IMDS endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn build_request(&self, ctx: &Context) -> Result<http::Request<Bytes>> {
        if let (Some(endpoint), Some(header)) = (
            ctx.env_var_non_empty(IDENTITY_ENDPOINT),
            ctx.env_var_non_empty(IDENTITY_HEADER),
        ) {
            let mut url = format!(
                "{endpoint}?api-version={APP_SERVICE_API_VERSION}&resource={STORAGE_RESOURCE}"
            );
            if let Some(client_id) = ctx.env_var_non_empty(AZURE_CLIENT_ID) {
                url.push_str(&format!("&client_id={client_id}"));
            }

            return Ok(http::Request::get(url)
                .header("X-IDENTITY-HEADER", header)
                .body(Bytes::new())?);
        }

        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| ctx.env_var_non_empty(AZURE_MSI_ENDPOINT))
            .unwrap_or_else(|| IMDS_ENDPOINT.to_string());
        let mut url = format!("{endpoint}?api-version={IMDS_API_VERSION}&resource={STORAGE_RESOURCE}");
        if let Some(object_id) = ctx.env_var_non_empty(AZURE_OBJECT_ID) {
            url.push_str(&format!("&object_id={object_id}"));
        } else if let Some(client_id) = ctx.env_var_non_empty(AZURE_CLIENT_ID) {
            url.push_str(&format!("&client_id={client_id}"));
        } else if let Some(msi_res_id) = ctx.env_var_non_empty(AZURE_MSI_RES_ID) {
            url.push_str(&format!("&msi_res_id={msi_res_id}"));
        }

        let mut req = http::Request::get(url).header("Metadata", "true");
        if let Some(secret) = ctx.env_var_non_empty(AZURE_MSI_SECRET) {
            req = req.header("X-IDENTITY-HEADER", secret);
        }

        Ok(req.body(Bytes::new())?)
    }
}

#[derive(serde::Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_on: Option<ExpiresOn>,
}

#[async_trait]
impl ProvideCredential for ImdsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let req = self
            .build_request(ctx)
            .map_err(|e| Error::credential("failed to build managed identity request").with_source(e))?;
        let token: AccessTokenResponse = fetch_token(ctx, "managed identity", req).await?;

        let expires_on = match token.expires_on {
            Some(v) => v.to_datetime()?,
            None => blob_browser_core::time::now() + chrono::TimeDelta::minutes(10),
        };

        Ok(Some(Credential::with_bearer_token(
            &token.access_token,
            Some(expires_on),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::tests::MockHttpSend;
    use blob_browser_core::time::format_rfc3339;
    use blob_browser_core::{ErrorKind, StaticEnv};
    use pretty_assertions::assert_eq;

    const TOKEN: &str = r#"{"access_token":"imds-token","expires_on":"1700000000","resource":"https://storage.azure.com/","token_type":"Bearer"}"#;

    #[tokio::test]
    async fn test_imds_request() {
        let http = MockHttpSend::ok(TOKEN);
        let ctx = Context::new()
            .with_http_send(http.clone())
            .with_env(StaticEnv::from_pairs([(AZURE_CLIENT_ID, "client")]));

        let cred = ImdsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.token, "imds-token");
        assert_eq!(
            format_rfc3339(cred.expires_in.unwrap()),
            "2023-11-14T22:13:20Z"
        );

        let req = http.single_request();
        assert_eq!(
            req.uri().to_string(),
            "http://169.254.169.254/metadata/identity/oauth2/token?api-version=2018-02-01&resource=https://storage.azure.com/&client_id=client"
        );
        assert_eq!(req.headers()["Metadata"], "true");
    }

    #[tokio::test]
    async fn test_app_service_request() {
        let http = MockHttpSend::ok(TOKEN);
        let ctx = Context::new().with_http_send(http.clone()).with_env(StaticEnv::from_pairs([
            (IDENTITY_ENDPOINT, "http://localhost:42356/msi/token"),
            (IDENTITY_HEADER, "secret-header"),
        ]));

        let cred = ImdsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap();
        assert!(cred.is_some());

        let req = http.single_request();
        assert_eq!(
            req.uri().to_string(),
            "http://localhost:42356/msi/token?api-version=2019-08-01&resource=https://storage.azure.com/"
        );
        assert_eq!(req.headers()["X-IDENTITY-HEADER"], "secret-header");
    }

    #[tokio::test]
    async fn test_imds_failure_is_credential_error() {
        let http = MockHttpSend::new(400, r#"{"error":"invalid_request"}"#);
        let ctx = Context::new().with_http_send(http);

        let err = ImdsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Credential);
        assert!(err.message().contains("400"));
    }

    #[tokio::test]
    async fn test_imds_unreachable_is_credential_error() {
        // The default context cannot send http requests at all.
        let err = ImdsCredentialProvider::new()
            .provide_credential(&Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Credential);
    }
}
