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

mod default;
pub use default::{CredentialMode, DefaultCredentialProvider};

mod imds;
pub use imds::ImdsCredentialProvider;

mod workload_identity;
pub use workload_identity::WorkloadIdentityCredentialProvider;

mod client_secret;
pub use client_secret::ClientSecretCredentialProvider;

mod azure_cli;
pub use azure_cli::AzureCliCredentialProvider;

use blob_browser_core::{Context, Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Send a token request and decode the JSON response.
///
/// Every failure is reported as a credential error tagged with `source`.
async fn fetch_token<T: DeserializeOwned>(
    ctx: &Context,
    source: &str,
    req: http::Request<Bytes>,
) -> Result<T> {
    let resp = ctx
        .http_send(req)
        .await
        .map_err(|e| Error::credential(format!("{source} request failed")).with_source(e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = String::from_utf8_lossy(resp.body());
        return Err(Error::credential(format!(
            "{source} request failed with status {status}: {body}"
        )));
    }

    serde_json::from_slice(resp.body())
        .map_err(|e| Error::credential(format!("failed to parse {source} response")).with_source(e))
}

/// Token response of the Entra ID v2.0 token endpoint.
#[derive(serde::Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

impl OAuthTokenResponse {
    fn into_credential(self) -> Result<crate::Credential> {
        let expires_on = chrono::TimeDelta::try_seconds(self.expires_in)
            .and_then(|ttl| blob_browser_core::time::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                Error::credential(format!(
                    "token expires_in {} is out of range",
                    self.expires_in
                ))
            })?;
        Ok(crate::Credential::with_bearer_token(
            &self.access_token,
            Some(expires_on),
        ))
    }
}
