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

use crate::provide_credential::{
    AzureCliCredentialProvider, ClientSecretCredentialProvider, ImdsCredentialProvider,
    WorkloadIdentityCredentialProvider,
};
use crate::Credential;
use async_trait::async_trait;
use blob_browser_core::{Context, ProvideCredential, ProvideCredentialChain, Result};

/// Where the server's identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Developer machines: service principal secret, workload identity,
    /// managed identity, then the Azure CLI session, first hit wins.
    Local,
    /// Deployed hosts: the managed identity of the host only.
    #[default]
    Managed,
}

impl CredentialMode {
    /// Select the mode from the "use default credential" flag.
    pub fn from_local_flag(local: bool) -> Self {
        if local {
            CredentialMode::Local
        } else {
            CredentialMode::Managed
        }
    }

    /// Build the provider for this mode.
    pub fn provider(self) -> DefaultCredentialProvider {
        DefaultCredentialProvider::new(self)
    }
}

#[derive(Debug)]
enum Inner {
    Chain(ProvideCredentialChain<Credential>),
    Managed(ImdsCredentialProvider),
}

/// DefaultCredentialProvider loads the server identity for a [`CredentialMode`].
///
/// In [`CredentialMode::Managed`] failures of the managed identity endpoint
/// are returned as is. In [`CredentialMode::Local`] every source is tried and
/// failures are logged and skipped; an exhausted chain yields `None`.
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    mode: CredentialMode,
    inner: Inner,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new(CredentialMode::default())
    }
}

impl DefaultCredentialProvider {
    /// Create a provider for `mode`.
    pub fn new(mode: CredentialMode) -> Self {
        let inner = match mode {
            CredentialMode::Local => Inner::Chain(
                ProvideCredentialChain::new()
                    .push(ClientSecretCredentialProvider::new())
                    .push(WorkloadIdentityCredentialProvider::new())
                    .push(ImdsCredentialProvider::new())
                    .push(AzureCliCredentialProvider::new()),
            ),
            CredentialMode::Managed => Inner::Managed(ImdsCredentialProvider::new()),
        };

        Self { mode, inner }
    }

    /// Mode this provider was created for.
    pub fn mode(&self) -> CredentialMode {
        self.mode
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        match &self.inner {
            Inner::Chain(chain) => chain.provide_credential(ctx).await,
            Inner::Managed(imds) => imds.provide_credential(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::provide_credential::tests::MockHttpSend;
    use blob_browser_core::{CommandExecute, CommandOutput, ErrorKind, StaticEnv};

    #[derive(Debug)]
    struct LoggedInAz;

    #[async_trait]
    impl CommandExecute for LoggedInAz {
        async fn command_execute(&self, _: &str, _: &[&str]) -> Result<CommandOutput> {
            Ok(CommandOutput {
                status: 0,
                stdout: br#"{"accessToken":"cli-token","expires_on":4102444800}"#.to_vec(),
                stderr: vec![],
            })
        }
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(CredentialMode::from_local_flag(true), CredentialMode::Local);
        assert_eq!(CredentialMode::from_local_flag(false), CredentialMode::Managed);
        assert_eq!(CredentialMode::Local.provider().mode(), CredentialMode::Local);
    }

    #[tokio::test]
    async fn test_local_prefers_client_secret() {
        let http = MockHttpSend::ok(r#"{"expires_in":3599,"access_token":"sp-token"}"#);
        let ctx = Context::new()
            .with_http_send(http)
            .with_command_execute(LoggedInAz)
            .with_env(StaticEnv::from_pairs([
                (AZURE_TENANT_ID, "tenant"),
                (AZURE_CLIENT_ID, "client"),
                (AZURE_CLIENT_SECRET, "secret"),
            ]));

        let cred = CredentialMode::Local
            .provider()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.token, "sp-token");
    }

    #[tokio::test]
    async fn test_local_survives_out_of_range_expiry() {
        let http = MockHttpSend::ok(r#"{"expires_in":9223372036854775807,"access_token":"t"}"#);
        let ctx = Context::new()
            .with_http_send(http)
            .with_command_execute(LoggedInAz)
            .with_env(StaticEnv::from_pairs([
                (AZURE_TENANT_ID, "tenant"),
                (AZURE_CLIENT_ID, "client"),
                (AZURE_CLIENT_SECRET, "secret"),
            ]));

        // The client secret member fails and the chain moves on.
        let result = CredentialMode::Local
            .provider()
            .provide_credential(&ctx)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_local_falls_back_to_cli() {
        // Managed identity is unreachable on a developer machine.
        let http = MockHttpSend::new(503, "unavailable");
        let ctx = Context::new()
            .with_http_send(http)
            .with_command_execute(LoggedInAz);

        let cred = CredentialMode::Local
            .provider()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.token, "cli-token");
    }

    #[tokio::test]
    async fn test_local_exhausted_is_none() {
        let cred = CredentialMode::Local
            .provider()
            .provide_credential(&Context::new())
            .await
            .unwrap();
        assert!(cred.is_none());
    }

    #[tokio::test]
    async fn test_managed_ignores_cli() {
        let http = MockHttpSend::new(503, "unavailable");
        let ctx = Context::new()
            .with_http_send(http)
            .with_command_execute(LoggedInAz);

        let err = CredentialMode::Managed
            .provider()
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Credential);
    }
}
