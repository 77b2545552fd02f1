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

use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use blob_browser_core::hash::{base64_decode, base64_hmac_sha256};
use blob_browser_core::time::{format_http_date, format_rfc3339, now, parse_rfc3339, DateTime};
use blob_browser_core::utils::Redact;
use blob_browser_core::{
    Context, DelegationKey, Error, Permission, Result, SignUrl, SignatureScope, SigningWindow,
    MAX_DELEGATION_KEY_TTL,
};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt::{self, Debug};

/// Key issued by the Get User Delegation Key operation.
///
/// Reference: <https://learn.microsoft.com/en-us/rest/api/storageservices/get-user-delegation-key>
#[derive(Clone)]
pub struct UserDelegationKey {
    /// Object id of the identity the key was issued to.
    pub signed_oid: String,
    /// Tenant of that identity.
    pub signed_tid: String,
    /// Start of the key window.
    pub signed_start: DateTime,
    /// End of the key window.
    pub signed_expiry: DateTime,
    /// Service the key is valid for, always `b`.
    pub signed_service: String,
    /// Service version used to issue the key.
    pub signed_version: String,
    /// Base64 encoded signing key.
    pub value: String,
}

impl Debug for UserDelegationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDelegationKey")
            .field("signed_oid", &self.signed_oid)
            .field("signed_tid", &self.signed_tid)
            .field("signed_start", &format_rfc3339(self.signed_start))
            .field("signed_expiry", &format_rfc3339(self.signed_expiry))
            .field("value", &Redact::from(&self.value))
            .finish()
    }
}

impl DelegationKey for UserDelegationKey {
    fn valid_from(&self) -> DateTime {
        self.signed_start
    }

    fn valid_until(&self) -> DateTime {
        self.signed_expiry
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDelegationKeyResponse {
    signed_oid: String,
    signed_tid: String,
    signed_start: String,
    signed_expiry: String,
    signed_service: String,
    signed_version: String,
    value: String,
}

impl UserDelegationKeyResponse {
    fn into_key(self) -> Result<UserDelegationKey> {
        Ok(UserDelegationKey {
            signed_start: parse_rfc3339(&self.signed_start)?,
            signed_expiry: parse_rfc3339(&self.signed_expiry)?,
            signed_oid: self.signed_oid,
            signed_tid: self.signed_tid,
            signed_service: self.signed_service,
            signed_version: self.signed_version,
            value: self.value,
        })
    }
}

/// UserDelegationSigner produces user delegation SAS tokens for one container.
///
/// Reference: <https://learn.microsoft.com/en-us/rest/api/storageservices/create-user-delegation-sas>
#[derive(Debug, Clone)]
pub struct UserDelegationSigner {
    endpoint: String,
    account: String,
    container: String,
}

impl UserDelegationSigner {
    /// Create a signer for `container` of `account`, served at `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            account: account.into(),
            container: container.into(),
        }
    }

    fn canonicalized_resource(&self, scope: &SignatureScope) -> (String, &'static str) {
        match scope {
            SignatureScope::Container => {
                (format!("/blob/{}/{}", self.account, self.container), "c")
            }
            SignatureScope::Object(name) => (
                format!("/blob/{}/{}/{}", self.account, self.container, name),
                "b",
            ),
        }
    }
}

#[async_trait]
impl SignUrl for UserDelegationSigner {
    type Credential = Credential;
    type Key = UserDelegationKey;

    async fn delegation_key(
        &self,
        ctx: &Context,
        cred: &Credential,
        window: &SigningWindow,
    ) -> Result<UserDelegationKey> {
        let latest = now() + chrono::TimeDelta::seconds(MAX_DELEGATION_KEY_TTL.as_secs() as i64);
        if window.expiry() > latest {
            return Err(Error::signing(format!(
                "delegation key expiry {} is more than 7 days ahead",
                format_rfc3339(window.expiry())
            )));
        }

        let url = format!(
            "{}/?restype=service&comp=userdelegationkey",
            self.endpoint.trim_end_matches('/')
        );
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
            format_rfc3339(window.start()),
            format_rfc3339(window.expiry())
        );

        let req = http::Request::post(&url)
            .header(http::header::AUTHORIZATION, cred.authorization())
            .header(http::header::CONTENT_TYPE, "application/xml")
            .header(X_MS_VERSION_HEADER, X_MS_VERSION)
            .header(X_MS_DATE, format_http_date(now()))
            .body(Bytes::from(body))
            .map_err(|e| Error::signing("failed to build delegation key request").with_source(e))?;

        let resp = ctx
            .http_send(req)
            .await
            .map_err(|e| Error::signing("delegation key request failed").with_source(e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = String::from_utf8_lossy(resp.body());
            return Err(Error::signing(format!(
                "delegation key request failed with status {status}: {body}"
            )));
        }

        let body = std::str::from_utf8(resp.body())
            .map_err(|e| Error::signing("delegation key response is not valid utf-8").with_source(e))?;
        let key = quick_xml::de::from_str::<UserDelegationKeyResponse>(body)
            .map_err(|e| Error::signing("failed to parse delegation key response").with_source(e))?
            .into_key()
            .map_err(|e| Error::signing("invalid delegation key window").with_source(e))?;

        log::debug!("acquired delegation key: {key:?}");
        Ok(key)
    }

    fn signed_query(
        &self,
        key: &UserDelegationKey,
        scope: &SignatureScope,
        window: &SigningWindow,
        permission: Permission,
    ) -> Result<String> {
        let (resource, signed_resource) = self.canonicalized_resource(scope);
        let start = format_rfc3339(window.start());
        let expiry = format_rfc3339(window.expiry());
        let key_start = format_rfc3339(key.signed_start);
        let key_expiry = format_rfc3339(key.signed_expiry);

        let fields: [&str; 24] = [
            permission.as_str(),
            &start,
            &expiry,
            &resource,
            &key.signed_oid,
            &key.signed_tid,
            &key_start,
            &key_expiry,
            &key.signed_service,
            &key.signed_version,
            // Authorized object id, unauthorized object id, correlation id, ip.
            "",
            "",
            "",
            "",
            "https",
            X_MS_VERSION,
            signed_resource,
            // Snapshot time, encryption scope.
            "",
            "",
            // Response header overrides: rscc, rscd, rsce, rscl, rsct.
            "",
            "",
            "",
            "",
            "",
        ];
        let string_to_sign = fields.join("\n");

        let signing_key = base64_decode(&key.value)
            .map_err(|e| Error::signing("delegation key value is not valid base64").with_source(e))?;
        let signature = base64_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        Ok(form_urlencoded::Serializer::new(String::new())
            .append_pair("sv", X_MS_VERSION)
            .append_pair("sr", signed_resource)
            .append_pair("st", &start)
            .append_pair("se", &expiry)
            .append_pair("sp", permission.as_str())
            .append_pair("spr", "https")
            .append_pair("skoid", &key.signed_oid)
            .append_pair("sktid", &key.signed_tid)
            .append_pair("skt", &key_start)
            .append_pair("ske", &key_expiry)
            .append_pair("sks", &key.signed_service)
            .append_pair("skv", &key.signed_version)
            .append_pair("sig", &signature)
            .finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::tests::MockHttpSend;
    use blob_browser_core::ErrorKind;
    use pretty_assertions::assert_eq;

    const KEY_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<UserDelegationKey>
  <SignedOid>6d8e1c8a-0000-4000-8000-000000000001</SignedOid>
  <SignedTid>72f988bf-0000-4000-8000-000000000002</SignedTid>
  <SignedStart>2024-05-01T11:59:50Z</SignedStart>
  <SignedExpiry>2024-05-03T12:00:00Z</SignedExpiry>
  <SignedService>b</SignedService>
  <SignedVersion>2022-11-02</SignedVersion>
  <Value>ZGVsZWdhdGlvbi1rZXktYnl0ZXMtMDEyMzQ1Njc4OWFi</Value>
</UserDelegationKey>"#;

    fn signer() -> UserDelegationSigner {
        UserDelegationSigner::new(
            "https://account.blob.core.windows.net",
            "account",
            "container",
        )
    }

    fn key() -> UserDelegationKey {
        quick_xml::de::from_str::<UserDelegationKeyResponse>(KEY_RESPONSE)
            .unwrap()
            .into_key()
            .unwrap()
    }

    fn url_window() -> SigningWindow {
        SigningWindow::new(
            parse_rfc3339("2024-05-01T11:59:50Z").unwrap(),
            parse_rfc3339("2024-05-01T12:15:00Z").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_container_sas() {
        let query = signer()
            .sign(&key(), &SignatureScope::Container, &url_window(), Permission::Read)
            .unwrap();

        assert_eq!(
            query,
            "sv=2022-11-02&sr=c&st=2024-05-01T11%3A59%3A50Z&se=2024-05-01T12%3A15%3A00Z&sp=r&spr=https&skoid=6d8e1c8a-0000-4000-8000-000000000001&sktid=72f988bf-0000-4000-8000-000000000002&skt=2024-05-01T11%3A59%3A50Z&ske=2024-05-03T12%3A00%3A00Z&sks=b&skv=2022-11-02&sig=xT5yshsvsc0zX9FfeqbJajObnplZ1Sau7gjidNhnUNE%3D"
        );
    }

    #[test]
    fn test_object_sas() {
        let query = signer()
            .sign(
                &key(),
                &SignatureScope::Object("reports/Q&A 2024.pdf".to_string()),
                &url_window(),
                Permission::Read,
            )
            .unwrap();

        assert!(query.contains("&sr=b&"));
        assert!(query.ends_with("&sig=KqMGKDJlUqc3gaUmr0yqsaAMbWsdMijbIsUvpObedVk%3D"));
    }

    #[test]
    fn test_sas_outside_key_window() {
        let late = SigningWindow::new(
            parse_rfc3339("2024-05-03T11:00:00Z").unwrap(),
            parse_rfc3339("2024-05-03T13:00:00Z").unwrap(),
        )
        .unwrap();

        let err = signer()
            .sign(&key(), &SignatureScope::Container, &late, Permission::Read)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }

    #[test]
    fn test_invalid_key_value() {
        let mut key = key();
        key.value = "not base64!".to_string();

        let err = signer()
            .sign(&key, &SignatureScope::Container, &url_window(), Permission::Read)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }

    #[tokio::test]
    async fn test_delegation_key_request() {
        let http = MockHttpSend::ok(KEY_RESPONSE);
        let ctx = Context::new().with_http_send(http.clone());
        let window = SigningWindow::new(
            parse_rfc3339("2024-05-01T11:59:50Z").unwrap(),
            parse_rfc3339("2024-05-03T12:00:00Z").unwrap(),
        )
        .unwrap();

        let key = signer()
            .delegation_key(&ctx, &Credential::with_bearer_token("token", None), &window)
            .await
            .unwrap();
        assert_eq!(key.signed_oid, "6d8e1c8a-0000-4000-8000-000000000001");
        assert_eq!(key.valid_until(), window.expiry());

        let req = http.single_request();
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(
            req.uri().to_string(),
            "https://account.blob.core.windows.net/?restype=service&comp=userdelegationkey"
        );
        assert_eq!(req.headers()["authorization"], "Bearer token");
        assert_eq!(
            String::from_utf8(req.body().to_vec()).unwrap(),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><KeyInfo><Start>2024-05-01T11:59:50Z</Start><Expiry>2024-05-03T12:00:00Z</Expiry></KeyInfo>"
        );
    }

    #[tokio::test]
    async fn test_delegation_key_forbidden() {
        let http = MockHttpSend::new(403, "<Error><Code>AuthorizationPermissionMismatch</Code></Error>");
        let ctx = Context::new().with_http_send(http);
        let window = SigningWindow::from_now(std::time::Duration::from_secs(3600)).unwrap();

        let err = signer()
            .delegation_key(&ctx, &Credential::with_bearer_token("token", None), &window)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
        assert!(err.message().contains("403"));
    }

    #[tokio::test]
    async fn test_delegation_key_window_is_capped() {
        let http = MockHttpSend::ok(KEY_RESPONSE);
        let ctx = Context::new().with_http_send(http.clone());
        let window =
            SigningWindow::from_now(std::time::Duration::from_secs(8 * 24 * 3600)).unwrap();

        let err = signer()
            .delegation_key(&ctx, &Credential::with_bearer_token("token", None), &window)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn test_debug_redacts_key_value() {
        let debug = format!("{:?}", key());
        assert!(!debug.contains("ZGVsZWdhdGlvbi1rZXktYnl0ZXMtMDEyMzQ1Njc4OWFi"));
    }
}
