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

use blob_browser_azure_storage::{blob_endpoint, CredentialMode, MAX_PAGE_SIZE};
use blob_browser_core::utils::Redact;
use blob_browser_core::{Context, Error, Result, SignatureMode, SnapshotOptions};
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TITLE: &str = "Blob Browser";
const DEFAULT_URL_TTL_SECS: u64 = 15 * 60;
const DEFAULT_KEY_TTL_SECS: u64 = 48 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;

/// When the snapshot served by `/list` is built.
///
/// Defaults to [`SnapshotRefresh::PerRequest`] so every page carries links
/// valid for the full URL window. [`SnapshotRefresh::Eager`] skips the
/// provider round trips per request, but its links stop working once the
/// URL window has passed, until the next restart. Raise
/// `BLOBBROWSER_URL_TTL_SECS` (up to the key window) when using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotRefresh {
    /// Once at startup, before the server accepts requests.
    Eager,
    /// On every `/list` request, bounded by the request timeout.
    #[default]
    PerRequest,
}

impl FromStr for SnapshotRefresh {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eager" => Ok(SnapshotRefresh::Eager),
            "per-request" => Ok(SnapshotRefresh::PerRequest),
            v => Err(Error::config_invalid(format!(
                "snapshot refresh must be `eager` or `per-request`, got {v:?}"
            ))),
        }
    }
}

/// Settings of the server, loaded from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Storage account name.
    pub account: String,
    /// Container to list.
    pub container: String,
    /// Blob endpoint of the account.
    pub endpoint: String,
    /// Where the server identity comes from.
    pub credential_mode: CredentialMode,
    /// bcrypt hash of the page password.
    pub secret_hash: String,
    /// Page title.
    pub title: String,
    /// When snapshots are built.
    pub refresh: SnapshotRefresh,
    /// How signatures are scoped.
    pub signature_mode: SignatureMode,
    /// Per-URL signing window.
    pub url_ttl: Duration,
    /// Delegation key window.
    pub key_ttl: Duration,
    /// Objects requested per listing page.
    pub page_size: usize,
    /// Handler timeout.
    pub request_timeout: Duration,
    /// Listen address.
    pub addr: SocketAddr,
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("account", &self.account)
            .field("container", &self.container)
            .field("endpoint", &self.endpoint)
            .field("credential_mode", &self.credential_mode)
            .field("secret_hash", &Redact::from(&self.secret_hash))
            .field("title", &self.title)
            .field("refresh", &self.refresh)
            .field("signature_mode", &self.signature_mode)
            .field("url_ttl", &self.url_ttl)
            .field("key_ttl", &self.key_ttl)
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .field("addr", &self.addr)
            .finish()
    }
}

fn required(ctx: &Context, key: &str) -> Result<String> {
    ctx.env_var_non_empty(key)
        .ok_or_else(|| Error::config_invalid(format!("{key} could not be found")))
}

fn parsed<T>(ctx: &Context, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match ctx.env_var_non_empty(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|e| Error::config_invalid(format!("{key} has invalid value {v:?}: {e}"))),
    }
}

/// Whether `v` looks like a `$2a$`, `$2b$` or `$2y$` bcrypt hash.
fn is_bcrypt_hash(v: &str) -> bool {
    let Some(rest) = ["$2a$", "$2b$", "$2y$"]
        .iter()
        .find_map(|prefix| v.strip_prefix(prefix))
    else {
        return false;
    };
    let Some((cost, salt_and_hash)) = rest.split_once('$') else {
        return false;
    };

    matches!(cost.parse::<u32>(), Ok(4..=31))
        && salt_and_hash.len() == 53
        && salt_and_hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'/')
}

impl Settings {
    /// Load settings through the environment of `ctx`.
    pub fn from_context(ctx: &Context) -> Result<Self> {
        let account = required(ctx, "AZURE_STORAGE_ACCOUNT_NAME")?;
        let container = required(ctx, "AZURE_CONTAINER_NAME")?;

        let secret_hash = required(ctx, "BLOBBROWSER_SECRET")?;
        if !is_bcrypt_hash(&secret_hash) {
            return Err(Error::config_invalid(
                "BLOBBROWSER_SECRET must be the bcrypt hash of the password",
            ));
        }

        let page_size: usize = parsed(ctx, "BLOBBROWSER_PAGE_SIZE", MAX_PAGE_SIZE)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::config_invalid(format!(
                "BLOBBROWSER_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let settings = Self {
            endpoint: ctx
                .env_var_non_empty("AZURE_STORAGE_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| blob_endpoint(&account)),
            account,
            container,
            credential_mode: CredentialMode::from_local_flag(
                ctx.env_var("USE_DEFAULT_CREDENTIAL").as_deref() == Some("true"),
            ),
            secret_hash,
            title: ctx
                .env_var_non_empty("BLOBBROWSER_TITLE")
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            refresh: parsed(ctx, "BLOBBROWSER_SNAPSHOT_REFRESH", SnapshotRefresh::default())?,
            signature_mode: parsed(ctx, "BLOBBROWSER_SIGNATURE_SCOPE", SignatureMode::default())?,
            url_ttl: Duration::from_secs(parsed(ctx, "BLOBBROWSER_URL_TTL_SECS", DEFAULT_URL_TTL_SECS)?),
            key_ttl: Duration::from_secs(parsed(ctx, "BLOBBROWSER_KEY_TTL_SECS", DEFAULT_KEY_TTL_SECS)?),
            page_size,
            request_timeout: Duration::from_millis(parsed(
                ctx,
                "BLOBBROWSER_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?),
            addr: parsed(ctx, "BLOBBROWSER_ADDR", SocketAddr::from(([0, 0, 0, 0], 80)))?,
        };
        settings.snapshot_options().validate()?;

        Ok(settings)
    }

    /// URL of the container, the base of every signed URL.
    pub fn container_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.container)
    }

    /// Options for the snapshot builder.
    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions::new(self.container_url())
            .with_mode(self.signature_mode)
            .with_key_ttl(self.key_ttl)
            .with_url_ttl(self.url_ttl)
    }
}
