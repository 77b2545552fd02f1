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

use crate::listing::{ListObjects, ObjectDescriptor, Pager};
use crate::sign::{Permission, SignUrl, SignatureScope, SigningWindow, MAX_DELEGATION_KEY_TTL};
use crate::time::{format_rfc3339, DateTime};
use crate::{format_size, Context, DelegationKey, Error, ProvideCredential, Result, SigningCredential};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Characters kept verbatim when an object name becomes a URL path.
const OBJECT_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Default delegation key window: 48 hours.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(48 * 60 * 60);
/// Default per-URL window: 15 minutes.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// Signed access information for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Absolute URL including the signature query.
    pub url: String,
    /// Human readable size.
    pub size: String,
}

/// A point-in-time mapping from object name to signed access information.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, SnapshotEntry>,
    complete: bool,
    expires_at: DateTime,
}

impl Snapshot {
    /// Create a snapshot from already assembled entries.
    pub fn new(
        entries: BTreeMap<String, SnapshotEntry>,
        complete: bool,
        expires_at: DateTime,
    ) -> Self {
        Self {
            entries,
            complete,
            expires_at,
        }
    }

    /// Entries ordered by object name.
    pub fn entries(&self) -> &BTreeMap<String, SnapshotEntry> {
        &self.entries
    }

    /// Look up one object.
    pub fn get(&self, name: &str) -> Option<&SnapshotEntry> {
        self.entries.get(name)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the listing behind this snapshot was fetched completely.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// When the signed URLs in this snapshot stop working.
    pub fn expires_at(&self) -> DateTime {
        self.expires_at
    }

    /// Whether the signed URLs have expired at `at`.
    pub fn is_expired_at(&self, at: DateTime) -> bool {
        at >= self.expires_at
    }
}

impl Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("objects", &self.entries.len())
            .field("complete", &self.complete)
            .field("expires_at", &format_rfc3339(self.expires_at))
            .finish()
    }
}

/// How signatures are scoped across the objects of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// Sign the container once and reuse the query string for every object.
    #[default]
    Container,
    /// Sign every object separately.
    Object,
}

impl FromStr for SignatureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "container" => Ok(SignatureMode::Container),
            "object" => Ok(SignatureMode::Object),
            v => Err(Error::config_invalid(format!(
                "signature scope must be `container` or `object`, got {v:?}"
            ))),
        }
    }
}

/// Options used by [`SnapshotBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// URL of the container, objects are appended as path segments.
    pub base_url: String,
    /// Signature scoping.
    pub mode: SignatureMode,
    /// Delegation key window.
    pub key_ttl: Duration,
    /// Per-URL window.
    pub url_ttl: Duration,
}

impl SnapshotOptions {
    /// Create options for the container at `base_url` with default windows.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            mode: SignatureMode::default(),
            key_ttl: DEFAULT_KEY_TTL,
            url_ttl: DEFAULT_URL_TTL,
        }
    }

    /// Set the signature mode.
    pub fn with_mode(mut self, mode: SignatureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the delegation key window.
    pub fn with_key_ttl(mut self, ttl: Duration) -> Self {
        self.key_ttl = ttl;
        self
    }

    /// Set the per-URL window.
    pub fn with_url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = ttl;
        self
    }

    /// Check that the windows can work together.
    pub fn validate(&self) -> Result<()> {
        if self.url_ttl.is_zero() || self.key_ttl.is_zero() {
            return Err(Error::config_invalid("signing windows must not be empty"));
        }
        if self.key_ttl > MAX_DELEGATION_KEY_TTL {
            return Err(Error::config_invalid(format!(
                "delegation key window of {}s exceeds the provider limit of {}s",
                self.key_ttl.as_secs(),
                MAX_DELEGATION_KEY_TTL.as_secs()
            )));
        }
        if self.url_ttl > self.key_ttl {
            return Err(Error::config_invalid(format!(
                "url window of {}s is longer than the delegation key window of {}s",
                self.url_ttl.as_secs(),
                self.key_ttl.as_secs()
            )));
        }

        Ok(())
    }
}

/// Build the absolute URL of `name` below `base_url`.
pub fn object_url(base_url: &str, name: &str, query: &str) -> String {
    format!(
        "{}/{}?{}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(name, OBJECT_NAME_ENCODE_SET),
        query
    )
}

/// Fold listed objects into signed snapshot entries.
///
/// Any signing failure aborts the whole assembly. A name listed twice keeps
/// its last occurrence.
pub fn assemble<C, K>(
    descriptors: &[ObjectDescriptor],
    signer: &dyn SignUrl<Credential = C, Key = K>,
    key: &K,
    window: &SigningWindow,
    base_url: &str,
    mode: SignatureMode,
) -> Result<BTreeMap<String, SnapshotEntry>>
where
    C: Send + Sync + 'static,
    K: DelegationKey,
{
    let container_query = match mode {
        SignatureMode::Container => Some(signer.sign(
            key,
            &SignatureScope::Container,
            window,
            Permission::Read,
        )?),
        SignatureMode::Object => None,
    };

    let mut entries = BTreeMap::new();
    for descriptor in descriptors {
        let query = match &container_query {
            Some(query) => query.clone(),
            None => signer.sign(
                key,
                &SignatureScope::Object(descriptor.name.clone()),
                window,
                Permission::Read,
            )?,
        };

        let entry = SnapshotEntry {
            url: object_url(base_url, &descriptor.name, &query),
            size: format_size(descriptor.size),
        };
        if entries.insert(descriptor.name.clone(), entry).is_some() {
            log::warn!(
                "object {:?} listed more than once, keeping the last occurrence",
                descriptor.name
            );
        }
    }

    Ok(entries)
}

/// SnapshotBuilder wires identity, listing and signing into one call.
///
/// The collaborators are injected at construction so tests can substitute
/// deterministic fakes for the provider.
pub struct SnapshotBuilder<C: SigningCredential, K: DelegationKey> {
    ctx: Context,
    credential: Arc<dyn ProvideCredential<Credential = C>>,
    lister: Arc<dyn ListObjects<Credential = C>>,
    signer: Arc<dyn SignUrl<Credential = C, Key = K>>,
    options: SnapshotOptions,
}

impl<C: SigningCredential, K: DelegationKey> Debug for SnapshotBuilder<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotBuilder")
            .field("credential", &self.credential)
            .field("lister", &self.lister)
            .field("signer", &self.signer)
            .field("options", &self.options)
            .finish()
    }
}

impl<C: SigningCredential, K: DelegationKey> SnapshotBuilder<C, K> {
    /// Create a new builder.
    pub fn new(
        ctx: Context,
        credential: impl ProvideCredential<Credential = C>,
        lister: impl ListObjects<Credential = C>,
        signer: impl SignUrl<Credential = C, Key = K>,
        options: SnapshotOptions,
    ) -> Self {
        Self {
            ctx,
            credential: Arc::new(credential),
            lister: Arc::new(lister),
            signer: Arc::new(signer),
            options,
        }
    }

    /// Options this builder was created with.
    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    /// Build a fresh snapshot.
    ///
    /// Steps run in sequence: acquire the identity, acquire the delegation
    /// key, drain the listing, sign every object. Errors from the identity
    /// and signing steps are returned as raised; a listing failure only
    /// marks the snapshot incomplete.
    pub async fn build(&self) -> Result<Snapshot> {
        self.options.validate()?;
        let started = Instant::now();

        log::debug!("acquiring identity");
        let cred = self
            .credential
            .provide_credential(&self.ctx)
            .await?
            .ok_or_else(|| Error::credential("no identity available from the credential provider"))?;
        if !cred.is_valid() {
            return Err(Error::credential("identity returned by the provider is already expired"));
        }

        let key_window = SigningWindow::from_now(self.options.key_ttl)?;
        log::debug!("acquiring delegation key for {key_window:?}");
        let key = self
            .signer
            .delegation_key(&self.ctx, &cred, &key_window)
            .await?;

        let listing = Pager::new(&self.ctx, &*self.lister, &cred).collect().await;

        let url_window = SigningWindow::from_now(self.options.url_ttl)?;
        let entries = assemble(
            &listing.objects,
            &*self.signer,
            &key,
            &url_window,
            &self.options.base_url,
            self.options.mode,
        )?;

        let snapshot = Snapshot::new(entries, listing.is_complete(), url_window.expiry());
        log::info!(
            "built snapshot of {} objects in {:?} (complete: {}, links expire at {})",
            snapshot.len(),
            started.elapsed(),
            snapshot.is_complete(),
            format_rfc3339(snapshot.expires_at())
        );
        Ok(snapshot)
    }
}
