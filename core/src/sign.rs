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

//! Delegation keys and time-bounded signatures.
//!
//! Signing happens in two steps with two independent windows:
//!
//! 1. A delegation key is requested from the provider for a long window
//!    (days). This is an expensive round trip done once per snapshot.
//! 2. Each signed URL is computed locally from that key for a short window
//!    (minutes to hours). The URL window must lie inside the key window.

use crate::time::{format_rfc3339, now, truncate_to_seconds, DateTime};
use crate::{Context, Error, Result};
use std::fmt::{self, Debug};
use std::time::Duration;

/// Seconds subtracted from "now" when a window starts, to tolerate clock
/// drift between this host and the provider.
pub const SKEW_BUFFER_SECS: i64 = 10;

/// Longest delegation key window accepted by the provider.
pub const MAX_DELEGATION_KEY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn skew_buffer() -> chrono::TimeDelta {
    chrono::TimeDelta::seconds(SKEW_BUFFER_SECS)
}

/// A `[start, expiry]` validity window with second precision.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SigningWindow {
    start: DateTime,
    expiry: DateTime,
}

impl SigningWindow {
    /// Create a window, failing with a signing error unless `start < expiry`.
    pub fn new(start: DateTime, expiry: DateTime) -> Result<Self> {
        let start = truncate_to_seconds(start);
        let expiry = truncate_to_seconds(expiry);
        if start >= expiry {
            return Err(Error::signing(format!(
                "signing window start {} is not before expiry {}",
                format_rfc3339(start),
                format_rfc3339(expiry)
            )));
        }

        Ok(Self { start, expiry })
    }

    /// Create a window valid from now (minus the skew buffer) for `ttl`.
    pub fn from_now(ttl: Duration) -> Result<Self> {
        Self::starting_at(now(), ttl)
    }

    /// Create a window valid from `now` (minus the skew buffer) for `ttl`.
    pub fn starting_at(now: DateTime, ttl: Duration) -> Result<Self> {
        let ttl = chrono::TimeDelta::from_std(ttl)
            .map_err(|e| Error::invalid_argument("signing ttl is out of range").with_source(e))?;

        let start = now
            .checked_sub_signed(skew_buffer())
            .ok_or_else(|| Error::invalid_argument("signing window start is out of range"))?;
        let expiry = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::invalid_argument("signing window expiry is out of range"))?;

        Self::new(start, expiry)
    }

    /// Start of the window.
    pub fn start(&self) -> DateTime {
        self.start
    }

    /// End of the window.
    pub fn expiry(&self) -> DateTime {
        self.expiry
    }

    /// Length of the window.
    pub fn duration(&self) -> chrono::TimeDelta {
        self.expiry - self.start
    }

    /// Check that this window can be signed by `key`.
    ///
    /// The window must end no later than the key and must not start earlier
    /// than the key's start minus the skew buffer.
    pub fn ensure_within<K: DelegationKey>(&self, key: &K) -> Result<()> {
        if self.expiry > key.valid_until() {
            return Err(Error::signing(format!(
                "signature expiry {} is after delegation key expiry {}",
                format_rfc3339(self.expiry),
                format_rfc3339(key.valid_until())
            )));
        }
        if self.start < key.valid_from() - skew_buffer() {
            return Err(Error::signing(format!(
                "signature start {} is before delegation key start {}",
                format_rfc3339(self.start),
                format_rfc3339(key.valid_from())
            )));
        }

        Ok(())
    }
}

impl Debug for SigningWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningWindow")
            .field("start", &format_rfc3339(self.start))
            .field("expiry", &format_rfc3339(self.expiry))
            .finish()
    }
}

/// Permission granted by a signed URL.
///
/// Only read access is ever delegated; listing stays with the server identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// Read the object content.
    #[default]
    Read,
}

impl Permission {
    /// The permission letters used in a signed query string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "r",
        }
    }
}

/// Resource a signature grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureScope {
    /// Every object in the container.
    Container,
    /// A single named object.
    Object(String),
}

/// Signing material issued by the provider for a bounded window.
pub trait DelegationKey: Clone + Debug + Send + Sync + 'static {
    /// When the key becomes usable.
    fn valid_from(&self) -> DateTime;

    /// When the key stops being usable.
    fn valid_until(&self) -> DateTime;

    /// Whether the key can still produce signatures at `at`.
    fn is_valid_at(&self, at: DateTime) -> bool {
        self.valid_from() - skew_buffer() <= at && at < self.valid_until()
    }
}

/// SignUrl exchanges an identity for a delegation key and signs URLs with it.
#[async_trait::async_trait]
pub trait SignUrl: Debug + Send + Sync + 'static {
    /// Identity used to request the delegation key.
    type Credential: Send + Sync + 'static;
    /// Delegation key produced by this signer.
    type Key: DelegationKey;

    /// Request a delegation key valid for `window`.
    ///
    /// Fails with a signing error if the provider rejects the window or the
    /// identity lacks permission.
    async fn delegation_key(
        &self,
        ctx: &Context,
        cred: &Self::Credential,
        window: &SigningWindow,
    ) -> Result<Self::Key>;

    /// Compute the signed query string without checking the window.
    ///
    /// Callers go through [`SignUrl::sign`].
    fn signed_query(
        &self,
        key: &Self::Key,
        scope: &SignatureScope,
        window: &SigningWindow,
        permission: Permission,
    ) -> Result<String>;

    /// Produce the signed query string for `scope`, valid during `window`.
    ///
    /// Fails with a signing error if `window` is not inside the key window.
    fn sign(
        &self,
        key: &Self::Key,
        scope: &SignatureScope,
        window: &SigningWindow,
        permission: Permission,
    ) -> Result<String> {
        window.ensure_within(key)?;
        self.signed_query(key, scope, window, permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::TimeZone;

    #[derive(Debug, Clone)]
    struct Key(SigningWindow);

    impl DelegationKey for Key {
        fn valid_from(&self) -> DateTime {
            self.0.start()
        }

        fn valid_until(&self) -> DateTime {
            self.0.expiry()
        }
    }

    fn t0() -> DateTime {
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_applies_skew_buffer() {
        let w = SigningWindow::starting_at(t0(), Duration::from_secs(15 * 60)).unwrap();
        assert_eq!(format_rfc3339(w.start()), "2024-05-01T11:59:50Z");
        assert_eq!(format_rfc3339(w.expiry()), "2024-05-01T12:15:00Z");
    }

    #[test]
    fn test_window_requires_start_before_expiry() {
        let err = SigningWindow::new(t0(), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);

        let err = SigningWindow::new(t0() + chrono::TimeDelta::hours(1), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }

    #[test]
    fn test_window_out_of_range_is_rejected() {
        let err = SigningWindow::from_now(Duration::from_secs(1_000_000_000_000_000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = SigningWindow::from_now(Duration::from_secs(u64::MAX)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = SigningWindow::starting_at(DateTime::MIN_UTC, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_window_within_key() {
        let key = Key(SigningWindow::starting_at(t0(), Duration::from_secs(48 * 3600)).unwrap());

        for offset in [0, 60, 3600, 47 * 3600] {
            let at = t0() + chrono::TimeDelta::seconds(offset);
            let w = SigningWindow::starting_at(at, Duration::from_secs(15 * 60)).unwrap();
            w.ensure_within(&key).unwrap();
            assert!(w.expiry() <= key.valid_until());
            assert!(w.start() >= key.valid_from() - skew_buffer());
        }
    }

    #[test]
    fn test_window_past_key_expiry_is_rejected() {
        let key = Key(SigningWindow::starting_at(t0(), Duration::from_secs(3600)).unwrap());
        let w = SigningWindow::starting_at(t0(), Duration::from_secs(2 * 3600)).unwrap();

        let err = w.ensure_within(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }

    #[test]
    fn test_window_before_key_start_is_rejected() {
        let key = Key(SigningWindow::starting_at(t0(), Duration::from_secs(3600)).unwrap());
        let early = t0() - chrono::TimeDelta::minutes(5);
        let w = SigningWindow::starting_at(early, Duration::from_secs(60)).unwrap();

        assert!(w.ensure_within(&key).is_err());
    }

    #[test]
    fn test_key_validity() {
        let key = Key(SigningWindow::starting_at(t0(), Duration::from_secs(3600)).unwrap());
        assert!(key.is_valid_at(t0()));
        assert!(!key.is_valid_at(t0() + chrono::TimeDelta::hours(2)));
    }

    #[test]
    fn test_permission_is_read_only() {
        assert_eq!(Permission::default(), Permission::Read);
        assert_eq!(Permission::Read.as_str(), "r");
    }
}
