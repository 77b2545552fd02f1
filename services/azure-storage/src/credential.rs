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

use blob_browser_core::time::{now, parse_rfc3339, DateTime};
use blob_browser_core::utils::Redact;
use blob_browser_core::{Error, Result, SigningCredential};
use std::fmt::{Debug, Formatter};

/// OAuth bearer token for the storage resource.
#[derive(Clone)]
pub struct Credential {
    /// Bearer token.
    pub token: String,
    /// Expiration time for this credential.
    pub expires_in: Option<DateTime>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &Redact::from(&self.token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl SigningCredential for Credential {
    fn is_valid(&self) -> bool {
        if self.token.is_empty() {
            return false;
        }
        // Take 20s as buffer so a token does not expire mid-build.
        match self.expires_in {
            Some(expires) => expires > now() + chrono::TimeDelta::seconds(20),
            None => true,
        }
    }
}

impl Credential {
    /// Create a new credential with bearer token authentication.
    pub fn with_bearer_token(token: &str, expires_in: Option<DateTime>) -> Self {
        Self {
            token: token.to_string(),
            expires_in,
        }
    }

    /// Value of the `Authorization` header for this token.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Expiry as returned by the managed identity endpoints.
///
/// IMDS and App Service send unix seconds as a string, other hosts send a
/// number or an RFC 3339 timestamp.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum ExpiresOn {
    Seconds(i64),
    Text(String),
}

impl ExpiresOn {
    pub(crate) fn to_datetime(&self) -> Result<DateTime> {
        let secs = match self {
            ExpiresOn::Seconds(secs) => *secs,
            ExpiresOn::Text(text) => match text.trim().parse::<i64>() {
                Ok(secs) => secs,
                Err(_) => return parse_rfc3339(text),
            },
        };

        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::credential(format!("token expiry {secs} is out of range")))
    }
}
