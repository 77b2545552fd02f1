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

//! Core components for building signed container listings.
//!
//! This crate holds the provider independent parts of blob-browser: how an
//! identity is obtained, how a listing is drained page by page, how a
//! delegation key turns into short lived signed URLs, and how all of that
//! folds into a [`Snapshot`].
//!
//! ## Overview
//!
//! - **Context**: I/O capabilities (files, HTTP, environment, commands) shared by every component
//! - **ProvideCredential**: obtains an identity, chained with [`ProvideCredentialChain`]
//! - **ListObjects** / **Pager**: one page per round trip, drained into a [`Listing`]
//! - **SignUrl**: requests a delegation key and signs query strings with it
//! - **SnapshotBuilder**: runs identity, key, listing and signing in order
//!
//! ## Example
//!
//! ```no_run
//! use blob_browser_core::{
//!     Context, DelegationKey, ListObjects, ObjectDescriptor, ObjectPage, Permission,
//!     ProvideCredential, Result, SignUrl, SignatureScope, SigningCredential, SigningWindow,
//!     SnapshotBuilder, SnapshotOptions,
//! };
//! use blob_browser_core::time::DateTime;
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)]
//! struct Token(String);
//!
//! impl SigningCredential for Token {
//!     fn is_valid(&self) -> bool {
//!         !self.0.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct StaticToken;
//!
//! #[async_trait]
//! impl ProvideCredential for StaticToken {
//!     type Credential = Token;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<Token>> {
//!         Ok(Some(Token("token".to_string())))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct OnePage;
//!
//! #[async_trait]
//! impl ListObjects for OnePage {
//!     type Credential = Token;
//!
//!     async fn list_page(&self, _: &Context, _: &Token, _: Option<&str>) -> Result<ObjectPage> {
//!         Ok(ObjectPage {
//!             objects: vec![ObjectDescriptor::new("a.txt", 512)],
//!             next_marker: None,
//!         })
//!     }
//! }
//!
//! #[derive(Clone, Debug)]
//! struct Key(SigningWindow);
//!
//! impl DelegationKey for Key {
//!     fn valid_from(&self) -> DateTime {
//!         self.0.start()
//!     }
//!     fn valid_until(&self) -> DateTime {
//!         self.0.expiry()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Signer;
//!
//! #[async_trait]
//! impl SignUrl for Signer {
//!     type Credential = Token;
//!     type Key = Key;
//!
//!     async fn delegation_key(&self, _: &Context, _: &Token, w: &SigningWindow) -> Result<Key> {
//!         Ok(Key(*w))
//!     }
//!
//!     fn signed_query(
//!         &self,
//!         _: &Key,
//!         _: &SignatureScope,
//!         _: &SigningWindow,
//!         _: Permission,
//!     ) -> Result<String> {
//!         Ok("sig=demo".to_string())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let builder = SnapshotBuilder::new(
//!     Context::new(),
//!     StaticToken,
//!     OnePage,
//!     Signer,
//!     SnapshotOptions::new("https://account.blob.core.windows.net/container"),
//! );
//! let snapshot = builder.build().await?;
//! assert_eq!(snapshot.get("a.txt").map(|e| e.size.as_str()), Some("512 B"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Utilities
//!
//! - [`hash`]: base64 and HMAC helpers
//! - [`time`]: time formatting and parsing
//! - [`utils`]: redaction of secrets in debug output

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{
    CommandExecute, CommandOutput, Context, Env, FileRead, HttpSend, NoopCommandExecute,
    NoopEnv, NoopFileRead, NoopHttpSend, OsEnv, StaticEnv,
};
mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SigningCredential};
mod chain;
pub use chain::ProvideCredentialChain;

mod size;
pub use size::format_size;
mod listing;
pub use listing::{ListObjects, Listing, ObjectDescriptor, ObjectPage, Pager};
mod sign;
pub use sign::{
    DelegationKey, Permission, SignUrl, SignatureScope, SigningWindow, MAX_DELEGATION_KEY_TTL,
    SKEW_BUFFER_SECS,
};
mod snapshot;
pub use snapshot::{
    assemble, object_url, SignatureMode, Snapshot, SnapshotBuilder, SnapshotEntry,
    SnapshotOptions, DEFAULT_KEY_TTL, DEFAULT_URL_TTL,
};
