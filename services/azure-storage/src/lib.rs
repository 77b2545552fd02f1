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

//! Azure Blob Storage support for blob-browser.
//!
//! This crate implements the provider side of a snapshot build:
//!
//! - [`CredentialMode`] / [`DefaultCredentialProvider`]: the server identity,
//!   from the host's managed identity or a local developer chain
//! - [`BlobLister`]: the List Blobs operation, one page per call
//! - [`UserDelegationSigner`]: user delegation keys and read-only SAS tokens
//!
//! ## Example
//!
//! ```no_run
//! use blob_browser_azure_storage::{blob_endpoint, BlobLister, CredentialMode, UserDelegationSigner};
//! use blob_browser_core::{Context, OsEnv, SnapshotBuilder, SnapshotOptions};
//!
//! # async fn example() -> blob_browser_core::Result<()> {
//! let ctx = Context::new().with_env(OsEnv);
//! let endpoint = blob_endpoint("account");
//!
//! let builder = SnapshotBuilder::new(
//!     ctx,
//!     CredentialMode::Managed.provider(),
//!     BlobLister::new(&endpoint, "container"),
//!     UserDelegationSigner::new(&endpoint, "account", "container"),
//!     SnapshotOptions::new(format!("{endpoint}/container")),
//! );
//! let snapshot = builder.build().await?;
//! println!("{} objects", snapshot.len());
//! # Ok(())
//! # }
//! ```

mod constants;
pub use constants::X_MS_VERSION;

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::*;

mod list;
pub use list::{BlobLister, MAX_PAGE_SIZE};

mod delegation;
pub use delegation::{UserDelegationKey, UserDelegationSigner};

/// Public blob endpoint of a storage account.
pub fn blob_endpoint(account: &str) -> String {
    format!("https://{account}.blob.core.windows.net")
}
