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

//! A password protected page listing one storage container, every object
//! with a short lived signed download link.
//!
//! The page is served by [`router`]. What `/list` renders comes from a
//! [`SnapshotSource`]: a fresh build per request
//! ([`SnapshotRefresh::PerRequest`], the default) or one snapshot built at
//! startup ([`SnapshotRefresh::Eager`]). An eager snapshot is never
//! refreshed, so its links stop working once the URL window has passed;
//! restart the process to hand out new ones.

pub mod config;
pub use config::{Settings, SnapshotRefresh};

pub mod server;
pub use server::{router, AppState, EagerSnapshot, SnapshotSource, PASSWORD_PARAM, TIMEOUT_PAGE};

mod views;

use axum::Router;
use blob_browser_azure_storage::{BlobLister, Credential, UserDelegationKey, UserDelegationSigner};
use blob_browser_core::{Context, Result, SnapshotBuilder};

/// Wire the Azure capabilities described by `settings` into a snapshot builder.
pub fn snapshot_builder(
    ctx: Context,
    settings: &Settings,
) -> SnapshotBuilder<Credential, UserDelegationKey> {
    SnapshotBuilder::new(
        ctx,
        settings.credential_mode.provider(),
        BlobLister::new(&settings.endpoint, &settings.container).with_page_size(settings.page_size),
        UserDelegationSigner::new(&settings.endpoint, &settings.account, &settings.container),
        settings.snapshot_options(),
    )
}

/// Build the application router.
///
/// With eager refresh the snapshot is built here, before any request can be
/// served, and a failure aborts startup.
pub async fn app(ctx: Context, settings: &Settings) -> Result<Router> {
    let builder = snapshot_builder(ctx, settings);

    let state = match settings.refresh {
        SnapshotRefresh::Eager => {
            log::info!(
                "building snapshot of container {} with {:?} identity",
                settings.container,
                settings.credential_mode
            );
            let snapshot = builder.build().await?;
            AppState::new(
                settings.title.clone(),
                settings.secret_hash.clone(),
                EagerSnapshot::new(snapshot),
            )
        }
        SnapshotRefresh::PerRequest => AppState::new(
            settings.title.clone(),
            settings.secret_hash.clone(),
            builder,
        ),
    };

    Ok(router(state, settings.request_timeout))
}
