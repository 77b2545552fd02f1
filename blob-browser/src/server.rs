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

//! HTTP surface: login page, listing page and the gates in front of them.

use crate::views::{render, ListPage, LoginPage, INTERNAL_ERROR_PAGE};
use async_trait::async_trait;
use axum::error_handling::HandleErrorLayer;
use axum::extract::{Query, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use blob_browser_core::time::{format_rfc3339, now};
use blob_browser_core::{DelegationKey, Result, SigningCredential, Snapshot, SnapshotBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};

/// Query parameter carrying the page password.
pub const PASSWORD_PARAM: &str = "_passwordx";

/// Body returned when a request exceeds the handler timeout.
pub const TIMEOUT_PAGE: &str = "<html><body>Request timeout!</body></html>";

/// SnapshotSource hands out the snapshot rendered by `/list`.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    /// Return the snapshot to render.
    async fn snapshot(&self) -> Result<Arc<Snapshot>>;
}

/// A snapshot built once and served for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct EagerSnapshot(Arc<Snapshot>);

impl EagerSnapshot {
    /// Wrap an already built snapshot.
    pub fn new(snapshot: Snapshot) -> Self {
        Self(Arc::new(snapshot))
    }
}

#[async_trait]
impl SnapshotSource for EagerSnapshot {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        Ok(self.0.clone())
    }
}

/// Every call builds a fresh snapshot.
#[async_trait]
impl<C: SigningCredential, K: DelegationKey> SnapshotSource for SnapshotBuilder<C, K> {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.build().await.map(Arc::new)
    }
}

/// Shared state of the router.
#[derive(Clone)]
pub struct AppState {
    title: Arc<str>,
    secret_hash: Arc<str>,
    snapshots: Arc<dyn SnapshotSource>,
}

impl AppState {
    /// Create the state from the page title, the bcrypt hash of the
    /// password and the snapshot source.
    pub fn new(
        title: impl Into<String>,
        secret_hash: impl Into<String>,
        snapshots: impl SnapshotSource,
    ) -> Self {
        Self {
            title: Arc::from(title.into()),
            secret_hash: Arc::from(secret_hash.into()),
            snapshots: Arc::new(snapshots),
        }
    }

    /// Whether `candidate` matches the configured bcrypt hash.
    ///
    /// This is CPU bound; async callers run it on the blocking pool.
    pub fn check_password(&self, candidate: &str) -> bool {
        match bcrypt::verify(candidate, &self.secret_hash) {
            Ok(matched) => matched,
            Err(err) => {
                log::error!("failed to verify password against the configured hash: {err}");
                false
            }
        }
    }
}

/// Build the router.
///
/// From the outside in: access log, request timeout, method gate, and on
/// `/list` the password gate.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(login_page))
        .route(
            "/list",
            get(list_page).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_password,
            )),
        )
        .layer(middleware::from_fn(allow_get))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

async fn login_page(State(state): State<AppState>) -> Response {
    render(LoginPage {
        title: &state.title,
    })
}

async fn list_page(State(state): State<AppState>) -> Response {
    let snapshot = match state.snapshots.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::error!("failed to build snapshot: {err:?}");
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(INTERNAL_ERROR_PAGE)).into_response();
        }
    };

    if snapshot.is_expired_at(now()) {
        log::warn!(
            "serving snapshot whose links expired at {}",
            format_rfc3339(snapshot.expires_at())
        );
    }
    render(ListPage::new(&state.title, &snapshot))
}

async fn allow_get(req: Request, next: Next) -> Response {
    if req.method() != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET")],
            "Method Not Allowed",
        )
            .into_response();
    }

    next.run(req).await
}

async fn require_password(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    req: Request,
    next: Next,
) -> Response {
    // The first occurrence wins when the parameter is repeated.
    let candidate = params
        .into_iter()
        .find_map(|(k, v)| (k == PASSWORD_PARAM).then_some(v));

    let authorized = match candidate {
        Some(candidate) => {
            let state = state.clone();
            tokio::task::spawn_blocking(move || state.check_password(&candidate))
                .await
                .unwrap_or(false)
        }
        None => {
            log::debug!("request to {} without {PASSWORD_PARAM}", req.uri().path());
            false
        }
    };
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    next.run(req).await
}

async fn access_log(req: Request, next: Next) -> Response {
    // The query string carries the password, only the path is logged.
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let resp = next.run(req).await;
    log::info!(
        "{method} {path} {} {:?}",
        resp.status().as_u16(),
        started.elapsed()
    );
    resp
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, Html<&'static str>) {
    if err.is::<Elapsed>() {
        (StatusCode::SERVICE_UNAVAILABLE, Html(TIMEOUT_PAGE))
    } else {
        log::error!("unhandled service error: {err}");
        (StatusCode::INTERNAL_SERVER_ERROR, Html(INTERNAL_ERROR_PAGE))
    }
}
