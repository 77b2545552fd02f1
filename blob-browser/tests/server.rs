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

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use blob_browser::{router, AppState, EagerSnapshot, SnapshotSource, TIMEOUT_PAGE};
use blob_browser_core::time::now;
use blob_browser_core::{Error, Result, Snapshot, SnapshotEntry};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tower::ServiceExt;

// bcrypt("qwerty")
const HASH: &str = "$2y$10$RgvwyipsCjwA5LmTCOcCQO0m.2iucAiLfuc/GodWNP3nTPYCEmoNe";
const TIMEOUT: Duration = Duration::from_secs(10);

fn snapshot(complete: bool) -> Snapshot {
    let mut entries = BTreeMap::new();
    entries.insert(
        "a.txt".to_string(),
        SnapshotEntry {
            url: "https://account.blob.core.windows.net/container/a.txt?sig=test".to_string(),
            size: "512 B".to_string(),
        },
    );
    entries.insert(
        "b.bin".to_string(),
        SnapshotEntry {
            url: "https://account.blob.core.windows.net/container/b.bin?sig=test&sp=r".to_string(),
            size: "2.0 MiB".to_string(),
        },
    );
    Snapshot::new(entries, complete, now() + chrono::TimeDelta::minutes(15))
}

/// Counts how often the wrapped handler asks for a snapshot.
#[derive(Clone, Default)]
struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SnapshotSource for Counting {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(snapshot(true)))
    }
}

struct Failing;

#[async_trait]
impl SnapshotSource for Failing {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        Err(Error::credential("no identity available"))
    }
}

struct Slow;

#[async_trait]
impl SnapshotSource for Slow {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Arc::new(snapshot(true)))
    }
}

fn app(source: impl SnapshotSource) -> Router {
    router(AppState::new("My Blobs", HASH, source), TIMEOUT)
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_login_page() {
    let (status, body) = send(app(Counting::default()), Method::GET, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<title>My Blobs</title>"));
    assert!(body.contains(r#"name="_passwordx""#));
}

#[tokio::test]
async fn test_list_with_correct_password() {
    let source = Counting::default();
    let (status, body) = send(app(source.clone()), Method::GET, "/list?_passwordx=qwerty").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(body.contains("a.txt?sig=test"));
    assert!(body.contains(">a.txt</a>"));
    assert!(body.contains("512 B"));
    assert!(body.contains("2.0 MiB"));
    // Query separators are escaped inside the href attribute.
    assert!(body.contains("b.bin?sig=test&amp;sp=r"));
    assert!(!body.contains("incomplete"));
}

#[test_case("/list"; "missing password")]
#[test_case("/list?_passwordx=wrong"; "wrong password")]
#[test_case("/list?_passwordx="; "empty password")]
#[test_case("/list?password=qwerty"; "wrong parameter name")]
#[test_case("/list?_passwordx=%242y%2410%24RgvwyipsCjwA5LmTCOcCQO0m.2iucAiLfuc%2FGodWNP3nTPYCEmoNe"; "hash instead of password")]
#[test_case("/list?_passwordx=wrong-pass&_passwordx=qwerty"; "repeated parameter, first is wrong")]
#[tokio::test]
async fn test_list_rejects_bad_password(uri: &str) {
    let source = Counting::default();
    let (status, _) = send(app(source.clone()), Method::GET, uri).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[test_case("/list?_passwordx=qwerty", StatusCode::OK; "correct")]
#[test_case("/list?_passwordx=wrong-pass", StatusCode::UNAUTHORIZED; "wrong")]
#[test_case("/list", StatusCode::UNAUTHORIZED; "missing")]
#[test_case("/list?_passwordx=qwerty&_passwordx=wrong-pass", StatusCode::OK; "repeated, first is correct")]
#[test_case("/list?page=2&_passwordx=qwerty", StatusCode::OK; "among other parameters")]
#[tokio::test]
async fn test_password_gate_status(uri: &str, expected: StatusCode) {
    let source = Counting::default();
    let (status, _) = send(app(source.clone()), Method::GET, uri).await;

    assert_eq!(status, expected);
    let calls = if expected == StatusCode::OK { 1 } else { 0 };
    assert_eq!(source.calls.load(Ordering::SeqCst), calls);
}

#[test_case(Method::POST, "/list?_passwordx=qwerty")]
#[test_case(Method::PUT, "/list?_passwordx=qwerty")]
#[test_case(Method::PATCH, "/list?_passwordx=qwerty")]
#[test_case(Method::DELETE, "/list")]
#[test_case(Method::POST, "/")]
#[tokio::test]
async fn test_non_get_is_method_not_allowed(method: Method, uri: &str) {
    let source = Counting::default();
    let (status, _) = send(app(source.clone()), method, uri).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_incomplete_listing_warns() {
    let (status, body) = send(
        app(EagerSnapshot::new(snapshot(false))),
        Method::GET,
        "/list?_passwordx=qwerty",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("This listing is incomplete"));
    assert!(body.contains("a.txt"));
}

#[tokio::test]
async fn test_object_names_are_escaped() {
    let mut entries = BTreeMap::new();
    entries.insert(
        "<script>alert(1)</script>".to_string(),
        SnapshotEntry {
            url: "https://h/c/%3Cscript%3E?sig=x".to_string(),
            size: "1 B".to_string(),
        },
    );
    let source = EagerSnapshot::new(Snapshot::new(entries, true, now()));

    let (status, body) = send(app(source), Method::GET, "/list?_passwordx=qwerty").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("<script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_failed_build_is_server_error() {
    let (status, body) = send(app(Failing), Method::GET, "/list?_passwordx=qwerty").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("no identity available"));
}

#[tokio::test]
async fn test_slow_build_times_out() {
    let app = router(
        AppState::new("My Blobs", HASH, Slow),
        Duration::from_millis(50),
    );
    let (status, body) = send(app, Method::GET, "/list?_passwordx=qwerty").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, TIMEOUT_PAGE);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (status, _) = send(app(Counting::default()), Method::GET, "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
