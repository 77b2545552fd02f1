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
use blob_browser_core::time::{format_http_date, now};
use blob_browser_core::{Context, Error, ListObjects, ObjectDescriptor, ObjectPage, Result};
use bytes::Bytes;
use serde::Deserialize;

/// Largest page the List Blobs operation returns.
pub const MAX_PAGE_SIZE: usize = 5000;

/// BlobLister lists one container page by page with the List Blobs operation.
///
/// Reference: <https://learn.microsoft.com/en-us/rest/api/storageservices/list-blobs>
#[derive(Debug, Clone)]
pub struct BlobLister {
    endpoint: String,
    container: String,
    page_size: usize,
}

impl BlobLister {
    /// Create a lister for `container` on the blob `endpoint`.
    pub fn new(endpoint: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            container: container.into(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Set the number of objects requested per page, capped at 5000.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn page_url(&self, marker: Option<&str>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("restype", "container")
            .append_pair("comp", "list")
            .append_pair("maxresults", &self.page_size.to_string());
        if let Some(marker) = marker {
            query.append_pair("marker", marker);
        }

        format!(
            "{}/{}?{}",
            self.endpoint.trim_end_matches('/'),
            self.container,
            query.finish()
        )
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct EnumerationResults {
    blobs: Blobs,
    next_marker: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Blobs {
    blob: Vec<Blob>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Blob {
    name: String,
    properties: BlobProperties,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default)]
struct BlobProperties {
    #[serde(rename = "Content-Length")]
    content_length: u64,
}

fn parse_page(body: &[u8]) -> Result<ObjectPage> {
    let body = std::str::from_utf8(body)
        .map_err(|e| Error::listing("list blobs response is not valid utf-8").with_source(e))?;
    let output: EnumerationResults = quick_xml::de::from_str(body)
        .map_err(|e| Error::listing("failed to parse list blobs response").with_source(e))?;

    Ok(ObjectPage {
        objects: output
            .blobs
            .blob
            .into_iter()
            .map(|b| ObjectDescriptor::new(b.name, b.properties.content_length))
            .collect(),
        next_marker: output.next_marker.filter(|v| !v.is_empty()),
    })
}

#[async_trait]
impl ListObjects for BlobLister {
    type Credential = Credential;

    async fn list_page(
        &self,
        ctx: &Context,
        cred: &Credential,
        marker: Option<&str>,
    ) -> Result<ObjectPage> {
        let url = self.page_url(marker);
        let req = http::Request::get(&url)
            .header(http::header::AUTHORIZATION, cred.authorization())
            .header(X_MS_VERSION_HEADER, X_MS_VERSION)
            .header(X_MS_DATE, format_http_date(now()))
            .body(Bytes::new())
            .map_err(|e| Error::listing("failed to build list blobs request").with_source(e))?;

        let resp = ctx.http_send(req).await.map_err(|e| {
            Error::listing(format!("list blobs request to container {} failed", self.container))
                .with_source(e)
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = String::from_utf8_lossy(resp.body());
            return Err(Error::listing(format!(
                "list blobs failed with status {status}: {body}"
            )));
        }

        let page = parse_page(resp.body())?;
        log::debug!(
            "listed {} objects from container {} (more: {})",
            page.objects.len(),
            self.container,
            page.next_marker.is_some()
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::tests::MockHttpSend;
    use blob_browser_core::{ErrorKind, Pager};
    use pretty_assertions::assert_eq;

    const FIRST_PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="container">
  <MaxResults>2</MaxResults>
  <Blobs>
    <Blob>
      <Name>a.txt</Name>
      <Properties>
        <Creation-Time>Wed, 01 May 2024 12:00:00 GMT</Creation-Time>
        <Last-Modified>Wed, 01 May 2024 12:00:00 GMT</Last-Modified>
        <Etag>0x8DC69D1A1B2C3D4</Etag>
        <Content-Length>512</Content-Length>
        <Content-Type>text/plain</Content-Type>
        <BlobType>BlockBlob</BlobType>
      </Properties>
      <Metadata />
    </Blob>
    <Blob>
      <Name>reports/Q&amp;A 2024.pdf</Name>
      <Properties>
        <Content-Length>2097152</Content-Length>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!80!MDAwMDE4IXJlcG9ydHMvUSZBIDIwMjQucGRm</NextMarker>
</EnumerationResults>"#;

    const LAST_PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="container">
  <Marker>2!80!MDAwMDE4IXJlcG9ydHMvUSZBIDIwMjQucGRm</Marker>
  <MaxResults>2</MaxResults>
  <Blobs />
  <NextMarker />
</EnumerationResults>"#;

    fn cred() -> Credential {
        Credential::with_bearer_token("token", None)
    }

    #[test]
    fn test_parse_page() {
        let page = parse_page(FIRST_PAGE.as_bytes()).unwrap();
        assert_eq!(
            page.objects,
            vec![
                ObjectDescriptor::new("a.txt", 512),
                ObjectDescriptor::new("reports/Q&A 2024.pdf", 2_097_152),
            ]
        );
        assert_eq!(
            page.next_marker.as_deref(),
            Some("2!80!MDAwMDE4IXJlcG9ydHMvUSZBIDIwMjQucGRm")
        );
    }

    #[test]
    fn test_parse_last_page() {
        let page = parse_page(LAST_PAGE.as_bytes()).unwrap();
        assert!(page.objects.is_empty());
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn test_parse_garbage_is_listing_error() {
        let body = "<EnumerationResults><Blobs><Blob><Name>a</Name><Properties><Content-Length>many</Content-Length></Properties></Blob></Blobs></EnumerationResults>";
        let err = parse_page(body.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Listing);
    }

    #[tokio::test]
    async fn test_list_page_request() {
        let http = MockHttpSend::ok(FIRST_PAGE);
        let ctx = Context::new().with_http_send(http.clone());
        let lister = BlobLister::new("https://account.blob.core.windows.net/", "container")
            .with_page_size(2);

        let page = lister
            .list_page(&ctx, &cred(), Some("2!80!MDAw"))
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 2);

        let req = http.single_request();
        assert_eq!(
            req.uri().to_string(),
            "https://account.blob.core.windows.net/container?restype=container&comp=list&maxresults=2&marker=2%2180%21MDAw"
        );
        assert_eq!(req.headers()["authorization"], "Bearer token");
        assert_eq!(req.headers()["x-ms-version"], "2022-11-02");
        assert!(req.headers().contains_key("x-ms-date"));
    }

    #[tokio::test]
    async fn test_list_page_forbidden() {
        let http = MockHttpSend::new(403, "<Error><Code>AuthorizationPermissionMismatch</Code></Error>");
        let ctx = Context::new().with_http_send(http);

        let err = BlobLister::new("https://account.blob.core.windows.net", "container")
            .list_page(&ctx, &cred(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Listing);
        assert!(err.message().contains("403"));
    }

    #[tokio::test]
    async fn test_pager_over_blob_lister() {
        // The mock answers every page with the same body, so the pager stops
        // only when the body has no marker.
        let http = MockHttpSend::ok(LAST_PAGE);
        let ctx = Context::new().with_http_send(http.clone());
        let lister = BlobLister::new("https://account.blob.core.windows.net", "container");
        let cred = cred();

        let listing = Pager::new(&ctx, &lister, &cred).collect().await;
        assert!(listing.is_complete());
        assert!(listing.objects.is_empty());
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn test_page_size_is_capped() {
        let lister = BlobLister::new("https://h", "c").with_page_size(100_000);
        assert_eq!(
            lister.page_url(None),
            "https://h/c?restype=container&comp=list&maxresults=5000"
        );
    }
}
