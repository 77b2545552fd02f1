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

//! Page view models.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use blob_browser_core::time::format_rfc3339;
use blob_browser_core::Snapshot;

pub(crate) const INTERNAL_ERROR_PAGE: &str = "<html><body>Internal Server Error</body></html>";

#[derive(Template)]
#[template(path = "login.html")]
pub(crate) struct LoginPage<'a> {
    pub title: &'a str,
}

pub(crate) struct ObjectRow<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub size: &'a str,
}

#[derive(Template)]
#[template(path = "list.html")]
pub(crate) struct ListPage<'a> {
    pub title: &'a str,
    pub objects: Vec<ObjectRow<'a>>,
    pub complete: bool,
    pub expires_at: String,
}

impl<'a> ListPage<'a> {
    pub fn new(title: &'a str, snapshot: &'a Snapshot) -> Self {
        Self {
            title,
            objects: snapshot
                .entries()
                .iter()
                .map(|(name, entry)| ObjectRow {
                    name,
                    url: &entry.url,
                    size: &entry.size,
                })
                .collect(),
            complete: snapshot.is_complete(),
            expires_at: format_rfc3339(snapshot.expires_at()),
        }
    }
}

/// Render a template, falling back to a plain 500 page.
pub(crate) fn render<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            log::error!("template rendering failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(INTERNAL_ERROR_PAGE)).into_response()
        }
    }
}
