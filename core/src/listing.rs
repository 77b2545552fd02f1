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

use crate::{Context, Error, ErrorKind, Result};
use std::fmt::Debug;
use std::mem;

/// One object as reported by the provider's listing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Object name, unique within a listing.
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A single page returned by [`ListObjects::list_page`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Objects in provider order.
    pub objects: Vec<ObjectDescriptor>,
    /// Continuation marker, `None` (or empty) on the last page.
    pub next_marker: Option<String>,
}

/// ListObjects fetches one page of a container listing.
///
/// Implementations perform exactly one provider round trip per call and keep
/// no state between calls; continuation is driven by [`Pager`].
#[async_trait::async_trait]
pub trait ListObjects: Debug + Send + Sync + 'static {
    /// Identity used to authorize the listing.
    type Credential: Send + Sync + 'static;

    /// Fetch the page starting at `marker`, or the first page when `marker` is `None`.
    async fn list_page(
        &self,
        ctx: &Context,
        cred: &Self::Credential,
        marker: Option<&str>,
    ) -> Result<ObjectPage>;
}

enum PagerState {
    Start,
    Next(String),
    Done,
}

/// Pager drains a container listing page by page.
///
/// The sequence is lazy (one round trip per [`Pager::next_page`]), finite and
/// not restartable: once the last page was returned, or a page failed, the
/// pager yields `None` forever.
pub struct Pager<'a, C: Send + Sync + 'static> {
    ctx: &'a Context,
    lister: &'a dyn ListObjects<Credential = C>,
    cred: &'a C,
    state: PagerState,
    pages: usize,
}

impl<'a, C: Send + Sync + 'static> Pager<'a, C> {
    /// Create a pager positioned before the first page.
    pub fn new(ctx: &'a Context, lister: &'a dyn ListObjects<Credential = C>, cred: &'a C) -> Self {
        Self {
            ctx,
            lister,
            cred,
            state: PagerState::Start,
            pages: 0,
        }
    }

    /// Whether another page may be fetched.
    pub fn has_more(&self) -> bool {
        !matches!(self.state, PagerState::Done)
    }

    /// Number of pages fetched successfully so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch the next page.
    ///
    /// Returns `None` once the listing is exhausted. A failed page is returned
    /// as `Some(Err(_))` and ends the sequence.
    pub async fn next_page(&mut self) -> Option<Result<Vec<ObjectDescriptor>>> {
        let marker = match mem::replace(&mut self.state, PagerState::Done) {
            PagerState::Start => None,
            PagerState::Next(marker) => Some(marker),
            PagerState::Done => return None,
        };

        match self
            .lister
            .list_page(self.ctx, self.cred, marker.as_deref())
            .await
        {
            Ok(page) => {
                self.pages += 1;
                if let Some(next) = page.next_marker.filter(|v| !v.is_empty()) {
                    self.state = PagerState::Next(next);
                }
                Some(Ok(page.objects))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Drain every remaining page into a [`Listing`].
    ///
    /// A page failure does not discard what was already gathered: the
    /// listing keeps the objects from the earlier pages and records the
    /// failure in [`Listing::incomplete`].
    pub async fn collect(mut self) -> Listing {
        let mut objects = Vec::new();

        while let Some(page) = self.next_page().await {
            match page {
                Ok(items) => objects.extend(items),
                Err(err) => {
                    let err = if err.kind() == ErrorKind::Listing {
                        err
                    } else {
                        Error::listing(format!("failed to fetch listing page {}", self.pages + 1))
                            .with_source(err)
                    };
                    log::warn!(
                        "listing truncated after {} pages and {} objects: {err}",
                        self.pages,
                        objects.len()
                    );
                    return Listing {
                        objects,
                        incomplete: Some(err),
                    };
                }
            }
        }

        log::debug!(
            "listing complete: {} pages, {} objects",
            self.pages,
            objects.len()
        );
        Listing {
            objects,
            incomplete: None,
        }
    }
}

/// The outcome of draining a [`Pager`].
#[derive(Debug)]
pub struct Listing {
    /// Objects gathered, in page order.
    pub objects: Vec<ObjectDescriptor>,
    /// The page failure that truncated this listing, if any.
    pub incomplete: Option<Error>,
}

impl Listing {
    /// Whether every page was fetched.
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_none()
    }
}
