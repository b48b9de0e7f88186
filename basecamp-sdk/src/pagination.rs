// ABOUTME: Link-header pagination with eager collection and lazy streaming
// ABOUTME: Next-page URLs must share the first page's origin before being fetched

use std::collections::VecDeque;

use futures_util::stream::{self, Stream};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::executor::ApiResponse;
use crate::security::is_same_origin;
use crate::Client;

/// Options for a paginated listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginationOptions {
    /// Stop after this many items. `None` collects everything.
    pub max_items: Option<usize>,
}

/// Pagination metadata returned alongside collected items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMeta {
    /// Server-reported total from X-Total-Count, or 0 when absent.
    pub total_count: i64,
    /// Whether collection stopped before exhausting the listing.
    pub truncated: bool,
}

/// A fully collected paginated listing.
#[derive(Debug)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub meta: ListMeta,
}

impl Client {
    /// Fetches every page of a listing eagerly and returns the combined
    /// items with pagination metadata.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        options: PaginationOptions,
        operation: Option<&str>,
    ) -> Result<ListResult<T>> {
        let first = self
            .execute(Method::GET, path, None, operation)
            .await?
            .into_result()?;
        self.follow_pagination(first, options, operation).await
    }

    /// Collects the remaining pages of a listing whose first page the caller
    /// already fetched.
    ///
    /// The total count comes from the first page only. Every next-page URL
    /// is resolved against the page that supplied it and must share the
    /// origin of the first page's request URL, before any redirects; a
    /// cross-origin link aborts the walk rather than send the bearer token
    /// elsewhere.
    pub async fn follow_pagination<T: DeserializeOwned>(
        &self,
        first: ApiResponse,
        options: PaginationOptions,
        operation: Option<&str>,
    ) -> Result<ListResult<T>> {
        let origin = first.request_url.clone();
        let total_count = total_count(&first.headers);
        let mut items: Vec<T> = first.json()?;
        let mut next = next_page_url(&first.headers, &first.url)?;

        if let Some(max) = options.max_items {
            if items.len() >= max {
                let truncated = items.len() > max || next.is_some();
                items.truncate(max);
                return Ok(ListResult {
                    items,
                    meta: ListMeta {
                        total_count,
                        truncated,
                    },
                });
            }
        }

        let mut pages: u32 = 1;
        let mut truncated = false;

        while let Some(next_url) = next.take() {
            if pages >= self.inner.max_pages {
                tracing::warn!(pages, "pagination stopped at page safety cap");
                truncated = true;
                break;
            }
            if !is_same_origin(&origin, &next_url) {
                return Err(cross_origin_error(&origin, &next_url));
            }

            let response = self
                .execute(Method::GET, next_url.as_str(), None, operation)
                .await?
                .into_result()?;
            pages += 1;

            let page: Vec<T> = response.json()?;
            next = next_page_url(&response.headers, &response.url)?;
            items.extend(page);

            if let Some(max) = options.max_items {
                if items.len() >= max {
                    items.truncate(max);
                    truncated = true;
                    break;
                }
            }
        }

        Ok(ListResult {
            items,
            meta: ListMeta {
                total_count,
                truncated,
            },
        })
    }

    /// Returns a lazy stream over a paginated listing.
    ///
    /// Nothing is fetched until the stream is polled, and each page is
    /// fetched only once its predecessor's items have been yielded.
    /// Dropping the stream abandons the walk with no further requests. The
    /// stream ends silently at the page safety cap.
    pub fn stream_paginated<T>(&self, path: &str) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let state = StreamState {
            client: self.clone(),
            path: path.to_string(),
            cursor: Cursor::Start,
            origin: None,
            pages: 0,
            buffer: VecDeque::new(),
        };

        stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Ok(Some((item, state)));
                }

                let response = match std::mem::replace(&mut state.cursor, Cursor::Done) {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => {
                        state
                            .client
                            .execute(Method::GET, &state.path, None, None)
                            .await?
                    }
                    Cursor::Next(url) => {
                        state
                            .client
                            .execute(Method::GET, url.as_str(), None, None)
                            .await?
                    }
                }
                .into_result()?;
                state.pages += 1;

                let origin = state
                    .origin
                    .get_or_insert_with(|| response.request_url.clone())
                    .clone();
                let page: Vec<T> = response.json()?;

                state.cursor = match next_page_url(&response.headers, &response.url)? {
                    None => Cursor::Done,
                    Some(next_url) => {
                        if !is_same_origin(&origin, &next_url) {
                            return Err(cross_origin_error(&origin, &next_url));
                        }
                        if state.pages >= state.client.inner.max_pages {
                            tracing::warn!(
                                pages = state.pages,
                                "pagination stream stopped at page safety cap"
                            );
                            Cursor::Done
                        } else {
                            Cursor::Next(next_url)
                        }
                    }
                };
                state.buffer = page.into();
            }
        })
    }
}

enum Cursor {
    Start,
    Next(Url),
    Done,
}

struct StreamState<T> {
    client: Client,
    path: String,
    cursor: Cursor,
    origin: Option<Url>,
    pages: u32,
    buffer: VecDeque<T>,
}

fn cross_origin_error(origin: &Url, next: &Url) -> Error {
    Error::api(
        0,
        format!("Pagination link {next} does not match the original origin {origin}"),
    )
}

/// Parses the Link header's rel="next" target and resolves it against the
/// URL of the page that supplied it.
fn next_page_url(headers: &HeaderMap, page_url: &Url) -> Result<Option<Url>> {
    let raw = match headers.get("link").and_then(|v| v.to_str().ok()) {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let target = match parse_next_link(raw) {
        Some(target) => target,
        None => return Ok(None),
    };
    let resolved = page_url
        .join(&target)
        .map_err(|e| Error::api(0, format!("Invalid pagination link {target}: {e}")))?;
    Ok(Some(resolved))
}

/// Extracts the first rel="next" target from a Link header value.
fn parse_next_link(header: &str) -> Option<String> {
    for segment in header.split(',') {
        let mut parts = segment.split(';');
        let target = parts.next()?.trim();
        if !(target.starts_with('<') && target.ends_with('>')) {
            continue;
        }
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if is_next {
            return Some(target[1..target.len() - 1].to_string());
        }
    }
    None
}

/// Reads X-Total-Count, defaulting to 0 when missing or malformed.
fn total_count(headers: &HeaderMap) -> i64 {
    headers
        .get("x-total-count")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
