// ABOUTME: Test helper utilities for mocking Basecamp API responses and servers
// ABOUTME: Provides mockito-based helpers plus a client wired to the mock server

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use mockito::{Server, ServerGuard};
#[cfg(test)]
use serde_json::json;

#[cfg(test)]
use crate::{Client, StaticTokenProvider, TokenProvider};

#[cfg(test)]
pub async fn mock_api_server() -> ServerGuard {
    Server::new_async().await
}

/// Client pointed at the mock server with a static test token.
#[cfg(test)]
pub fn test_client(server: &ServerGuard) -> Client {
    Client::builder()
        .token_provider(Arc::new(StaticTokenProvider::new("test-token")) as Arc<dyn TokenProvider>)
        .base_url(server.url())
        .build()
        .unwrap()
}

#[cfg(test)]
pub const TEST_BEARER: &str = "Bearer test-token";

/// A page of todo items with the given IDs.
#[cfg(test)]
pub fn todos_page(ids: std::ops::RangeInclusive<i64>) -> serde_json::Value {
    let items: Vec<serde_json::Value> = ids
        .map(|id| {
            json!({
                "id": id,
                "content": format!("Todo {id}"),
                "completed": false
            })
        })
        .collect();
    json!(items)
}

#[cfg(test)]
pub fn project_response() -> serde_json::Value {
    json!({
        "id": 1,
        "status": "active",
        "name": "Launch checklist",
        "description": "Everything before the launch",
        "purpose": "topic"
    })
}

#[cfg(test)]
pub fn validation_error_response() -> serde_json::Value {
    json!({
        "error": "Validation failed",
        "error_description": "Content can't be blank"
    })
}
