//! Tests for paged listing fetches

use super::*;
use crate::cursor::Window;
use crate::error::Error;
use crate::http::{ClientConfig, RateLimitedClient};
use crate::types::BackoffType;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(uri: &str, page_size: u32) -> PageFetcher {
    let config = ClientConfig::builder()
        .base_url(uri)
        .no_throttle()
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
        .build();
    PageFetcher::new(Arc::new(RateLimitedClient::new(config).unwrap()), page_size)
}

fn rows(first_id: u64, count: u64) -> Vec<Value> {
    (first_id..first_id + count)
        .map(|id| json!({"ticket_id": id}))
        .collect()
}

async fn mount_page(server: &MockServer, page: u64, num_found: u64, page_rows: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(query_param(PAGE_PARAM, page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "ok",
            "numFound": num_found,
            "tickets": page_rows
        })))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Helpers
// ============================================================================

#[test_case(0, 500, 0)]
#[test_case(1, 500, 1)]
#[test_case(500, 500, 1)]
#[test_case(501, 500, 2)]
#[test_case(1234, 500, 3)]
#[test_case(10, 0, 0)]
fn test_page_count(num_found: u64, page_size: u32, expected: u64) {
    assert_eq!(page_count(num_found, page_size), expected);
}

#[test]
fn test_num_found_shapes() {
    assert_eq!(num_found(&json!({"numFound": 12}), "tickets").unwrap(), 12);
    assert_eq!(num_found(&json!({"numFound": "34"}), "tickets").unwrap(), 34);
    assert_eq!(num_found(&json!({"numFound": null}), "tickets").unwrap(), 0);
    assert!(matches!(
        num_found(&json!({"tickets": []}), "tickets"),
        Err(Error::MissingResponseKey { .. })
    ));
}

#[test]
fn test_take_rows() {
    let body = json!({"tickets": [{"ticket_id": 1}], "numFound": 1});
    assert_eq!(take_rows(body, "tickets", "tickets").unwrap().len(), 1);
    assert!(take_rows(json!({"tickets": null}), "tickets", "tickets")
        .unwrap()
        .is_empty());
    assert!(take_rows(json!({"code": "ok"}), "tickets", "tickets").is_err());
}

#[test]
fn test_window_query_params() {
    let window = Window::from_dates("2021-06-01", "2021-06-02").unwrap();

    let updated = WindowParams::Updated.query(&window, 500);
    assert_eq!(
        updated,
        vec![
            ("updated_since".to_string(), "2021-06-01T00:00:00Z".to_string()),
            ("updated_to".to_string(), "2021-06-02T00:00:00Z".to_string()),
            ("order_by".to_string(), "updated_at".to_string()),
            ("order_type".to_string(), "asc".to_string()),
            ("count".to_string(), "500".to_string()),
        ]
    );

    let calls = WindowParams::StartTime.query(&window, 100);
    assert_eq!(calls[0].0, "start_time_since");
    assert_eq!(calls[1].0, "start_time_to");
    assert_eq!(calls[2].1, "start_time");
}

// ============================================================================
// Fetching
// ============================================================================

#[tokio::test]
async fn test_fetch_all_issues_one_request_per_page() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 1234, rows(0, 500)).await;
    mount_page(&server, 2, 1234, rows(500, 500)).await;
    mount_page(&server, 3, 1234, rows(1000, 234)).await;

    let fetched = fetcher(&server.uri(), 500)
        .fetch_all("tickets", "tickets", &Vec::new())
        .await
        .unwrap();

    assert_eq!(fetched.len(), 1234);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_fetch_all_empty_window_single_request() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 0, Vec::new()).await;

    let fetched = fetcher(&server.uri(), 500)
        .fetch_all("tickets", "tickets", &Vec::new())
        .await
        .unwrap();

    assert!(fetched.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetch_all_forwards_window_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(query_param("updated_since", "2021-06-01T00:00:00Z"))
        .and(query_param("count", "500"))
        .and(query_param(PAGE_PARAM, "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "numFound": "2",
            "tickets": rows(1, 2)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let window = Window::from_dates("2021-06-01", "2021-06-02").unwrap();
    let query = WindowParams::Updated.query(&window, 500);
    let fetched = fetcher(&server.uri(), 500)
        .fetch_all("tickets", "tickets", &query)
        .await
        .unwrap();

    assert_eq!(fetched.len(), 2);
}

#[tokio::test]
async fn test_fetch_all_fails_when_a_page_fails() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 600, rows(0, 500)).await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(query_param(PAGE_PARAM, "2"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = fetcher(&server.uri(), 500)
        .fetch_all("tickets", "tickets", &Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 403, .. }));
}

#[tokio::test]
async fn test_fetch_unpaged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets/custom_fields"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "custom_fields": [{"custom_field_id": 1}, {"custom_field_id": 2}]
        })))
        .mount(&server)
        .await;

    let fetched = fetcher(&server.uri(), 500)
        .fetch_unpaged("tickets/custom_fields", "custom_fields")
        .await
        .unwrap();
    assert_eq!(fetched.len(), 2);
}

#[tokio::test]
async fn test_fetch_unpaged_missing_row_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "ok"})))
        .mount(&server)
        .await;

    let err = fetcher(&server.uri(), 500)
        .fetch_unpaged("groups", "groups")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingResponseKey { ref key, .. } if key == "groups"));
}
