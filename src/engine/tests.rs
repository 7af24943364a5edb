//! Tests for the execution engine

use super::*;
use crate::error::Error;
use crate::http::ClientConfig;
use crate::schema::EntitySpec;
use crate::sink::LoadResult;
use crate::types::{BackoffType, JsonObject, JsonValue};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

fn client(uri: &str) -> Arc<RateLimitedClient> {
    let config = ClientConfig::builder()
        .base_url(uri)
        .no_throttle()
        .max_retries(1)
        .rate_limit_retry(3, Duration::from_millis(5))
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
        .build();
    Arc::new(RateLimitedClient::new(config).unwrap())
}

struct Harness {
    orchestrator: SyncOrchestrator,
    sink: Arc<DuckDbSink>,
    queue: Arc<MemoryQueue>,
}

fn harness(uri: &str) -> Harness {
    harness_with(uri, Vec::new())
}

fn harness_with(uri: &str, extra_sinks: Vec<Arc<dyn Sink>>) -> Harness {
    let sink = Arc::new(DuckDbSink::in_memory("Caresoft").unwrap());
    let queue = Arc::new(MemoryQueue::new());

    let mut builder = SyncOrchestrator::builder()
        .page_fetcher(PageFetcher::new(client(uri), 500))
        .detail_fetcher(DetailFetcher::new(client(uri)))
        .sink(sink.clone())
        .task_queue(queue.clone());
    for extra in extra_sinks {
        builder = builder.sink(extra);
    }

    Harness {
        orchestrator: builder.build().unwrap(),
        sink,
        queue,
    }
}

fn count(sink: &DuckDbSink, table: &str) -> usize {
    let rows = sink
        .query(&format!("SELECT COUNT(*) AS n FROM {}", sink.relation(table)))
        .unwrap();
    rows[0]["n"].as_u64().unwrap() as usize
}

fn ticket(id: i64, updated_at: &str) -> JsonValue {
    json!({
        "ticket_id": id,
        "updated_at": updated_at,
        "created_at": "2021-05-20 08:00:00",
        "ticket_subject": format!("Ticket {id}"),
        "assignee": {"id": 7, "username": "agent"},
        "custom_fields": [{"id": 1, "lable": "Store", "type": "text", "value": "HN"}]
    })
}

async fn mount_tickets(server: &MockServer, since: &str, rows: Vec<JsonValue>) {
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(query_param("updated_since", since))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "ok",
            "numFound": rows.len(),
            "tickets": rows
        })))
        .mount(server)
        .await;
}

/// Sink that rejects every write
struct FailingSink;

impl Sink for FailingSink {
    fn name(&self) -> &str {
        "mirror"
    }

    fn relation(&self, table: &str) -> String {
        format!("\"public\".\"{table}\"")
    }

    fn ensure_table(&self, _entity: &EntitySpec) -> crate::error::Result<()> {
        Err(Error::sink("mirror", "connection refused"))
    }

    fn truncate_load(
        &self,
        _entity: &EntitySpec,
        _rows: &[JsonObject],
    ) -> crate::error::Result<LoadResult> {
        Err(Error::sink("mirror", "connection refused"))
    }

    fn append(
        &self,
        _entity: &EntitySpec,
        _rows: &[JsonObject],
    ) -> crate::error::Result<LoadResult> {
        Err(Error::sink("mirror", "connection refused"))
    }

    fn execute(&self, _sql: &str) -> crate::error::Result<()> {
        Err(Error::sink("mirror", "connection refused"))
    }

    fn query(&self, _sql: &str) -> crate::error::Result<Vec<JsonObject>> {
        Err(Error::sink("mirror", "connection refused"))
    }
}

// ============================================================================
// Trigger Parsing
// ============================================================================

#[test]
fn test_trigger_table() {
    let request: TriggerRequest =
        serde_json::from_value(json!({"table": "Tickets", "start": "2021-06-01", "end": "2021-06-02"}))
            .unwrap();

    assert_eq!(
        request.action().unwrap(),
        Trigger::Run {
            table: "Tickets".to_string(),
            start: Some("2021-06-01".to_string()),
            end: Some("2021-06-02".to_string()),
            ids: Vec::new(),
        }
    );
}

#[test]
fn test_trigger_tasks_groups() {
    let parse = |body: JsonValue| {
        serde_json::from_value::<TriggerRequest>(body)
            .unwrap()
            .action()
    };

    assert!(matches!(
        parse(json!({"tasks": true})).unwrap(),
        Trigger::Tasks { group: TaskGroup::All, .. }
    ));
    assert!(matches!(
        parse(json!({"tasks": "static"})).unwrap(),
        Trigger::Tasks { group: TaskGroup::Static, .. }
    ));
    assert!(matches!(
        parse(json!({"tasks": "incre"})).unwrap(),
        Trigger::Tasks { group: TaskGroup::Incremental, .. }
    ));
    assert!(matches!(
        parse(json!({"tasks": "weekly"})),
        Err(Error::UnknownGroup { .. })
    ));
    assert!(matches!(
        parse(json!({"tasks": 3})),
        Err(Error::InvalidRequest { .. })
    ));
}

#[test]
fn test_trigger_broadcast_wins() {
    let request: TriggerRequest =
        serde_json::from_value(json!({"broadcast": true, "table": "Agents"})).unwrap();
    assert_eq!(request.action().unwrap(), Trigger::Broadcast);
}

#[test]
fn test_trigger_empty_body() {
    let request = TriggerRequest::default();
    let err = request.action().unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_response_shape() {
    let result = PipelineResult {
        output_rows: Some(2),
        loads: vec![LoadResult::new("warehouse", 2)],
        ..PipelineResult::new("Agents", 2)
    };
    let response = TriggerResponse::new(RunResult::Single(result));

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({
            "pipelines": "Caresoft",
            "results": {
                "table": "Agents",
                "num_processed": 2,
                "output_rows": 2,
                "loads": [{"load": "warehouse", "output_rows": 2}]
            }
        })
    );

    let fanout = TriggerResponse::new(RunResult::Fanout(FanoutResult::MessageSent(10)));
    assert_eq!(
        serde_json::to_value(&fanout).unwrap(),
        json!({"pipelines": "Caresoft", "results": {"message_sent": 10}})
    );
}

// ============================================================================
// Dimension Pipeline
// ============================================================================

#[tokio::test]
async fn test_dimension_replaces_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agents": [
                {"id": 1, "username": "an", "group_id": 3},
                {"id": 2, "username": "binh", "group_id": 3},
                {"id": 3, "username": "chi", "group_id": 4}
            ]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agents": [{"id": 1, "username": "an"}]
        })))
        .mount(&server)
        .await;

    let h = harness(&server.uri());

    let first = h
        .orchestrator
        .run_table("Agents", None, None, &[])
        .await
        .unwrap();
    let RunResult::Single(first) = first else {
        panic!("expected a single result");
    };
    assert_eq!(first.num_processed, 3);
    assert_eq!(first.output_rows, Some(3));
    assert_eq!(count(&h.sink, "Agents"), 3);

    let RunResult::Single(second) = h
        .orchestrator
        .run_table("Agents", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected a single result");
    };
    assert_eq!(second.output_rows, Some(1));
    assert_eq!(count(&h.sink, "Agents"), 1);
}

#[tokio::test]
async fn test_empty_fetch_skips_sink() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"groups": []})))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let RunResult::Single(result) = h
        .orchestrator
        .run_table("Groups", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected a single result");
    };

    assert_eq!(result.num_processed, 0);
    assert_eq!(result.output_rows, None);
    assert!(result.loads.is_empty());

    let err = h
        .sink
        .query(&format!("SELECT * FROM {}", h.sink.relation("Groups")))
        .unwrap_err();
    assert!(err.is_missing_relation());
}

#[tokio::test]
async fn test_secondary_sink_failure_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [{"id": 1, "service_name": "Hotline"}]
        })))
        .mount(&server)
        .await;

    let h = harness_with(&server.uri(), vec![Arc::new(FailingSink)]);
    let RunResult::Single(result) = h
        .orchestrator
        .run_table("Services", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected a single result");
    };

    assert_eq!(result.output_rows, Some(1));
    assert_eq!(result.loads.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("mirror:"));
}

#[tokio::test]
async fn test_fatal_fetch_leaves_sink_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let err = h
        .orchestrator
        .run_table("Agents", None, None, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 401, .. }));
    assert!(h
        .sink
        .query(&format!("SELECT * FROM {}", h.sink.relation("Agents")))
        .unwrap_err()
        .is_missing_relation());
}

// ============================================================================
// Incremental Pipeline
// ============================================================================

#[tokio::test]
async fn test_incremental_loads_and_enqueues_details() {
    let server = MockServer::start().await;
    mount_tickets(
        &server,
        "2021-06-01T00:00:00Z",
        vec![
            ticket(1, "2021-06-01 10:00:00"),
            ticket(2, "2021-06-01 11:00:00"),
        ],
    )
    .await;

    let h = harness(&server.uri());
    let RunResult::Single(result) = h
        .orchestrator
        .run_table("Tickets", Some("2021-06-01"), Some("2021-06-02"), &[])
        .await
        .unwrap()
    else {
        panic!("expected a single result");
    };

    assert_eq!(result.num_processed, 2);
    assert_eq!(result.output_rows, Some(2));
    assert_eq!(result.start.as_deref(), Some("2021-06-01T00:00:00Z"));
    assert_eq!(result.end.as_deref(), Some("2021-06-02T00:00:00Z"));
    assert_eq!(result.tasks_created, Some(1));

    let tasks = h.queue.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0, DETAILS_QUEUE);
    assert_eq!(tasks[0].1.table, "TicketsDetails");
    assert_eq!(tasks[0].1.ids, vec![EntityId::Int(1), EntityId::Int(2)]);
}

#[tokio::test]
async fn test_incremental_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_tickets(
        &server,
        "2021-06-01T00:00:00Z",
        vec![
            ticket(1, "2021-06-01 10:00:00"),
            ticket(2, "2021-06-01 11:00:00"),
        ],
    )
    .await;

    let h = harness(&server.uri());
    for _ in 0..2 {
        h.orchestrator
            .run_table("Tickets", Some("2021-06-01"), Some("2021-06-02"), &[])
            .await
            .unwrap();
    }

    assert_eq!(count(&h.sink, "Tickets"), 2);
}

#[tokio::test]
async fn test_incremental_resumes_from_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calls"))
        .and(query_param("start_time_since", "2021-06-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "numFound": 2,
            "calls": [
                {"id": 10, "start_time": "2021-06-01 09:00:00"},
                {"id": 11, "start_time": "2021-06-01 10:30:00"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calls"))
        .and(query_param("start_time_since", "2021-06-01T10:30:00Z"))
        .and(query_param("order_by", "start_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "numFound": 0,
            "calls": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.orchestrator
        .run_table("Calls", Some("2021-06-01"), Some("2021-06-02"), &[])
        .await
        .unwrap();

    let RunResult::Single(result) = h
        .orchestrator
        .run_table("Calls", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected a single result");
    };
    assert_eq!(result.start.as_deref(), Some("2021-06-01T10:30:00Z"));
    assert_eq!(result.num_processed, 0);
    assert!(result.tasks_created.is_none());
}

#[tokio::test]
async fn test_partial_window_rejected() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let err = h
        .orchestrator
        .run_table("Tickets", Some("2021-06-01"), None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
}

// ============================================================================
// Details Pipeline
// ============================================================================

#[tokio::test]
async fn test_details_explicit_ids_split_present_and_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "ok",
            "ticket": {"ticket_id": 1, "updated_at": "2021-06-01 10:00:00", "satisfaction": 5}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tickets/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let result = h
        .orchestrator
        .run_table(
            "TicketsDetails",
            None,
            None,
            &[EntityId::Int(1), EntityId::Int(2)],
        )
        .await
        .unwrap();

    let RunResult::Stages(stages) = result else {
        panic!("expected staged results");
    };
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].table, "TicketsDetails");
    assert_eq!(stages[0].output_rows, Some(1));
    assert_eq!(stages[1].table, "DeletedTickets");
    assert_eq!(stages[1].output_rows, Some(1));

    let deleted = h
        .sink
        .query(&format!(
            "SELECT ticket_id, deleted FROM {}",
            h.sink.relation("DeletedTickets")
        ))
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["ticket_id"], json!(2));
    assert_eq!(deleted[0]["deleted"], json!(true));
}

#[tokio::test]
async fn test_details_candidates_follow_parent() {
    let server = MockServer::start().await;
    mount_tickets(
        &server,
        "2021-06-01T00:00:00Z",
        vec![
            ticket(1, "2021-06-01 10:00:00"),
            ticket(2, "2021-06-01 11:00:00"),
        ],
    )
    .await;
    for id in [1, 2] {
        Mock::given(method("GET"))
            .and(path(format!("/tickets/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticket": {
                    "ticket_id": id,
                    "updated_at": if id == 1 { "2021-06-01 10:00:00" } else { "2021-06-01 11:00:00" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let h = harness(&server.uri());
    h.orchestrator
        .run_table("Tickets", Some("2021-06-01"), Some("2021-06-02"), &[])
        .await
        .unwrap();

    let RunResult::Stages(first) = h
        .orchestrator
        .run_table("TicketsDetails", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected staged results");
    };
    assert_eq!(first[0].num_processed, 2);
    assert_eq!(first[0].output_rows, Some(2));
    assert_eq!(first[1].num_processed, 0);
    assert_eq!(first[1].output_rows, None);

    // Details now match the parent cursor, nothing left to fetch.
    let RunResult::Stages(second) = h
        .orchestrator
        .run_table("TicketsDetails", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected staged results");
    };
    assert_eq!(second[0].num_processed, 0);
    assert_eq!(count(&h.sink, "TicketsDetails"), 2);
}

#[tokio::test]
async fn test_details_without_parent_table() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let RunResult::Stages(stages) = h
        .orchestrator
        .run_table("ContactsDetails", None, None, &[])
        .await
        .unwrap()
    else {
        panic!("expected staged results");
    };
    assert_eq!(stages[0].num_processed, 0);
    assert_eq!(stages[1].table, "DeletedContacts");
}

// ============================================================================
// Lookup Errors
// ============================================================================

#[tokio::test]
async fn test_unknown_table() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let err = h
        .orchestrator
        .handle(&TriggerRequest::table("Orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity { ref name } if name == "Orders"));
}

#[tokio::test]
async fn test_ids_rejected_for_non_details() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let err = h
        .orchestrator
        .handle(&TriggerRequest::table("Tickets").with_ids(vec![EntityId::Int(1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_tasks_fan_out_static_group() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let request: TriggerRequest = serde_json::from_value(json!({"tasks": "static"})).unwrap();
    let response = h.orchestrator.handle(&request).await.unwrap();

    assert_eq!(response.pipelines, "Caresoft");
    assert_eq!(response.results, RunResult::Fanout(FanoutResult::Tasks(5)));

    let tasks = h.queue.tasks();
    assert!(tasks.iter().all(|(queue, _)| queue == SYNC_QUEUE));
    assert_eq!(tasks[0].1, TaskPayload::table("Agents"));
}

#[tokio::test]
async fn test_tasks_carry_window() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let request: TriggerRequest = serde_json::from_value(
        json!({"tasks": "incre", "start": "2021-06-01", "end": "2021-06-02"}),
    )
    .unwrap();
    h.orchestrator.handle(&request).await.unwrap();

    let tasks = h.queue.tasks();
    assert_eq!(tasks.len(), 5);
    assert_eq!(tasks[0].1.start.as_deref(), Some("2021-06-01"));
    assert_eq!(tasks[0].1.end.as_deref(), Some("2021-06-02"));
}

#[tokio::test]
async fn test_broadcast_every_entity() {
    let server = MockServer::start().await;
    let h = harness(&server.uri());

    let request: TriggerRequest = serde_json::from_value(json!({"broadcast": true})).unwrap();
    let response = h.orchestrator.handle(&request).await.unwrap();

    assert_eq!(
        response.results,
        RunResult::Fanout(FanoutResult::MessageSent(10))
    );
    assert!(h
        .queue
        .tasks()
        .iter()
        .all(|(queue, _)| queue == BROADCAST_QUEUE));
}

#[test]
fn test_builder_requires_sink() {
    let err = SyncOrchestrator::builder()
        .page_fetcher(PageFetcher::new(client("http://localhost"), 500))
        .detail_fetcher(DetailFetcher::new(client("http://localhost")))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn test_handle_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}

    let h = harness("http://localhost");
    let request = TriggerRequest::table("TicketsDetails").with_ids(vec![EntityId::Int(1)]);
    let pending = h.orchestrator.handle(&request);
    assert_send(&pending);

    let fanout = TriggerRequest {
        tasks: Some(json!("static")),
        ..TriggerRequest::default()
    };
    assert_send(&h.orchestrator.handle(&fanout));
}
