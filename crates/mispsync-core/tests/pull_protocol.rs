//! Record pull, conditional index and the supplementary protocols

mod common;

use std::collections::HashMap;

use serde_json::json;

use common::{body_json, transport, MockPeer};
use mispsync_core::http::header;
use mispsync_core::sync::{ids_newer_than, IndexOutcome, ProposalOutcome};
use mispsync_core::{
    Capability, EventSync, GalaxyClusterSync, HttpResponse, Method, NamedParams, ProposalSync,
    Record, RecordKind, RecordSync, SyncError, TransportError,
};

// ============================================================================
// Best-effort Pull
// ============================================================================

#[tokio::test]
async fn test_pull_skips_the_failing_id() {
    let mock = MockPeer::new();
    mock.on_json(Method::Get, "/events/view/1", 200, json!({"Event": {"id": "1", "uuid": "a"}}));
    mock.on(Method::Get, "/events/view/2", HttpResponse::status_only(500));
    mock.on_json(Method::Get, "/events/view/3", 200, json!({"Event": {"id": "3", "uuid": "c"}}));
    let t = transport(&mock);

    let report = RecordSync::new(&t, RecordKind::Event)
        .pull(["1", "2", "3"], &NamedParams::new())
        .await
        .unwrap();

    let ids: Vec<_> = report.records.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.skipped_ids().collect::<Vec<_>>(), vec!["2"]);
    assert_eq!(report.skipped[0].reason.status(), Some(500));
}

#[tokio::test]
async fn test_pull_skips_undecodable_bodies() {
    let mock = MockPeer::new();
    mock.on(
        Method::Get,
        "/events/view/1",
        HttpResponse::new(200, Vec::new(), "{not json"),
    );
    mock.on_json(Method::Get, "/events/view/2", 200, json!({"Event": {"id": "2"}}));
    let t = transport(&mock);

    let report = RecordSync::new(&t, RecordKind::Event)
        .pull(vec!["1".to_string(), "2".to_string()], &NamedParams::new())
        .await
        .unwrap();

    assert_eq!(report.records.len(), 1);
    assert!(matches!(report.skipped[0].reason, SyncError::Decode(_)));
}

#[tokio::test]
async fn test_pull_aborts_on_cancellation() {
    let mock = MockPeer::new();
    mock.on_json(Method::Get, "/events/view/1", 200, json!({"Event": {"id": "1"}}));
    mock.fail(Method::Get, "/events/view/2", TransportError::Cancelled);
    let t = transport(&mock);

    let err = RecordSync::new(&t, RecordKind::Event)
        .pull(["1", "2", "3"], &NamedParams::new())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(mock.count(Method::Get, "/events/view/3"), 0);
}

#[tokio::test]
async fn test_fetch_appends_named_params() {
    let mock = MockPeer::new();
    mock.on_json(
        Method::Get,
        "/events/view/7/deleted[]:0/deleted[]:1/excludeGalaxy:1",
        200,
        json!({"Event": {"id": "7"}}),
    );
    let t = transport(&mock);

    let params = NamedParams::new()
        .with_list("deleted", [0, 1])
        .with("excludeGalaxy", 1);
    let record = RecordSync::new(&t, RecordKind::Event)
        .fetch("7", &params)
        .await
        .unwrap();
    assert_eq!(record.id().as_deref(), Some("7"));
}

// ============================================================================
// Conditional Index
// ============================================================================

#[tokio::test]
async fn test_index_returns_entries_and_etag() {
    let mock = MockPeer::new();
    mock.on(
        Method::Post,
        "/events/index",
        HttpResponse::new(
            200,
            vec![("ETag".to_string(), "\"v1-gzip\"".to_string())],
            r#"[{"id":"1","uuid":"a","timestamp":"100"},{"id":"2","uuid":"b","timestamp":"200"}]"#,
        ),
    );
    let t = transport(&mock);

    let outcome = EventSync::new(&t)
        .index(&json!({"minimal": true, "published": 1}), None)
        .await
        .unwrap();

    let IndexOutcome::Fresh {
        entries,
        etag,
        malformed,
    } = outcome
    else {
        panic!("expected a fresh index");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(etag.as_deref(), Some("\"v1-gzip\""));
    assert!(malformed.is_empty());

    let request = mock.last_request_to(Method::Post, "/events/index").unwrap();
    assert_eq!(body_json(&request)["minimal"], true);
    assert!(request.header(header::IF_NONE_MATCH).is_none());
}

#[tokio::test]
async fn test_index_not_modified_with_stripped_token() {
    let mock = MockPeer::new();
    mock.on(Method::Post, "/events/index", HttpResponse::status_only(304));
    let t = transport(&mock);

    let outcome = EventSync::new(&t)
        .index(&json!({"minimal": true}), Some("abc123-br"))
        .await
        .unwrap();

    assert!(matches!(outcome, IndexOutcome::NotModified));
    assert!(outcome.entries().is_empty());
    let request = mock.last_request_to(Method::Post, "/events/index").unwrap();
    assert_eq!(request.header(header::IF_NONE_MATCH), Some("abc123"));
}

#[tokio::test]
async fn test_index_304_without_token_is_an_error() {
    let mock = MockPeer::new();
    mock.on(Method::Post, "/events/index", HttpResponse::status_only(304));
    let t = transport(&mock);

    let err = EventSync::new(&t).index(&json!({}), None).await.unwrap_err();
    assert_eq!(err.status(), Some(304));
}

#[tokio::test]
async fn test_index_feeds_newer_than_selection() {
    let mock = MockPeer::new();
    mock.on_json(
        Method::Post,
        "/events/index",
        200,
        json!([
            {"id": 1, "uuid": "a", "timestamp": 100},
            {"id": 2, "uuid": "b", "timestamp": 250},
            {"id": 3, "uuid": "c", "timestamp": 300}
        ]),
    );
    let t = transport(&mock);

    let outcome = EventSync::new(&t).index(&json!({}), None).await.unwrap();
    let local = HashMap::from([("a".to_string(), 100), ("b".to_string(), 200)]);
    assert_eq!(ids_newer_than(outcome.entries(), &local), vec!["2", "3"]);
}

#[tokio::test]
async fn test_index_reports_malformed_rows() {
    let mock = MockPeer::new();
    mock.on_json(
        Method::Post,
        "/events/index",
        200,
        json!([
            {"id": "1", "uuid": "a", "timestamp": "100"},
            {"id": "2", "timestamp": "200"},
            {"Event": {"id": 3, "uuid": "c", "timestamp": "soon"}},
            "garbage",
            {"Event": {"id": "5", "uuid": "e", "timestamp": 500}}
        ]),
    );
    let t = transport(&mock);

    let outcome = EventSync::new(&t).index(&json!({}), None).await.unwrap();
    let IndexOutcome::Fresh {
        entries, malformed, ..
    } = outcome
    else {
        panic!("expected a fresh index");
    };

    let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "5"]);
    let skipped: Vec<_> = malformed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(skipped, vec!["2", "3", "#3"]);
    assert!(malformed
        .iter()
        .all(|s| matches!(s.reason, SyncError::Decode(_))));
}

#[tokio::test]
async fn test_filter_ids_for_push() {
    let mock = MockPeer::new();
    mock.on_json(Method::Post, "/events/filterEventIdsForPush", 200, json!(["b"]));
    let t = transport(&mock);

    let stubs = vec![
        json!({"Event": {"uuid": "a", "timestamp": 1}}),
        json!({"Event": {"uuid": "b", "timestamp": 2}}),
    ];
    let wanted = EventSync::new(&t).filter_ids_for_push(&stubs).await.unwrap();
    assert_eq!(wanted, vec!["b"]);

    let request = mock
        .last_request_to(Method::Post, "/events/filterEventIdsForPush")
        .unwrap();
    assert_eq!(body_json(&request).as_array().unwrap().len(), 2);
}

// ============================================================================
// Galaxy Clusters
// ============================================================================

#[tokio::test]
async fn test_galaxy_cluster_push_sends_one_element_list() {
    let mock = MockPeer::with_info(json!({"version": "2.4.170", "perm_galaxy_editor": true}));
    mock.on_json(Method::Post, "/galaxies/pushCluster", 200, json!({"saved": true}));
    let t = transport(&mock);

    let cluster = Record::galaxy_cluster(json!({"GalaxyCluster": {"id": "4", "uuid": "g1"}}))
        .unwrap();
    GalaxyClusterSync::new(&t).push(&cluster).await.unwrap();

    let request = mock
        .last_request_to(Method::Post, "/galaxies/pushCluster")
        .unwrap();
    assert_eq!(
        body_json(&request),
        json!([{"GalaxyCluster": {"id": "4", "uuid": "g1"}}])
    );
}

#[tokio::test]
async fn test_galaxy_cluster_push_requires_edit_support() {
    let mock = MockPeer::with_info(json!({"version": "2.4.100"}));
    let t = transport(&mock);

    let cluster = Record::galaxy_cluster(json!({"uuid": "g1"})).unwrap();
    let err = GalaxyClusterSync::new(&t).push(&cluster).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::CapabilityUnavailable(Capability::GalaxyClusterEdit)
    ));
    assert_eq!(mock.count(Method::Post, "/galaxies/pushCluster"), 0);
}

#[tokio::test]
async fn test_galaxy_cluster_search_and_fetch() {
    let mock = MockPeer::new();
    mock.on_json(
        Method::Post,
        "/galaxy_clusters/restSearch",
        200,
        json!({"response": [{"GalaxyCluster": {"id": "1"}}, {"GalaxyCluster": {"id": "2"}}]}),
    );
    mock.on_json(
        Method::Get,
        "/galaxy_clusters/view/2",
        200,
        json!({"GalaxyCluster": {"id": "2", "uuid": "g2"}}),
    );
    let t = transport(&mock);
    let sync = GalaxyClusterSync::new(&t);

    let found = sync.search(&json!({"minimal": 1})).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|r| r.kind() == RecordKind::GalaxyCluster));

    let cluster = sync.fetch("2").await.unwrap();
    assert_eq!(cluster.uuid(), Some("g2"));
}

// ============================================================================
// Proposals
// ============================================================================

#[tokio::test]
async fn test_proposals_unsupported_on_old_peer() {
    let mock = MockPeer::with_info(json!({"version": "2.4.110"}));
    let t = transport(&mock);

    let outcome = ProposalSync::new(&t).fetch(&NamedParams::new()).await.unwrap();
    assert_eq!(outcome, ProposalOutcome::Unsupported);
    assert_eq!(mock.requests().len(), 1, "only the capability probe");
}

#[tokio::test]
async fn test_proposals_fetched_with_params() {
    let mock = MockPeer::with_info(json!({"version": "2.4.111"}));
    mock.on_json(
        Method::Get,
        "/shadow_attributes/index/all:1/timestamp:1700000000.json",
        200,
        json!([{"ShadowAttribute": {"id": "5"}}]),
    );
    let t = transport(&mock);

    let params = NamedParams::new()
        .with("all", 1)
        .with("timestamp", 1_700_000_000);
    let outcome = ProposalSync::new(&t).fetch(&params).await.unwrap();
    let ProposalOutcome::Fetched(items) = outcome else {
        panic!("expected proposals");
    };
    assert_eq!(items.len(), 1);
}
