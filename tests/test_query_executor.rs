//! Tests for QueryExecutor: page defaults, hit ranking, count bodies,
//! failure handling and the query log stores.

mod common;

use common::{blog_registry, ArticleManager, Call, RecordingTransport};
use searchsync::query::QueryType;
use searchsync::{
    Connections, ExecuteOptions, JsonlQueryLogStore, MemoryQueryLogStore, QueryExecutor,
    QueryLogStore, RecordId, SearchRequest, SyncError,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct Fixture {
    _dir: tempfile::TempDir,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryQueryLogStore>,
    executor: QueryExecutor,
}

fn fixture(settings: Value) -> Fixture {
    let (dir, registry, _catalog) = blog_registry(ArticleManager::with(vec![]), settings);
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryQueryLogStore::new());
    let executor = QueryExecutor::new(
        registry,
        Connections::single(transport.clone()),
        store.clone(),
    );
    Fixture {
        _dir: dir,
        transport,
        store,
        executor,
    }
}

fn engine_response() -> Value {
    json!({
        "took": 3,
        "hits": {
            "total": {"value": 2, "relation": "eq"},
            "max_score": 9.1,
            "hits": [
                {"_index": "blog", "_id": "5", "_score": 9.1},
                {"_index": "blog", "_id": "3", "_score": 4.2}
            ]
        }
    })
}

fn match_title(text: &str) -> Value {
    json!({"query": {"match": {"title": text}}})
}

#[tokio::test]
async fn search_fills_page_defaults_and_ranks_hits() {
    let f = fixture(json!({}));
    f.transport.set_response(engine_response());

    let request = SearchRequest::search(["blog"], match_title("rust"));
    let options = ExecuteOptions::default()
        .user("alice")
        .search_terms("rust")
        .reference("home");
    let entry = f.executor.execute(&request, &options).await.unwrap();

    match &f.transport.calls()[..] {
        [Call::Search { indexes, body }] => {
            assert_eq!(indexes, &vec!["blog".to_string()]);
            assert_eq!(body["from"], 0);
            assert_eq!(body["size"], 25);
            assert_eq!(body["query"], match_title("rust")["query"]);
        }
        other => panic!("unexpected calls: {other:?}"),
    }

    assert_eq!(entry.query_type, QueryType::Search);
    assert_eq!(entry.total_hits, 2);
    assert_eq!(entry.object_ids(), vec![RecordId::from(5), RecordId::from(3)]);
    assert_eq!(entry.hits[0].rank, 1);
    assert_eq!(entry.hits[1].rank, 2);
    assert_eq!(entry.max_score(), 9.1);
    assert_eq!(entry.min_score(), 4.2);
    assert_eq!((entry.page_from(), entry.page_to()), (1, 2));
    assert_eq!(entry.user.as_deref(), Some("alice"));

    let stored = f.store.get(&entry.id).unwrap().unwrap();
    assert_eq!(stored.search_terms.as_deref(), Some("rust"));
    assert!(stored.raw_response.is_none());
    assert_eq!(f.store.by_reference("home").unwrap().len(), 1);
}

#[tokio::test]
async fn explicit_paging_is_kept() {
    let f = fixture(json!({}));
    let request = SearchRequest::search(["blog"], match_title("rust")).from(20).size(10);
    let entry = f
        .executor
        .execute(&request, &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(entry.page_slice(), (20, 10));
}

#[tokio::test]
async fn unsaved_entry_still_carries_raw_response() {
    let f = fixture(json!({}));
    f.transport.set_response(engine_response());

    let request = SearchRequest::search(["blog"], Value::Null);
    let entry = f
        .executor
        .execute(&request, &ExecuteOptions::default().save(false))
        .await
        .unwrap();

    assert!(f.store.is_empty());
    assert_eq!(entry.raw_response, Some(engine_response()));
    assert_eq!(entry.response_snapshot, Some(engine_response()));
}

#[tokio::test]
async fn snapshot_respects_include_source() {
    let f = fixture(json!({"include_source": false}));
    f.transport.set_response(engine_response());
    let entry = f
        .executor
        .execute(
            &SearchRequest::search(["blog"], Value::Null),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(entry.response_snapshot.is_none());
    assert!(entry.raw_response.is_some());
}

#[tokio::test]
async fn oversized_snapshot_is_dropped() {
    let f = fixture(json!({"response_snapshot_limit": 16}));
    f.transport.set_response(engine_response());
    let entry = f
        .executor
        .execute(
            &SearchRequest::search(["blog"], Value::Null),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(entry.response_snapshot.is_none());
    assert_eq!(entry.total_hits, 2);
}

#[tokio::test]
async fn count_strips_paging_and_reads_count() {
    let f = fixture(json!({}));
    f.transport.set_response(json!({"count": 17}));

    let request = SearchRequest::count(["blog"], match_title("rust"))
        .from(10)
        .size(5)
        .aggregations(json!({"tags": {"terms": {"field": "tags"}}}));
    let entry = f
        .executor
        .execute(&request, &ExecuteOptions::default())
        .await
        .unwrap();

    match &f.transport.calls()[..] {
        [Call::Count { body, .. }] => assert_eq!(body, &match_title("rust")),
        other => panic!("unexpected calls: {other:?}"),
    }
    assert_eq!(entry.query_type, QueryType::Count);
    assert_eq!(entry.total_hits, 17);
    assert!(entry.hits.is_empty());
}

#[tokio::test]
async fn engine_failure_is_search_execution_and_not_logged() {
    let f = fixture(json!({}));
    f.transport.set_failing(true);

    let err = f
        .executor
        .execute(
            &SearchRequest::search(["blog"], match_title("rust")),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SearchExecution(ref m) if m.contains("503")));
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn empty_on_error_returns_empty_unsaved_entry() {
    let f = fixture(json!({}));
    f.transport.set_failing(true);

    let entry = f
        .executor
        .execute(
            &SearchRequest::search(["blog"], match_title("rust")),
            &ExecuteOptions::default().empty_on_error(),
        )
        .await
        .unwrap();
    assert_eq!(entry.total_hits, 0);
    assert!(entry.hits.is_empty());
    assert!(entry.raw_response.is_none());
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let f = fixture(json!({}));
    let err = f
        .executor
        .execute(
            &SearchRequest::search(["blog"], json!(["not", "an", "object"])),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SearchExecution(_)));
    assert!(f.transport.calls().is_empty());
}

#[tokio::test]
async fn jsonl_store_persists_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("logs").join("queries.jsonl");

    let (_mappings, registry, _catalog) = blog_registry(ArticleManager::with(vec![]), json!({}));
    let transport = RecordingTransport::new();
    transport.set_response(engine_response());
    let store = Arc::new(JsonlQueryLogStore::open(&path).unwrap());
    let executor = QueryExecutor::new(registry, Connections::single(transport), store);

    let first = executor
        .execute(
            &SearchRequest::search(["blog"], match_title("rust")),
            &ExecuteOptions::default().reference("docs"),
        )
        .await
        .unwrap();
    executor
        .execute(
            &SearchRequest::search(["blog"], match_title("tokio")),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    drop(executor);

    let reopened = JsonlQueryLogStore::open(&path).unwrap();
    let entries = reopened.list().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, first.id);
    assert_eq!(entries[0].hits, first.hits);
    assert!(entries[0].raw_response.is_none());
    assert_eq!(reopened.by_reference("docs").unwrap().len(), 1);
    assert_eq!(reopened.get(&first.id).unwrap().unwrap().total_hits, 2);
}
