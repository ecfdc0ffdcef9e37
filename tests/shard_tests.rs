//! End-to-end tests for the shard entry points
//!
//! Each test spawns a shard over an in-memory store and drives it only
//! through `ShardHandle`, the way the router does.

use logshard::error::Outcome;
use logshard::shard::{
    spawn_shard, HttpProber, Level, LogInput, LogQuery, ShardHandle, ShardOptions, ShardStore,
    StatsDelta,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn shard() -> ShardHandle {
    let store = ShardStore::open_in_memory().await.unwrap();
    let options = ShardOptions::new(Arc::new(HttpProber::new(Duration::from_secs(1))));
    spawn_shard("acme", store, options).await.unwrap()
}

#[tokio::test]
async fn test_log_then_query_newest_first() {
    let shard = shard().await;

    let error = shard
        .log(
            LogInput::new("ERROR", "db timeout")
                .with_context(json!({"user": "u1"}))
                .with_request_id("r1"),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let info = shard.log(LogInput::new("INFO", "ok")).await.unwrap();

    let all = shard.query(LogQuery::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![info.id.as_str(), error.id.as_str()]);

    let errors = shard.query(LogQuery::default().level("ERROR")).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].request_id.as_deref(), Some("r1"));
    assert_eq!(errors[0].context.as_ref().unwrap()["user"], json!("u1"));

    let by_context = shard
        .query(LogQuery::from_params([("context.user", "u1")]))
        .await
        .unwrap();
    assert_eq!(by_context, errors);
}

#[tokio::test]
async fn test_batch_shares_timestamp_and_is_atomic() {
    let shard = shard().await;

    let batch = LogInput::batch_from_value(json!([
        {"level": "INFO", "message": "a"},
        {"level": "WARN", "message": "b", "request_id": "r9"},
    ]))
    .unwrap();
    let stored = shard.log_batch(batch).await.unwrap();

    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].timestamp, stored[1].timestamp);
    assert_ne!(stored[0].id, stored[1].id);

    let rejected = LogInput::batch_from_value(json!([
        {"level": "INFO", "message": "c"},
        {"level": "NOTICE", "message": "d"},
    ]))
    .unwrap();
    let err = shard.log_batch(rejected).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let all = shard.query(LogQuery::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_later_batch_sorts_first_without_delay() {
    let shard = shard().await;

    let first = shard
        .log_batch(vec![LogInput::new("INFO", "first a"), LogInput::new("INFO", "first b")])
        .await
        .unwrap();
    let second = shard
        .log_batch(vec![LogInput::new("WARN", "second a"), LogInput::new("WARN", "second b")])
        .await
        .unwrap();

    let ids: Vec<String> = shard
        .query(LogQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids.len(), 4);

    let position = |id: &str| ids.iter().position(|i| i == id).unwrap();
    let last_of_second = second.iter().map(|e| position(&e.id)).max().unwrap();
    let first_of_first = first.iter().map(|e| position(&e.id)).min().unwrap();
    assert!(last_of_second < first_of_first);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let shard = shard().await;

    assert!(shard.log_batch(Vec::new()).await.unwrap().is_empty());
    assert!(shard.query(LogQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_adding_filters_only_narrows_results() {
    let shard = shard().await;
    for (level, message, user) in [
        ("INFO", "login ok", "u1"),
        ("ERROR", "login failed", "u1"),
        ("ERROR", "payment failed", "u2"),
        ("DEBUG", "cache miss", "u1"),
    ] {
        shard
            .log(LogInput::new(level, message).with_context(json!({ "user": user })))
            .await
            .unwrap();
    }

    let steps = [
        LogQuery::default(),
        LogQuery::default().level("ERROR"),
        LogQuery::default().level("ERROR").search("failed"),
        LogQuery::default().level("ERROR").search("failed").context("user", "u1"),
    ];

    let mut previous: Option<Vec<String>> = None;
    for query in steps {
        let ids: Vec<String> = shard.query(query).await.unwrap().into_iter().map(|e| e.id).collect();
        if let Some(previous) = &previous {
            assert!(ids.iter().all(|id| previous.contains(id)));
        }
        previous = Some(ids);
    }
    assert_eq!(previous.unwrap().len(), 1);
}

#[tokio::test]
async fn test_prune_keeps_counters() {
    let shard = shard().await;

    shard.log(LogInput::new("INFO", "old")).await.unwrap();
    shard.record_stats(Level::Info, 1).await.unwrap();

    let deleted = shard.prune_logs("2999-01-01").await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(shard.prune_logs("2999-01-01").await.unwrap(), 0);

    let today = shard.get_stats(None).await.unwrap();
    assert_eq!(today.info, 1);

    let err = shard.prune_logs("yesterday").await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_stats_accumulate_across_calls() {
    let shard = shard().await;

    shard.record_stats(Level::Error, 2).await.unwrap();
    let after = shard
        .record_stats_batch(vec![
            StatsDelta::new(Level::Error, 1),
            StatsDelta::new(Level::Debug, 4),
        ])
        .await
        .unwrap();

    assert_eq!(after.error, 3);
    assert_eq!(after.debug, 4);
    assert_eq!(after.total(), 7);

    let range = shard.get_stats_range(3).await.unwrap();
    assert_eq!(range.len(), 3);
    assert_eq!(range[0], after);
    assert_eq!(range[1].total(), 0);

    let missing = shard.get_stats(Some("2001-02-03".to_string())).await.unwrap();
    assert_eq!(missing.total(), 0);

    assert!(shard.get_stats(Some("03/02/2001".to_string())).await.is_err());
}

#[tokio::test]
async fn test_outcome_serialization_for_router() {
    let shard = shard().await;

    let ok: Outcome<_> = shard.log(LogInput::new("INFO", "hello")).await.into();
    let ok = serde_json::to_value(&ok).unwrap();
    assert_eq!(ok["success"], json!(true));
    assert_eq!(ok["data"]["message"], json!("hello"));
    assert_eq!(ok["data"]["level"], json!("INFO"));

    let failed: Outcome<_> = shard.log(LogInput::new("INFO", "")).await.into();
    let failed = serde_json::to_value(&failed).unwrap();
    assert_eq!(failed["success"], json!(false));
    assert_eq!(failed["error"]["code"], json!("validation_error"));
    assert!(failed.get("data").is_none());
}

#[tokio::test]
async fn test_concurrent_callers_are_serialized() {
    let shard = shard().await;

    let calls = (0..50).map(|i| {
        let shard = shard.clone();
        tokio::spawn(async move {
            shard.log(LogInput::new("INFO", format!("m{}", i))).await.unwrap();
            shard.record_stats(Level::Info, 1).await.unwrap();
        })
    });
    for call in futures::future::join_all(calls).await {
        call.unwrap();
    }

    let all = shard.query(LogQuery::default().limit(1000)).await.unwrap();
    assert_eq!(all.len(), 50);
    assert_eq!(shard.get_stats(None).await.unwrap().info, 50);
}
