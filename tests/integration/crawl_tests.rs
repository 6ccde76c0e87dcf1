//! End-to-end sweep tests
//!
//! Each test runs the engine against `FakeApi` and a real SQLite file,
//! reopening the database between runs the way separate processes would.

use crate::common::{
    businesses, config_with, location_unit_id, springfield_config, temp_db, FailingLedger,
    FakeApi,
};
use biz_sweep::crawler::{CrawlEngine, FetchError, RunOutcome, StopReason};
use biz_sweep::output::{export_jsonl, load_statistics};
use biz_sweep::state::{PageCursor, UnitStatus};
use biz_sweep::storage::{BusinessRecord, LedgerStore, ResultStore, RunStatus, SqliteStorage};
use biz_sweep::SweepError;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn springfield_api() -> FakeApi {
    FakeApi::new().with_dataset("Springfield, IL", businesses("spr", 0..120))
}

fn open(path: &Path) -> SqliteStorage {
    SqliteStorage::new(path).unwrap()
}

fn stored_ids(storage: &SqliteStorage) -> HashSet<String> {
    storage.iterate().map(|r| r.unwrap().id).collect()
}

#[tokio::test]
async fn test_springfield_sweep_resumes_after_rate_limit() {
    let (_dir, db) = temp_db();
    let config = springfield_config(&db, 5000);
    let unit_id = location_unit_id("Springfield, IL");

    // Probe, page 1, page 2, then the API starts refusing
    let api = springfield_api().rate_limit_from(3);
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    let outcome = engine.run().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Paused(StopReason::RemoteSignal(_))));
    assert_eq!(engine.store().count().unwrap(), 100);

    let progress = engine.state().progress(&unit_id).unwrap();
    assert_eq!(progress.status, UnitStatus::InProgress);
    assert_eq!(
        progress.next_cursor,
        Some(PageCursor {
            offset: 100,
            limit: 20
        })
    );
    assert_eq!(progress.pages_fetched, 2);
    drop(engine);

    // The next run fetches only the third page
    let api = springfield_api();
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    let outcome = engine.run().await.unwrap();

    assert_eq!(outcome, RunOutcome::Complete);
    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].offset, calls[0].limit), (100, 20));

    let storage = engine.into_store();
    assert_eq!(storage.count().unwrap(), 120);
    assert_eq!(stored_ids(&storage).len(), 120);

    let run = storage.latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_completed_sweep_is_idempotent() {
    let (_dir, db) = temp_db();
    let config = springfield_config(&db, 5000);

    let api = springfield_api();
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    let first_calls = api.calls();
    assert_eq!(first_calls.iter().filter(|c| c.is_probe()).count(), 1);
    assert_eq!(
        api.page_calls()
            .iter()
            .map(|c| (c.offset, c.limit))
            .collect::<Vec<_>>(),
        vec![(0, 50), (50, 50), (100, 20)]
    );
    let report = engine.report();
    assert_eq!(report.records_new, 120);
    assert_eq!(report.units_completed, 1);
    drop(engine);

    let api = springfield_api();
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    assert!(api.calls().is_empty());
    assert_eq!(engine.report().records_new, 0);
    assert_eq!(engine.store().count().unwrap(), 120);
}

#[tokio::test]
async fn test_budget_caps_requests_per_window() {
    let (_dir, db) = temp_db();

    let api = springfield_api();
    let mut engine =
        CrawlEngine::new(&springfield_config(&db, 2), api.clone(), open(&db)).unwrap();
    let outcome = engine.run().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Paused(StopReason::BudgetExhausted {
            consumed: 2,
            budget: 2
        })
    );
    assert_eq!(api.calls().len(), 2);
    assert_eq!(engine.store().count().unwrap(), 50);
    drop(engine);

    // Same window, same budget: nothing may be sent
    let api = springfield_api();
    let mut engine =
        CrawlEngine::new(&springfield_config(&db, 2), api.clone(), open(&db)).unwrap();
    assert!(matches!(
        engine.run().await.unwrap(),
        RunOutcome::Paused(StopReason::BudgetExhausted { .. })
    ));
    assert!(api.calls().is_empty());
    let run = engine.store().latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Paused);
    drop(engine);

    // A larger budget continues the same window where it left off
    let api = springfield_api();
    let mut engine =
        CrawlEngine::new(&springfield_config(&db, 100), api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);
    assert_eq!(
        api.calls()
            .iter()
            .map(|c| c.offset)
            .collect::<Vec<_>>(),
        vec![50, 100]
    );

    let storage = engine.into_store();
    assert_eq!(storage.count().unwrap(), 120);
    assert_eq!(storage.load_limiter_window().unwrap().unwrap().consumed, 4);
}

#[tokio::test]
async fn test_crash_between_records_and_cursor_refetches_one_page() {
    let (_dir, db) = temp_db();
    let config = springfield_config(&db, 5000);

    // Ledger writes: begin, page 1 commit, then page 2's commit fails after
    // its records were stored
    let store = FailingLedger::new(open(&db), 2);
    let mut engine = CrawlEngine::new(&config, springfield_api(), store).unwrap();
    let result = engine.run().await;

    assert!(matches!(result, Err(SweepError::Storage(_))));
    drop(engine);

    let storage = open(&db);
    assert_eq!(storage.count().unwrap(), 100);
    assert_eq!(
        storage.latest_run().unwrap().unwrap().status,
        RunStatus::Failed
    );

    let api = springfield_api();
    let mut engine = CrawlEngine::new(&config, api.clone(), storage).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    assert_eq!(
        api.calls()
            .iter()
            .map(|c| c.offset)
            .collect::<Vec<_>>(),
        vec![50, 100]
    );
    let report = engine.report();
    assert_eq!(report.records_duplicate, 50);
    assert_eq!(report.records_new, 20);

    let storage = engine.into_store();
    assert_eq!(storage.count().unwrap(), 120);
    assert_eq!(stored_ids(&storage).len(), 120);
}

#[tokio::test]
async fn test_overlapping_areas_store_each_business_once() {
    let (_dir, db) = temp_db();
    let config = config_with(
        &db,
        r#"
[[area]]
location = "Springfield, IL"

[[area]]
location = "Chatham, IL"
"#,
    );

    // Chatham shares ten businesses with Springfield
    let mut chatham = businesses("spr", 50..60);
    chatham.extend(businesses("cha", 0..30));

    let api = FakeApi::new()
        .with_dataset("Springfield, IL", businesses("spr", 0..60))
        .with_dataset("Chatham, IL", chatham);

    let mut engine = CrawlEngine::new(&config, api, open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    let report = engine.report();
    assert_eq!(report.units_completed, 2);
    assert_eq!(report.records_new, 90);
    assert_eq!(report.records_duplicate, 10);

    let storage = engine.into_store();
    assert_eq!(storage.count().unwrap(), 90);

    // The first unit to find a business owns it
    let shared: BusinessRecord = storage
        .iterate()
        .map(|r| r.unwrap())
        .find(|r| r.id == "spr-055")
        .unwrap();
    assert_eq!(shared.location_query, "Springfield, IL");
    assert_eq!(shared.unit_id, location_unit_id("Springfield, IL"));
}

#[tokio::test]
async fn test_filters_are_separate_units() {
    let (_dir, db) = temp_db();
    let config = config_with(
        &db,
        r#"
[search]
filters = ["Black owned"]
include-unfiltered = true

[[area]]
location = "Springfield, IL"
"#,
    );

    let api = FakeApi::new().with_dataset("Springfield, IL", businesses("spr", 0..30));
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    let filters: Vec<Option<String>> = api.page_calls().into_iter().map(|c| c.filter).collect();
    assert_eq!(filters, vec![Some("Black owned".to_string()), None]);

    // The unfiltered pass finds nothing new
    let report = engine.report();
    assert_eq!(report.units_completed, 2);
    assert_eq!(report.records_new, 30);
    assert_eq!(report.records_duplicate, 30);

    let stats = load_statistics(engine.store()).unwrap();
    assert_eq!(stats.planned_units, 2);
    assert_eq!(stats.units.complete, 2);
}

#[tokio::test]
async fn test_zip_partitions_reach_past_the_ceiling() {
    let (_dir, db) = temp_db();
    let config = config_with(
        &db,
        r#"
[api]
page-size = 10
max-results = 20

[[area]]
location = "Springfield, IL"
partitions = ["62701", "62702"]
"#,
    );

    let api = FakeApi::new()
        .with_dataset("Springfield, IL", businesses("spr", 0..40))
        .with_dataset("Springfield, IL 62701", businesses("spr", 0..15))
        .with_dataset("Springfield, IL 62702", businesses("spr", 10..25));

    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    let calls = api.calls();
    assert!(calls[0].is_probe());
    assert_eq!(calls[0].location, "Springfield, IL");
    assert_eq!(
        api.page_calls()
            .iter()
            .map(|c| (c.location.as_str(), c.offset, c.limit))
            .collect::<Vec<_>>(),
        vec![
            ("Springfield, IL 62701", 0, 10),
            ("Springfield, IL 62701", 10, 5),
            ("Springfield, IL 62702", 0, 10),
            ("Springfield, IL 62702", 10, 5),
        ]
    );

    let report = engine.report();
    assert_eq!(report.units_planned, 2);
    assert_eq!(report.units_truncated, 0);
    assert_eq!(engine.store().count().unwrap(), 25);
    drop(engine);

    // The stored plan is reused: no probe on the next run
    let api = FakeApi::new().with_dataset("Springfield, IL", businesses("spr", 0..40));
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_abandoned_run_still_charges_sent_requests() {
    let (_dir, db) = temp_db();

    // Planner count, pages 1 and 2, then page 3 never answers
    let api = springfield_api().stall_from(3);
    let mut engine =
        CrawlEngine::new(&springfield_config(&db, 10), api.clone(), open(&db)).unwrap();
    let result = tokio::time::timeout(Duration::from_millis(200), engine.run()).await;
    assert!(result.is_err());
    assert_eq!(api.calls().len(), 4);
    drop(engine);

    let storage = open(&db);
    let window = storage.load_limiter_window().unwrap().unwrap();
    assert_eq!(window.consumed, 4);
    assert_eq!(storage.count().unwrap(), 100);
    drop(storage);

    // One request left in the window: just enough for the last page
    let api = springfield_api();
    let mut engine =
        CrawlEngine::new(&springfield_config(&db, 5), api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].offset, 100);

    let storage = engine.into_store();
    assert_eq!(storage.count().unwrap(), 120);
    assert_eq!(storage.load_limiter_window().unwrap().unwrap().consumed, 5);
}

#[tokio::test]
async fn test_location_without_partitions_is_truncated_at_ceiling() {
    let (_dir, db) = temp_db();
    let config = config_with(
        &db,
        r#"
[api]
page-size = 10
max-results = 20

[[area]]
location = "Springfield, IL"
"#,
    );

    let api = FakeApi::new().with_dataset("Springfield, IL", businesses("spr", 0..40));
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    assert_eq!(
        api.page_calls()
            .iter()
            .map(|c| (c.offset, c.limit))
            .collect::<Vec<_>>(),
        vec![(0, 10), (10, 10)]
    );
    assert_eq!(engine.report().units_truncated, 1);
    assert_eq!(engine.store().count().unwrap(), 20);

    let progress = engine
        .state()
        .progress(&location_unit_id("Springfield, IL"))
        .unwrap();
    assert_eq!(progress.status, UnitStatus::Complete);
    assert!(progress.truncated);
    assert!(progress.possibly_truncated);
    assert_eq!(progress.next_cursor, None);
    assert_eq!(engine.report().units_possibly_truncated, 1);

    let stats = load_statistics(engine.store()).unwrap();
    assert_eq!(stats.units.possibly_truncated, 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let (_dir, db) = temp_db();
    let config = springfield_config(&db, 5000);

    let api = springfield_api().fail_call(1, FetchError::Transient("HTTP 503".to_string()));
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    assert_eq!(
        api.page_calls()
            .iter()
            .map(|c| c.offset)
            .collect::<Vec<_>>(),
        vec![0, 0, 50, 100]
    );
    let report = engine.report();
    assert_eq!(report.requests_issued, 5);
    assert_eq!(report.units_truncated, 0);
    assert_eq!(engine.store().count().unwrap(), 120);
}

#[tokio::test]
async fn test_fatal_failure_completes_unit_as_truncated() {
    let (_dir, db) = temp_db();
    let config = springfield_config(&db, 5000);

    let api = springfield_api().fail_call(
        2,
        FetchError::Fatal {
            status: Some(400),
            detail: "VALIDATION_ERROR".to_string(),
        },
    );
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    assert_eq!(api.calls().len(), 3);
    assert_eq!(engine.report().units_truncated, 1);
    assert_eq!(engine.store().count().unwrap(), 50);

    let progress = engine
        .state()
        .progress(&location_unit_id("Springfield, IL"))
        .unwrap();
    assert_eq!(progress.status, UnitStatus::Complete);
    assert!(progress.truncated);
    drop(engine);

    // A completed unit is never fetched again
    let api = springfield_api();
    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_bounding_box_is_split_into_quadrants() {
    let (_dir, db) = temp_db();
    let config = config_with(
        &db,
        r#"
[api]
page-size = 10
max-results = 20

[[area]]
bbox = { south = 39.70, west = -89.70, north = 39.80, east = -89.60 }
"#,
    );

    let root = biz_sweep::planner::BoundingBox::new(39.70, -89.70, 39.80, -89.60);
    let mut api = FakeApi::new().with_dataset(&root.canonical(), businesses("box", 0..40));
    for (i, quadrant) in root.quadrants().iter().enumerate() {
        let prefix = format!("q{}", i);
        api = api.with_dataset(&quadrant.canonical(), businesses(&prefix, 0..10));
    }

    let mut engine = CrawlEngine::new(&config, api.clone(), open(&db)).unwrap();
    assert_eq!(engine.run().await.unwrap(), RunOutcome::Complete);

    // Root probe plus one probe per quadrant, then one page per quadrant
    let calls = api.calls();
    assert_eq!(calls.iter().filter(|c| c.is_probe()).count(), 5);
    let pages: Vec<String> = api.page_calls().into_iter().map(|c| c.location).collect();
    let expected: Vec<String> = root.quadrants().iter().map(|q| q.canonical()).collect();
    assert_eq!(pages, expected);

    assert_eq!(engine.report().units_planned, 4);
    assert_eq!(engine.store().count().unwrap(), 40);
}

#[tokio::test]
async fn test_stats_and_export_reflect_the_sweep() {
    let (dir, db) = temp_db();
    let config = springfield_config(&db, 5000);

    let mut engine = CrawlEngine::new(&config, springfield_api(), open(&db))
        .unwrap()
        .with_config_hash("abc123");
    engine.run().await.unwrap();
    let storage = engine.into_store();

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total_records, 120);
    assert_eq!(stats.planned_units, 1);
    assert_eq!(stats.units.complete, 1);
    assert_eq!(stats.units.pending, 0);
    assert_eq!(stats.limiter.unwrap().consumed, 4);
    assert_eq!(stats.latest_run.unwrap().config_hash, "abc123");

    let out = dir.path().join("businesses.jsonl");
    let written = export_jsonl(&storage, &out).unwrap();
    assert_eq!(written, 120);

    let content = std::fs::read_to_string(&out).unwrap();
    let records: Vec<BusinessRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 120);
    assert_eq!(records[0].id, "spr-000");
    assert_eq!(records[119].id, "spr-119");
    assert!(records.iter().all(|r| r.location_query == "Springfield, IL"));
}
