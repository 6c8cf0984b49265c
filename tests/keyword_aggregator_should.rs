use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use drama_edge::database::{Book, BookDetail, ChapterCandidate, UnlockBatch};
use drama_edge::server::error::{DramaboxError, DramaboxResult};
use drama_edge::server::services::{
    cache_services::CacheService,
    dramabox_services::{DramaboxServiceTrait, DynDramaboxService, MockDramaboxServiceTrait},
    keyword_services::{KeywordService, KeywordServiceTrait},
};

fn book(id: &str) -> Book {
    Book {
        book_id: id.to_string(),
        book_name: format!("Book {}", id),
        ..Default::default()
    }
}

fn books(ids: &[&str]) -> Vec<Book> {
    ids.iter().map(|id| book(id)).collect()
}

fn keywords(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

fn aggregator(api: MockDramaboxServiceTrait) -> KeywordService {
    KeywordService::new(
        Arc::new(api) as DynDramaboxService,
        Arc::new(CacheService::memory_only()),
    )
}

#[tokio::test]
async fn test_keywords_are_deduplicated_case_insensitively() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .withf(|keyword| keyword.to_string() == "drama")
        .times(1)
        .returning(|_| Ok(books(&["1", "2"])));

    let result = aggregator(api)
        .fetch_by_keywords(&keywords(&["Drama", "drama", " DRAMA "]), 10)
        .await;

    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn test_merge_follows_submission_order_and_stops_at_limit() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .withf(|keyword| keyword.to_string() == "ceo")
        .returning(|_| Ok(books(&["a", "b", "c"])));
    api.expect_search_suggest()
        .withf(|keyword| keyword.to_string() == "revenge")
        .returning(|_| Ok(books(&["b", "d", "e", "f"])));

    let result = aggregator(api)
        .fetch_by_keywords(&keywords(&["CEO", "Revenge"]), 4)
        .await;

    let ids: Vec<&str> = result.iter().map(|b| b.book_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_fewer_than_limit_when_results_run_out() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .returning(|_| Ok(books(&["only"])));

    let result = aggregator(api)
        .fetch_by_keywords(&keywords(&["x"]), 50)
        .await;

    assert_eq!(result.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cached_result_is_reused_until_the_ttl_passes() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .times(2)
        .returning(|_| Ok(books(&["r1"])));

    let service = aggregator(api);

    service.search("romance").await;
    tokio::time::advance(Duration::from_secs(299)).await;
    let cached = service.search("Romance").await;
    assert_eq!(cached.len(), 1);

    // second upstream call only after the five minutes are up
    tokio::time::advance(Duration::from_secs(2)).await;
    let refreshed = service.search("romance").await;
    assert_eq!(refreshed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_then_caches_the_empty_result() {
    let mut api = MockDramaboxServiceTrait::new();
    // one call plus two retries, then nothing until the negative entry expires
    api.expect_search_suggest()
        .times(3)
        .returning(|_| Err(DramaboxError::Transport("reset".to_string())));

    let service = aggregator(api);

    let started = tokio::time::Instant::now();
    let first = service.search("broken").await;
    assert!(first.is_empty());
    // 250ms then 500ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(750));

    let second = service.search("broken").await;
    assert!(second.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_on_a_later_attempt() {
    let mut api = MockDramaboxServiceTrait::new();
    let mut seq = mockall::Sequence::new();
    api.expect_search_suggest()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(DramaboxError::Upstream { status: 503, body_excerpt: String::new() }));
    api.expect_search_suggest()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(books(&["late"])));

    let result = aggregator(api).search("flaky").await;

    assert_eq!(result[0].book_id, "late");
}

#[tokio::test(start_paused = true)]
async fn test_signature_failures_are_not_retried() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .times(1)
        .returning(|_| Err(DramaboxError::Signature("no key".to_string())));

    let result = aggregator(api).search("anything").await;

    assert!(result.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_api_errors_are_not_retried() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .times(1)
        .returning(|_| Err(DramaboxError::Api { message: "keyword blocked".to_string() }));

    let service = aggregator(api);

    let started = tokio::time::Instant::now();
    let result = service.search("blocked").await;
    assert!(result.is_empty());
    assert!(started.elapsed() < Duration::from_millis(250));

    // the empty answer is cached like any other give-up
    assert!(service.search("blocked").await.is_empty());
}

/// suggest answers after a per-keyword delay, nothing else is ever called
struct SlowSuggest;

#[async_trait]
impl DramaboxServiceTrait for SlowSuggest {
    async fn search_suggest(&self, keyword: &str) -> DramaboxResult<Vec<Book>> {
        let (delay, ids) = match keyword {
            "slow" => (Duration::from_secs(1), ["s1", "s2"]),
            _ => (Duration::from_millis(500), ["f1", "s1"]),
        };
        tokio::time::sleep(delay).await;
        Ok(books(&ids))
    }

    async fn search(&self, _: &str, _: u32) -> DramaboxResult<Vec<Book>> {
        unreachable!()
    }

    async fn book_detail(&self, _: &str) -> DramaboxResult<BookDetail> {
        unreachable!()
    }

    async fn batch_download(&self, _: &str, _: &[String]) -> DramaboxResult<UnlockBatch> {
        unreachable!()
    }

    async fn batch_load(&self, _: &str, _: i64) -> DramaboxResult<Vec<ChapterCandidate>> {
        unreachable!()
    }

    async fn bootstrap(&self) -> DramaboxResult<String> {
        unreachable!()
    }

    async fn theater(&self) -> DramaboxResult<Value> {
        unreachable!()
    }

    async fn stream(&self, _: &str, _: i64) -> DramaboxResult<Vec<ChapterCandidate>> {
        unreachable!()
    }
}

#[tokio::test(start_paused = true)]
async fn test_keywords_are_looked_up_concurrently() {
    let service = KeywordService::new(
        Arc::new(SlowSuggest) as DynDramaboxService,
        Arc::new(CacheService::memory_only()),
    );

    let started = tokio::time::Instant::now();
    let result = service
        .fetch_by_keywords(&keywords(&["slow", "fast"]), 10)
        .await;
    let elapsed = started.elapsed();

    // one second for both, not the one and a half it would take one after the other
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1500));

    // "fast" finished first but the merge still follows submission order
    let ids: Vec<&str> = result.iter().map(|b| b.book_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "f1"]);
}

#[tokio::test(start_paused = true)]
async fn test_one_failing_keyword_does_not_sink_the_rest() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_search_suggest()
        .withf(|keyword| keyword.to_string() == "bad")
        .returning(|_| Err(DramaboxError::Api { message: "nope".to_string() }));
    api.expect_search_suggest()
        .withf(|keyword| keyword.to_string() == "good")
        .returning(|_| Ok(books(&["g1"])));

    let result = aggregator(api)
        .fetch_by_keywords(&keywords(&["bad", "good"]), 10)
        .await;

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].book_id, "g1");
}

#[tokio::test]
async fn test_view_counts_are_filled_in_only_where_missing() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_book_detail()
        .withf(|id| id.to_string() == "zero")
        .times(1)
        .returning(|_| {
            Ok(BookDetail {
                book: Book {
                    book_id: "zero".to_string(),
                    view_count: 9001,
                    ..Default::default()
                },
                ..Default::default()
            })
        });
    api.expect_book_detail()
        .withf(|id| id.to_string() == "gone")
        .returning(|_| Err(DramaboxError::Upstream { status: 404, body_excerpt: String::new() }));

    let mut counted = book("counted");
    counted.view_count = 5;

    let service = aggregator(api);
    let enriched = service
        .enrich_view_counts(vec![counted, book("zero"), book("gone")], 2)
        .await;

    assert_eq!(enriched[0].view_count, 5);
    assert_eq!(enriched[1].view_count, 9001);
    assert_eq!(enriched[2].view_count, 0);

    // the looked-up count is cached, no second detail call
    let again = service.enrich_view_counts(vec![book("zero")], 10).await;
    assert_eq!(again[0].view_count, 9001);
}
