use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use mockall::automock;
use tracing::{debug, info, warn};

use crate::{
    database::{Book, KeywordCacheEntry},
    server::services::{
        cache_services::{DETAIL_CACHE_TTL, DynCacheService, SEARCH_CACHE_TTL, cache_key},
        dramabox_services::{DramaboxServiceTrait, DynDramaboxService},
    },
};

const MAX_RETRIES: u32 = 2;
const BACKOFF_STEP: Duration = Duration::from_millis(250);
pub const DEFAULT_ENRICH_BATCH_SIZE: usize = 10;

pub type DynKeywordService = Arc<dyn KeywordServiceTrait + Send + Sync>;

/// never fails: a keyword that keeps failing upstream just contributes nothing
#[automock]
#[async_trait]
pub trait KeywordServiceTrait {
    async fn search(&self, keyword: &str) -> Vec<Book>;
    async fn fetch_by_keywords(&self, keywords: &[String], limit: usize) -> Vec<Book>;
    async fn enrich_view_counts(&self, books: Vec<Book>, batch_size: usize) -> Vec<Book>;
}

pub struct KeywordService {
    api: DynDramaboxService,
    cache: DynCacheService,
}

impl KeywordService {
    pub fn new(api: DynDramaboxService, cache: DynCacheService) -> Self {
        Self { api, cache }
    }

    /// memory -> persisted -> upstream with linear backoff. the empty list after the last
    /// retry is cached too, so a bad keyword stays quiet for the rest of the ttl window
    async fn keyword_results(&self, lowered: &str) -> Vec<Book> {
        let key = cache_key("keyword", lowered);

        if let Some(entry) = self.cache.get_json::<KeywordCacheEntry>(&key).await {
            debug!("keyword '{}' served from cache ({} books)", lowered, entry.results.len());
            return entry.results;
        }

        let mut attempt = 0;
        let results = loop {
            match self.api.search_suggest(lowered).await {
                Ok(books) => break books,
                Err(e) if attempt < MAX_RETRIES && e.is_retryable() => {
                    attempt += 1;
                    let backoff = BACKOFF_STEP * attempt;
                    warn!(
                        "search for '{}' failed (attempt {}): {}, retrying in {:?}",
                        lowered, attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        "search for '{}' gave up after {} attempts: {}, caching empty result",
                        lowered,
                        attempt + 1,
                        e
                    );
                    break Vec::new();
                }
            }
        };

        let entry = KeywordCacheEntry {
            keyword: lowered.to_string(),
            results,
            cached_at: Utc::now(),
        };
        self.cache.set_json(&key, &entry, SEARCH_CACHE_TTL).await;

        entry.results
    }

    async fn view_count(&self, book_id: &str) -> Option<i64> {
        let key = cache_key("viewCount", book_id);

        if let Some(views) = self.cache.get_json::<i64>(&key).await {
            return Some(views);
        }

        match self.api.book_detail(book_id).await {
            Ok(detail) => {
                let views = detail.book.view_count;
                self.cache.set_json(&key, &views, DETAIL_CACHE_TTL).await;
                Some(views)
            }
            Err(e) => {
                debug!("no view count for {}: {}", book_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl KeywordServiceTrait for KeywordService {
    async fn search(&self, keyword: &str) -> Vec<Book> {
        let lowered = keyword.trim().to_lowercase();
        if lowered.is_empty() {
            return Vec::new();
        }

        self.keyword_results(&lowered).await
    }

    async fn fetch_by_keywords(&self, keywords: &[String], limit: usize) -> Vec<Book> {
        let mut unique: Vec<String> = Vec::new();
        for keyword in keywords {
            let lowered = keyword.trim().to_lowercase();
            if !lowered.is_empty() && !unique.contains(&lowered) {
                unique.push(lowered);
            }
        }

        info!("fetching {} unique keywords (limit {})", unique.len(), limit);

        // join_all hands results back in submission order whatever finishes first
        let per_keyword =
            join_all(unique.iter().map(|keyword| self.keyword_results(keyword))).await;

        merge_unique(per_keyword, limit)
    }

    async fn enrich_view_counts(&self, books: Vec<Book>, batch_size: usize) -> Vec<Book> {
        let mut enriched = books;

        for batch in enriched.chunks_mut(batch_size.max(1)) {
            let lookups = batch.iter().map(|book| async move {
                if book.view_count > 0 || book.book_id.is_empty() {
                    return None;
                }
                self.view_count(&book.book_id).await
            });

            let counts = join_all(lookups).await;
            for (book, views) in batch.iter_mut().zip(counts) {
                if let Some(views) = views {
                    book.view_count = views;
                }
            }
        }

        enriched
    }
}

/// flattens in list order, first occurrence of a book id wins, stops at `limit`
pub fn merge_unique(lists: Vec<Vec<Book>>, limit: usize) -> Vec<Book> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected: Vec<Book> = Vec::new();

    for book in lists.into_iter().flatten() {
        if collected.len() >= limit {
            break;
        }
        if book.book_id.is_empty() || !seen.insert(book.book_id.clone()) {
            continue;
        }
        collected.push(book);
    }

    collected
}
