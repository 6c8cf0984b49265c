use std::sync::Arc;

use mockall::Sequence;

use drama_edge::database::{
    Book, BookDetail, CdnOption, ChapterCandidate, ChapterItem, UnlockBatch, VideoPath,
};
use drama_edge::server::error::DramaboxError;
use drama_edge::server::services::{
    cache_services::CacheService,
    chapter_services::{ChapterService, ChapterServiceTrait},
    dramabox_services::{DynDramaboxService, MockDramaboxServiceTrait},
};

fn candidate(id: &str, index: i64, quality: i32) -> ChapterCandidate {
    ChapterCandidate {
        chapter_id: id.to_string(),
        chapter_index: index,
        chapter_name: format!("EP {}", index),
        chapter_img: String::new(),
        cdn_list: vec![CdnOption {
            cdn_domain: "https://cdn.example".to_string(),
            is_default: true,
            video_path_list: vec![VideoPath {
                quality,
                video_path: format!("/{}/{}.mp4", id, quality),
                is_default: true,
            }],
        }],
    }
}

fn detail() -> BookDetail {
    BookDetail {
        book: Book {
            book_id: "b1".to_string(),
            book_name: "From Detail".to_string(),
            cover: "https://img/b1.jpg".to_string(),
            ..Default::default()
        },
        recommends: vec![],
        chapter_list: ["c1", "c2", "c3"]
            .iter()
            .enumerate()
            .map(|(i, id)| ChapterItem {
                id: id.to_string(),
                index: i as i64,
                ..Default::default()
            })
            .collect(),
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|id| id.to_string()).collect()
}

fn resolver(api: MockDramaboxServiceTrait) -> ChapterService {
    ChapterService::new(
        Arc::new(api) as DynDramaboxService,
        Arc::new(CacheService::memory_only()),
    )
}

#[tokio::test]
async fn test_bulk_success_skips_the_fallback() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download().times(1).returning(|_, _| {
        Ok(UnlockBatch {
            chapters: vec![candidate("c1", 1, 720), candidate("c2", 2, 720)],
            book_name: "Bulk".to_string(),
            ..Default::default()
        })
    });
    api.expect_book_detail().times(0);
    api.expect_batch_load().times(0);

    let unlocked = resolver(api)
        .resolve_chapters("b1", &ids(&["c1", "c2"]))
        .await
        .unwrap();

    assert_eq!(unlocked.book_name, "Bulk");
    assert_eq!(unlocked.chapters.len(), 2);
}

#[tokio::test]
async fn test_bulk_duplicates_keep_the_first_per_index() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download().returning(|_, _| {
        Ok(UnlockBatch {
            chapters: vec![
                candidate("c1", 1, 720),
                candidate("c2", 2, 720),
                candidate("c1-late", 1, 1080),
            ],
            ..Default::default()
        })
    });

    let unlocked = resolver(api)
        .resolve_chapters("b1", &ids(&["c1", "c2"]))
        .await
        .unwrap();

    let chapter_ids: Vec<&str> = unlocked.chapters.iter().map(|c| c.chapter_id.as_str()).collect();
    assert_eq!(chapter_ids, vec!["c1", "c2"]);
}

#[tokio::test]
async fn test_fallback_runs_in_order_and_keeps_partial_results() {
    let mut api = MockDramaboxServiceTrait::new();
    let mut seq = Sequence::new();

    api.expect_batch_download()
        .returning(|_, _| Err(DramaboxError::Transport("connection reset".to_string())));
    api.expect_book_detail().times(1).returning(|_| Ok(detail()));

    // play index is the 0-based detail index plus one
    api.expect_batch_load()
        .withf(|_, index| *index == 1)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(vec![candidate("c1", 1, 720)]));
    api.expect_batch_load()
        .withf(|_, index| *index == 2)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(DramaboxError::Upstream { status: 500, body_excerpt: String::new() }));
    api.expect_batch_load()
        .withf(|_, index| *index == 3)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(vec![candidate("c3", 3, 540)]));

    let unlocked = resolver(api)
        .resolve_chapters("b1", &ids(&["c1", "c2", "c3"]))
        .await
        .unwrap();

    let chapter_ids: Vec<&str> = unlocked.chapters.iter().map(|c| c.chapter_id.as_str()).collect();
    assert_eq!(chapter_ids, vec!["c1", "c3"]);
    assert_eq!(unlocked.book_name, "From Detail");
    assert_eq!(unlocked.book_cover, "https://img/b1.jpg");
}

#[tokio::test]
async fn test_empty_bulk_result_falls_back() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download()
        .returning(|_, _| Ok(UnlockBatch::default()));
    api.expect_book_detail().times(1).returning(|_| Ok(detail()));
    api.expect_batch_load()
        .times(1)
        .returning(|_, _| Ok(vec![candidate("c2", 2, 720)]));

    let unlocked = resolver(api)
        .resolve_chapters("b1", &ids(&["c2"]))
        .await
        .unwrap();

    assert_eq!(unlocked.chapters[0].chapter_id, "c2");
}

#[tokio::test]
async fn test_load_answering_with_another_chapter_is_skipped() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download()
        .returning(|_, _| Ok(UnlockBatch::default()));
    api.expect_book_detail().returning(|_| Ok(detail()));
    api.expect_batch_load()
        .returning(|_, _| Ok(vec![candidate("c9", 9, 720)]));

    let result = resolver(api).resolve_chapters("b1", &ids(&["c1"])).await;

    assert!(matches!(result, Err(DramaboxError::Unlock(_))));
}

#[tokio::test]
async fn test_nothing_resolved_is_an_unlock_error() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download()
        .returning(|_, _| Err(DramaboxError::Api { message: "locked".to_string() }));
    api.expect_book_detail().returning(|_| Ok(detail()));
    api.expect_batch_load()
        .times(2)
        .returning(|_, _| Err(DramaboxError::Transport("timeout".to_string())));

    let result = resolver(api).resolve_chapters("b1", &ids(&["c1", "c2"])).await;

    match result {
        Err(DramaboxError::Unlock(message)) => {
            assert_eq!(message, "No chapters could be unlocked")
        }
        other => panic!("expected unlock error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_detail_failure_in_fallback_propagates() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download()
        .returning(|_, _| Ok(UnlockBatch::default()));
    api.expect_book_detail()
        .returning(|_| Err(DramaboxError::Upstream { status: 404, body_excerpt: String::new() }));
    api.expect_batch_load().times(0);

    let result = resolver(api).resolve_chapters("b1", &ids(&["c1"])).await;

    assert!(matches!(result, Err(DramaboxError::Upstream { status: 404, .. })));
}

#[tokio::test]
async fn test_chapter_video_url_picks_from_the_unlocked_chapter() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_batch_download().returning(|_, _| {
        Ok(UnlockBatch {
            chapters: vec![candidate("c2", 2, 1080)],
            ..Default::default()
        })
    });

    let service = resolver(api);

    let picked = service.chapter_video_url("b1", "c2", None).await.unwrap().unwrap();
    assert_eq!(picked.url, "https://cdn.example/c2/1080.mp4");
    assert_eq!(picked.quality, 1080);

    let missing_quality = service.chapter_video_url("b1", "c2", Some(360)).await.unwrap();
    assert!(missing_quality.is_none());
}

#[tokio::test]
async fn test_all_chapter_urls_are_sorted_and_cached() {
    let mut api = MockDramaboxServiceTrait::new();
    api.expect_book_detail().times(1).returning(|_| Ok(detail()));
    api.expect_batch_download()
        .withf(|_, chapter_ids| chapter_ids.len() == 3)
        .times(1)
        .returning(|_, _| {
            let mut no_cdn = candidate("c2", 2, 720);
            no_cdn.cdn_list.clear();
            Ok(UnlockBatch {
                chapters: vec![candidate("c3", 3, 720), no_cdn, candidate("c1", 1, 720)],
                ..Default::default()
            })
        });

    let service = resolver(api);

    let urls = service.all_chapter_urls("b1", None).await.unwrap();
    let indexes: Vec<i64> = urls.iter().map(|u| u.chapter_index).collect();
    assert_eq!(indexes, vec![1, 3]);
    assert_eq!(urls[0].mp4_url, "https://cdn.example/c1/720.mp4");
    assert_eq!(urls[0].quality_selected, 720);

    // served from cache, the mock would panic on a second upstream call
    let again = service.all_chapter_urls("b1", None).await.unwrap();
    assert_eq!(again, urls);
}
