use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, info, warn};

use crate::{
    database::{
        ChapterCandidate, ChapterUrl, PickedUrl, ResolvedChapter, UnlockedBook, VideoPath,
    },
    server::{
        error::{DramaboxError, DramaboxResult},
        services::{
            cache_services::{DETAIL_CACHE_TTL, DynCacheService, cache_key},
            dramabox_services::{DramaboxServiceTrait, DynDramaboxService},
        },
    },
};

pub type DynChapterService = Arc<dyn ChapterServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait ChapterServiceTrait {
    /// bulk first, per-chapter fallback second. `DramaboxError::Unlock` when nothing resolved
    async fn resolve_chapters(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<UnlockedBook>;

    /// `Ok(None)` is a normal outcome: the chapter exists but has nothing playable
    async fn chapter_video_url(
        &self,
        book_id: &str,
        chapter_id: &str,
        quality: Option<i32>,
    ) -> DramaboxResult<Option<PickedUrl>>;

    async fn all_chapter_urls(
        &self,
        book_id: &str,
        quality: Option<i32>,
    ) -> DramaboxResult<Vec<ChapterUrl>>;
}

pub struct ChapterService {
    api: DynDramaboxService,
    cache: DynCacheService,
}

impl ChapterService {
    pub fn new(api: DynDramaboxService, cache: DynCacheService) -> Self {
        Self { api, cache }
    }

    /// fast path. `Ok(None)` means the endpoint answered but had nothing for us
    async fn unlock_in_bulk(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<Option<UnlockedBook>> {
        let batch = self.api.batch_download(book_id, chapter_ids).await?;

        if batch.chapters.is_empty() {
            return Ok(None);
        }

        Ok(Some(UnlockedBook {
            chapters: dedupe_chapters(batch.chapters),
            book_name: batch.book_name,
            book_cover: batch.book_cover,
            introduction: batch.introduction,
        }))
    }

    /// one chapter per call, strictly in order. the load endpoint rate limits hard so these
    /// are never run concurrently. a failed chapter is skipped, partial results are fine
    async fn unlock_per_chapter(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<UnlockedBook> {
        let detail = self.api.book_detail(book_id).await?;
        let mut candidates: Vec<ChapterCandidate> = Vec::new();

        for chapter_id in chapter_ids.iter().filter(|id| !id.is_empty()) {
            let Some(index) = detail.play_index(chapter_id) else {
                warn!("chapter {} is not listed in book {}, skipping", chapter_id, book_id);
                continue;
            };

            match self.api.batch_load(book_id, index).await {
                Ok(loaded) => {
                    match loaded.into_iter().find(|c| c.chapter_id == *chapter_id) {
                        Some(chapter) => candidates.push(chapter),
                        None => warn!(
                            "load for chapter {} (index {}) returned nothing matching",
                            chapter_id, index
                        ),
                    }
                }
                Err(e) => {
                    warn!(
                        "failed to load chapter {} (index {}): {}, continuing",
                        chapter_id, index, e
                    );
                }
            }
        }

        let chapters = dedupe_chapters(candidates);
        if chapters.is_empty() {
            return Err(DramaboxError::Unlock(
                "No chapters could be unlocked".to_string(),
            ));
        }

        info!(
            "per-chapter fallback resolved {}/{} chapters for {}",
            chapters.len(),
            chapter_ids.len(),
            book_id
        );

        Ok(UnlockedBook {
            chapters,
            book_name: detail.book.book_name,
            book_cover: detail.book.cover,
            introduction: detail.book.introduction,
        })
    }
}

#[async_trait]
impl ChapterServiceTrait for ChapterService {
    async fn resolve_chapters(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<UnlockedBook> {
        info!("unlocking {} chapters of {}", chapter_ids.len(), book_id);

        match self.unlock_in_bulk(book_id, chapter_ids).await {
            Ok(Some(unlocked)) => {
                debug!("bulk strategy resolved {} chapters", unlocked.chapters.len());
                return Ok(unlocked);
            }
            Ok(None) => info!("bulk strategy returned no chapters for {}, falling back", book_id),
            Err(e) => warn!("bulk strategy failed for {}: {}, falling back", book_id, e),
        }

        self.unlock_per_chapter(book_id, chapter_ids).await
    }

    async fn chapter_video_url(
        &self,
        book_id: &str,
        chapter_id: &str,
        quality: Option<i32>,
    ) -> DramaboxResult<Option<PickedUrl>> {
        let unlocked = self
            .resolve_chapters(book_id, &[chapter_id.to_string()])
            .await?;

        Ok(unlocked
            .chapters
            .iter()
            .find(|chapter| chapter.chapter_id == chapter_id)
            .and_then(|chapter| pick_url(chapter, quality)))
    }

    async fn all_chapter_urls(
        &self,
        book_id: &str,
        quality: Option<i32>,
    ) -> DramaboxResult<Vec<ChapterUrl>> {
        let quality_key = quality
            .filter(|q| *q > 0)
            .map(|q| q.to_string())
            .unwrap_or_else(|| "best".to_string());
        let key = cache_key("episodes", &format!("{}:{}", book_id, quality_key));

        if let Some(cached) = self.cache.get_json::<Vec<ChapterUrl>>(&key).await {
            debug!("using cached episode urls for {}", book_id);
            return Ok(cached);
        }

        let detail = self.api.book_detail(book_id).await?;
        let chapter_ids: Vec<String> = detail.chapter_list.iter().map(|c| c.id.clone()).collect();

        let mut unlocked = self.resolve_chapters(book_id, &chapter_ids).await?;
        unlocked.chapters.sort_by_key(|chapter| chapter.chapter_index);

        let urls: Vec<ChapterUrl> = unlocked
            .chapters
            .iter()
            .filter_map(|chapter| {
                let picked = pick_url(chapter, quality)?;
                Some(ChapterUrl {
                    chapter_index: chapter.chapter_index,
                    chapter_id: chapter.chapter_id.clone(),
                    mp4_url: picked.url,
                    quality_selected: picked.quality,
                })
            })
            .collect();

        self.cache.set_json(&key, &urls, DETAIL_CACHE_TTL).await;
        Ok(urls)
    }
}

/// first chapter seen per index wins, later ones are dropped (overlapping pages happen)
pub fn dedupe_chapters(
    candidates: impl IntoIterator<Item = ChapterCandidate>,
) -> Vec<ResolvedChapter> {
    let mut seen: HashSet<i64> = HashSet::new();

    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.chapter_index))
        .map(ResolvedChapter::from)
        .collect()
}

/// absolute paths pass through, relative ones get the cdn domain in front
pub fn join_cdn_url(cdn_domain: &str, video_path: &str) -> String {
    if video_path.starts_with("http://") || video_path.starts_with("https://") {
        return video_path.to_string();
    }

    let base = cdn_domain.trim_end_matches('/');
    if base.is_empty() {
        return video_path.to_string();
    }

    format!("{}/{}", base, video_path.trim_start_matches('/'))
}

/// with a quality: first exact match scanning cdns in order. without: the highest quality of
/// the first cdn that has any paths, cdns are never merged
pub fn pick_url(chapter: &ResolvedChapter, quality: Option<i32>) -> Option<PickedUrl> {
    match quality.filter(|q| *q > 0) {
        Some(wanted) => chapter.cdn_list.iter().find_map(|cdn| {
            cdn.video_path_list
                .iter()
                .find(|path| path.quality == wanted)
                .map(|path| PickedUrl {
                    url: join_cdn_url(&cdn.cdn_domain, &path.video_path),
                    quality: path.quality,
                })
        }),
        None => chapter.cdn_list.iter().find_map(|cdn| {
            let best = highest_quality(&cdn.video_path_list)?;

            Some(PickedUrl {
                url: join_cdn_url(&cdn.cdn_domain, &best.video_path),
                quality: best.quality,
            })
        }),
    }
}

/// ties keep the earlier entry
fn highest_quality(paths: &[VideoPath]) -> Option<&VideoPath> {
    let mut best: Option<&VideoPath> = None;
    for path in paths {
        if best.is_none_or(|current| path.quality > current.quality) {
            best = Some(path);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::CdnOption;

    fn path(quality: i32, video_path: &str) -> VideoPath {
        VideoPath {
            quality,
            video_path: video_path.to_string(),
            is_default: false,
        }
    }

    fn chapter(cdn_list: Vec<CdnOption>) -> ResolvedChapter {
        ResolvedChapter {
            chapter_id: "c1".to_string(),
            chapter_index: 0,
            chapter_name: "EP 1".to_string(),
            chapter_img: String::new(),
            cdn_list,
        }
    }

    fn cdn(domain: &str, paths: Vec<VideoPath>) -> CdnOption {
        CdnOption {
            cdn_domain: domain.to_string(),
            is_default: false,
            video_path_list: paths,
        }
    }

    #[test]
    fn picks_highest_quality_of_first_cdn_when_unspecified() {
        let ch = chapter(vec![
            cdn("https://a.cdn/", vec![path(540, "/x540.mp4"), path(720, "/x720.mp4")]),
            cdn("https://b.cdn", vec![path(1080, "x1080.mp4")]),
        ]);

        let picked = pick_url(&ch, None).unwrap();
        assert_eq!(picked.url, "https://a.cdn/x720.mp4");
        assert_eq!(picked.quality, 720);
    }

    #[test]
    fn picks_first_cdn_with_requested_quality() {
        let ch = chapter(vec![
            cdn("https://a.cdn", vec![path(540, "x540.mp4")]),
            cdn("https://b.cdn", vec![path(1080, "x1080.mp4")]),
        ]);

        let picked = pick_url(&ch, Some(1080)).unwrap();
        assert_eq!(picked.url, "https://b.cdn/x1080.mp4");
        assert!(pick_url(&ch, Some(360)).is_none());
    }

    #[test]
    fn skips_cdns_without_paths_and_treats_zero_as_unspecified() {
        let ch = chapter(vec![
            cdn("https://empty.cdn", vec![]),
            cdn("https://b.cdn", vec![path(720, "a.mp4"), path(720, "b.mp4")]),
        ]);

        let picked = pick_url(&ch, Some(0)).unwrap();
        assert_eq!(picked.url, "https://b.cdn/a.mp4");
        assert!(pick_url(&chapter(vec![]), None).is_none());
    }

    #[test]
    fn absolute_paths_are_not_joined() {
        assert_eq!(
            join_cdn_url("https://a.cdn", "https://other/v.mp4"),
            "https://other/v.mp4"
        );
        assert_eq!(join_cdn_url("", "/v.mp4"), "/v.mp4");
    }

    #[test]
    fn dedupe_keeps_first_per_index() {
        let make = |id: &str, index: i64| ChapterCandidate {
            chapter_id: id.to_string(),
            chapter_index: index,
            ..Default::default()
        };

        let chapters = dedupe_chapters(vec![make("a", 0), make("b", 1), make("a-dup", 0)]);
        let ids: Vec<&str> = chapters.iter().map(|c| c.chapter_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
