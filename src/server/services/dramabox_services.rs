// typed wrappers over the upstream endpoints. every list that comes back goes through the
// normalizers so nothing above this layer ever sees raw upstream json
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    database::{
        BookDetail, Book, ChapterCandidate, UnlockBatch,
        normalize::{first_str, normalize_book_detail, normalize_book_list, normalize_chapter_list},
    },
    server::{
        error::{DramaboxError, DramaboxResult},
        services::fetch_services::AuthenticatedFetcher,
    },
};

pub const SEARCH_SUGGEST_PATH: &str = "/search/suggest";
pub const SEARCH_PATH: &str = "/search/search";
pub const THEATER_PATH: &str = "/he001/theater";
pub const BATCH_DOWNLOAD_PATH: &str = "/chapterv2/batchDownload";
pub const BATCH_LOAD_PATH: &str = "/chapterv2/batch/load";
pub const BOOTSTRAP_PATH: &str = "/ap001/bootstrap";
pub const BOOK_DETAIL_PATH: &str = "/book/detail/v2";

const SEARCH_PAGE_SIZE: u32 = 20;

pub type DynDramaboxService = Arc<dyn DramaboxServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait DramaboxServiceTrait {
    async fn search_suggest(&self, keyword: &str) -> DramaboxResult<Vec<Book>>;
    /// full-text search, 1-based pages of 20
    async fn search(&self, keyword: &str, page: u32) -> DramaboxResult<Vec<Book>>;
    async fn book_detail(&self, book_id: &str) -> DramaboxResult<BookDetail>;
    /// every requested chapter in one signed call
    async fn batch_download(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<UnlockBatch>;
    /// one chapter by 1-based play index
    async fn batch_load(
        &self,
        book_id: &str,
        index: i64,
    ) -> DramaboxResult<Vec<ChapterCandidate>>;
    /// issues a session token, returned without the `Bearer ` prefix
    async fn bootstrap(&self) -> DramaboxResult<String>;
    /// home feed (latest and ranked rows), handed back as upstream shaped it
    async fn theater(&self) -> DramaboxResult<Value>;
    /// one chapter by play index under a session bootstrapped just for this call
    async fn stream(&self, book_id: &str, index: i64) -> DramaboxResult<Vec<ChapterCandidate>>;
}

#[derive(Serialize)]
struct SearchSuggestPayload<'a> {
    keyword: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload<'a> {
    keyword: &'a str,
    page_no: u32,
    page_size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TheaterPayload {
    home_page_style: i64,
    is_need_rank: i64,
    index: i64,
    #[serde(rename = "type")]
    kind: i64,
    channel_id: i64,
}

impl Default for TheaterPayload {
    fn default() -> Self {
        Self {
            home_page_style: 0,
            is_need_rank: 1,
            index: 0,
            kind: 0,
            channel_id: 175,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchDownloadPayload<'a> {
    book_id: &'a str,
    chapter_id_list: &'a [String],
}

// field order is what the app sends, it's part of the signed bytes
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchLoadPayload<'a> {
    boundary_index: i64,
    coming_play_section_id: i64,
    index: i64,
    currency_play_source: &'a str,
    need_end_recommend: i64,
    currency_play_source_name: &'a str,
    pre_load: bool,
    rid: &'a str,
    pull_cid: &'a str,
    load_direction: i64,
    start_up_key: &'a str,
    book_id: &'a str,
}

impl<'a> BatchLoadPayload<'a> {
    fn new(book_id: &'a str, index: i64) -> Self {
        Self {
            boundary_index: 0,
            coming_play_section_id: -1,
            index,
            currency_play_source: "discover_new_rec_new",
            need_end_recommend: 0,
            currency_play_source_name: "",
            pre_load: false,
            rid: "",
            pull_cid: "",
            load_direction: 0,
            start_up_key: "",
            book_id,
        }
    }
}

pub struct DramaboxService {
    fetcher: AuthenticatedFetcher,
    detail_base_url: String,
    detail_language: String,
}

impl DramaboxService {
    pub fn new(
        fetcher: AuthenticatedFetcher,
        detail_base_url: impl Into<String>,
        detail_language: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            detail_base_url: detail_base_url.into().trim_end_matches('/').to_string(),
            detail_language: detail_language.into(),
        }
    }
}

#[async_trait]
impl DramaboxServiceTrait for DramaboxService {
    async fn search_suggest(&self, keyword: &str) -> DramaboxResult<Vec<Book>> {
        let data = self
            .fetcher
            .call(SEARCH_SUGGEST_PATH, &SearchSuggestPayload { keyword }, None)
            .await?;

        let books = normalize_book_list(&data);
        debug!("suggest '{}' returned {} books", keyword, books.len());
        Ok(books)
    }

    async fn search(&self, keyword: &str, page: u32) -> DramaboxResult<Vec<Book>> {
        let payload = SearchPayload {
            keyword,
            page_no: page.max(1),
            page_size: SEARCH_PAGE_SIZE,
        };
        let data = self.fetcher.call(SEARCH_PATH, &payload, None).await?;

        Ok(normalize_book_list(&data))
    }

    async fn book_detail(&self, book_id: &str) -> DramaboxResult<BookDetail> {
        let url = format!(
            "{}{}?id={}&tlanguage={}",
            self.detail_base_url,
            BOOK_DETAIL_PATH,
            urlencoding::encode(book_id),
            urlencoding::encode(&self.detail_language)
        );
        let data = self.fetcher.get_unsigned(&url).await?;

        normalize_book_detail(&data)
            .ok_or_else(|| DramaboxError::Decode(format!("book detail for {} has no book", book_id)))
    }

    async fn batch_download(
        &self,
        book_id: &str,
        chapter_ids: &[String],
    ) -> DramaboxResult<UnlockBatch> {
        let payload = BatchDownloadPayload {
            book_id,
            chapter_id_list: chapter_ids,
        };
        let data = self.fetcher.call(BATCH_DOWNLOAD_PATH, &payload, None).await?;

        Ok(UnlockBatch {
            chapters: normalize_chapter_list(&data),
            book_name: first_str(&data, &["bookName"]).unwrap_or_default(),
            book_cover: first_str(&data, &["bookCover", "cover"]).unwrap_or_default(),
            introduction: first_str(&data, &["introduction"]).unwrap_or_default(),
        })
    }

    async fn batch_load(
        &self,
        book_id: &str,
        index: i64,
    ) -> DramaboxResult<Vec<ChapterCandidate>> {
        load_chapter(&self.fetcher, book_id, index).await
    }

    async fn bootstrap(&self) -> DramaboxResult<String> {
        let data = self
            .fetcher
            .call(BOOTSTRAP_PATH, &Value::Object(Map::new()), None)
            .await?;

        let token = data
            .pointer("/user/token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| DramaboxError::Decode("bootstrap response has no user token".to_string()))?;

        info!("bootstrap issued a new session token");
        Ok(token.to_string())
    }

    async fn theater(&self) -> DramaboxResult<Value> {
        self.fetcher
            .call(THEATER_PATH, &TheaterPayload::default(), None)
            .await
    }

    async fn stream(&self, book_id: &str, index: i64) -> DramaboxResult<Vec<ChapterCandidate>> {
        let token = self.bootstrap().await?;
        let session = self
            .fetcher
            .with_device(self.fetcher.device().with_session_token(&token));
        debug!("streaming {} index {} as device {}", book_id, index, session.device().device_id);

        load_chapter(&session, book_id, index).await
    }
}

async fn load_chapter(
    fetcher: &AuthenticatedFetcher,
    book_id: &str,
    index: i64,
) -> DramaboxResult<Vec<ChapterCandidate>> {
    let payload = BatchLoadPayload::new(book_id, index);
    let data = fetcher.call(BATCH_LOAD_PATH, &payload, None).await?;

    Ok(normalize_chapter_list(&data))
}
