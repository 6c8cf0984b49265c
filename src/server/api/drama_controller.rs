use axum::{
    Extension, Json, Router,
    extract::Query,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{debug, info};
use validator::Validate;

use crate::server::{
    dtos::drama_dto::{
        ActionQuery, ApiResponse, DramaboxActionRequest, KeywordsQuery, SearchListResponse,
        SearchQuery, StreamQuery,
    },
    error::{AppResult, Error},
    services::{
        chapter_services::ChapterServiceTrait,
        dramabox_services::DramaboxServiceTrait,
        edge_services::EdgeServices,
        keyword_services::{DEFAULT_ENRICH_BATCH_SIZE, KeywordServiceTrait},
    },
};

pub struct DramaController;

impl DramaController {
    pub fn app() -> Router {
        Router::new()
            .route("/", post(Self::action))
            .route("/search", get(Self::search))
            .route("/keywords", get(Self::keywords))
            .route("/latest", get(Self::latest))
            .route("/stream", get(Self::stream))
    }

    /// single entry point the player uses, dispatches on `action`
    async fn action(
        Extension(services): Extension<EdgeServices>,
        Query(query): Query<ActionQuery>,
        Json(body): Json<DramaboxActionRequest>,
    ) -> AppResult<Response> {
        body.validate()
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let action = query
            .action
            .or_else(|| body.action.clone())
            .filter(|action| !action.is_empty())
            .ok_or_else(|| Error::BadRequest("Action is required".to_string()))?;

        debug!("dramabox action {}", action);

        match action.as_str() {
            "search" => {
                let keyword = required(&body.keyword, "Keyword is required")?;
                let books = match body.page {
                    Some(page) => services.dramabox.search(&keyword, page).await?,
                    None => services.dramabox.search_suggest(&keyword).await?,
                };
                Ok(Json(ApiResponse::ok(SearchListResponse { search_list: books })).into_response())
            }
            "detail" => {
                let id = required(&body.id, "ID is required")?;
                let detail = services.dramabox.book_detail(&id).await?;
                Ok(Json(ApiResponse::ok(detail)).into_response())
            }
            "unlock" => {
                let chapter_ids = body.chapter_id_list.clone().unwrap_or_default();
                let book_id = required(&body.book_id, "bookId and chapterIdList are required")?;
                if chapter_ids.is_empty() {
                    return Err(Error::BadRequest(
                        "bookId and chapterIdList are required".to_string(),
                    ));
                }

                let unlocked = services
                    .chapters
                    .resolve_chapters(&book_id, &chapter_ids)
                    .await?;
                info!("unlocked {} chapters of {}", unlocked.chapters.len(), book_id);
                Ok(Json(ApiResponse::ok(unlocked)).into_response())
            }
            "chapterVideo" => {
                let message = "bookId and chapterId are required";
                let book_id = required(&body.book_id, message)?;
                let chapter_id = required(&body.chapter_id, message)?;

                let picked = services
                    .chapters
                    .chapter_video_url(&book_id, &chapter_id, body.quality)
                    .await?;
                Ok(Json(ApiResponse::ok(picked)).into_response())
            }
            "allChapterUrls" => {
                let book_id = required(&body.book_id, "bookId is required")?;
                let urls = services
                    .chapters
                    .all_chapter_urls(&book_id, body.quality)
                    .await?;
                Ok(Json(ApiResponse::ok(urls)).into_response())
            }
            _ => Err(Error::BadRequest("Unknown action".to_string())),
        }
    }

    async fn latest(Extension(services): Extension<EdgeServices>) -> AppResult<Response> {
        let feed = services.dramabox.theater().await?;

        Ok(Json(ApiResponse::ok(feed)).into_response())
    }

    /// one chapter through a throwaway session, the player's direct stream lookup
    async fn stream(
        Extension(services): Extension<EdgeServices>,
        Query(params): Query<StreamQuery>,
    ) -> AppResult<Response> {
        params
            .validate()
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let book_id = required(&params.book_id, "bookId is required")?;
        let index = params.index.unwrap_or(StreamQuery::DEFAULT_INDEX);

        let chapters = services.dramabox.stream(&book_id, index).await?;
        debug!("stream {} index {} returned {} chapters", book_id, index, chapters.len());

        Ok(Json(ApiResponse::ok(chapters)).into_response())
    }

    async fn search(
        Extension(services): Extension<EdgeServices>,
        Query(params): Query<SearchQuery>,
    ) -> AppResult<Response> {
        let query = required(&params.query, "Query parameter is required")?;
        let books = services.keywords.search(&query).await;

        Ok(Json(ApiResponse::ok(books)).into_response())
    }

    /// several keywords merged into one deduplicated list, view counts filled in where missing
    async fn keywords(
        Extension(services): Extension<EdgeServices>,
        Query(params): Query<KeywordsQuery>,
    ) -> AppResult<Response> {
        params
            .validate()
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let keywords = params.keyword_list();
        if keywords.is_empty() {
            return Err(Error::BadRequest("keywords are required".to_string()));
        }

        let limit = params.limit.unwrap_or(KeywordsQuery::DEFAULT_LIMIT);
        let books = services.keywords.fetch_by_keywords(&keywords, limit).await;
        let books = services
            .keywords
            .enrich_view_counts(books, DEFAULT_ENRICH_BATCH_SIZE)
            .await;

        Ok(Json(ApiResponse::ok(books)).into_response())
    }
}

fn required(value: &Option<String>, message: &str) -> AppResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::BadRequest(message.to_string()))
}
