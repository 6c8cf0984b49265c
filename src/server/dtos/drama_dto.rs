use serde::{Deserialize, Serialize};
use validator::Validate;

/// body of `POST /api/v1/dramabox`. which fields are required depends on `action`, the
/// controller checks that per action
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct DramaboxActionRequest {
    pub action: Option<String>,
    pub keyword: Option<String>,
    /// `search` only: without it the quick suggest lookup is used, with it the paged search
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    pub id: Option<String>,
    pub book_id: Option<String>,
    #[validate(length(max = 500))]
    pub chapter_id_list: Option<Vec<String>>,
    pub chapter_id: Option<String>,
    #[validate(range(min = 0, max = 4320))]
    pub quality: Option<i32>,
}

/// `?action=` wins over the body field
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

/// `GET /stream?bookId=&index=`, index defaults to the first chapter
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamQuery {
    pub book_id: Option<String>,
    #[validate(range(min = 1))]
    pub index: Option<i64>,
}

impl StreamQuery {
    pub const DEFAULT_INDEX: i64 = 1;
}

/// what the `search` action answers with, mobile clients look for `searchList`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse<T: Serialize> {
    pub search_list: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct KeywordsQuery {
    /// comma separated
    #[validate(length(min = 1, max = 1000))]
    pub keywords: String,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

impl KeywordsQuery {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
