use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// canonical book record. upstream has several spellings for most of these fields, see
/// `normalize::normalize_book` for the candidate lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    pub book_id: String,
    pub book_name: String,
    pub cover: String,
    pub view_count: i64,
    pub follow_count: i64,
    pub introduction: String,
    pub chapter_count: i64,
    pub tags: Vec<String>,
    pub labels: Vec<String>,
    pub language: String,
    pub shelf_time: String,
}

/// one quality tagged path on a cdn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoPath {
    pub quality: i32,
    pub video_path: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdnOption {
    pub cdn_domain: String,
    pub is_default: bool,
    pub video_path_list: Vec<VideoPath>,
}

/// a chapter as one upstream strategy reported it, may be duplicated across strategies/pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterCandidate {
    pub chapter_id: String,
    /// 1-based
    pub chapter_index: i64,
    pub chapter_name: String,
    pub chapter_img: String,
    pub cdn_list: Vec<CdnOption>,
}

/// deduplicated chapter, exactly one per `chapter_index`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedChapter {
    pub chapter_id: String,
    pub chapter_index: i64,
    pub chapter_name: String,
    pub chapter_img: String,
    pub cdn_list: Vec<CdnOption>,
}

impl From<ChapterCandidate> for ResolvedChapter {
    fn from(candidate: ChapterCandidate) -> Self {
        Self {
            chapter_id: candidate.chapter_id,
            chapter_index: candidate.chapter_index,
            chapter_name: candidate.chapter_name,
            chapter_img: candidate.chapter_img,
            cdn_list: candidate.cdn_list,
        }
    }
}

/// what the bulk endpoint hands back before dedup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnlockBatch {
    pub chapters: Vec<ChapterCandidate>,
    pub book_name: String,
    pub book_cover: String,
    pub introduction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedBook {
    pub chapters: Vec<ResolvedChapter>,
    pub book_name: String,
    pub book_cover: String,
    pub introduction: String,
}

/// chapter entry from the web detail endpoint, `index` is 0-based here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterItem {
    pub id: String,
    pub name: String,
    pub index: i64,
    pub unlock: bool,
    pub cover: String,
    pub duration: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookDetail {
    pub book: Book,
    pub recommends: Vec<Book>,
    pub chapter_list: Vec<ChapterItem>,
}

impl BookDetail {
    /// the batch/load endpoint addresses chapters by 1-based play index, not id
    pub fn play_index(&self, chapter_id: &str) -> Option<i64> {
        self.chapter_list
            .iter()
            .find(|chapter| chapter.id == chapter_id)
            .map(|chapter| chapter.index + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickedUrl {
    pub url: String,
    pub quality: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterUrl {
    pub chapter_index: i64,
    pub chapter_id: String,
    pub mp4_url: String,
    pub quality_selected: i32,
}

/// value stored under a keyword in both cache tiers. an empty `results` is a negative entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordCacheEntry {
    pub keyword: String,
    pub results: Vec<Book>,
    pub cached_at: DateTime<Utc>,
}
