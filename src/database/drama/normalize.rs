//! Upstream sends the same concept under different field names depending on the endpoint
//! (and sometimes the app version). Every entity goes through exactly one function here that
//! walks an ordered candidate list and builds the canonical record.

use serde_json::Value;

use super::model::{Book, BookDetail, CdnOption, ChapterCandidate, ChapterItem, VideoPath};

pub const BOOK_ID_FIELDS: &[&str] = &["bookId", "id"];
pub const BOOK_NAME_FIELDS: &[&str] = &["bookName", "title", "name"];
pub const COVER_FIELDS: &[&str] = &[
    "cover",
    "coverWap",
    "coverImage",
    "img",
    "image",
    "poster",
    "thumbnail",
];
pub const INTRODUCTION_FIELDS: &[&str] = &["introduction", "intro", "description"];

pub const CHAPTER_ID_FIELDS: &[&str] = &["chapterId", "id"];
pub const CHAPTER_INDEX_FIELDS: &[&str] = &["chapterIndex", "index"];
pub const CHAPTER_NAME_FIELDS: &[&str] = &["chapterName", "name"];
pub const CHAPTER_IMG_FIELDS: &[&str] = &["chapterImg", "cover"];

pub const BOOK_LIST_FIELDS: &[&str] = &["suggestList", "searchList", "list"];
pub const CHAPTER_LIST_FIELDS: &[&str] = &["chapterVoList", "chapterList", "chapters"];

/// flattened stream shape has no quality, the web player assumed 720
const DEFAULT_STREAM_QUALITY: i32 = 720;

pub fn first_str(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// numbers, numeric strings and bools all count
pub fn first_i64(value: &Value, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|field| match value.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    })
}

pub fn first_array<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a Vec<Value>> {
    fields
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_array))
}

fn flag(value: &Value, field: &str) -> bool {
    first_i64(value, &[field]).is_some_and(|v| v != 0)
}

fn string_list(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `None` when no identity field is present, an id-less book can't be deduplicated or
/// looked up so it's dropped
pub fn normalize_book(value: &Value) -> Option<Book> {
    let book_id = first_str(value, BOOK_ID_FIELDS)?;

    Some(Book {
        book_id,
        book_name: first_str(value, BOOK_NAME_FIELDS).unwrap_or_else(|| "Untitled".to_string()),
        cover: first_str(value, COVER_FIELDS).unwrap_or_default(),
        view_count: first_i64(value, &["viewCount", "playCount"]).unwrap_or(0),
        follow_count: first_i64(value, &["followCount"]).unwrap_or(0),
        introduction: first_str(value, INTRODUCTION_FIELDS).unwrap_or_default(),
        chapter_count: first_i64(value, &["chapterCount"]).unwrap_or(0),
        tags: string_list(value, "tags"),
        labels: string_list(value, "labels"),
        language: first_str(value, &["language"]).unwrap_or_default(),
        shelf_time: first_str(value, &["shelfTime", "firstShelfTime"]).unwrap_or_default(),
    })
}

/// accepts the list itself or an object holding it under one of the known container names
pub fn normalize_book_list(data: &Value) -> Vec<Book> {
    let items = match data {
        Value::Array(items) => Some(items),
        other => first_array(other, BOOK_LIST_FIELDS),
    };

    items
        .map(|items| items.iter().filter_map(normalize_book).collect())
        .unwrap_or_default()
}

fn normalize_video_path(value: &Value) -> Option<VideoPath> {
    let video_path = first_str(value, &["videoPath", "url"])?;

    Some(VideoPath {
        quality: first_i64(value, &["quality"]).unwrap_or(0) as i32,
        video_path,
        is_default: flag(value, "isDefault"),
    })
}

fn normalize_cdn(value: &Value) -> CdnOption {
    CdnOption {
        cdn_domain: first_str(value, &["cdnDomain"]).unwrap_or_default(),
        is_default: flag(value, "isDefault"),
        video_path_list: first_array(value, &["videoPathList"])
            .map(|paths| paths.iter().filter_map(normalize_video_path).collect())
            .unwrap_or_default(),
    }
}

/// the flattened `{videoUrl, videoUrls:[{quality,url}]}` shape becomes one cdn with no domain
fn cdn_from_stream_shape(value: &Value) -> Option<CdnOption> {
    let mut paths: Vec<VideoPath> = first_array(value, &["videoUrls"])
        .map(|urls| {
            urls.iter()
                .filter_map(|entry| {
                    let url = first_str(entry, &["url"])?;
                    Some(VideoPath {
                        quality: first_i64(entry, &["quality"])
                            .map(|q| q as i32)
                            .unwrap_or(DEFAULT_STREAM_QUALITY),
                        video_path: url,
                        is_default: false,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if paths.is_empty() {
        let url = first_str(value, &["videoUrl"])?;
        paths.push(VideoPath {
            quality: DEFAULT_STREAM_QUALITY,
            video_path: url,
            is_default: true,
        });
    } else if let Some(first) = paths.first_mut() {
        first.is_default = true;
    }

    Some(CdnOption {
        cdn_domain: String::new(),
        is_default: true,
        video_path_list: paths,
    })
}

pub fn normalize_chapter(value: &Value) -> Option<ChapterCandidate> {
    let chapter_id = first_str(value, CHAPTER_ID_FIELDS)?;

    let cdn_list = match first_array(value, &["cdnList"]) {
        Some(cdns) => cdns.iter().map(normalize_cdn).collect(),
        None => cdn_from_stream_shape(value).into_iter().collect(),
    };

    Some(ChapterCandidate {
        chapter_id,
        chapter_index: first_i64(value, CHAPTER_INDEX_FIELDS).unwrap_or(0),
        chapter_name: first_str(value, CHAPTER_NAME_FIELDS).unwrap_or_default(),
        chapter_img: first_str(value, CHAPTER_IMG_FIELDS).unwrap_or_default(),
        cdn_list,
    })
}

pub fn normalize_chapter_list(data: &Value) -> Vec<ChapterCandidate> {
    let items = match data {
        Value::Array(items) => Some(items),
        other => first_array(other, CHAPTER_LIST_FIELDS),
    };

    items
        .map(|items| items.iter().filter_map(normalize_chapter).collect())
        .unwrap_or_default()
}

fn normalize_chapter_item(value: &Value) -> Option<ChapterItem> {
    Some(ChapterItem {
        id: first_str(value, &["id", "chapterId"])?,
        name: first_str(value, &["name", "chapterName"]).unwrap_or_default(),
        index: first_i64(value, &["index", "chapterIndex"]).unwrap_or(0),
        unlock: flag(value, "unlock"),
        cover: first_str(value, &["cover", "chapterImg"]).unwrap_or_default(),
        duration: first_i64(value, &["duration", "viewingDuration"]).unwrap_or(0),
    })
}

/// `None` when the detail carries no usable book
pub fn normalize_book_detail(data: &Value) -> Option<BookDetail> {
    let book = normalize_book(data.get("book")?)?;

    let recommends = first_array(data, &["recommends"])
        .map(|items| items.iter().filter_map(normalize_book).collect())
        .unwrap_or_default();

    let chapter_list = first_array(data, &["chapterList"])
        .map(|items| items.iter().filter_map(normalize_chapter_item).collect())
        .unwrap_or_default();

    Some(BookDetail {
        book,
        recommends,
        chapter_list,
    })
}
