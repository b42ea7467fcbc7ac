//! Authoring input: the nested degree description produced by admin forms
//! (or a JSON file on the CLI) before any upload has happened.

use std::path::Path;

use anyhow::Context as _;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::OverviewPoint;

/// A raw file carried inline. `data` travels as base64 in JSON.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

impl std::fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<FileUpload>,
    #[serde(default)]
    pub overview_points: Option<Vec<OverviewPoint>>,
    #[serde(default)]
    pub courses: Vec<CourseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSpec {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<FileUpload>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub chapters: Vec<ChapterSpec>,
    #[serde(default)]
    pub final_test: Option<TestSpec>,
    #[serde(default)]
    pub overview_points: Option<Vec<OverviewPoint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lessons: Vec<LessonSpec>,
    #[serde(default)]
    pub test: Option<TestSpec>,
}

/// A lesson cannot be authored without its file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSpec {
    pub title: String,
    pub file: FileUpload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    pub title: String,
    #[serde(default)]
    pub time_limit: u32,
    #[serde(rename = "type", default)]
    pub test_type: String,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnswerType {
    #[serde(rename = "MCQ")]
    MultipleChoice,
    #[serde(rename = "Typed")]
    Typed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub question: String,
    #[serde(rename = "type")]
    pub answer_type: AnswerType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub marks: Option<u32>,
}

/// Top-level degree fields replaced by `replace_fields`. Absent fields are
/// left as stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeFieldsUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<FileUpload>,
    #[serde(default)]
    pub overview_points: Option<Vec<OverviewPoint>>,
    #[serde(default)]
    pub courses: Option<Vec<CourseSpec>>,
}

/// Replaces every `{ "path": ..., "contentType": ... }` object in `value`
/// with an inline [`FileUpload`] read from disk, relative to `base_dir`.
pub fn inline_file_paths(value: &mut serde_json::Value, base_dir: &Path) -> anyhow::Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            let file_ref = match map.get("path") {
                Some(serde_json::Value::String(raw))
                    if map.contains_key("contentType") && !map.contains_key("data") =>
                {
                    Some(raw.clone())
                }
                _ => None,
            };
            if let Some(raw) = file_ref {
                let path = base_dir.join(&raw);
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("read authoring file: {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or(raw);
                map.remove("path");
                map.entry("fileName")
                    .or_insert(serde_json::Value::String(file_name));
                map.insert(
                    "data".to_string(),
                    serde_json::Value::String(
                        base64::engine::general_purpose::STANDARD.encode(bytes),
                    ),
                );
                return Ok(());
            }
            for child in map.values_mut() {
                inline_file_paths(child, base_dir)?;
            }
        }
        serde_json::Value::Array(items) => {
            for child in items {
                inline_file_paths(child, base_dir)?;
            }
        }
        _ => {}
    }
    Ok(())
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(serde::de::Error::custom)
    }
}
