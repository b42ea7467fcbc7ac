//! Persisted shape of the content catalog.
//!
//! A [`Degree`] is stored as one document; every nested node lives inside it.
//! Optional values such as thumbnails serialize as explicit `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Degree {
    pub id: String,
    pub name: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub overview_points: Option<Vec<OverviewPoint>>,
    pub courses: Vec<Course>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Degree {
    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == course_id)
    }

    pub fn course_mut(&mut self, course_id: &str) -> Option<&mut Course> {
        self.courses.iter_mut().find(|c| c.id == course_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverviewPoint {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub price: f64,
    pub chapters: Vec<Chapter>,
    pub final_test: Option<Test>,
    pub overview_points: Option<Vec<OverviewPoint>>,
}

impl Course {
    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn chapter_mut(&mut self, chapter_id: &str) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == chapter_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub lessons: Vec<Lesson>,
    pub test: Option<Test>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub file: FileAsset,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Document,
    Presentation,
}

impl MediaKind {
    /// Classifies a declared content type such as `video/mp4` or
    /// `application/vnd.ms-powerpoint`. Returns `None` for anything that has
    /// no storage namespace.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let (primary, subtype) = essence.split_once('/').unwrap_or((essence.as_str(), ""));

        match primary {
            "video" => return Some(Self::Video),
            "audio" => return Some(Self::Audio),
            "image" => return Some(Self::Image),
            _ => {}
        }

        if subtype.contains("presentation")
            || subtype.contains("powerpoint")
            || subtype.contains("ppt")
        {
            return Some(Self::Presentation);
        }
        if subtype.contains("pdf")
            || subtype.contains("msword")
            || subtype.contains("wordprocessingml")
            || subtype.contains("opendocument.text")
        {
            return Some(Self::Document);
        }
        None
    }

    /// Object-store namespace for this kind.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Audio => "audios",
            Self::Image => "images",
            Self::Document => "documents",
            Self::Presentation => "presentations",
        }
    }

    pub fn is_timed(self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileAsset {
    pub url: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub title: String,
    pub time_limit: u32,
    #[serde(rename = "type")]
    pub test_type: String,
    pub questions: Vec<Question>,
    pub total_marks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Question {
    #[serde(rename = "MCQ", rename_all = "camelCase")]
    MultipleChoice {
        question: String,
        options: Vec<String>,
        correct_answer: Option<String>,
        marks: u32,
    },
    #[serde(rename = "Typed")]
    Typed {
        question: String,
        answer: String,
        marks: u32,
    },
}

impl Question {
    pub fn marks(&self) -> u32 {
        match self {
            Self::MultipleChoice { marks, .. } | Self::Typed { marks, .. } => *marks,
        }
    }
}
