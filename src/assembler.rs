//! Turns an authoring tree into a fully materialized [`Degree`].
//!
//! Siblings (courses, chapters of a course, lessons of a chapter) are
//! assembled concurrently and collected back in input order. The first
//! failure anywhere aborts the whole assembly.

use chrono::Utc;
use futures::future::try_join_all;

use crate::assets::AssetUploader;
use crate::authoring::{ChapterSpec, CourseSpec, DegreeSpec, LessonSpec};
use crate::error::Result;
use crate::model::{Chapter, Course, Degree, Lesson, OverviewPoint};
use crate::quiz::build_test;

/// How absent overview points are materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverviewPointsMode {
    /// Absent overview points become an empty list.
    #[default]
    Objects,
    /// Absent overview points stay `null` in the stored document.
    Passthrough,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyOptions {
    pub overview_points: OverviewPointsMode,
}

#[derive(Clone)]
pub struct Assembler {
    uploader: AssetUploader,
    options: AssemblyOptions,
}

impl Assembler {
    pub fn new(uploader: AssetUploader, options: AssemblyOptions) -> Self {
        Self { uploader, options }
    }

    pub fn uploader(&self) -> &AssetUploader {
        &self.uploader
    }

    pub async fn assemble(&self, spec: &DegreeSpec) -> Result<Degree> {
        let thumbnail = match &spec.thumbnail {
            Some(file) => Some(
                self.uploader
                    .store_thumbnail(file)
                    .await
                    .map_err(|err| err.at_node("thumbnail"))?,
            ),
            None => None,
        };

        let courses = self.assemble_courses(&spec.courses).await?;

        let degree = Degree {
            id: crate::new_id(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            thumbnail,
            overview_points: self.overview_points(spec.overview_points.as_ref()),
            courses,
            created_at: Utc::now(),
            updated_at: None,
        };
        tracing::info!(degree_id = %degree.id, courses = degree.courses.len(), "assembled degree");
        Ok(degree)
    }

    pub async fn assemble_courses(&self, specs: &[CourseSpec]) -> Result<Vec<Course>> {
        try_join_all(specs.iter().enumerate().map(|(i, spec)| async move {
            self.assemble_course(spec)
                .await
                .map_err(|err| err.at_node(format!("courses[{i}]")))
        }))
        .await
    }

    pub async fn assemble_course(&self, spec: &CourseSpec) -> Result<Course> {
        let thumbnail = match &spec.thumbnail {
            Some(file) => Some(
                self.uploader
                    .store_thumbnail(file)
                    .await
                    .map_err(|err| err.at_node("thumbnail"))?,
            ),
            None => None,
        };

        let chapters = try_join_all(spec.chapters.iter().enumerate().map(|(i, chapter)| async move {
            self.assemble_chapter(chapter)
                .await
                .map_err(|err| err.at_node(format!("chapters[{i}]")))
        }))
        .await?;

        Ok(Course {
            id: crate::new_id(),
            title: spec.title.clone(),
            description: spec.description.clone(),
            thumbnail,
            price: spec.price,
            chapters,
            final_test: spec.final_test.as_ref().map(build_test),
            overview_points: self.overview_points(spec.overview_points.as_ref()),
        })
    }

    pub async fn assemble_chapter(&self, spec: &ChapterSpec) -> Result<Chapter> {
        let lessons = try_join_all(spec.lessons.iter().enumerate().map(|(i, lesson)| async move {
            self.assemble_lesson(lesson)
                .await
                .map_err(|err| err.at_node(format!("lessons[{i}]")))
        }))
        .await?;

        Ok(Chapter {
            id: crate::new_id(),
            title: spec.title.clone(),
            description: spec.description.clone().unwrap_or_default(),
            lessons,
            test: spec.test.as_ref().map(build_test),
        })
    }

    pub async fn assemble_lesson(&self, spec: &LessonSpec) -> Result<Lesson> {
        let file = self.uploader.store(&spec.file).await?;
        Ok(Lesson {
            id: crate::new_id(),
            title: spec.title.clone(),
            file,
        })
    }

    pub fn overview_points(
        &self,
        points: Option<&Vec<OverviewPoint>>,
    ) -> Option<Vec<OverviewPoint>> {
        match (points, self.options.overview_points) {
            (Some(points), _) => Some(points.clone()),
            (None, OverviewPointsMode::Objects) => Some(Vec::new()),
            (None, OverviewPointsMode::Passthrough) => None,
        }
    }
}
