//! Partial updates to a stored degree.
//!
//! Every operation reads the current document, changes it in memory and
//! writes it back against the revision it read. A concurrent writer that
//! got there first makes the later write fail with `Conflict` instead of
//! being silently overwritten.

use chrono::Utc;

use crate::assembler::Assembler;
use crate::authoring::{ChapterSpec, CourseSpec, DegreeFieldsUpdate, LessonSpec};
use crate::catalog::DegreeRepository;
use crate::error::{CatalogError, EntityKind, Result};
use crate::model::Degree;

#[derive(Clone)]
pub struct Mutator {
    repository: DegreeRepository,
    assembler: Assembler,
}

impl Mutator {
    pub fn new(repository: DegreeRepository, assembler: Assembler) -> Self {
        Self {
            repository,
            assembler,
        }
    }

    /// Overwrites the supplied top-level fields. A supplied course list is
    /// reassembled from scratch, so every course gets new identifiers.
    pub async fn replace_fields(
        &self,
        degree_id: &str,
        fields: &DegreeFieldsUpdate,
    ) -> Result<Degree> {
        let current = self.repository.fetch(degree_id).await?;
        let mut degree = current.degree;

        if let Some(file) = &fields.thumbnail {
            let url = self
                .assembler
                .uploader()
                .store_thumbnail(file)
                .await
                .map_err(|err| err.at_node("thumbnail"))?;
            degree.thumbnail = Some(url);
        }
        if let Some(courses) = &fields.courses {
            degree.courses = self.assembler.assemble_courses(courses).await?;
        }
        if let Some(name) = &fields.name {
            degree.name = name.clone();
        }
        if let Some(description) = &fields.description {
            degree.description = description.clone();
        }
        if let Some(points) = &fields.overview_points {
            degree.overview_points = Some(points.clone());
        }

        self.commit(degree, current.revision).await
    }

    pub async fn append_course(&self, degree_id: &str, spec: &CourseSpec) -> Result<Degree> {
        let current = self.repository.fetch(degree_id).await?;
        let mut degree = current.degree;

        let index = degree.courses.len();
        let course = self
            .assembler
            .assemble_course(spec)
            .await
            .map_err(|err| err.at_node(format!("courses[{index}]")))?;
        degree.courses.push(course);

        self.commit(degree, current.revision).await
    }

    pub async fn append_chapter(
        &self,
        degree_id: &str,
        course_id: &str,
        spec: &ChapterSpec,
    ) -> Result<Degree> {
        let current = self.repository.fetch(degree_id).await?;
        let mut degree = current.degree;

        let course = degree
            .course_mut(course_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Course, course_id))?;
        let index = course.chapters.len();
        let chapter = self
            .assembler
            .assemble_chapter(spec)
            .await
            .map_err(|err| err.at_node(format!("chapters[{index}]")))?;
        course.chapters.push(chapter);

        self.commit(degree, current.revision).await
    }

    pub async fn append_lesson(
        &self,
        degree_id: &str,
        course_id: &str,
        chapter_id: &str,
        spec: &LessonSpec,
    ) -> Result<Degree> {
        let current = self.repository.fetch(degree_id).await?;
        let mut degree = current.degree;

        let chapter = degree
            .course_mut(course_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Course, course_id))?
            .chapter_mut(chapter_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Chapter, chapter_id))?;
        let index = chapter.lessons.len();
        let lesson = self
            .assembler
            .assemble_lesson(spec)
            .await
            .map_err(|err| err.at_node(format!("lessons[{index}]")))?;
        chapter.lessons.push(lesson);

        self.commit(degree, current.revision).await
    }

    async fn commit(&self, mut degree: Degree, expected_revision: u64) -> Result<Degree> {
        degree.updated_at = Some(Utc::now());
        match self.repository.write(&degree, expected_revision).await {
            Ok(_) => Ok(degree),
            Err(err) => {
                if let CatalogError::Conflict { .. } = &err {
                    tracing::warn!(
                        degree_id = %degree.id,
                        expected_revision,
                        "stale degree write rejected"
                    );
                }
                Err(err)
            }
        }
    }
}
