//! Typed access to the `degrees` collection and the catalog service that
//! ties assembly, mutation and scoring together.

use std::sync::Arc;

use crate::app::document_store::{DocumentStore, StoredDocument};
use crate::assembler::Assembler;
use crate::authoring::{ChapterSpec, CourseSpec, DegreeFieldsUpdate, DegreeSpec, LessonSpec};
use crate::error::{CatalogError, EntityKind, Result};
use crate::model::{Degree, Test};
use crate::mutator::Mutator;
use crate::quiz::{AnswerRecord, score_submission};

pub const DEGREES: &str = "degrees";

/// A degree together with the store revision it was read at.
#[derive(Debug, Clone)]
pub struct VersionedDegree {
    pub degree: Degree,
    pub revision: u64,
}

#[derive(Clone)]
pub struct DegreeRepository {
    store: Arc<dyn DocumentStore>,
}

impl DegreeRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, degree_id: &str) -> Result<VersionedDegree> {
        let doc = self
            .store
            .get_by_id(DEGREES, degree_id)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Degree, degree_id))?;
        decode(doc)
    }

    pub async fn list(&self) -> Result<Vec<Degree>> {
        let mut degrees = self
            .store
            .get_all(DEGREES)
            .await?
            .into_iter()
            .map(|doc| decode(doc).map(|v| v.degree))
            .collect::<Result<Vec<_>>>()?;
        degrees.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(degrees)
    }

    pub async fn insert(&self, degree: &Degree) -> Result<u64> {
        let doc = self.store.create(DEGREES, &degree.id, encode(degree)?).await?;
        Ok(doc.revision)
    }

    /// Writes `degree` over the stored document, provided it is still at
    /// `expected_revision`.
    pub async fn write(&self, degree: &Degree, expected_revision: u64) -> Result<u64> {
        let revision = self
            .store
            .replace(DEGREES, &degree.id, encode(degree)?, Some(expected_revision))
            .await?;
        tracing::info!(degree_id = %degree.id, revision, "degree written");
        Ok(revision)
    }

    pub async fn delete(&self, degree_id: &str) -> Result<()> {
        if !self.store.delete_by_id(DEGREES, degree_id).await? {
            return Err(CatalogError::not_found(EntityKind::Degree, degree_id));
        }
        tracing::info!(degree_id, "degree deleted");
        Ok(())
    }
}

fn encode(degree: &Degree) -> Result<serde_json::Value> {
    serde_json::to_value(degree).map_err(|err| CatalogError::Store(err.into()))
}

fn decode(doc: StoredDocument) -> Result<VersionedDegree> {
    let degree = serde_json::from_value(doc.data).map_err(|err| {
        CatalogError::Store(anyhow::Error::new(err).context(format!("decode degree {}", doc.id)))
    })?;
    Ok(VersionedDegree {
        degree,
        revision: doc.revision,
    })
}

#[derive(Clone)]
pub struct CatalogService {
    repository: DegreeRepository,
    assembler: Assembler,
    mutator: Mutator,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DocumentStore>, assembler: Assembler) -> Self {
        let repository = DegreeRepository::new(store);
        let mutator = Mutator::new(repository.clone(), assembler.clone());
        Self {
            repository,
            assembler,
            mutator,
        }
    }

    /// Assembles the whole tree, then persists it with a single write.
    pub async fn create_degree(&self, spec: &DegreeSpec) -> Result<Degree> {
        let degree = self.assembler.assemble(spec).await?;
        self.repository.insert(&degree).await?;
        Ok(degree)
    }

    pub async fn get_degree(&self, degree_id: &str) -> Result<Degree> {
        Ok(self.repository.fetch(degree_id).await?.degree)
    }

    pub async fn list_degrees(&self) -> Result<Vec<Degree>> {
        self.repository.list().await
    }

    pub async fn delete_degree(&self, degree_id: &str) -> Result<()> {
        self.repository.delete(degree_id).await
    }

    pub async fn replace_fields(
        &self,
        degree_id: &str,
        fields: &DegreeFieldsUpdate,
    ) -> Result<Degree> {
        self.mutator.replace_fields(degree_id, fields).await
    }

    pub async fn append_course(&self, degree_id: &str, spec: &CourseSpec) -> Result<Degree> {
        self.mutator.append_course(degree_id, spec).await
    }

    pub async fn append_chapter(
        &self,
        degree_id: &str,
        course_id: &str,
        spec: &ChapterSpec,
    ) -> Result<Degree> {
        self.mutator.append_chapter(degree_id, course_id, spec).await
    }

    pub async fn append_lesson(
        &self,
        degree_id: &str,
        course_id: &str,
        chapter_id: &str,
        spec: &LessonSpec,
    ) -> Result<Degree> {
        self.mutator
            .append_lesson(degree_id, course_id, chapter_id, spec)
            .await
    }

    pub async fn score_chapter_test(
        &self,
        degree_id: &str,
        course_id: &str,
        chapter_id: &str,
        answers: &[AnswerRecord],
    ) -> Result<u32> {
        let degree = self.get_degree(degree_id).await?;
        let course = degree
            .course(course_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Course, course_id))?;
        let chapter = course
            .chapter(chapter_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Chapter, chapter_id))?;
        let test = test_or_not_found(chapter.test.as_ref(), chapter_id)?;
        Ok(score_submission(test, answers))
    }

    pub async fn score_final_test(
        &self,
        degree_id: &str,
        course_id: &str,
        answers: &[AnswerRecord],
    ) -> Result<u32> {
        let degree = self.get_degree(degree_id).await?;
        let course = degree
            .course(course_id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Course, course_id))?;
        let test = test_or_not_found(course.final_test.as_ref(), course_id)?;
        Ok(score_submission(test, answers))
    }
}

fn test_or_not_found<'a>(test: Option<&'a Test>, owner_id: &str) -> Result<&'a Test> {
    test.ok_or_else(|| CatalogError::not_found(EntityKind::Test, owner_id))
}
