//! Operator commands behind `lectern catalog ...`.

use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::config::Backends;
use crate::assembler::{Assembler, AssemblyOptions};
use crate::assets::AssetUploader;
use crate::authoring::{ChapterSpec, CourseSpec, DegreeSpec, LessonSpec, inline_file_paths};
use crate::catalog::CatalogService;
use crate::cli::{CatalogCommand, StoreArgs};

pub async fn run(command: CatalogCommand) -> anyhow::Result<()> {
    match command {
        CatalogCommand::Create(args) => {
            let service = open(&args.store)?;
            let spec: DegreeSpec = read_authoring(&args.input)?;
            let degree = service.create_degree(&spec).await?;
            tracing::info!(degree_id = %degree.id, "degree created");
            print_json(&degree)
        }
        CatalogCommand::List(store) => {
            let service = open(&store)?;
            let degrees = service.list_degrees().await?;
            let rows: Vec<_> = degrees
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "name": d.name,
                        "courses": d.courses.len(),
                        "createdAt": d.created_at,
                    })
                })
                .collect();
            print_json(&rows)
        }
        CatalogCommand::Show(args) => {
            let degree = open(&args.store)?.get_degree(&args.degree).await?;
            print_json(&degree)
        }
        CatalogCommand::Delete(args) => {
            open(&args.store)?.delete_degree(&args.degree).await?;
            println!("deleted {}", args.degree);
            Ok(())
        }
        CatalogCommand::AddCourse(args) => {
            let spec: CourseSpec = read_authoring(&args.input)?;
            let degree = open(&args.store)?
                .append_course(&args.degree, &spec)
                .await?;
            print_json(&degree)
        }
        CatalogCommand::AddChapter(args) => {
            let spec: ChapterSpec = read_authoring(&args.input)?;
            let degree = open(&args.store)?
                .append_chapter(&args.degree, &args.course, &spec)
                .await?;
            print_json(&degree)
        }
        CatalogCommand::AddLesson(args) => {
            let spec: LessonSpec = read_authoring(&args.input)?;
            let degree = open(&args.store)?
                .append_lesson(&args.degree, &args.course, &args.chapter, &spec)
                .await?;
            print_json(&degree)
        }
    }
}

fn open(args: &StoreArgs) -> anyhow::Result<CatalogService> {
    let backends = Backends::from_env(Path::new(&args.data_dir)).context("configure storage")?;
    let uploader =
        AssetUploader::with_max_concurrency(backends.objects, args.max_concurrent_uploads);
    let assembler = Assembler::new(
        uploader,
        AssemblyOptions {
            overview_points: args.overview_points,
        },
    );
    Ok(CatalogService::new(backends.documents, assembler))
}

fn read_authoring<T: DeserializeOwned>(input: &str) -> anyhow::Result<T> {
    let path = Path::new(input);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read authoring input: {}", path.display()))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parse json: {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    inline_file_paths(&mut value, base_dir)?;
    serde_json::from_value(value)
        .with_context(|| format!("decode authoring input: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}
