use clap::{Args, Parser, Subcommand};

use crate::assembler::OverviewPointsMode;
use crate::assets::DEFAULT_MAX_CONCURRENT_UPLOADS;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Assemble a degree from an authoring JSON file and store it.
    Create(CreateArgs),
    List(StoreArgs),
    Show(ShowArgs),
    Delete(ShowArgs),
    AddCourse(AddCourseArgs),
    AddChapter(AddChapterArgs),
    AddLesson(AddLessonArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Data directory holding documents and local objects.
    #[arg(long, default_value = "lectern-data")]
    pub data_dir: String,

    /// Maximum object-store uploads in flight.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_UPLOADS)]
    pub max_concurrent_uploads: usize,

    /// How absent overview points are stored.
    #[arg(long, value_enum, default_value_t = OverviewPointsMode::Objects)]
    pub overview_points: OverviewPointsMode,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Authoring JSON. Files may be given as `{ "path", "contentType" }`.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub degree: String,
}

#[derive(Debug, Args)]
pub struct AddCourseArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub degree: String,

    /// Course authoring JSON.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct AddChapterArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub degree: String,

    #[arg(long)]
    pub course: String,

    /// Chapter authoring JSON.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct AddLessonArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub degree: String,

    #[arg(long)]
    pub course: String,

    #[arg(long)]
    pub chapter: String,

    /// Lesson authoring JSON.
    #[arg(long)]
    pub input: String,
}
