use std::path::PathBuf;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::authoring::{
    ChapterSpec, CourseSpec, DegreeFieldsUpdate, DegreeSpec, FileUpload, LessonSpec,
};
use crate::catalog::CatalogService;
use crate::error::CatalogError;
use crate::model::Degree;
use crate::quiz::AnswerRecord;
use crate::users::{NewUser, ProfileUpdate, UserProfile, UserService};

pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub users: UserService,
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub max_body_bytes: usize,
    /// Directory served under `/objects` when objects live on local disk.
    pub objects_dir: Option<PathBuf>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            objects_dir: None,
        }
    }
}

pub fn router(state: AppState, options: RouterOptions) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/degrees", get(list_degrees).post(create_degree))
        .route(
            "/degrees/:degree_id",
            get(get_degree).patch(replace_fields).delete(delete_degree),
        )
        .route("/degrees/:degree_id/students", get(list_students))
        .route("/degrees/:degree_id/courses", post(append_course))
        .route(
            "/degrees/:degree_id/courses/:course_id/chapters",
            post(append_chapter),
        )
        .route(
            "/degrees/:degree_id/courses/:course_id/chapters/:chapter_id/lessons",
            post(append_lesson),
        )
        .route(
            "/degrees/:degree_id/courses/:course_id/chapters/:chapter_id/test/score",
            post(score_chapter_test),
        )
        .route(
            "/degrees/:degree_id/courses/:course_id/final-test/score",
            post(score_final_test),
        )
        .route("/users", get(find_user).post(create_user))
        .route(
            "/users/:user_id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/:user_id/documents", post(upload_document))
        .route("/users/:user_id/purchases", post(record_purchase));

    if let Some(dir) = options.objects_dir {
        app = app.nest_service("/objects", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(options.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiError(CatalogError);

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.root_cause() {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::UnsupportedAssetType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CatalogError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CatalogError::Conflict { .. } => StatusCode::CONFLICT,
            CatalogError::UploadFailure { .. } | CatalogError::AssemblyFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = format!("{:#}", anyhow::Error::new(self.0));
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn list_degrees(State(state): State<AppState>) -> ApiResult<Json<Vec<Degree>>> {
    Ok(Json(state.catalog.list_degrees().await?))
}

async fn create_degree(
    State(state): State<AppState>,
    Json(spec): Json<DegreeSpec>,
) -> ApiResult<(StatusCode, Json<Degree>)> {
    let degree = state.catalog.create_degree(&spec).await?;
    Ok((StatusCode::CREATED, Json(degree)))
}

async fn get_degree(
    State(state): State<AppState>,
    Path(degree_id): Path<String>,
) -> ApiResult<Json<Degree>> {
    Ok(Json(state.catalog.get_degree(&degree_id).await?))
}

async fn replace_fields(
    State(state): State<AppState>,
    Path(degree_id): Path<String>,
    Json(fields): Json<DegreeFieldsUpdate>,
) -> ApiResult<Json<Degree>> {
    Ok(Json(state.catalog.replace_fields(&degree_id, &fields).await?))
}

async fn delete_degree(
    State(state): State<AppState>,
    Path(degree_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_degree(&degree_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_students(
    State(state): State<AppState>,
    Path(degree_id): Path<String>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    Ok(Json(state.users.students_of_degree(&degree_id).await?))
}

async fn append_course(
    State(state): State<AppState>,
    Path(degree_id): Path<String>,
    Json(spec): Json<CourseSpec>,
) -> ApiResult<Json<Degree>> {
    Ok(Json(state.catalog.append_course(&degree_id, &spec).await?))
}

async fn append_chapter(
    State(state): State<AppState>,
    Path((degree_id, course_id)): Path<(String, String)>,
    Json(spec): Json<ChapterSpec>,
) -> ApiResult<Json<Degree>> {
    Ok(Json(
        state
            .catalog
            .append_chapter(&degree_id, &course_id, &spec)
            .await?,
    ))
}

async fn append_lesson(
    State(state): State<AppState>,
    Path((degree_id, course_id, chapter_id)): Path<(String, String, String)>,
    Json(spec): Json<LessonSpec>,
) -> ApiResult<Json<Degree>> {
    Ok(Json(
        state
            .catalog
            .append_lesson(&degree_id, &course_id, &chapter_id, &spec)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct Submission {
    answers: Vec<AnswerRecord>,
}

async fn score_chapter_test(
    State(state): State<AppState>,
    Path((degree_id, course_id, chapter_id)): Path<(String, String, String)>,
    Json(submission): Json<Submission>,
) -> ApiResult<Json<serde_json::Value>> {
    let score = state
        .catalog
        .score_chapter_test(&degree_id, &course_id, &chapter_id, &submission.answers)
        .await?;
    Ok(Json(serde_json::json!({ "score": score })))
}

async fn score_final_test(
    State(state): State<AppState>,
    Path((degree_id, course_id)): Path<(String, String)>,
    Json(submission): Json<Submission>,
) -> ApiResult<Json<serde_json::Value>> {
    let score = state
        .catalog
        .score_final_test(&degree_id, &course_id, &submission.answers)
        .await?;
    Ok(Json(serde_json::json!({ "score": score })))
}

#[derive(Debug, Deserialize)]
struct EmailQuery {
    email: String,
}

async fn find_user(
    State(state): State<AppState>,
    Query(q): Query<EmailQuery>,
) -> ApiResult<Json<UserProfile>> {
    let user = state
        .users
        .find_by_email(&q.email)
        .await?
        .ok_or_else(|| CatalogError::not_found(crate::error::EntityKind::User, q.email.clone()))?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state.users.create_user(&new_user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.get_user(&user_id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.update_profile(&user_id, &update).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.users.delete_user(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_document(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(file): Json<FileUpload>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.upload_document(&user_id, &file).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseRequest {
    degree_id: String,
}

async fn record_purchase(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(
        state
            .users
            .record_purchase(&user_id, &request.degree_id)
            .await?,
    ))
}
