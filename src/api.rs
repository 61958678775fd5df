//! HTTP API for the department dashboard

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts;
use crate::auth::{AuthError, Authorizer, CredentialHasher, Principal, Role};
use crate::config::Thresholds;
use crate::db::Repository;
use crate::models::{DepartmentStats, Faculty, FacultyInsert, NewFaculty, Overview};
use crate::stats;

const DASHBOARD_VIEWERS: &[Role] = &[Role::Hod, Role::Principal];
const FACULTY_MANAGERS: &[Role] = &[Role::Hod];

/// Shared application state
pub struct AppState<R> {
    pub repository: R,
    pub authorizer: Arc<dyn Authorizer>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub thresholds: Thresholds,
    pub default_faculty_password: String,
}

impl<R: Repository> AppState<R> {
    pub fn new(
        repository: R,
        authorizer: Arc<dyn Authorizer>,
        hasher: Arc<dyn CredentialHasher>,
        thresholds: Thresholds,
        default_faculty_password: String,
    ) -> Self {
        Self {
            repository,
            authorizer,
            hasher,
            thresholds,
            default_faculty_password,
        }
    }

    fn principal(
        &self,
        headers: &HeaderMap,
        allowed: Option<&[Role]>,
    ) -> Result<Principal, ApiError> {
        let principal = self.authorizer.authenticate(headers)?;
        if let Some(roles) = allowed {
            principal.require(roles)?;
        }
        Ok(principal)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(AuthError::Unauthenticated) => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            ApiError::Auth(err @ AuthError::Forbidden(_)) => {
                warn!(error = %err, "request rejected");
                (StatusCode::FORBIDDEN, "Access denied".to_string())
            }
            ApiError::InvalidBody(rejection) => {
                warn!(error = %rejection.body_text(), "malformed request body");
                (rejection.status(), "Invalid request body".to_string())
            }
            ApiError::Internal(err) => {
                error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DepartmentQuery {
    pub department: Option<String>,
}

impl DepartmentQuery {
    /// The requested department; `?department=` with a blank value counts as absent.
    fn department(self) -> Option<String> {
        self.department
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct FacultyCreated {
    message: String,
    id: Uuid,
}

#[derive(Debug, Serialize)]
struct DepartmentStatus {
    department: String,
    status: &'static str,
    message: String,
}

/// Dashboard overview: grade bands, alerts and faculty headcount
async fn overview<R: Repository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Query(query): Query<DepartmentQuery>,
) -> Result<Json<Overview>, ApiError> {
    let principal = state.principal(&headers, Some(DASHBOARD_VIEWERS))?;
    let department = query.department().or(principal.department);
    info!(department = ?department, role = %principal.role, "overview requested");

    let records = state
        .repository
        .marks_for_department(department.as_deref())
        .await?;
    let faculty_count = state.repository.faculty_count(department.as_deref()).await?;

    Ok(Json(alerts::build_overview_now(
        &records,
        faculty_count,
        &state.thresholds,
    )))
}

async fn list_faculty<R: Repository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Query(query): Query<DepartmentQuery>,
) -> Result<Json<Vec<Faculty>>, ApiError> {
    let principal = state.principal(&headers, Some(DASHBOARD_VIEWERS))?;
    let department = query.department();
    info!(department = ?department, role = %principal.role, "faculty list requested");

    let rows = state.repository.list_faculty(department.as_deref()).await?;

    let mut faculty = Vec::with_capacity(rows.len());
    for row in rows {
        let subjects = state.repository.faculty_subjects(row.id).await?;
        faculty.push(Faculty::from_row(row, subjects));
    }

    Ok(Json(faculty))
}

async fn create_faculty<R: Repository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    payload: Result<Json<NewFaculty>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state.principal(&headers, Some(FACULTY_MANAGERS))?;
    let Json(body) = payload?;

    let password = body
        .password
        .filter(|password| !password.is_empty())
        .unwrap_or_else(|| state.default_faculty_password.clone());
    let hasher = Arc::clone(&state.hasher);
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .context("password hashing task failed")??;

    let insert = FacultyInsert {
        id: Uuid::new_v4(),
        username: body.username,
        full_name: body.full_name,
        email: body.email,
        password_hash,
        department: body.department,
        designation: body.designation,
    };
    let id = state.repository.insert_faculty(&insert).await?;
    info!(
        faculty_id = %id,
        department = %insert.department,
        created_by = %principal.user_id,
        "faculty created"
    );

    Ok((
        StatusCode::CREATED,
        Json(FacultyCreated {
            message: "Faculty created successfully".to_string(),
            id,
        }),
    ))
}

async fn department_stats<R: Repository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Path(department): Path<String>,
) -> Result<Json<DepartmentStats>, ApiError> {
    let principal = state.principal(&headers, None)?;
    info!(department = %department, role = %principal.role, "department stats requested");

    let records = state
        .repository
        .marks_for_department(Some(&department))
        .await?;

    Ok(Json(stats::department_stats(&records, &state.thresholds)))
}

/// Readiness placeholder kept separate from `/department/:dept/stats`
async fn department_status<R: Repository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Path(department): Path<String>,
) -> Result<Json<DepartmentStatus>, ApiError> {
    state.principal(&headers, None)?;

    Ok(Json(DepartmentStatus {
        message: format!("Analytics for department {department} are available"),
        department,
        status: "active",
    }))
}

/// Create the API router
pub fn create_router<R: Repository>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .route("/overview", get(overview::<R>))
        .route("/faculty", get(list_faculty::<R>).post(create_faculty::<R>))
        .route("/department/:dept", get(department_status::<R>))
        .route("/department/:dept/stats", get(department_stats::<R>))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

/// Start the API server
pub async fn serve<R: Repository>(bind_addr: &str, state: Arc<AppState<R>>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %bind_addr, "starting dashboard API");
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GatewayAuthorizer, USER_DEPARTMENT_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
    use crate::models::{FacultyRow, MarkRecord, MarkRow};
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryRepository {
        marks: Vec<MarkRecord>,
        faculty: Vec<FacultyRow>,
        subjects: HashMap<Uuid, Vec<String>>,
        inserted: Mutex<Vec<FacultyInsert>>,
        failing: bool,
    }

    impl MemoryRepository {
        fn check(&self) -> anyhow::Result<()> {
            if self.failing {
                anyhow::bail!("connection refused by postgres at 10.0.0.5");
            }
            Ok(())
        }
    }

    fn in_department(candidate: Option<&str>, department: Option<&str>) -> bool {
        department.is_none() || candidate == department
    }

    impl Repository for MemoryRepository {
        async fn marks_for_department(
            &self,
            department: Option<&str>,
        ) -> anyhow::Result<Vec<MarkRecord>> {
            self.check()?;
            Ok(self
                .marks
                .iter()
                .filter(|record| in_department(record.department.as_deref(), department))
                .cloned()
                .collect())
        }

        async fn faculty_count(&self, department: Option<&str>) -> anyhow::Result<i64> {
            let rows = self.list_faculty(department).await?;
            Ok(rows.len() as i64)
        }

        async fn list_faculty(&self, department: Option<&str>) -> anyhow::Result<Vec<FacultyRow>> {
            self.check()?;
            Ok(self
                .faculty
                .iter()
                .filter(|row| in_department(row.department.as_deref(), department))
                .cloned()
                .collect())
        }

        async fn faculty_subjects(&self, faculty_id: Uuid) -> anyhow::Result<Vec<String>> {
            Ok(self.subjects.get(&faculty_id).cloned().unwrap_or_default())
        }

        async fn insert_faculty(&self, faculty: &FacultyInsert) -> anyhow::Result<Uuid> {
            self.check()?;
            self.inserted.lock().unwrap().push(faculty.clone());
            Ok(faculty.id)
        }
    }

    struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, password: &str) -> anyhow::Result<String> {
            Ok(format!("plain:{password}"))
        }
    }

    fn mark(department: &str, subject: &str, marks: f64, status: &str) -> MarkRecord {
        MarkRecord::from_row(MarkRow {
            student_id: Uuid::new_v4(),
            student_name: Some("Avery Lee".to_string()),
            subject_id: Some(Uuid::new_v4()),
            subject_name: Some(subject.to_string()),
            department: Some(department.to_string()),
            marks_obtained: Some(marks),
            max_marks: Some(50.0),
            status: Some(status.to_string()),
        })
    }

    fn faculty_row(name: &str, department: &str) -> FacultyRow {
        FacultyRow {
            id: Uuid::new_v4(),
            username: name.to_lowercase(),
            full_name: Some(name.to_string()),
            department: Some(department.to_string()),
            designation: Some("Assistant Professor".to_string()),
        }
    }

    fn sample_repository() -> MemoryRepository {
        let shah = faculty_row("Shah", "CSE");
        let mut subjects = HashMap::new();
        subjects.insert(shah.id, vec!["Data Structures".to_string()]);

        MemoryRepository {
            marks: vec![
                mark("CSE", "Data Structures", 45.0, "FINALIZED"),
                mark("CSE", "Data Structures", 35.0, "PENDING"),
                mark("ECE", "Signals", 5.0, "FINALIZED"),
            ],
            faculty: vec![shah, faculty_row("Rao", "ECE")],
            subjects,
            ..MemoryRepository::default()
        }
    }

    fn setup(repository: MemoryRepository) -> (Router, Arc<AppState<MemoryRepository>>) {
        let state = Arc::new(AppState::new(
            repository,
            Arc::new(GatewayAuthorizer),
            Arc::new(PlainHasher),
            Thresholds::default(),
            "password123".to_string(),
        ));
        (create_router(Arc::clone(&state)), state)
    }

    fn request(method: &str, uri: &str, role: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match role {
            Some(role) => builder
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(USER_ROLE_HEADER, role),
            None => builder,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_overview_for_department() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/overview?department=CSE", Some("HOD"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["facultyCount"], 1);
        assert_eq!(body["gradeDistribution"]["A"], 1);
        assert_eq!(body["gradeDistribution"]["B"], 1);
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["severity"], "info");
        assert_eq!(alerts[0]["message"], "1 mark entries are pending review");
    }

    #[tokio::test]
    async fn test_overview_falls_back_to_caller_department() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/overview", Some("PRINCIPAL"))
                .header(USER_DEPARTMENT_HEADER, "ECE")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["facultyCount"], 1);
        assert_eq!(body["gradeDistribution"]["F"], 1);
        assert_eq!(body["alerts"][0]["severity"], "warning");
    }

    #[tokio::test]
    async fn test_blank_department_query_falls_back_to_caller_department() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/overview?department=", Some("HOD"))
                .header(USER_DEPARTMENT_HEADER, "ECE")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["facultyCount"], 1);
        assert_eq!(body["gradeDistribution"]["F"], 1);
        assert_eq!(body["gradeDistribution"]["A"], 0);
    }

    #[tokio::test]
    async fn test_overview_rejects_faculty_role() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/overview", Some("FACULTY"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Access denied");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _state) = setup(sample_repository());

        let (status, _body) = send(
            app,
            request("GET", "/department/CSE/stats", None)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_faculty_list_includes_subjects() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/faculty?department=CSE", Some("HOD"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let faculty = body.as_array().unwrap();
        assert_eq!(faculty.len(), 1);
        assert_eq!(faculty[0]["fullName"], "Shah");
        assert_eq!(faculty[0]["subjects"][0], "Data Structures");
    }

    #[tokio::test]
    async fn test_create_faculty_uses_default_password() {
        let (app, state) = setup(sample_repository());
        let payload = serde_json::json!({
            "username": "n.kapoor",
            "fullName": "Nisha Kapoor",
            "email": "n.kapoor@department.edu",
            "department": "CSE",
            "designation": "Lecturer"
        });

        let (status, body) = send(
            app,
            request("POST", "/faculty", Some("HOD"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Faculty created successfully");

        let inserted = state.repository.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].password_hash, "plain:password123");
        assert_eq!(body["id"], inserted[0].id.to_string());
    }

    #[tokio::test]
    async fn test_create_faculty_requires_hod() {
        let (app, state) = setup(sample_repository());
        let payload = serde_json::json!({
            "username": "n.kapoor",
            "fullName": "Nisha Kapoor",
            "email": "n.kapoor@department.edu",
            "password": "s3cret",
            "department": "CSE",
            "designation": "Lecturer"
        });

        let (status, _body) = send(
            app,
            request("POST", "/faculty", Some("PRINCIPAL"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.repository.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_faculty_with_missing_fields_returns_json_error() {
        let (app, state) = setup(sample_repository());
        let payload = serde_json::json!({ "username": "x", "department": "CSE" });

        let (status, body) = send(
            app,
            request("POST", "/faculty", Some("HOD"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, serde_json::json!({ "message": "Invalid request body" }));
        assert!(state.repository.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_department_stats_for_any_authenticated_role() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/department/CSE/stats", Some("STUDENT"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalStudents"], 2);
        assert_eq!(body["average"], 40.0);
        assert_eq!(body["passPercentage"], 100.0);
        assert_eq!(body["atRiskCount"], 0);
    }

    #[tokio::test]
    async fn test_department_status_stub() {
        let (app, _state) = setup(sample_repository());

        let (status, body) = send(
            app,
            request("GET", "/department/CSE", Some("FACULTY"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["department"], "CSE");
        assert_eq!(body["status"], "active");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_store_failure_returns_static_message() {
        let (app, _state) = setup(MemoryRepository {
            failing: true,
            ..MemoryRepository::default()
        });

        let (status, body) = send(
            app,
            request("GET", "/overview?department=CSE", Some("HOD"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "message": "Internal server error" }));
    }
}
