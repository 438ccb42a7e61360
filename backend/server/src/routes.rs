use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use ledger::{
    database::parse_date,
    password::verify_password,
    records::{BulkAction, Priority, SearchFilter, Status},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    error::AppError,
    session::clear_cookie,
    state::AppState,
    utils::{ComplaintForm, Registration, export_filename, integer},
};

type Payload<T> = Result<Json<T>, JsonRejection>;
type PathParam<T> = Result<Path<T>, PathRejection>;

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_status(raw: Option<&str>) -> Result<Status, AppError> {
    raw.and_then(Status::parse)
        .ok_or_else(|| AppError::bad_request("Invalid status"))
}

fn parse_priority(raw: Option<&str>) -> Result<Priority, AppError> {
    raw.and_then(Priority::parse)
        .ok_or_else(|| AppError::bad_request("Invalid priority"))
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<Registration>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload?;
    let profile = form.validate()?;

    let user = state.store.register_student(profile).await?;
    state.mirror.notify();
    info!("Registered student {}", user.student_id.as_deref().unwrap_or_default());

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Registration successful", "user": user })),
    ))
}

#[derive(Deserialize)]
pub struct LoginForm {
    login_type: Option<String>,
    student_id: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<LoginForm>,
) -> Result<Response, AppError> {
    let Json(form) = payload?;

    let user = if form.login_type.as_deref().unwrap_or("student") == "student" {
        let student_id = blank_to_none(form.student_id)
            .ok_or_else(|| AppError::bad_request("Student ID is required"))?;

        state
            .store
            .find_by_student_id(student_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found("Student ID not found. Please contact administration.")
            })?
    } else {
        let (Some(email), Some(password)) = (blank_to_none(form.email), form.password) else {
            return Err(AppError::bad_request("Email and password are required"));
        };
        let account = email.to_lowercase();
        if state.logins.is_locked(&account) {
            return Err(AppError::TooManyRequests);
        }

        let admin = state.store.find_admin_by_email(email).await?;
        let verified = match admin.as_ref().and_then(|a| a.password_hash.clone()) {
            Some(hash) => tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                .await
                .map_err(|e| AppError::InternalError(Box::new(e)))?,
            None => false,
        };

        match admin.filter(|_| verified) {
            Some(admin) => {
                state.logins.clear(&account);
                admin
            }
            None => {
                if state.logins.record_failure(&account) {
                    warn!("Locked administrator login for {account} after repeated failures");
                }
                return Err(AppError::Unauthorized("Invalid credentials".to_string()));
            }
        }
    };

    state.store.touch_last_login(user.id).await?;

    let mut response =
        Json(json!({ "message": "Login successful", "user": user })).into_response();
    if let Some(cookie) = state.sessions.set_cookie(user.id) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

pub async fn logout_handler() -> impl IntoResponse {
    (
        [(SET_COOKIE, clear_cookie())],
        Json(json!({ "message": "Logged out successfully" })),
    )
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let unauthorized = || AppError::Unauthorized("Authentication required".to_string());
    let user_id = state.sessions.user_id(&headers).ok_or_else(unauthorized)?;
    let user = state.store.get_user(user_id).await?.ok_or_else(unauthorized)?;

    Ok(Json(user))
}

pub async fn create_complaint_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<ComplaintForm>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload?;
    let new = form.validate()?;

    let complaint = state.store.create_complaint(new).await?;
    state.mirror.notify();
    info!("Filed complaint {}", complaint.complaint_id);

    Ok((StatusCode::CREATED, Json(complaint)))
}

#[derive(Deserialize)]
pub struct ListParams {
    user_id: Option<String>,
}

pub async fn list_complaints_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = blank_to_none(params.user_id)
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .map_err(|_| AppError::bad_request("Invalid user_id"))?;

    Ok(Json(state.store.list_complaints(user_id).await?))
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    department_id: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
}

impl SearchParams {
    fn into_filter(self) -> Result<SearchFilter, AppError> {
        let date = |raw: Option<String>, field: &str| {
            blank_to_none(raw)
                .map(|d| parse_date(&d).ok_or_else(|| AppError::bad_request(format!("Invalid {field}"))))
                .transpose()
        };

        Ok(SearchFilter {
            query: blank_to_none(self.q),
            status: blank_to_none(self.status)
                .map(|s| parse_status(Some(&s)))
                .transpose()?,
            priority: blank_to_none(self.priority)
                .map(|p| parse_priority(Some(&p)))
                .transpose()?,
            department_id: blank_to_none(self.department_id)
                .map(|d| d.parse::<i64>())
                .transpose()
                .map_err(|_| AppError::bad_request("Invalid department_id"))?,
            date_from: date(self.date_from, "date_from")?,
            date_to: date(self.date_to, "date_to")?,
        })
    }
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let complaints = state.store.search(params.into_filter()?).await?;

    Ok(Json(json!({ "total": complaints.len(), "complaints": complaints })))
}

pub async fn export_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.store.export_rows().await?;

    Ok(Json(json!({ "data": data, "filename": export_filename() })))
}

#[derive(Deserialize)]
pub struct BulkForm {
    #[serde(default)]
    complaint_ids: Vec<i64>,
    action: Option<String>,
    value: Option<Value>,
    admin_id: Option<i64>,
}

impl BulkForm {
    fn action(&self) -> Result<BulkAction, AppError> {
        let value = self.value.as_ref().filter(|v| !v.is_null());
        if self.complaint_ids.is_empty() || self.action.is_none() || value.is_none() {
            return Err(AppError::bad_request("Missing required fields"));
        }

        match self.action.as_deref() {
            Some("status") => Ok(BulkAction::Status(parse_status(value.and_then(Value::as_str))?)),
            Some("priority") => Ok(BulkAction::Priority(parse_priority(
                value.and_then(Value::as_str),
            )?)),
            Some("assign") => self
                .admin_id
                .or_else(|| integer(value))
                .map(BulkAction::Assign)
                .ok_or_else(|| AppError::bad_request("Admin ID required")),
            _ => Err(AppError::bad_request("Invalid action")),
        }
    }
}

pub async fn bulk_update_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<BulkForm>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload?;
    let action = form.action()?;

    let updated = state.store.bulk_update(form.complaint_ids, action).await?;
    state.mirror.notify();

    Ok(Json(json!({
        "message": format!("Successfully updated {updated} complaints"),
        "updated_count": updated,
    })))
}

#[derive(Deserialize)]
pub struct StatusForm {
    status: Option<String>,
    admin_comment: Option<String>,
    admin_id: Option<i64>,
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
    payload: Payload<StatusForm>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(form) = payload?;
    let status = parse_status(form.status.as_deref())?;

    let complaint = state
        .store
        .update_status(id, status, blank_to_none(form.admin_comment), form.admin_id)
        .await?;
    state.mirror.notify();

    Ok(Json(json!({
        "message": format!("Complaint status updated to {status}"),
        "complaint": complaint,
    })))
}

#[derive(Deserialize)]
pub struct PriorityForm {
    priority: Option<String>,
}

pub async fn priority_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
    payload: Payload<PriorityForm>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(form) = payload?;
    let priority = parse_priority(form.priority.as_deref())?;

    let complaint = state.store.update_priority(id, priority).await?;
    state.mirror.notify();

    Ok(Json(complaint))
}

#[derive(Deserialize)]
pub struct CommentForm {
    admin_id: Option<i64>,
    text: Option<String>,
}

pub async fn add_comment_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
    payload: Payload<CommentForm>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(form) = payload?;
    let (Some(admin_id), Some(text)) = (form.admin_id, blank_to_none(form.text)) else {
        return Err(AppError::bad_request("Admin ID and text required"));
    };

    let comment = state.store.add_comment(id, admin_id, text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    Ok(Json(state.store.list_comments(id).await?))
}

pub async fn departments_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let store = &state.store;
    let departments = state
        .cache
        .departments
        .get_or_load(store.list_departments())
        .await?;

    Ok(Json(departments))
}

pub async fn department_categories_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let Path(department_id) = path?;
    Ok(Json(
        state.store.list_categories_by_department(department_id).await?,
    ))
}

pub async fn courses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let store = &state.store;
    let courses = state.cache.courses.get_or_load(store.list_courses()).await?;

    Ok(Json(courses))
}

pub async fn department_courses_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let Path(department_id) = path?;
    Ok(Json(
        state.store.list_courses_by_department(department_id).await?,
    ))
}

pub async fn categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let store = &state.store;
    let categories = state
        .cache
        .categories
        .get_or_load(store.list_categories())
        .await?;

    Ok(Json(categories))
}

pub async fn student_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let Path(student_id) = path?;
    let student = state
        .store
        .find_by_student_id(student_id)
        .await?
        .ok_or_else(|| AppError::not_found("Student not found"))?;

    Ok(Json(student))
}

/// Applies pending mirror changes so a reader sees its own writes.
async fn catch_up(state: &AppState) {
    if let Err(e) = state.mirror.drain(&state.store).await {
        warn!("CSV mirror behind, serving last written rows: {e}");
    }
}

pub async fn student_complaints_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let Path(student_id) = path?;
    catch_up(&state).await;

    Ok(Json(state.mirror.read_student_complaints(&student_id).await?))
}

pub async fn all_student_complaints_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    catch_up(&state).await;

    Ok(Json(state.mirror.read_all_complaints().await?))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.store.stats().await?))
}

pub async fn notifications_handler(
    State(state): State<Arc<AppState>>,
    path: PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let Path(user_id) = path?;
    let notifications = state.store.notifications(user_id).await?;

    Ok(Json(json!({ "notifications": notifications })))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected", "timestamp": timestamp })),
        ),
        Err(e) => {
            warn!("Health probe failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

pub async fn not_found_handler() -> impl IntoResponse {
    AppError::not_found("Resource not found")
}
