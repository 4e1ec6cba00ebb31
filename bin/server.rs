// Split Ledger - API Server
// REST surface over the balance ledger core. Domain errors bubble up as
// AppError and are translated into the JSON envelope in one place.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing_subscriber::EnvFilter;

use split_ledger::{auth, balances, db, expenses, groups, AppError, Config};
use split_ledger::{NewExpense, SplitInput, SplitSpec, SplitType};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

// ============================================================================
// Response envelope
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Serialize)]
struct FieldError {
    field: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
}

/// Boundary translation of domain errors into HTTP responses.
struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<Vec<FieldError>>,
}

impl ApiError {
    fn validation_failed(details: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation failed".to_string(),
            details: Some(details),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 5xx details stay in the log, not in the response
        let message = if status.is_server_error() {
            error!("request failed: {}", err);
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        Self { status, message, details: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Bearer-token extractor
// ============================================================================

/// The authenticated caller, resolved from the Authorization header.
struct AuthUser(String);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::from(AppError::unauthorized("No token provided. Please authenticate."))
        })?;

        let user_id = auth::verify_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser(user_id))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct GroupBody {
    name: Option<String>,
    #[serde(rename = "memberEmails")]
    member_emails: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct MembersBody {
    #[serde(rename = "memberEmails")]
    member_emails: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ExpenseBody {
    description: Option<String>,
    amount: Option<f64>,
    #[serde(rename = "splitType")]
    split_type: Option<String>,
    splits: Option<Vec<SplitInput>>,
}

#[derive(Deserialize)]
struct SettleBody {
    #[serde(rename = "creditorId")]
    creditor_id: Option<String>,
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

fn field_error(field: &str, message: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /auth/register - Create an account and issue a token
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();

    let name = body.name.unwrap_or_default();
    if name.trim().is_empty() {
        errors.push(field_error("name", "Name is required"));
    }
    let email = body.email.unwrap_or_default();
    if email.trim().is_empty() || !email.contains('@') {
        errors.push(field_error("email", "A valid email is required"));
    }
    let password = body.password.unwrap_or_default();
    if password.len() < 6 {
        errors.push(field_error("password", "Password must be at least 6 characters"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation_failed(errors));
    }

    let conn = state.db.lock().unwrap();
    let session = auth::register(
        &conn,
        &name,
        &email,
        &password,
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
    )?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(session))))
}

/// POST /auth/login - Exchange credentials for a token
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();

    let email = body.email.unwrap_or_default();
    if email.trim().is_empty() {
        errors.push(field_error("email", "Email is required"));
    }
    let password = body.password.unwrap_or_default();
    if password.is_empty() {
        errors.push(field_error("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation_failed(errors));
    }

    let conn = state.db.lock().unwrap();
    let session = auth::login(
        &conn,
        &email,
        &password,
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
    )?;

    Ok(Json(ApiResponse::ok(session)))
}

/// GET /auth/me - The authenticated user
async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let user = auth::get_user(&conn, &user_id)?;
    Ok(Json(ApiResponse::ok(user)))
}

/// POST /groups - Create a group
async fn create_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<GroupBody>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.unwrap_or_default();
    let trimmed = name.trim();
    if trimmed.len() < 2 || trimmed.len() > 50 {
        return Err(ApiError::validation_failed(vec![field_error(
            "name",
            "Group name must be between 2 and 50 characters",
        )]));
    }

    let member_emails = body.member_emails.unwrap_or_default();

    let mut conn = state.db.lock().unwrap();
    let view = groups::create_group(&mut conn, &user_id, trimmed, &member_emails)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /groups - Groups the caller belongs to
async fn list_groups(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let views = groups::user_groups(&conn, &user_id)?;
    Ok(Json(ApiResponse::ok(views)))
}

/// GET /groups/:group_id - One group, membership required
async fn get_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let view = groups::get_group(&conn, &group_id, &user_id)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// POST /groups/:group_id/members - Add members by email (creator only)
async fn add_members(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
    Json(body): Json<MembersBody>,
) -> Result<impl IntoResponse, ApiError> {
    let member_emails = body.member_emails.unwrap_or_default();
    if member_emails.is_empty() {
        return Err(ApiError::validation_failed(vec![field_error(
            "memberEmails",
            "At least one email is required",
        )]));
    }

    let mut conn = state.db.lock().unwrap();
    let view = groups::add_members(&mut conn, &group_id, &user_id, &member_emails)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// DELETE /groups/:group_id/members/:member_id - Remove a member (creator only)
async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((group_id, member_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let view = groups::remove_member(&conn, &group_id, &user_id, &member_id)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// POST /groups/:group_id/expenses - Create an expense
async fn create_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
    Json(body): Json<ExpenseBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();

    let description = body.description.unwrap_or_default();
    if description.trim().is_empty() {
        errors.push(field_error("description", "Description is required"));
    } else if description.trim().len() > 200 {
        errors.push(field_error("description", "Description cannot exceed 200 characters"));
    }

    let amount = body.amount.unwrap_or(0.0);
    if amount <= 0.0 {
        errors.push(field_error("amount", "Amount must be greater than 0"));
    }

    let split_type_raw = body.split_type.unwrap_or_default();
    if split_type_raw.is_empty() {
        errors.push(field_error("splitType", "Split type is required"));
    }

    if !errors.is_empty() {
        return Err(ApiError::validation_failed(errors));
    }

    // Unknown split types and per-entry field mismatches surface as plain
    // 400s from the domain layer.
    let split_type = SplitType::parse(&split_type_raw)?;
    let splits = body.splits.unwrap_or_default();
    let spec = SplitSpec::from_request(split_type, &splits)?;

    let req = NewExpense {
        group_id,
        description,
        amount,
        split: spec,
    };

    let mut conn = state.db.lock().unwrap();
    let view = expenses::create_expense(&mut conn, &user_id, &req)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /groups/:group_id/expenses?page&limit - Paginated expense list
async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    let conn = state.db.lock().unwrap();
    let result = expenses::list_expenses(&conn, &user_id, &group_id, page, limit)?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /groups/:group_id/balances - Balance summary for a group
async fn group_balances(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let view = balances::group_balances(&conn, &user_id, &group_id)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// GET /users/me/balances - Balances across all of the caller's groups
async fn my_balances(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock().unwrap();
    let view = balances::overall_balances(&conn, &user_id)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// POST /groups/:group_id/settle - Settle debt with another member
async fn settle(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<String>,
    Json(body): Json<SettleBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();

    let creditor_id = body.creditor_id.unwrap_or_default();
    if creditor_id.is_empty() {
        errors.push(field_error("creditorId", "Creditor is required"));
    }
    let amount = body.amount.unwrap_or(0.0);
    if amount <= 0.0 {
        errors.push(field_error("amount", "Amount must be greater than 0"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation_failed(errors));
    }

    let mut conn = state.db.lock().unwrap();
    let receipt = balances::settle_debt(&mut conn, &user_id, &group_id, &creditor_id, amount)?;
    Ok(Json(ApiResponse::ok(receipt)))
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/groups", post(create_group).get(list_groups))
        .route("/groups/:group_id", get(get_group))
        .route("/groups/:group_id/members", post(add_members))
        .route("/groups/:group_id/members/:member_id", delete(remove_member))
        .route("/groups/:group_id/expenses", post(create_expense).get(list_expenses))
        .route("/groups/:group_id/balances", get(group_balances))
        .route("/groups/:group_id/settle", post(settle))
        .route("/users/me/balances", get(my_balances))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Split Ledger - API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env();

    let conn = db::open(FsPath::new(&config.database_path)).expect("Failed to open database");
    db::setup_database(&conn).expect("Failed to set up schema");
    println!("✓ Database opened: {}", config.database_path);

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", bind_addr);
    println!("   Try: curl http://{}/health", bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
