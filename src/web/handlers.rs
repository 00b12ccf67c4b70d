//! JSON request handlers. Each one is a thin shell around a `core` operation.

use crate::{
    core::{
        access::Principal,
        auth, ledger,
        ledger::TransactionFilter,
        report::{self, Dashboard},
        student::{self, NewStudent, StudentDetail, StudentUpdate},
    },
    entities::{StudentModel, TransactionModel, TransactionType},
    errors::Result,
    web::{
        AppState,
        extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
        session::Session,
    },
};
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Password login body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Staff username
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Phone login body.
#[derive(Debug, Deserialize)]
pub struct PhoneLoginRequest {
    /// Phone number shared by the student's family
    pub phone: String,
}

/// Returned by both logins.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for later requests
    pub token: String,
    /// Who logged in
    pub principal: Principal,
}

async fn open_session(state: &AppState, principal: Principal) -> Json<LoginResponse> {
    let token = state
        .sessions
        .create(Session::new(principal.user_id, principal.phone.clone()))
        .await;
    Json(LoginResponse { token, principal })
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub(crate) async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let principal = auth::authenticate_password(&state.db, &payload.username, &payload.password).await?;
    Ok(open_session(&state, principal).await)
}

#[instrument(skip(state, payload))]
pub(crate) async fn student_login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PhoneLoginRequest>,
) -> Result<Json<LoginResponse>> {
    let principal = auth::authenticate_phone(&state.db, &payload.phone).await?;
    Ok(open_session(&state, principal).await)
}

pub(crate) async fn logout(State(state): State<AppState>, user: CurrentUser) -> StatusCode {
    state.sessions.remove(&user.token).await;
    info!(username = %user.principal.username, "Logged out");
    StatusCode::NO_CONTENT
}

pub(crate) async fn me(user: CurrentUser) -> Json<Principal> {
    Json(user.principal)
}

pub(crate) async fn home(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Dashboard>> {
    let view = report::dashboard(
        &state.db,
        &user.principal,
        state.config.recent_transactions_limit,
    )
    .await?;
    Ok(Json(view))
}

/// Award body.
#[derive(Debug, Deserialize)]
pub struct AwardRequest {
    /// Students to award
    pub student_ids: Vec<i64>,
    /// Coins per student
    pub amount: i64,
}

pub(crate) async fn award(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<AwardRequest>,
) -> Result<(StatusCode, Json<Vec<TransactionModel>>)> {
    let created = ledger::award(
        &state.db,
        &user.principal,
        &payload.student_ids,
        payload.amount,
        state.config.max_award_amount,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Deduct body.
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// Student to deduct from
    pub student_id: i64,
    /// Coins to remove
    pub amount: i64,
    /// Reason, mandatory
    #[serde(default)]
    pub comment: String,
}

pub(crate) async fn deduct(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<DeductRequest>,
) -> Result<(StatusCode, Json<TransactionModel>)> {
    let entry = ledger::deduct(
        &state.db,
        &user.principal,
        payload.student_id,
        payload.amount,
        &payload.comment,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// History query string.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only this student
    pub student_id: Option<i64>,
    /// AWARD or DEDUCT
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    /// Free-text search
    pub search: Option<String>,
    /// Maximum rows
    pub limit: Option<u64>,
}

pub(crate) async fn transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Vec<TransactionModel>>> {
    let filter = TransactionFilter {
        student_id: query.student_id,
        kind: query.kind,
        search: query.search,
        limit: query.limit,
    };
    Ok(Json(ledger::history(&state.db, &user.principal, &filter).await?))
}

/// Award correction body.
#[derive(Debug, Deserialize)]
pub struct EditAwardRequest {
    /// Corrected amount
    pub amount: i64,
}

pub(crate) async fn edit_transaction(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<EditAwardRequest>,
) -> Result<Json<TransactionModel>> {
    let updated = ledger::edit_award(
        &state.db,
        &user.principal,
        id,
        payload.amount,
        state.config.max_award_amount,
    )
    .await?;
    Ok(Json(updated))
}

/// Student list query string.
#[derive(Debug, Default, Deserialize)]
pub struct StudentQuery {
    /// Free-text search
    pub search: Option<String>,
}

pub(crate) async fn list_students(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<StudentQuery>,
) -> Result<Json<Vec<StudentModel>>> {
    let students =
        student::list_students(&state.db, &user.principal, query.search.as_deref()).await?;
    Ok(Json(students))
}

pub(crate) async fn create_student(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<NewStudent>,
) -> Result<(StatusCode, Json<StudentModel>)> {
    let created = student::create_student(&state.db, &user.principal, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn student_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<StudentDetail>> {
    let detail = student::get_student_detail(
        &state.db,
        &user.principal,
        id,
        state.config.recent_transactions_limit,
    )
    .await?;
    Ok(Json(detail))
}

pub(crate) async fn update_student(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<StudentUpdate>,
) -> Result<Json<StudentModel>> {
    let updated = student::update_student(&state.db, &user.principal, id, payload).await?;
    Ok(Json(updated))
}

pub(crate) async fn award_candidates(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<StudentModel>>> {
    Ok(Json(
        student::award_candidates(&state.db, &user.principal).await?,
    ))
}
