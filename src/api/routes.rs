//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::Recipient;
use crate::error::AppError;
use crate::registry::{FlowChange, ReconcileReport, RecipientChange};
use crate::session::{DashboardSession, RecipientUnwrap, SessionOverview, WalletReceipt};

/// Shared state of all handlers
pub type AppState = Arc<DashboardSession>;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRecipientRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub was_connected: bool,
}

#[derive(Debug, Serialize)]
pub struct RemoveRecipientResponse {
    pub address: String,
    pub change: FlowChange,
}

#[derive(Debug, Serialize)]
pub struct ClearRecipientsResponse {
    pub removed: usize,
}

// =========================================================================
// API Router
// =========================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Session
        .route("/session", get(get_session))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
        // Own wallet
        .route("/wrap", post(wrap))
        .route("/unwrap", post(unwrap))
        // Recipients
        .route(
            "/recipients",
            get(list_recipients)
                .post(add_recipient)
                .delete(clear_recipients),
        )
        .route("/recipients/reconcile", post(reconcile))
        .route("/recipients/:address", delete(remove_recipient))
        .route("/recipients/:address/pause", post(pause_recipient))
        .route("/recipients/:address/resume", post(resume_recipient))
        .route("/recipients/:address/unwrap", post(unwrap_for_recipient))
}

// =========================================================================
// Session
// =========================================================================

/// Current dashboard view
async fn get_session(State(session): State<AppState>) -> Json<SessionOverview> {
    Json(session.overview().await)
}

async fn connect(State(session): State<AppState>) -> Result<Json<SessionOverview>, AppError> {
    Ok(Json(session.connect().await?))
}

async fn disconnect(State(session): State<AppState>) -> Json<DisconnectResponse> {
    Json(DisconnectResponse {
        was_connected: session.disconnect().await,
    })
}

// =========================================================================
// Own wallet
// =========================================================================

/// Wrap underlying tokens, approving the allowance first if needed
async fn wrap(
    State(session): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(session.wrap(&request.amount).await?))
}

async fn unwrap(
    State(session): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(session.unwrap(&request.amount).await?))
}

// =========================================================================
// Recipients
// =========================================================================

async fn list_recipients(State(session): State<AppState>) -> Json<Vec<Recipient>> {
    Json(session.recipients().await)
}

/// Start streaming to a new recipient
async fn add_recipient(
    State(session): State<AppState>,
    Json(request): Json<AddRecipientRequest>,
) -> Result<(StatusCode, Json<RecipientChange>), AppError> {
    let change = session.add_recipient(&request.address).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

async fn clear_recipients(
    State(session): State<AppState>,
) -> Result<Json<ClearRecipientsResponse>, AppError> {
    let removed = session.clear_recipients().await?;
    Ok(Json(ClearRecipientsResponse { removed }))
}

async fn pause_recipient(
    State(session): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<RecipientChange>, AppError> {
    Ok(Json(session.pause(&address).await?))
}

async fn resume_recipient(
    State(session): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<RecipientChange>, AppError> {
    Ok(Json(session.resume(&address).await?))
}

/// Stop tracking a recipient, closing its flow if one is running
async fn remove_recipient(
    State(session): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<RemoveRecipientResponse>, AppError> {
    let change = session.remove(&address).await?;
    Ok(Json(RemoveRecipientResponse { address, change }))
}

/// Partially unwrap a recipient's wrapped balance
async fn unwrap_for_recipient(
    State(session): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<RecipientUnwrap>, AppError> {
    Ok(Json(session.unwrap_for_recipient(&address).await?))
}

async fn reconcile(State(session): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(session.reconcile_now().await?))
}
