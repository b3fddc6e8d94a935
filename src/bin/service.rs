// src/bin/service.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The reference HTTP deployment: a thin axum layer translating JSON
//! bodies to and from [`pos_kernel::Kernel`] calls. One route per
//! `RequestSurface` operation, under `/api/terminals/:terminal_id/...` —
//! the terminal id is part of every path because a single process can hold
//! locks on more than one terminal at once.
//!
//! This binary owns no transaction logic of its own: every handler below
//! is validate-nothing, translate-and-delegate. The kernel enforces every
//! invariant and writes every WAL frame; this binary only maps HTTP
//! concerns (paths, JSON, status codes) onto it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, patch, post};
use axum::Router;
use pos_kernel::{ItemType, Kernel, KernelConfig, KernelError, Money, ProductRef, TenderKind, TxSnapshot, Ulid};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

type AppState = Arc<Kernel>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "pos_kernel_service=info,pos_kernel=info".into()))
        .init();

    let config = KernelConfig::from_env();
    info!(data_dir = %config.data_dir.display(), "starting pos-kernel-service");
    let kernel: AppState = Arc::new(Kernel::new(config));

    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/terminals", get(list_terminals_handler))
        .route("/api/terminals/:terminal_id", post(open_terminal_handler).delete(close_terminal_handler))
        .route("/api/terminals/:terminal_id/sessions", post(create_session_handler))
        .route("/api/terminals/:terminal_id/sessions/:session_id", axum::routing::delete(close_session_handler))
        .route("/api/terminals/:terminal_id/sessions/:session_id/transactions", post(begin_tx_handler))
        .route("/api/terminals/:terminal_id/transactions/:tx_id", get(get_tx_handler))
        .route("/api/terminals/:terminal_id/transactions/:tx_id/cancel", post(cancel_tx_handler))
        .route("/api/terminals/:terminal_id/transactions/:tx_id/lines", post(add_line_handler))
        .route(
            "/api/terminals/:terminal_id/transactions/:tx_id/lines/:line_item_id/children",
            post(add_child_line_handler),
        )
        .route(
            "/api/terminals/:terminal_id/transactions/:tx_id/lines/:line_item_id/quantity",
            patch(update_line_qty_handler),
        )
        .route(
            "/api/terminals/:terminal_id/transactions/:tx_id/lines/:line_item_id/notes",
            patch(update_line_notes_handler),
        )
        .route(
            "/api/terminals/:terminal_id/transactions/:tx_id/lines/:line_item_id/void",
            post(void_line_handler),
        )
        .route("/api/terminals/:terminal_id/transactions/:tx_id/tenders", post(add_tender_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(kernel.clone());

    let port: u16 = std::env::var("POS_KERNEL_HTTP_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(kernel.clone())).await?;

    Ok(())
}

/// Waits for `SIGINT`/`SIGTERM`, then releases every terminal lock this
/// process holds before the server actually stops accepting connections —
/// the graceful-shutdown contract of SPEC_FULL §6.1.
async fn shutdown_signal(kernel: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, releasing terminal locks");
    if let Err(err) = kernel.close_all_terminals() {
        error!(%err, "failed to release all terminals cleanly during shutdown");
    }
}

// --- Wire DTOs ---
//
// These mirror the kernel's domain types field-for-field; they exist only
// so serde has something to (de)serialize — no business logic lives here.

#[derive(Debug, Serialize, Deserialize)]
struct MoneyDto {
    currency: String,
    decimal_places: u8,
    minor_units: i64,
}

impl MoneyDto {
    fn into_money(self) -> Result<Money, KernelError> {
        Money::new(&self.currency, self.decimal_places, self.minor_units)
    }

    fn from_money(m: &Money) -> Self {
        Self {
            currency: m.currency().to_string(),
            decimal_places: m.decimal_places(),
            minor_units: m.minor_units(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductDto {
    sku: String,
    name: Option<String>,
    description: Option<String>,
}

impl ProductDto {
    fn into_product(self) -> Result<ProductRef, KernelError> {
        let mut product = ProductRef::new(self.sku)?;
        if let Some(name) = self.name {
            product = product.with_name(name);
        }
        if let Some(description) = self.description {
            product = product.with_description(description);
        }
        Ok(product)
    }
}

#[derive(Debug, Serialize)]
struct LineSnapshotDto {
    line_item_id: String,
    line_number: u32,
    parent_line_item_id: Option<String>,
    sku: String,
    name: Option<String>,
    description: Option<String>,
    quantity: i32,
    unit_price: MoneyDto,
    extended_price: MoneyDto,
    preparation_notes: String,
    is_voided: bool,
    void_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct TenderSnapshotDto {
    tender_sequence: u32,
    kind: String,
    amount: MoneyDto,
}

#[derive(Debug, Serialize)]
struct TxSnapshotDto {
    transaction_id: String,
    session_id: String,
    currency: String,
    decimal_places: u8,
    state: String,
    lines: Vec<LineSnapshotDto>,
    tenders: Vec<TenderSnapshotDto>,
    total: MoneyDto,
    tendered: MoneyDto,
    change_due: Option<MoneyDto>,
}

impl From<TxSnapshot> for TxSnapshotDto {
    fn from(snap: TxSnapshot) -> Self {
        Self {
            transaction_id: snap.transaction_id.as_str().to_string(),
            session_id: snap.session_id.as_str().to_string(),
            currency: snap.currency,
            decimal_places: snap.decimal_places,
            state: format!("{:?}", snap.state),
            lines: snap
                .lines
                .into_iter()
                .map(|l| LineSnapshotDto {
                    line_item_id: l.line_item_id.as_str().to_string(),
                    line_number: l.line_number,
                    parent_line_item_id: l.parent_line_item_id.map(|id| id.as_str().to_string()),
                    sku: l.product.sku().to_string(),
                    name: l.product.name().map(str::to_string),
                    description: l.product.description().map(str::to_string),
                    quantity: l.quantity,
                    unit_price: MoneyDto::from_money(&l.unit_price),
                    extended_price: MoneyDto::from_money(&l.extended_price),
                    preparation_notes: l.preparation_notes,
                    is_voided: l.is_voided,
                    void_reason: l.void_reason,
                })
                .collect(),
            tenders: snap
                .tenders
                .into_iter()
                .map(|t| TenderSnapshotDto {
                    tender_sequence: t.tender_sequence,
                    kind: t.kind.as_wal_str().to_string(),
                    amount: MoneyDto::from_money(&t.amount),
                })
                .collect(),
            total: MoneyDto::from_money(&snap.total),
            tendered: MoneyDto::from_money(&snap.tendered),
            change_due: snap.change_due.as_ref().map(MoneyDto::from_money),
        }
    }
}

fn parse_item_type(s: &str) -> Result<ItemType, KernelError> {
    match s {
        "Modification" => Ok(ItemType::Modification),
        "AutomaticInclusion" => Ok(ItemType::AutomaticInclusion),
        "Discount" => Ok(ItemType::Discount),
        "Tax" => Ok(ItemType::Tax),
        "Fee" => Ok(ItemType::Fee),
        _ => Err(KernelError::InvalidItemType),
    }
}

/// Maps the kernel's stable error codes (spec.md §7) onto HTTP statuses.
/// The JSON body always carries the same `code`/`message` shape so callers
/// never need to branch on HTTP status alone.
fn kernel_error_response(err: KernelError) -> axum::response::Response {
    let status = match &err {
        KernelError::TerminalBusy => StatusCode::CONFLICT,
        KernelError::TerminalNotOwned => StatusCode::CONFLICT,
        KernelError::WalCorrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        KernelError::IoFatal(_) => StatusCode::SERVICE_UNAVAILABLE,
        KernelError::SessionNotFound => StatusCode::NOT_FOUND,
        KernelError::SessionBusy => StatusCode::CONFLICT,
        KernelError::TxNotFound => StatusCode::NOT_FOUND,
        KernelError::InvalidState => StatusCode::CONFLICT,
        KernelError::LineNotFound => StatusCode::NOT_FOUND,
        KernelError::ParentVoided => StatusCode::CONFLICT,
        KernelError::InvalidItemType => StatusCode::BAD_REQUEST,
        KernelError::InvalidQuantity => StatusCode::BAD_REQUEST,
        KernelError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
        KernelError::CurrencyMismatch => StatusCode::BAD_REQUEST,
        KernelError::DecimalPlacesMismatch => StatusCode::BAD_REQUEST,
        KernelError::InvalidCurrency(_) => StatusCode::BAD_REQUEST,
        KernelError::Arithmetic => StatusCode::BAD_REQUEST,
        KernelError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(%err, "internal kernel error surfaced to caller");
    }
    let body = serde_json::json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    (status, Json(body)).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "build_date": env!("BUILD_DATE"),
        "git_hash": env!("GIT_HASH"),
    }))
}

async fn list_terminals_handler(State(kernel): State<AppState>) -> impl IntoResponse {
    match kernel.list_active_terminals() {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

async fn open_terminal_handler(State(kernel): State<AppState>, Path(terminal_id): Path<String>) -> impl IntoResponse {
    match kernel.open_terminal(&terminal_id) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "terminal_id": terminal_id }))).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

async fn close_terminal_handler(State(kernel): State<AppState>, Path(terminal_id): Path<String>) -> impl IntoResponse {
    match kernel.close_terminal(&terminal_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    operator_id: Option<String>,
}

async fn create_session_handler(
    State(kernel): State<AppState>,
    Path(terminal_id): Path<String>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match kernel.create_session(&terminal_id, req.operator_id) {
        Ok(session_id) => (StatusCode::CREATED, Json(serde_json::json!({ "session_id": session_id.as_str() }))).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

async fn close_session_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, session_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match kernel.close_session(&terminal_id, &Ulid::from_string(session_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct BeginTxRequest {
    currency: String,
    decimal_places: u8,
}

async fn begin_tx_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, session_id)): Path<(String, String)>,
    Json(req): Json<BeginTxRequest>,
) -> impl IntoResponse {
    match kernel.begin_tx(&terminal_id, &Ulid::from_string(session_id), &req.currency, req.decimal_places) {
        Ok(tx_id) => (StatusCode::CREATED, Json(serde_json::json!({ "transaction_id": tx_id.as_str() }))).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

async fn get_tx_handler(State(kernel): State<AppState>, Path((terminal_id, tx_id)): Path<(String, String)>) -> impl IntoResponse {
    match kernel.get_tx(&terminal_id, &Ulid::from_string(tx_id)) {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct CancelRequest {
    reason: Option<String>,
}

async fn cancel_tx_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id)): Path<(String, String)>,
    body: Option<Json<CancelRequest>>,
) -> impl IntoResponse {
    let reason = body.map(|Json(b)| b.reason).unwrap_or(None);
    match kernel.cancel_tx(&terminal_id, &Ulid::from_string(tx_id), reason) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct AddLineRequest {
    product: ProductDto,
    quantity: i32,
    unit_price: MoneyDto,
}

async fn add_line_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id)): Path<(String, String)>,
    Json(req): Json<AddLineRequest>,
) -> impl IntoResponse {
    let result = (|| -> Result<TxSnapshot, KernelError> {
        let product = req.product.into_product()?;
        let unit_price = req.unit_price.into_money()?;
        kernel.add_line(&terminal_id, &Ulid::from_string(tx_id), product, req.quantity, unit_price)
    })();

    match result {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct AddChildLineRequest {
    product: ProductDto,
    quantity: i32,
    unit_price: MoneyDto,
    item_type: String,
}

async fn add_child_line_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id, line_item_id)): Path<(String, String, String)>,
    Json(req): Json<AddChildLineRequest>,
) -> impl IntoResponse {
    let result = (|| -> Result<TxSnapshot, KernelError> {
        let product = req.product.into_product()?;
        let unit_price = req.unit_price.into_money()?;
        let item_type = parse_item_type(&req.item_type)?;
        kernel.add_child_line(
            &terminal_id,
            &Ulid::from_string(tx_id),
            &Ulid::from_string(line_item_id),
            product,
            req.quantity,
            unit_price,
            item_type,
        )
    })();

    match result {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    new_quantity: i32,
}

async fn update_line_qty_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id, line_item_id)): Path<(String, String, String)>,
    Json(req): Json<UpdateQuantityRequest>,
) -> impl IntoResponse {
    match kernel.update_line_qty(&terminal_id, &Ulid::from_string(tx_id), &Ulid::from_string(line_item_id), req.new_quantity) {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateNotesRequest {
    notes: String,
}

async fn update_line_notes_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id, line_item_id)): Path<(String, String, String)>,
    Json(req): Json<UpdateNotesRequest>,
) -> impl IntoResponse {
    match kernel.update_line_prep_notes(&terminal_id, &Ulid::from_string(tx_id), &Ulid::from_string(line_item_id), req.notes) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct VoidRequest {
    reason: Option<String>,
}

async fn void_line_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id, line_item_id)): Path<(String, String, String)>,
    body: Option<Json<VoidRequest>>,
) -> impl IntoResponse {
    let reason = body.map(|Json(b)| b.reason).unwrap_or(None);
    match kernel.void_line(&terminal_id, &Ulid::from_string(tx_id), &Ulid::from_string(line_item_id), reason) {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct AddTenderRequest {
    kind: String,
    amount: MoneyDto,
}

async fn add_tender_handler(
    State(kernel): State<AppState>,
    Path((terminal_id, tx_id)): Path<(String, String)>,
    Json(req): Json<AddTenderRequest>,
) -> impl IntoResponse {
    let result = (|| -> Result<TxSnapshot, KernelError> {
        let amount = req.amount.into_money()?;
        let kind = TenderKind::from_wal_str(&req.kind);
        kernel.add_tender(&terminal_id, &Ulid::from_string(tx_id), kind, amount)
    })();

    match result {
        Ok(snapshot) => Json(TxSnapshotDto::from(snapshot)).into_response(),
        Err(err) => kernel_error_response(err),
    }
}
