//! Dispense handlers: create, edit, cancel, pay, bill, and the reconciliation report.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateDispenseRequest, DispenseListQuery, DispenseListResponse, DispenseResponse,
        PaymentRequest, StatsQuery, UpdateDispenseRequest, VersionQuery,
    },
    models::{NewDispense, ReportSummary, ReportWindow},
    startup::AppState,
};

pub async fn create_dispense(
    State(state): State<AppState>,
    Json(payload): Json<CreateDispenseRequest>,
) -> Result<(StatusCode, Json<DispenseResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        patient_id = ?payload.patient_id,
        daily_token = ?payload.daily_token,
        items = payload.items.len(),
        "Creating dispense"
    );

    let record = state.dispensary.create(NewDispense::from(payload)).await?;

    Ok((StatusCode::CREATED, Json(DispenseResponse::from(record))))
}

pub async fn list_dispenses(
    State(state): State<AppState>,
    Query(query): Query<DispenseListQuery>,
) -> Result<Json<DispenseListResponse>, AppError> {
    let filter = query
        .into_filter()
        .map_err(|msg| AppError::BadRequest(anyhow::anyhow!(msg)))?;

    let records = state.dispensary.list(&filter).await?;

    Ok(Json(DispenseListResponse::from(records)))
}

pub async fn get_dispense(
    State(state): State<AppState>,
    Path(dispense_id): Path<Uuid>,
) -> Result<Json<DispenseResponse>, AppError> {
    let record = state.dispensary.get(dispense_id).await?;
    Ok(Json(DispenseResponse::from(record)))
}

pub async fn update_dispense(
    State(state): State<AppState>,
    Path(dispense_id): Path<Uuid>,
    Json(payload): Json<UpdateDispenseRequest>,
) -> Result<Json<DispenseResponse>, AppError> {
    payload.validate()?;

    tracing::info!(dispense_id = %dispense_id, items = payload.items.len(), "Updating dispense");

    let (items, tax, discount, expected_version) = payload.into_parts();
    let revised = state
        .dispensary
        .update(dispense_id, items, tax, discount, expected_version)
        .await?;

    let mut response = DispenseResponse::from(revised.record);
    response.refund_due = revised.refund_due;
    Ok(Json(response))
}

pub async fn cancel_dispense(
    State(state): State<AppState>,
    Path(dispense_id): Path<Uuid>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<DispenseResponse>, AppError> {
    tracing::info!(dispense_id = %dispense_id, "Cancelling dispense");

    let record = state
        .dispensary
        .cancel(dispense_id, query.expected_version)
        .await?;

    Ok(Json(DispenseResponse::from(record)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    Path(dispense_id): Path<Uuid>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<DispenseResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        dispense_id = %dispense_id,
        amount = %payload.amount,
        mode = payload.mode.as_str(),
        "Recording payment"
    );

    let record = state
        .dispensary
        .pay(
            dispense_id,
            payload.amount,
            payload.mode,
            payload.reference,
            payload.expected_version,
        )
        .await?;

    Ok(Json(DispenseResponse::from(record)))
}

pub async fn issue_bill(
    State(state): State<AppState>,
    Path(dispense_id): Path<Uuid>,
) -> Result<Json<DispenseResponse>, AppError> {
    let record = state.dispensary.issue_bill(dispense_id).await?;
    Ok(Json(DispenseResponse::from(record)))
}

pub async fn dispense_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ReportSummary>, AppError> {
    let window = ReportWindow::new(query.start_date, query.end_date).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("startDate must not be after endDate"))
    })?;

    let summary = state.dispensary.report(window).await?;

    Ok(Json(summary))
}
