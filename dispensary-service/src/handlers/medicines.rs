//! Medicines master handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CreateMedicineRequest, ListMedicinesQuery, UpdateMedicineRequest},
    models::{CreateMedicine, ListMedicinesFilter, Medicine, UpdateMedicine},
    startup::AppState,
};

fn medicine_not_found(medicine_id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Medicine {} not found", medicine_id))
}

pub async fn create_medicine(
    State(state): State<AppState>,
    Json(payload): Json<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<Medicine>), AppError> {
    payload.validate()?;

    tracing::info!(name = %payload.name, stock = payload.stock, "Creating medicine");

    let medicine = state
        .medicines
        .create_medicine(&CreateMedicine::from(payload))
        .await?;

    Ok((StatusCode::CREATED, Json(medicine)))
}

pub async fn list_medicines(
    State(state): State<AppState>,
    Query(query): Query<ListMedicinesQuery>,
) -> Result<Json<Vec<Medicine>>, AppError> {
    let medicines = state
        .medicines
        .list_medicines(&ListMedicinesFilter::from(query))
        .await?;
    Ok(Json(medicines))
}

pub async fn get_medicine(
    State(state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
) -> Result<Json<Medicine>, AppError> {
    let medicine = state
        .medicines
        .get_medicine(medicine_id)
        .await?
        .ok_or_else(|| medicine_not_found(medicine_id))?;
    Ok(Json(medicine))
}

pub async fn update_medicine(
    State(state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
    Json(payload): Json<UpdateMedicineRequest>,
) -> Result<Json<Medicine>, AppError> {
    payload.validate()?;

    tracing::info!(medicine_id = %medicine_id, "Updating medicine");

    let medicine = state
        .medicines
        .update_medicine(medicine_id, &UpdateMedicine::from(payload))
        .await?
        .ok_or_else(|| medicine_not_found(medicine_id))?;

    Ok(Json(medicine))
}
