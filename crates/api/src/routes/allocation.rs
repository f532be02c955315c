//! Batch and allocation endpoints.
//!
//! Request bodies deserialize straight into the domain commands, so the
//! wire names (`ref`, `orderid`, `sku`, `qty`, `eta`) are the commands' own.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Allocate, BatchRef, ChangeBatchQuantity, CreateBatch, Deallocate};
use serde::{Deserialize, Serialize};
use service::CommandOutput;
use store::UnitOfWorkFactory;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangeQuantityRequest {
    pub qty: u32,
}

#[derive(Debug, Serialize)]
pub struct BatchCreatedResponse {
    #[serde(rename = "ref")]
    pub reference: BatchRef,
}

/// `batchref` is `null` when the line could not be allocated.
#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub batchref: Option<BatchRef>,
}

#[derive(Debug, Serialize)]
pub struct QuantityChangedResponse {
    #[serde(rename = "ref")]
    pub reference: BatchRef,
    pub qty: u32,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// The result of the top-level command is always first.
fn first_output(outputs: Vec<CommandOutput>) -> Option<BatchRef> {
    outputs.into_iter().next().flatten()
}

/// POST /batches
#[tracing::instrument(skip(state, payload))]
pub async fn add_batch<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    payload: Result<Json<CreateBatch>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchCreatedResponse>), ApiError> {
    let Json(command) = payload?;
    let reference = command.reference.clone();

    state.dispatch(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(BatchCreatedResponse { reference }),
    ))
}

/// POST /allocate
#[tracing::instrument(skip(state, payload))]
pub async fn allocate<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    payload: Result<Json<Allocate>, JsonRejection>,
) -> Result<(StatusCode, Json<AllocationResponse>), ApiError> {
    let Json(command) = payload?;

    let batchref = first_output(state.dispatch(command).await?);

    Ok((StatusCode::CREATED, Json(AllocationResponse { batchref })))
}

/// POST /deallocate
#[tracing::instrument(skip(state, payload))]
pub async fn deallocate<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    payload: Result<Json<Deallocate>, JsonRejection>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let Json(command) = payload?;

    let batchref = first_output(state.dispatch(command).await?);

    Ok(Json(AllocationResponse { batchref }))
}

/// POST /batches/{ref}/quantity
#[tracing::instrument(skip(state, payload))]
pub async fn change_quantity<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Path(reference): Path<String>,
    payload: Result<Json<ChangeQuantityRequest>, JsonRejection>,
) -> Result<Json<QuantityChangedResponse>, ApiError> {
    let Json(request) = payload?;
    let reference = BatchRef::new(reference);

    state
        .dispatch(ChangeBatchQuantity::new(reference.clone(), request.qty))
        .await?;

    Ok(Json(QuantityChangedResponse {
        reference,
        qty: request.qty,
    }))
}
