use super::ledger::{apply_movement, set_stock, NewMovement};
use crate::commands::utils::non_empty;
use crate::db::{DbPool, InventoryMovement, MovementType};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MovementListQuery {
    pub product_id: Option<i32>,
    pub movement_type: Option<MovementType>,
    pub limit: Option<i64>,
}

pub async fn list_movements_internal(
    pool: &DbPool,
    product_id: Option<i32>,
    movement_type: Option<MovementType>,
    limit: i64,
) -> ZafesysResult<Vec<InventoryMovement>> {
    let rows = sqlx::query_as::<_, InventoryMovement>(
        r#"
        SELECT m.*, p.name AS product_name, p.model AS product_model
        FROM inventory_movements m
        JOIN products p ON p.id = m.product_id
        WHERE ($1::INT IS NULL OR m.product_id = $1)
          AND ($2::TEXT IS NULL OR m.movement_type = $2)
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT $3
        "#,
    )
    .bind(product_id)
    .bind(movement_type)
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_movements_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<MovementListQuery>,
) -> ZafesysResult<Json<Vec<InventoryMovement>>> {
    let rows = list_movements_internal(
        &state.pool,
        params.product_id,
        params.movement_type,
        params.limit.unwrap_or(50),
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ProductMovementsQuery {
    pub limit: Option<i64>,
}

pub async fn get_product_movements_axum(
    AxumState(state): AxumState<AppState>,
    Path(product_id): Path<i32>,
    Query(params): Query<ProductMovementsQuery>,
) -> ZafesysResult<Json<Vec<InventoryMovement>>> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(ZafesysError::not_found("Product"));
    }

    let rows = list_movements_internal(
        &state.pool,
        Some(product_id),
        None,
        params.limit.unwrap_or(50),
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateMovementRequest {
    pub product_id: i32,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

pub async fn create_movement_internal(
    pool: &DbPool,
    payload: CreateMovementRequest,
) -> ZafesysResult<InventoryMovement> {
    let mut movement = NewMovement::new(payload.product_id, payload.movement_type, payload.quantity)
        .notes(non_empty(payload.notes))
        .created_by(non_empty(payload.created_by));
    movement.reference_type = non_empty(payload.reference_type);
    movement.reference_id = payload.reference_id;

    let mut tx = pool.begin().await?;
    let row = apply_movement(&mut tx, &movement).await?;
    tx.commit().await?;

    Ok(row)
}

pub async fn create_movement_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateMovementRequest>,
) -> ZafesysResult<Json<InventoryMovement>> {
    Ok(Json(create_movement_internal(&state.pool, payload).await?))
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: i32,
    pub new_stock: i32,
    pub reason: Option<String>,
    pub created_by: Option<String>,
}

pub async fn adjust_stock_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<AdjustStockRequest>,
) -> ZafesysResult<Json<Option<InventoryMovement>>> {
    let notes = non_empty(payload.reason).map(|r| format!("Physical count: {}", r));

    let mut tx = state.pool.begin().await?;
    let row = set_stock(
        &mut tx,
        payload.product_id,
        payload.new_stock,
        notes,
        non_empty(payload.created_by),
    )
    .await?;
    tx.commit().await?;

    if row.is_none() {
        tracing::info!(
            "Stock count for product {} matches the books ({}), nothing recorded",
            payload.product_id,
            payload.new_stock
        );
    }
    Ok(Json(row))
}
