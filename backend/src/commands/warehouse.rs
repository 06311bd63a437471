use crate::commands::installation::INSTALLATION_DETAIL_SELECT;
use crate::commands::inventory::set_stock;
use crate::commands::utils::{colombia_today, non_empty};
use crate::db::{
    DbPool, InstallationDetail, InventoryMovement, Product, Warehouse, WarehouseStatus,
    WarehouseStockLine,
};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub async fn list_warehouses_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<Warehouse>>> {
    let warehouses = sqlx::query_as::<_, Warehouse>(
        "SELECT * FROM warehouses WHERE is_active ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(warehouses))
}

#[derive(Debug, Deserialize)]
pub struct CreateWarehouseRequest {
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

fn duplicate_code(e: sqlx::Error) -> ZafesysError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ZafesysError::Validation("Warehouse code already exists".to_string())
        }
        other => ZafesysError::Database(other),
    }
}

pub async fn create_warehouse_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateWarehouseRequest>,
) -> ZafesysResult<Json<Warehouse>> {
    if payload.name.trim().is_empty() || payload.code.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "Name and code are required".to_string(),
        ));
    }

    let warehouse = sqlx::query_as::<_, Warehouse>(
        r#"
        INSERT INTO warehouses (name, code, address, city, contact_name, contact_phone, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.code.trim().to_uppercase())
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.contact_name))
    .bind(non_empty(payload.contact_phone))
    .bind(non_empty(payload.notes))
    .fetch_one(&state.pool)
    .await
    .map_err(duplicate_code)?;

    tracing::info!("Created warehouse {} ({})", warehouse.id, warehouse.code);
    Ok(Json(warehouse))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateWarehouseRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_warehouse_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateWarehouseRequest>,
) -> ZafesysResult<Json<Warehouse>> {
    let warehouse = sqlx::query_as::<_, Warehouse>(
        r#"
        UPDATE warehouses SET
            name = COALESCE($1, name),
            code = COALESCE($2, code),
            address = COALESCE($3, address),
            city = COALESCE($4, city),
            contact_name = COALESCE($5, contact_name),
            contact_phone = COALESCE($6, contact_phone),
            notes = COALESCE($7, notes),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.name))
    .bind(non_empty(payload.code).map(|c| c.to_uppercase()))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.contact_name))
    .bind(non_empty(payload.contact_phone))
    .bind(non_empty(payload.notes))
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(duplicate_code)?
    .ok_or_else(|| ZafesysError::not_found("Warehouse"))?;

    Ok(Json(warehouse))
}

// --- Stock per warehouse ---

#[derive(Debug, Clone, sqlx::FromRow)]
struct WarehouseStockRow {
    product_id: i32,
    #[sqlx(flatten)]
    line: WarehouseStockLine,
}

#[derive(Debug, Serialize)]
pub struct ProductWarehouseStock {
    pub product_id: i32,
    pub product_name: String,
    pub product_sku: String,
    pub total_stock: i32,
    pub warehouses: Vec<WarehouseStockLine>,
}

pub async fn get_product_warehouse_stock_axum(
    AxumState(state): AxumState<AppState>,
    Path(product_id): Path<i32>,
) -> ZafesysResult<Json<ProductWarehouseStock>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Product"))?;

    // every active warehouse is listed, with zero where nothing is stored
    let warehouses = sqlx::query_as::<_, WarehouseStockLine>(
        r#"
        SELECT w.id AS warehouse_id, w.name AS warehouse_name, w.code AS warehouse_code,
               COALESCE(ws.quantity, 0) AS quantity,
               COALESCE(ws.min_stock_alert, 2) AS min_stock_alert
        FROM warehouses w
        LEFT JOIN warehouse_stock ws ON ws.warehouse_id = w.id AND ws.product_id = $1
        WHERE w.is_active
        ORDER BY w.name
        "#,
    )
    .bind(product_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ProductWarehouseStock {
        product_id: product.id,
        product_name: product.name,
        product_sku: product.sku,
        total_stock: warehouses.iter().map(|w| w.quantity).sum(),
        warehouses,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseQuantity {
    pub warehouse_id: i32,
    pub quantity: i32,
    #[serde(default = "default_min_alert")]
    pub min_stock_alert: i32,
}

fn default_min_alert() -> i32 {
    2
}

/// Sum of the per-warehouse quantities; a warehouse listed twice is an error.
pub fn total_of(quantities: &[WarehouseQuantity]) -> ZafesysResult<i32> {
    let mut seen = std::collections::HashSet::new();
    let mut total: i32 = 0;
    for q in quantities {
        if q.quantity < 0 {
            return Err(ZafesysError::Validation(
                "Warehouse quantity cannot be negative".to_string(),
            ));
        }
        if !seen.insert(q.warehouse_id) {
            return Err(ZafesysError::Validation(format!(
                "Warehouse {} listed more than once",
                q.warehouse_id
            )));
        }
        total = total
            .checked_add(q.quantity)
            .ok_or_else(|| ZafesysError::Validation("Stock quantity out of range".to_string()))?;
    }
    Ok(total)
}

#[derive(Debug, Serialize)]
pub struct WarehouseStockUpdate {
    pub product_id: i32,
    pub total_stock: i32,
    pub movement: Option<InventoryMovement>,
}

/// Stores the per-warehouse counts and re-syncs the product's total stock
/// through an adjustment movement.
pub async fn set_warehouse_stock_internal(
    pool: &DbPool,
    product_id: i32,
    quantities: &[WarehouseQuantity],
) -> ZafesysResult<WarehouseStockUpdate> {
    let listed_total = total_of(quantities)?;

    let mut tx = pool.begin().await?;
    for q in quantities {
        sqlx::query(
            r#"
            INSERT INTO warehouse_stock (warehouse_id, product_id, quantity, min_stock_alert, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (warehouse_id, product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity,
                          min_stock_alert = EXCLUDED.min_stock_alert,
                          updated_at = NOW()
            "#,
        )
        .bind(q.warehouse_id)
        .bind(product_id)
        .bind(q.quantity)
        .bind(q.min_stock_alert)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                ZafesysError::not_found("Warehouse or product")
            }
            other => ZafesysError::Database(other),
        })?;
    }

    // warehouses not in the request keep their stored quantity
    let total_stock: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM warehouse_stock WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_one(&mut *tx)
    .await?;
    let total_stock = i32::try_from(total_stock)
        .map_err(|_| ZafesysError::Validation("Stock quantity out of range".to_string()))?;

    let movement = set_stock(
        &mut tx,
        product_id,
        total_stock,
        Some("Warehouse stock sync".to_string()),
        None,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Product {} warehouse stock set ({} listed, {} total)",
        product_id,
        listed_total,
        total_stock
    );
    Ok(WarehouseStockUpdate {
        product_id,
        total_stock,
        movement,
    })
}

pub async fn set_warehouse_stock_axum(
    AxumState(state): AxumState<AppState>,
    Path(product_id): Path<i32>,
    Json(payload): Json<Vec<WarehouseQuantity>>,
) -> ZafesysResult<Json<WarehouseStockUpdate>> {
    let update = set_warehouse_stock_internal(&state.pool, product_id, &payload).await?;
    Ok(Json(update))
}

#[derive(Debug, Serialize)]
pub struct ProductWithWarehouses {
    #[serde(flatten)]
    pub product: Product,
    pub warehouses: Vec<WarehouseStockLine>,
}

fn attach_breakdown(
    products: Vec<Product>,
    rows: Vec<WarehouseStockRow>,
) -> Vec<ProductWithWarehouses> {
    let mut by_product: HashMap<i32, Vec<WarehouseStockLine>> = HashMap::new();
    for row in rows {
        by_product.entry(row.product_id).or_default().push(row.line);
    }
    products
        .into_iter()
        .map(|product| ProductWithWarehouses {
            warehouses: by_product.remove(&product.id).unwrap_or_default(),
            product,
        })
        .collect()
}

pub async fn get_inventory_with_warehouses_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<ProductWithWarehouses>>> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE is_active ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, WarehouseStockRow>(
        r#"
        SELECT ws.product_id, w.id AS warehouse_id, w.name AS warehouse_name,
               w.code AS warehouse_code, ws.quantity, ws.min_stock_alert
        FROM warehouse_stock ws
        JOIN warehouses w ON w.id = ws.warehouse_id
        WHERE w.is_active
        ORDER BY w.name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(attach_breakdown(products, rows)))
}

// --- Order board ---

#[derive(Debug, Deserialize)]
pub struct OrderBoardQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub warehouse_status: Option<WarehouseStatus>,
}

/// Defaults to today; a missing end date means a single day.
pub fn board_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ZafesysResult<(NaiveDate, NaiveDate)> {
    let start = start.unwrap_or(today);
    let end = end.unwrap_or(start);
    if end < start {
        return Err(ZafesysError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    Ok((start, end))
}

/// Orders only move forward: pending, prepared, delivered.
pub fn check_warehouse_transition(
    current: WarehouseStatus,
    next: WarehouseStatus,
) -> ZafesysResult<()> {
    let rank = |s: WarehouseStatus| match s {
        WarehouseStatus::Pending => 0,
        WarehouseStatus::Prepared => 1,
        WarehouseStatus::Delivered => 2,
    };
    if rank(next) < rank(current) {
        return Err(ZafesysError::InvalidState(format!(
            "Order is already {:?}",
            current
        )));
    }
    Ok(())
}

pub async fn get_order_board_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<OrderBoardQuery>,
) -> ZafesysResult<Json<Vec<InstallationDetail>>> {
    let (start, end) = board_range(params.start_date, params.end_date, colombia_today(Utc::now()))?;

    let sql = format!(
        "{} WHERE i.scheduled_date BETWEEN $1 AND $2 \
         AND i.status IN ('pending', 'scheduled', 'en_route', 'in_progress') \
         AND ($3::TEXT IS NULL OR i.warehouse_status = $3) \
         ORDER BY i.scheduled_date, i.scheduled_time NULLS LAST, i.id",
        INSTALLATION_DETAIL_SELECT
    );
    let orders = sqlx::query_as::<_, InstallationDetail>(&sql)
        .bind(start)
        .bind(end)
        .bind(params.warehouse_status)
        .fetch_all(&state.pool)
        .await?;

    tracing::info!("Order board {}..{}: {} orders", start, end, orders.len());
    Ok(Json(orders))
}

#[derive(Debug, Default, Deserialize)]
pub struct WarehouseMarkRequest {
    pub user: Option<String>,
}

async fn mark_order(
    pool: &DbPool,
    installation_id: i32,
    next: WarehouseStatus,
    user: Option<String>,
) -> ZafesysResult<InstallationDetail> {
    let mut tx = pool.begin().await?;
    let current: WarehouseStatus = sqlx::query_scalar(
        "SELECT warehouse_status FROM installations WHERE id = $1 FOR UPDATE",
    )
    .bind(installation_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Order"))?;

    check_warehouse_transition(current, next)?;

    if next == WarehouseStatus::Prepared {
        sqlx::query(
            r#"
            UPDATE installations
            SET warehouse_status = $1, prepared_by = $2, prepared_at = NOW(), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(next)
        .bind(user)
        .bind(installation_id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query("UPDATE installations SET warehouse_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next)
            .bind(installation_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!("Order {} marked {:?}", installation_id, next);
    crate::commands::installation::get_installation_detail_internal(pool, installation_id).await
}

pub async fn mark_prepared_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<WarehouseMarkRequest>,
) -> ZafesysResult<Json<InstallationDetail>> {
    let detail = mark_order(&state.pool, id, WarehouseStatus::Prepared, non_empty(payload.user)).await?;
    Ok(Json(detail))
}

pub async fn mark_delivered_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<WarehouseMarkRequest>,
) -> ZafesysResult<Json<InstallationDetail>> {
    let detail = mark_order(&state.pool, id, WarehouseStatus::Delivered, non_empty(payload.user)).await?;
    Ok(Json(detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(warehouse_id: i32, quantity: i32) -> WarehouseQuantity {
        WarehouseQuantity {
            warehouse_id,
            quantity,
            min_stock_alert: 2,
        }
    }

    #[test]
    fn test_total_of_quantities() {
        assert_eq!(total_of(&[qty(1, 4), qty(2, 6)]).unwrap(), 10);
        assert_eq!(total_of(&[]).unwrap(), 0);
        assert!(total_of(&[qty(1, -1)]).is_err());
        assert!(total_of(&[qty(1, 2), qty(1, 3)]).is_err());
    }

    #[test]
    fn test_board_range_defaults() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let later = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        assert_eq!(board_range(None, None, today).unwrap(), (today, today));
        assert_eq!(board_range(Some(today), Some(later), today).unwrap(), (today, later));
        assert_eq!(board_range(Some(later), None, today).unwrap(), (later, later));
        assert!(board_range(Some(later), Some(today), today).is_err());
    }

    #[test]
    fn test_orders_only_move_forward() {
        use WarehouseStatus::*;
        assert!(check_warehouse_transition(Pending, Prepared).is_ok());
        assert!(check_warehouse_transition(Pending, Delivered).is_ok());
        assert!(check_warehouse_transition(Prepared, Prepared).is_ok());
        assert!(matches!(
            check_warehouse_transition(Delivered, Prepared),
            Err(ZafesysError::InvalidState(_))
        ));
    }
}
