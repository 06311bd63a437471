use crate::commands::inventory::{apply_movement, NewMovement};
use crate::commands::utils::non_empty;
use crate::db::{DbPool, MovementType, Product};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub active_only: Option<bool>,
}

pub async fn list_products_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<ProductListQuery>,
) -> ZafesysResult<Json<Vec<Product>>> {
    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT * FROM products
        WHERE (NOT $1 OR is_active)
        ORDER BY name
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(params.active_only.unwrap_or(true))
    .bind(params.skip.unwrap_or(0).max(0))
    .bind(params.limit.unwrap_or(100).clamp(1, 500))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct ProductSearchQuery {
    pub q: String,
}

pub async fn search_products_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<ProductSearchQuery>,
) -> ZafesysResult<Json<Vec<Product>>> {
    let term = params.q.trim();
    if term.chars().count() < 2 {
        return Err(ZafesysError::Validation(
            "Search term must be at least 2 characters".to_string(),
        ));
    }

    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT * FROM products
        WHERE name ILIKE $1 OR model ILIKE $1 OR sku ILIKE $1
        ORDER BY name
        LIMIT 100
        "#,
    )
    .bind(format!("%{}%", term))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(products))
}

pub async fn get_low_stock_products_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<Product>>> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE is_active AND stock <= min_stock_alert ORDER BY stock, name",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(products))
}

pub async fn get_product_internal(pool: &DbPool, id: i32) -> ZafesysResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Product"))
}

pub async fn get_product_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Product>> {
    Ok(Json(get_product_internal(&state.pool, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub model: String,
    pub category: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub installation_price: Decimal,
    #[serde(default)]
    pub stock: i32,
    pub min_stock_alert: Option<i32>,
    pub features: Option<String>,
    pub image_url: Option<String>,
}

/// Inserts the product with zero stock and books the opening stock as an
/// entry so the ledger accounts for every unit.
pub async fn create_product_internal(
    pool: &DbPool,
    payload: CreateProductRequest,
) -> ZafesysResult<Product> {
    if payload.sku.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "SKU and name are required".to_string(),
        ));
    }
    if payload.price < Decimal::ZERO || payload.installation_price < Decimal::ZERO {
        return Err(ZafesysError::Validation(
            "Prices cannot be negative".to_string(),
        ));
    }
    if payload.stock < 0 {
        return Err(ZafesysError::Validation(
            "Stock cannot be negative".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (sku, name, description, model, category, price,
                              installation_price, stock, min_stock_alert, features, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(payload.sku.trim())
    .bind(payload.name.trim())
    .bind(non_empty(payload.description))
    .bind(payload.model.trim())
    .bind(non_empty(payload.category))
    .bind(payload.price)
    .bind(payload.installation_price)
    .bind(payload.min_stock_alert.unwrap_or(5))
    .bind(non_empty(payload.features))
    .bind(non_empty(payload.image_url))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ZafesysError::Validation("Product with this SKU already exists".to_string())
        }
        other => ZafesysError::Database(other),
    })?;

    let product = if payload.stock > 0 {
        let movement = NewMovement::new(product.id, MovementType::Entry, payload.stock)
            .reference("product", product.id)
            .notes(Some("Initial stock".to_string()));
        apply_movement(&mut tx, &movement).await?;
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product.id)
            .fetch_one(&mut *tx)
            .await?
    } else {
        product
    };

    tx.commit().await?;
    tracing::info!("Created product {} ({})", product.id, product.sku);
    Ok(product)
}

pub async fn create_product_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> ZafesysResult<Json<Product>> {
    Ok(Json(create_product_internal(&state.pool, payload).await?))
}

/// Stock is absent on purpose: it only moves through the inventory ledger.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub installation_price: Option<Decimal>,
    pub min_stock_alert: Option<i32>,
    pub features: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_product_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> ZafesysResult<Json<Product>> {
    if payload.price.map_or(false, |p| p < Decimal::ZERO)
        || payload.installation_price.map_or(false, |p| p < Decimal::ZERO)
    {
        return Err(ZafesysError::Validation(
            "Prices cannot be negative".to_string(),
        ));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            sku = COALESCE($1, sku),
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            model = COALESCE($4, model),
            category = COALESCE($5, category),
            price = COALESCE($6, price),
            installation_price = COALESCE($7, installation_price),
            min_stock_alert = COALESCE($8, min_stock_alert),
            features = COALESCE($9, features),
            image_url = COALESCE($10, image_url),
            is_active = COALESCE($11, is_active),
            updated_at = NOW()
        WHERE id = $12
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.sku))
    .bind(non_empty(payload.name))
    .bind(non_empty(payload.description))
    .bind(non_empty(payload.model))
    .bind(non_empty(payload.category))
    .bind(payload.price)
    .bind(payload.installation_price)
    .bind(payload.min_stock_alert)
    .bind(non_empty(payload.features))
    .bind(non_empty(payload.image_url))
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ZafesysError::Validation("Product with this SKU already exists".to_string())
        }
        other => ZafesysError::Database(other),
    })?
    .ok_or_else(|| ZafesysError::not_found("Product"))?;

    Ok(Json(product))
}

/// Products referenced by installations or the ledger are never removed.
pub async fn deactivate_product_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Product"))?;

    tracing::info!("Deactivated product {}", id);
    Ok(Json(product))
}
