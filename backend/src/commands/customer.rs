use crate::commands::utils::{non_empty, normalize_phone};
use crate::db::{Customer, DbPool, Lead, LeadStatus};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CustomerSearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_customers_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<CustomerSearchQuery>,
) -> ZafesysResult<Json<Vec<Customer>>> {
    let pattern = non_empty(params.q).map(|q| format!("%{}%", q));
    let customers = sqlx::query_as::<_, Customer>(
        r#"
        SELECT * FROM customers
        WHERE ($1 OR is_active)
          AND ($2::TEXT IS NULL OR name ILIKE $2 OR phone ILIKE $2 OR document_number ILIKE $2)
        ORDER BY created_at DESC
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(params.include_inactive)
    .bind(pattern)
    .bind(params.skip.unwrap_or(0).max(0))
    .bind(params.limit.unwrap_or(100).clamp(1, 500))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(customers))
}

pub async fn get_customer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Customer>> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Customer"))?;
    Ok(Json(customer))
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
    pub lead_id: Option<i32>,
}

pub async fn create_customer_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateCustomerRequest>,
) -> ZafesysResult<Json<Customer>> {
    if payload.name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "Name and phone are required".to_string(),
        ));
    }
    let phone = normalize_phone(payload.phone.trim());

    let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM customers WHERE phone = $1")
        .bind(&phone)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_some() {
        return Err(ZafesysError::Validation(
            "Customer with this phone already exists".to_string(),
        ));
    }

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (name, phone, email, document_type, document_number, address, city, notes, lead_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&phone)
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.document_type))
    .bind(non_empty(payload.document_number))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.notes))
    .bind(payload.lead_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(customer))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_customer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> ZafesysResult<Json<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        r#"
        UPDATE customers SET
            name = COALESCE($1, name),
            phone = COALESCE($2, phone),
            email = COALESCE($3, email),
            document_type = COALESCE($4, document_type),
            document_number = COALESCE($5, document_number),
            address = COALESCE($6, address),
            city = COALESCE($7, city),
            notes = COALESCE($8, notes),
            is_active = COALESCE($9, is_active),
            updated_at = NOW()
        WHERE id = $10
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.name))
    .bind(non_empty(payload.phone).map(|p| normalize_phone(&p)))
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.document_type))
    .bind(non_empty(payload.document_number))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.notes))
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Customer"))?;
    Ok(Json(customer))
}

pub async fn deactivate_customer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<()>> {
    let result = sqlx::query("UPDATE customers SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ZafesysError::not_found("Customer"));
    }
    Ok(Json(()))
}

/// Creates the customer for a lead (once) and marks the lead converted.
pub async fn convert_lead_internal(pool: &DbPool, lead_id: i32) -> ZafesysResult<Customer> {
    let mut tx = pool.begin().await?;

    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1 FOR UPDATE")
        .bind(lead_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Lead"))?;

    let existing = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE lead_id = $1")
        .bind(lead_id)
        .fetch_optional(&mut *tx)
        .await?;
    if let Some(customer) = existing {
        return Ok(customer);
    }

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (name, phone, email, address, city, lead_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&lead.name)
    .bind(&lead.phone)
    .bind(&lead.email)
    .bind(&lead.address)
    .bind(&lead.city)
    .bind(lead.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE leads SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(LeadStatus::Converted)
        .bind(lead.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!("Lead {} converted to customer {}", lead.id, customer.id);
    Ok(customer)
}

pub async fn convert_lead_axum(
    AxumState(state): AxumState<AppState>,
    Path(lead_id): Path<i32>,
) -> ZafesysResult<Json<Customer>> {
    Ok(Json(convert_lead_internal(&state.pool, lead_id).await?))
}
