use super::lifecycle::{payment_status_for, plan_status_change, StatusChange};
use super::timer::{InstallationTimer, TimerStatus};
use crate::commands::inventory::{apply_movement, NewMovement};
use crate::commands::utils::{db_now, non_empty};
use crate::db::{
    DbPool, Installation, InstallationStatus, MovementType, PaymentMethod, PaymentStatus,
    TimerActor,
};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State as AxumState},
    Json,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgConnection;

pub(crate) async fn lock_installation(
    conn: &mut PgConnection,
    id: i32,
) -> ZafesysResult<Installation> {
    sqlx::query_as::<_, Installation>("SELECT * FROM installations WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Installation"))
}

pub(crate) async fn write_timer(
    conn: &mut PgConnection,
    id: i32,
    timer: &InstallationTimer,
) -> ZafesysResult<()> {
    sqlx::query(
        r#"
        UPDATE installations
        SET timer_started_at = $1, timer_ended_at = $2, timer_started_by = $3,
            duration_minutes = $4, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(timer.started_at)
    .bind(timer.ended_at)
    .bind(timer.started_by)
    .bind(timer.duration_minutes)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn write_status_change(
    conn: &mut PgConnection,
    id: i32,
    change: &StatusChange,
) -> ZafesysResult<Installation> {
    write_timer(conn, id, &change.timer).await?;
    let row = sqlx::query_as::<_, Installation>(
        "UPDATE installations SET status = $1, completed_at = $2, updated_at = NOW() WHERE id = $3 RETURNING *",
    )
    .bind(change.status)
    .bind(change.completed_at)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    tracing::info!("Installation {} is now {}", id, change.status.as_str());
    Ok(row)
}

/// Applies a status change, returning the row unchanged when it is a no-op.
pub async fn set_status_internal(
    pool: &DbPool,
    id: i32,
    next: InstallationStatus,
) -> ZafesysResult<Installation> {
    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;

    let updated = match plan_status_change(&installation, next, db_now())? {
        Some(change) => write_status_change(&mut tx, id, &change).await?,
        None => installation,
    };

    tx.commit().await?;
    Ok(updated)
}

#[derive(Debug, Deserialize)]
pub struct CreateInstallationRequest {
    pub lead_id: i32,
    pub customer_id: Option<i32>,
    pub product_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub technician_id: Option<i32>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub estimated_duration: Option<i32>,
    pub address: String,
    pub city: Option<String>,
    pub address_notes: Option<String>,
    pub total_price: Decimal,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

pub async fn create_installation_internal(
    pool: &DbPool,
    payload: CreateInstallationRequest,
) -> ZafesysResult<Installation> {
    if payload.quantity <= 0 {
        return Err(ZafesysError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if payload.address.trim().is_empty() {
        return Err(ZafesysError::Validation("Address is required".to_string()));
    }

    let mut tx = pool.begin().await?;

    let lead: Option<i32> = sqlx::query_scalar("SELECT id FROM leads WHERE id = $1")
        .bind(payload.lead_id)
        .fetch_optional(&mut *tx)
        .await?;
    if lead.is_none() {
        return Err(ZafesysError::not_found("Lead"));
    }

    let product: Option<i32> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&mut *tx)
        .await?;
    if product.is_none() {
        return Err(ZafesysError::not_found("Product"));
    }

    let installation = sqlx::query_as::<_, Installation>(
        r#"
        INSERT INTO installations (
            lead_id, customer_id, product_id, quantity, technician_id,
            scheduled_date, scheduled_time, estimated_duration, address, city,
            address_notes, total_price, customer_notes, internal_notes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(payload.lead_id)
    .bind(payload.customer_id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .bind(payload.technician_id)
    .bind(payload.scheduled_date)
    .bind(payload.scheduled_time)
    .bind(payload.estimated_duration.unwrap_or(60))
    .bind(payload.address.trim())
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.address_notes))
    .bind(payload.total_price)
    .bind(non_empty(payload.customer_notes))
    .bind(non_empty(payload.internal_notes))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            ZafesysError::Validation("Customer or technician does not exist".to_string())
        }
        other => ZafesysError::Database(other),
    })?;

    let movement = NewMovement::new(payload.product_id, MovementType::Exit, payload.quantity)
        .reference("installation", installation.id)
        .notes(Some(format!("Installation #{}", installation.id)));
    apply_movement(&mut tx, &movement).await?;

    tx.commit().await?;

    tracing::info!(
        "Created installation {} for lead {} ({} x product {})",
        installation.id,
        installation.lead_id,
        installation.quantity,
        installation.product_id
    );
    Ok(installation)
}

pub async fn create_installation_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateInstallationRequest>,
) -> ZafesysResult<Json<Installation>> {
    let installation = create_installation_internal(&state.pool, payload).await?;
    Ok(Json(installation))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateInstallationRequest {
    pub customer_id: Option<i32>,
    pub technician_id: Option<i32>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub estimated_duration: Option<i32>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub address_notes: Option<String>,
    pub total_price: Option<Decimal>,
    pub customer_notes: Option<String>,
    pub technician_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub video_url: Option<String>,
}

pub async fn update_installation_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateInstallationRequest>,
) -> ZafesysResult<Json<Installation>> {
    let row = sqlx::query_as::<_, Installation>(
        r#"
        UPDATE installations SET
            customer_id = COALESCE($1, customer_id),
            technician_id = COALESCE($2, technician_id),
            scheduled_date = COALESCE($3, scheduled_date),
            scheduled_time = COALESCE($4, scheduled_time),
            estimated_duration = COALESCE($5, estimated_duration),
            address = COALESCE($6, address),
            city = COALESCE($7, city),
            address_notes = COALESCE($8, address_notes),
            total_price = COALESCE($9, total_price),
            customer_notes = COALESCE($10, customer_notes),
            technician_notes = COALESCE($11, technician_notes),
            internal_notes = COALESCE($12, internal_notes),
            video_url = COALESCE($13, video_url),
            updated_at = NOW()
        WHERE id = $14
        RETURNING *
        "#,
    )
    .bind(payload.customer_id)
    .bind(payload.technician_id)
    .bind(payload.scheduled_date)
    .bind(payload.scheduled_time)
    .bind(payload.estimated_duration)
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.address_notes))
    .bind(payload.total_price)
    .bind(non_empty(payload.customer_notes))
    .bind(non_empty(payload.technician_notes))
    .bind(non_empty(payload.internal_notes))
    .bind(non_empty(payload.video_url))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Installation"))?;

    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: InstallationStatus,
}

pub async fn update_installation_status_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ZafesysResult<Json<Installation>> {
    let row = set_status_internal(&state.pool, id, payload.status).await?;
    Ok(Json(row))
}

/// Cancelling is the only way to retire an installation.
pub async fn cancel_installation_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Installation>> {
    let row = set_status_internal(&state.pool, id, InstallationStatus::Cancelled).await?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid: Decimal,
}

pub async fn update_installation_payment_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<PaymentUpdateRequest>,
) -> ZafesysResult<Json<Installation>> {
    if payload.amount_paid < Decimal::ZERO {
        return Err(ZafesysError::Validation(
            "Amount paid cannot be negative".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;

    let status = payload
        .payment_status
        .unwrap_or_else(|| payment_status_for(installation.total_price, payload.amount_paid));

    let row = sqlx::query_as::<_, Installation>(
        r#"
        UPDATE installations
        SET payment_status = $1, payment_method = COALESCE($2, payment_method),
            amount_paid = $3, updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(payload.payment_method)
    .bind(payload.amount_paid)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(row))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteInstallationRequest {
    pub technician_notes: Option<String>,
    pub photo_proof_url: Option<String>,
    pub signature_url: Option<String>,
    pub video_url: Option<String>,
}

/// Marks an installation completed and stores the proof of work.
pub async fn complete_installation_internal(
    pool: &DbPool,
    id: i32,
    technician_id: Option<i32>,
    payload: CompleteInstallationRequest,
) -> ZafesysResult<Installation> {
    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;

    if let Some(tech_id) = technician_id {
        super::lifecycle::check_technician_access(&installation, tech_id)?;
    }

    if let Some(change) = plan_status_change(&installation, InstallationStatus::Completed, db_now())? {
        write_status_change(&mut tx, id, &change).await?;
    }

    let row = sqlx::query_as::<_, Installation>(
        r#"
        UPDATE installations SET
            technician_notes = COALESCE($1, technician_notes),
            photo_proof_url = COALESCE($2, photo_proof_url),
            signature_url = COALESCE($3, signature_url),
            video_url = COALESCE($4, video_url),
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.technician_notes))
    .bind(non_empty(payload.photo_proof_url))
    .bind(non_empty(payload.signature_url))
    .bind(non_empty(payload.video_url))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(row)
}

pub async fn complete_installation_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CompleteInstallationRequest>,
) -> ZafesysResult<Json<Installation>> {
    let row = complete_installation_internal(&state.pool, id, None, payload).await?;
    Ok(Json(row))
}

// --- Timer ---

#[derive(Debug, Deserialize)]
pub struct TimerStartRequest {
    pub started_by: TimerActor,
}

pub async fn start_timer_internal(
    pool: &DbPool,
    id: i32,
    started_by: TimerActor,
) -> ZafesysResult<TimerStatus> {
    let now = db_now();
    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;

    let current = InstallationTimer::of(&installation);
    let timer = current.start(started_by, now);

    if timer != current {
        write_timer(&mut tx, id, &timer).await?;
        if !installation.status.is_terminal()
            && installation.status != InstallationStatus::InProgress
        {
            sqlx::query("UPDATE installations SET status = $1 WHERE id = $2")
                .bind(InstallationStatus::InProgress)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tracing::info!("Timer started on installation {} by {:?}", id, started_by);
    }
    tx.commit().await?;

    Ok(timer.status(id, now))
}

pub async fn stop_timer_internal(pool: &DbPool, id: i32) -> ZafesysResult<TimerStatus> {
    let now = db_now();
    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;

    let timer = InstallationTimer::of(&installation).stop(now)?;
    write_timer(&mut tx, id, &timer).await?;
    tx.commit().await?;

    tracing::info!(
        "Timer stopped on installation {} after {:?} minutes",
        id,
        timer.duration_minutes
    );
    Ok(timer.status(id, now))
}

pub async fn start_timer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<TimerStartRequest>,
) -> ZafesysResult<Json<TimerStatus>> {
    let status = start_timer_internal(&state.pool, id, payload.started_by).await?;
    Ok(Json(status))
}

pub async fn stop_timer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<TimerStatus>> {
    let status = stop_timer_internal(&state.pool, id).await?;
    Ok(Json(status))
}

pub async fn get_timer_internal(pool: &DbPool, id: i32) -> ZafesysResult<TimerStatus> {
    let installation = sqlx::query_as::<_, Installation>("SELECT * FROM installations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Installation"))?;

    Ok(InstallationTimer::of(&installation).status(id, Utc::now()))
}

pub async fn get_timer_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<TimerStatus>> {
    Ok(Json(get_timer_internal(&state.pool, id).await?))
}
