use crate::commands::installation::crud::lock_installation;
use crate::commands::installation::{
    accumulate_payment, check_technician_access, check_technician_status,
    complete_installation_internal, get_installation_detail_internal, plan_status_change,
    technician_day_schedule_internal, CompleteInstallationRequest,
};
use crate::commands::installation::crud::write_status_change;
use crate::commands::technician::{get_technician_internal, hash_pin, set_availability_internal, validate_pin};
use crate::commands::utils::{colombia_today, db_now, normalize_phone};
use crate::db::{
    DbPool, Installation, InstallationDetail, InstallationStatus, PaymentMethod, PaymentStatus,
    Technician,
};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use bcrypt::verify;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The technician app identifies the caller by `technician_id` in the query.
#[derive(Debug, Deserialize)]
pub struct TechQuery {
    pub technician_id: i32,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TechLoginRequest {
    pub phone: String,
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct TechLoginResponse {
    pub technician_id: i32,
    pub technician_name: String,
    pub pin_created: bool,
}

/// Local part of a Colombian number, used when the stored phone was saved
/// in a different format.
fn local_digits(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.strip_prefix("57") {
        Some(rest) if rest.len() == 10 => rest.to_string(),
        _ => digits,
    }
}

async fn find_by_login_phone(pool: &DbPool, raw: &str) -> ZafesysResult<Option<Technician>> {
    let phone = normalize_phone(raw.trim());
    let exact = sqlx::query_as::<_, Technician>("SELECT * FROM technicians WHERE phone = $1")
        .bind(&phone)
        .fetch_optional(pool)
        .await?;
    if exact.is_some() {
        return Ok(exact);
    }

    let local = local_digits(&phone);
    if local.len() < 7 {
        return Ok(None);
    }
    let fallback = sqlx::query_as::<_, Technician>(
        "SELECT * FROM technicians WHERE is_active AND phone LIKE $1 ORDER BY id LIMIT 1",
    )
    .bind(format!("%{}", local))
    .fetch_optional(pool)
    .await?;
    Ok(fallback)
}

/// Phone + PIN login. A technician without a PIN sets it on first login.
pub async fn tech_login_internal(
    pool: &DbPool,
    payload: &TechLoginRequest,
) -> ZafesysResult<TechLoginResponse> {
    let pin = payload.pin.trim();
    validate_pin(pin)?;

    let technician = find_by_login_phone(pool, &payload.phone)
        .await?
        .ok_or_else(|| ZafesysError::Unauthorized("Phone not registered".to_string()))?;

    if !technician.is_active {
        return Err(ZafesysError::Unauthorized("Account disabled".to_string()));
    }

    let pin_created = match technician.pin_hash.as_deref() {
        Some(stored) => {
            if !verify(pin, stored)? {
                tracing::warn!("Failed PIN login for technician {}", technician.id);
                return Err(ZafesysError::Unauthorized("Incorrect PIN".to_string()));
            }
            false
        }
        None => {
            let result = sqlx::query(
                "UPDATE technicians SET pin_hash = $1, updated_at = NOW() WHERE id = $2 AND pin_hash IS NULL",
            )
            .bind(hash_pin(pin)?)
            .bind(technician.id)
            .execute(pool)
            .await?;
            // another device set the PIN first
            if result.rows_affected() == 0 {
                return Err(ZafesysError::Unauthorized("Incorrect PIN".to_string()));
            }
            tracing::info!("Technician {} set a PIN on first login", technician.id);
            true
        }
    };

    Ok(TechLoginResponse {
        technician_id: technician.id,
        technician_name: technician.full_name,
        pin_created,
    })
}

pub async fn tech_login_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<TechLoginRequest>,
) -> ZafesysResult<Json<TechLoginResponse>> {
    Ok(Json(tech_login_internal(&state.pool, &payload).await?))
}

pub async fn get_my_installations_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<TechQuery>,
) -> ZafesysResult<Json<Vec<InstallationDetail>>> {
    get_technician_internal(&state.pool, params.technician_id).await?;
    let day = params.date.unwrap_or_else(|| colombia_today(Utc::now()));
    let rows = technician_day_schedule_internal(&state.pool, params.technician_id, day).await?;
    Ok(Json(rows))
}

pub async fn get_tech_installation_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<TechQuery>,
) -> ZafesysResult<Json<InstallationDetail>> {
    let detail = get_installation_detail_internal(&state.pool, id).await?;
    check_technician_access(&detail.installation, params.technician_id)?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct TechStatusRequest {
    pub status: InstallationStatus,
}

pub async fn tech_update_status_internal(
    pool: &DbPool,
    id: i32,
    technician_id: i32,
    next: InstallationStatus,
) -> ZafesysResult<Installation> {
    check_technician_status(next)?;

    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;
    check_technician_access(&installation, technician_id)?;

    let row = match plan_status_change(&installation, next, db_now())? {
        Some(change) => write_status_change(&mut tx, id, &change).await?,
        None => installation,
    };
    tx.commit().await?;
    Ok(row)
}

pub async fn tech_update_status_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<TechQuery>,
    Json(payload): Json<TechStatusRequest>,
) -> ZafesysResult<Json<Installation>> {
    let row =
        tech_update_status_internal(&state.pool, id, params.technician_id, payload.status).await?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub amount: Decimal,
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentConfirmation {
    pub installation_id: i32,
    pub amount_paid: Decimal,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
}

/// Adds a payment collected in the field. An unknown method keeps the
/// method already on record.
pub async fn confirm_payment_internal(
    pool: &DbPool,
    id: i32,
    technician_id: i32,
    payload: &ConfirmPaymentRequest,
) -> ZafesysResult<PaymentConfirmation> {
    let method = match payload.method.parse::<PaymentMethod>() {
        Ok(m) => Some(m),
        Err(_) => {
            tracing::warn!("Ignoring unknown payment method {:?}", payload.method);
            None
        }
    };

    let mut tx = pool.begin().await?;
    let installation = lock_installation(&mut tx, id).await?;
    check_technician_access(&installation, technician_id)?;

    let (amount_paid, payment_status) =
        accumulate_payment(installation.total_price, installation.amount_paid, payload.amount)?;

    let row = sqlx::query_as::<_, Installation>(
        r#"
        UPDATE installations
        SET amount_paid = $1, payment_status = $2,
            payment_method = COALESCE($3, payment_method), updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(amount_paid)
    .bind(payment_status)
    .bind(method)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Technician {} registered payment of {} on installation {}",
        technician_id,
        payload.amount,
        id
    );
    Ok(PaymentConfirmation {
        installation_id: row.id,
        amount_paid: row.amount_paid,
        total_price: row.total_price,
        payment_status: row.payment_status,
        payment_method: row.payment_method,
    })
}

pub async fn confirm_payment_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<TechQuery>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> ZafesysResult<Json<PaymentConfirmation>> {
    let confirmation =
        confirm_payment_internal(&state.pool, id, params.technician_id, &payload).await?;
    Ok(Json(confirmation))
}

pub async fn tech_complete_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<TechQuery>,
    Json(payload): Json<CompleteInstallationRequest>,
) -> ZafesysResult<Json<Installation>> {
    let row =
        complete_installation_internal(&state.pool, id, Some(params.technician_id), payload).await?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct TechAvailabilityRequest {
    pub is_available: bool,
}

pub async fn tech_availability_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<TechQuery>,
    Json(payload): Json<TechAvailabilityRequest>,
) -> ZafesysResult<Json<Technician>> {
    let technician =
        set_availability_internal(&state.pool, params.technician_id, payload.is_available).await?;
    Ok(Json(technician))
}

pub async fn tech_profile_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<TechQuery>,
) -> ZafesysResult<Json<Technician>> {
    Ok(Json(get_technician_internal(&state.pool, params.technician_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_digits() {
        assert_eq!(local_digits("+573001234567"), "3001234567");
        assert_eq!(local_digits("300 123 4567"), "3001234567");
        assert_eq!(local_digits("+1 555 0100"), "15550100");
    }
}
