use crate::commands::installation::technician_day_schedule_internal;
use crate::commands::utils::{colombia_today, non_empty, normalize_phone};
use crate::db::{DbPool, InstallationDetail, Technician, TechnicianLocation};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use bcrypt::{hash, DEFAULT_COST};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TechnicianListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub active_only: Option<bool>,
}

pub async fn list_technicians_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<TechnicianListQuery>,
) -> ZafesysResult<Json<Vec<Technician>>> {
    let technicians = sqlx::query_as::<_, Technician>(
        r#"
        SELECT * FROM technicians
        WHERE (NOT $1 OR is_active)
        ORDER BY full_name
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(params.active_only.unwrap_or(true))
    .bind(params.skip.unwrap_or(0).max(0))
    .bind(params.limit.unwrap_or(100).clamp(1, 500))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(technicians))
}

pub async fn get_available_technicians_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<Technician>>> {
    let technicians = sqlx::query_as::<_, Technician>(
        "SELECT * FROM technicians WHERE is_active AND is_available ORDER BY full_name",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(technicians))
}

pub async fn get_technician_internal(pool: &DbPool, id: i32) -> ZafesysResult<Technician> {
    sqlx::query_as::<_, Technician>("SELECT * FROM technicians WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Technician"))
}

pub async fn get_technician_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Technician>> {
    Ok(Json(get_technician_internal(&state.pool, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct TechnicianDaySchedule {
    pub date: NaiveDate,
    pub total_count: usize,
    pub installations: Vec<InstallationDetail>,
}

pub async fn get_technician_schedule_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<ScheduleQuery>,
) -> ZafesysResult<Json<TechnicianDaySchedule>> {
    get_technician_internal(&state.pool, id).await?;
    let date = params.date.unwrap_or_else(|| colombia_today(Utc::now()));
    let installations = technician_day_schedule_internal(&state.pool, id, date).await?;

    Ok(Json(TechnicianDaySchedule {
        date,
        total_count: installations.len(),
        installations,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTechnicianRequest {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub document_id: Option<String>,
    pub zone: Option<String>,
    pub specialties: Option<String>,
    pub user_id: Option<i32>,
}

fn duplicate_phone(e: sqlx::Error) -> ZafesysError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ZafesysError::Validation("Technician with this phone already exists".to_string())
        }
        other => ZafesysError::Database(other),
    }
}

pub async fn create_technician_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateTechnicianRequest>,
) -> ZafesysResult<Json<Technician>> {
    if payload.full_name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "Name and phone are required".to_string(),
        ));
    }

    let technician = sqlx::query_as::<_, Technician>(
        r#"
        INSERT INTO technicians (full_name, phone, email, document_id, zone, specialties, user_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.full_name.trim())
    .bind(normalize_phone(payload.phone.trim()))
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.document_id))
    .bind(non_empty(payload.zone))
    .bind(non_empty(payload.specialties))
    .bind(payload.user_id)
    .fetch_one(&state.pool)
    .await
    .map_err(duplicate_phone)?;

    tracing::info!("Created technician {} ({})", technician.id, technician.full_name);
    Ok(Json(technician))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTechnicianRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub document_id: Option<String>,
    pub zone: Option<String>,
    pub specialties: Option<String>,
    pub is_available: Option<bool>,
    pub is_active: Option<bool>,
}

pub async fn update_technician_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTechnicianRequest>,
) -> ZafesysResult<Json<Technician>> {
    let technician = sqlx::query_as::<_, Technician>(
        r#"
        UPDATE technicians SET
            full_name = COALESCE($1, full_name),
            phone = COALESCE($2, phone),
            email = COALESCE($3, email),
            document_id = COALESCE($4, document_id),
            zone = COALESCE($5, zone),
            specialties = COALESCE($6, specialties),
            is_available = COALESCE($7, is_available),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.full_name))
    .bind(non_empty(payload.phone).map(|p| normalize_phone(&p)))
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.document_id))
    .bind(non_empty(payload.zone))
    .bind(non_empty(payload.specialties))
    .bind(payload.is_available)
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(duplicate_phone)?
    .ok_or_else(|| ZafesysError::not_found("Technician"))?;

    Ok(Json(technician))
}

pub async fn set_availability_internal(
    pool: &DbPool,
    id: i32,
    is_available: bool,
) -> ZafesysResult<Technician> {
    sqlx::query_as::<_, Technician>(
        "UPDATE technicians SET is_available = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(is_available)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Technician"))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

pub async fn update_availability_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<AvailabilityRequest>,
) -> ZafesysResult<Json<Technician>> {
    let technician = set_availability_internal(&state.pool, id, payload.is_available).await?;
    Ok(Json(technician))
}

pub async fn deactivate_technician_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Technician>> {
    let technician = sqlx::query_as::<_, Technician>(
        r#"
        UPDATE technicians SET is_active = FALSE, is_available = FALSE, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Technician"))?;

    tracing::info!("Deactivated technician {}", id);
    Ok(Json(technician))
}

// --- PIN ---

/// PINs are 4 to 6 ASCII digits.
pub fn validate_pin(pin: &str) -> ZafesysResult<()> {
    let valid = (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ZafesysError::Validation(
            "PIN must be 4 to 6 digits".to_string(),
        ))
    }
}

pub fn hash_pin(pin: &str) -> ZafesysResult<String> {
    validate_pin(pin)?;
    Ok(hash(pin, DEFAULT_COST)?)
}

#[derive(Debug, Deserialize)]
pub struct SetPinRequest {
    pub pin: String,
}

pub async fn set_pin_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<SetPinRequest>,
) -> ZafesysResult<Json<()>> {
    let pin_hash = hash_pin(payload.pin.trim())?;

    let result = sqlx::query("UPDATE technicians SET pin_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(pin_hash)
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ZafesysError::not_found("Technician"));
    }

    tracing::info!("PIN updated for technician {}", id);
    Ok(Json(()))
}

// --- GPS ---

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> ZafesysResult<()> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(ZafesysError::Validation(
            "Coordinates out of range".to_string(),
        ));
    }
    Ok(())
}

pub async fn record_location_internal(
    pool: &DbPool,
    technician_id: i32,
    payload: &LocationRequest,
) -> ZafesysResult<TechnicianLocation> {
    validate_coordinates(payload.latitude, payload.longitude)?;
    get_technician_internal(pool, technician_id).await?;

    let location = sqlx::query_as::<_, TechnicianLocation>(
        r#"
        INSERT INTO technician_locations (technician_id, latitude, longitude, accuracy_m)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(technician_id)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.accuracy_m)
    .fetch_one(pool)
    .await?;
    Ok(location)
}

pub async fn record_location_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<LocationRequest>,
) -> ZafesysResult<Json<TechnicianLocation>> {
    Ok(Json(record_location_internal(&state.pool, id, &payload).await?))
}

/// Most recent position of every active technician.
pub async fn get_latest_locations_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<TechnicianLocation>>> {
    let locations = sqlx::query_as::<_, TechnicianLocation>(
        r#"
        SELECT DISTINCT ON (l.technician_id)
               l.*, t.full_name AS technician_name
        FROM technician_locations l
        JOIN technicians t ON t.id = l.technician_id
        WHERE t.is_active
        ORDER BY l.technician_id, l.recorded_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(locations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(validate_pin("1234").is_ok());
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("1234567").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("١٢٣٤").is_err());
    }

    #[test]
    fn test_hashed_pin_verifies() {
        let hashed = hash_pin("4821").unwrap();
        assert_ne!(hashed, "4821");
        assert!(bcrypt::verify("4821", &hashed).unwrap());
        assert!(!bcrypt::verify("4822", &hashed).unwrap());
    }

    #[test]
    fn test_coordinates_range() {
        assert!(validate_coordinates(4.711, -74.072).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
    }
}
