use crate::commands::utils::colombia_today;
use crate::db::{DbPool, InstallationDetail, InstallationStatus};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) const INSTALLATION_DETAIL_SELECT: &str = r#"
    SELECT i.*,
           l.name AS lead_name, l.phone AS lead_phone,
           p.name AS product_name, p.model AS product_model,
           p.sku AS product_sku, p.image_url AS product_image,
           t.full_name AS technician_name
    FROM installations i
    LEFT JOIN leads l ON l.id = i.lead_id
    LEFT JOIN products p ON p.id = i.product_id
    LEFT JOIN technicians t ON t.id = i.technician_id
"#;

pub async fn get_installation_detail_internal(
    pool: &DbPool,
    id: i32,
) -> ZafesysResult<InstallationDetail> {
    let sql = format!("{} WHERE i.id = $1", INSTALLATION_DETAIL_SELECT);
    sqlx::query_as::<_, InstallationDetail>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Installation"))
}

/// Open installations of one technician for one day, in visit order.
pub async fn technician_day_schedule_internal(
    pool: &DbPool,
    technician_id: i32,
    day: NaiveDate,
) -> ZafesysResult<Vec<InstallationDetail>> {
    let sql = format!(
        "{} WHERE i.technician_id = $1 AND i.scheduled_date = $2 \
         AND i.status NOT IN ('cancelled', 'completed') \
         ORDER BY i.scheduled_time NULLS LAST, i.id",
        INSTALLATION_DETAIL_SELECT
    );
    let rows = sqlx::query_as::<_, InstallationDetail>(&sql)
        .bind(technician_id)
        .bind(day)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[derive(Debug, Deserialize)]
pub struct InstallationListQuery {
    pub status: Option<InstallationStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_installations_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<InstallationListQuery>,
) -> ZafesysResult<Json<Vec<InstallationDetail>>> {
    let sql = format!(
        "{} WHERE ($1::TEXT IS NULL OR i.status = $1) \
         ORDER BY i.scheduled_date DESC NULLS LAST, i.created_at DESC \
         OFFSET $2 LIMIT $3",
        INSTALLATION_DETAIL_SELECT
    );
    let rows = sqlx::query_as::<_, InstallationDetail>(&sql)
        .bind(params.status)
        .bind(params.skip.unwrap_or(0).max(0))
        .bind(params.limit.unwrap_or(100).clamp(1, 500))
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(rows))
}

/// Installations still waiting for a date and technician.
pub async fn get_pending_installations_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Vec<InstallationDetail>>> {
    let sql = format!(
        "{} WHERE i.status = 'pending' ORDER BY i.created_at",
        INSTALLATION_DETAIL_SELECT
    );
    let rows = sqlx::query_as::<_, InstallationDetail>(&sql)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ByDateQuery {
    pub date: Option<NaiveDate>,
    pub technician_id: Option<i32>,
}

pub async fn get_installations_by_date_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<ByDateQuery>,
) -> ZafesysResult<Json<Vec<InstallationDetail>>> {
    let day = params.date.unwrap_or_else(|| colombia_today(Utc::now()));
    let sql = format!(
        "{} WHERE i.scheduled_date = $1 AND ($2::INT IS NULL OR i.technician_id = $2) \
         ORDER BY i.scheduled_time NULLS LAST, i.id",
        INSTALLATION_DETAIL_SELECT
    );
    let rows = sqlx::query_as::<_, InstallationDetail>(&sql)
        .bind(day)
        .bind(params.technician_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InstallationStats {
    pub by_status: BTreeMap<&'static str, i64>,
    pub today_count: i64,
}

/// Every status appears in the result, zero when absent from `counts`.
pub fn count_by_status(counts: &[(InstallationStatus, i64)]) -> BTreeMap<&'static str, i64> {
    let mut by_status: BTreeMap<&'static str, i64> = InstallationStatus::ALL
        .iter()
        .map(|s| (s.as_str(), 0))
        .collect();
    for (status, count) in counts {
        *by_status.entry(status.as_str()).or_insert(0) += count;
    }
    by_status
}

pub async fn get_installation_stats_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<InstallationStats>> {
    let counts: Vec<(InstallationStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM installations GROUP BY status")
            .fetch_all(&state.pool)
            .await?;

    let today_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM installations WHERE scheduled_date = $1")
            .bind(colombia_today(Utc::now()))
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(InstallationStats {
        by_status: count_by_status(&counts),
        today_count,
    }))
}

pub async fn get_installation_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<InstallationDetail>> {
    let row = get_installation_detail_internal(&state.pool, id).await?;
    Ok(Json(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_by_status_fills_missing() {
        let counts = count_by_status(&[
            (InstallationStatus::Pending, 4),
            (InstallationStatus::Completed, 11),
        ]);
        assert_eq!(counts.len(), 6);
        assert_eq!(counts["pending"], 4);
        assert_eq!(counts["completed"], 11);
        assert_eq!(counts["en_route"], 0);
        assert_eq!(counts["cancelled"], 0);
    }
}
