use crate::commands::utils::{db_now, non_empty, normalize_phone};
use crate::db::{DbPool, Lead, LeadSource, LeadStatus};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct LeadListQuery {
    pub status: Option<LeadStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_leads_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<LeadListQuery>,
) -> ZafesysResult<Json<Vec<Lead>>> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(params.status)
    .bind(params.skip.unwrap_or(0).max(0))
    .bind(params.limit.unwrap_or(100).clamp(1, 500))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(leads))
}

/// What a kanban card needs to render.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadCard {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub product_interest: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Groups cards into one column per status; empty columns are kept.
pub fn group_by_status(cards: Vec<LeadCard>) -> BTreeMap<&'static str, Vec<LeadCard>> {
    let mut board: BTreeMap<&'static str, Vec<LeadCard>> =
        LeadStatus::ALL.iter().map(|s| (s.as_str(), Vec::new())).collect();
    for card in cards {
        board.entry(card.status.as_str()).or_default().push(card);
    }
    board
}

pub async fn get_leads_kanban_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<BTreeMap<&'static str, Vec<LeadCard>>>> {
    let cards = sqlx::query_as::<_, LeadCard>(
        "SELECT id, name, phone, status, source, product_interest, created_at FROM leads ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(group_by_status(cards)))
}

pub async fn get_lead_stats_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<BTreeMap<&'static str, i64>>> {
    let counts: Vec<(LeadStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM leads GROUP BY status")
            .fetch_all(&state.pool)
            .await?;

    let mut by_status: BTreeMap<&'static str, i64> =
        LeadStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for (status, count) in counts {
        by_status.insert(status.as_str(), count);
    }
    Ok(Json(by_status))
}

pub async fn get_lead_internal(pool: &DbPool, id: i32) -> ZafesysResult<Lead> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Lead"))
}

pub async fn get_lead_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<Lead>> {
    Ok(Json(get_lead_internal(&state.pool, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub source: Option<LeadSource>,
    pub notes: Option<String>,
    pub product_interest: Option<String>,
    pub assigned_to_id: Option<i32>,
}

pub async fn create_lead_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> ZafesysResult<Json<Lead>> {
    let name = payload.name.trim();
    if name.is_empty() || payload.phone.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "Name and phone are required".to_string(),
        ));
    }
    let phone = normalize_phone(payload.phone.trim());

    let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM leads WHERE phone = $1")
        .bind(&phone)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_some() {
        return Err(ZafesysError::Validation(
            "Lead with this phone already exists".to_string(),
        ));
    }

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (name, phone, email, address, city, source, notes, product_interest, assigned_to_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(&phone)
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(payload.source.unwrap_or(LeadSource::Website))
    .bind(non_empty(payload.notes))
    .bind(non_empty(payload.product_interest))
    .bind(payload.assigned_to_id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Created lead {} ({:?})", lead.id, lead.source);
    Ok(Json(lead))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub source: Option<LeadSource>,
    pub notes: Option<String>,
    pub product_interest: Option<String>,
    pub assigned_to_id: Option<i32>,
}

pub async fn update_lead_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateLeadRequest>,
) -> ZafesysResult<Json<Lead>> {
    let phone = non_empty(payload.phone).map(|p| normalize_phone(&p));

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        UPDATE leads SET
            name = COALESCE($1, name),
            phone = COALESCE($2, phone),
            email = COALESCE($3, email),
            address = COALESCE($4, address),
            city = COALESCE($5, city),
            source = COALESCE($6, source),
            notes = COALESCE($7, notes),
            product_interest = COALESCE($8, product_interest),
            assigned_to_id = COALESCE($9, assigned_to_id),
            updated_at = NOW()
        WHERE id = $10
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.name))
    .bind(phone)
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(payload.source)
    .bind(non_empty(payload.notes))
    .bind(non_empty(payload.product_interest))
    .bind(payload.assigned_to_id)
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ZafesysError::Validation("Lead with this phone already exists".to_string())
        }
        other => ZafesysError::Database(other),
    })?
    .ok_or_else(|| ZafesysError::not_found("Lead"))?;

    Ok(Json(lead))
}

/// First contact is stamped when a lead enters the conversation stage.
pub fn contacted_at_after(
    next: LeadStatus,
    contacted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (next, contacted_at) {
        (LeadStatus::InConversation, None) => Some(now),
        (_, existing) => existing,
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadStatusRequest {
    pub status: LeadStatus,
}

pub async fn update_lead_status_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<LeadStatusRequest>,
) -> ZafesysResult<Json<Lead>> {
    let current = get_lead_internal(&state.pool, id).await?;
    let contacted_at = contacted_at_after(payload.status, current.contacted_at, db_now());

    let lead = sqlx::query_as::<_, Lead>(
        "UPDATE leads SET status = $1, contacted_at = $2, updated_at = NOW() WHERE id = $3 RETURNING *",
    )
    .bind(payload.status)
    .bind(contacted_at)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Lead {} moved to {}", id, payload.status.as_str());
    Ok(Json(lead))
}

pub async fn delete_lead_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<()>> {
    let installations: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM installations WHERE lead_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;
    if installations > 0 {
        return Err(ZafesysError::Validation(
            "Lead has installations and cannot be deleted".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE customers SET lead_id = NULL WHERE lead_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ZafesysError::not_found("Lead"));
    }
    tx.commit().await?;

    Ok(Json(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card(id: i32, status: LeadStatus) -> LeadCard {
        LeadCard {
            id,
            name: format!("Lead {id}"),
            phone: format!("+57300000000{id}"),
            status,
            source: LeadSource::Website,
            product_interest: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kanban_keeps_every_column() {
        let board = group_by_status(vec![
            card(1, LeadStatus::New),
            card(2, LeadStatus::Potential),
            card(3, LeadStatus::New),
        ]);
        assert_eq!(board.len(), LeadStatus::ALL.len());
        assert_eq!(board["new"].iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(board["potential"].len(), 1);
        assert!(board["closed_won"].is_empty());
    }

    #[test]
    fn test_contacted_at_stamped_once() {
        let first = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 2, 3, 10, 0, 0).unwrap();

        assert_eq!(contacted_at_after(LeadStatus::InConversation, None, first), Some(first));
        assert_eq!(
            contacted_at_after(LeadStatus::InConversation, Some(first), later),
            Some(first)
        );
        assert_eq!(contacted_at_after(LeadStatus::Potential, None, later), None);
    }
}
