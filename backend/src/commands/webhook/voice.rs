use super::analysis::{analyze, format_transcript, initial_lead_status, InterestLevel, VoiceConversationPayload};
use super::signature::{verify_signature, SECRET_HEADER, SIGNATURE_HEADER};
use crate::db::{DbPool, Lead, LeadSource, LeadStatus};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

const PLACEHOLDER_PHONE_PREFIX: &str = "pendiente-";
const UNIDENTIFIED_NAME: &str = "Cliente sin identificar";
const DEFAULT_LEAD_NAME: &str = "Cliente de Ana";

const SAMPLE_TRANSCRIPT: &str = "Ana: Hola, bienvenido a ZAFESYS. Soy Ana, tu asistente virtual.\n\
Cliente: Hola, quiero información sobre cerraduras biométricas.\n\
Ana: Excelente, tenemos el modelo OS566F con sensor de huella. ¿Te gustaría agendar una instalación?\n\
Cliente: Sí, me interesa. Mi nombre es Juan Pérez.\n\
Ana: Perfecto Juan, ¿me puedes dar tu número de teléfono?";

fn is_placeholder_phone(phone: &str) -> bool {
    phone.starts_with(PLACEHOLDER_PHONE_PREFIX)
}

fn placeholder_phone(conversation_id: &str) -> String {
    let short: String = conversation_id.chars().take(8).collect();
    format!("{}{}", PLACEHOLDER_PHONE_PREFIX, short)
}

/// Appends an `[Ana]` line unless the same line is already present.
/// A redelivered older conversation misses the `conversation_id` check once a
/// newer call has taken the lead, and lands here again.
fn append_assistant_note(existing: Option<&str>, note: Option<&str>) -> Option<String> {
    let Some(note) = note else {
        return existing.map(str::to_string);
    };
    let line = format!("[Ana] {}", note);
    match existing.filter(|n| !n.trim().is_empty()) {
        Some(current) if current.lines().any(|l| l == line) => Some(current.to_string()),
        Some(current) => Some(format!("{}\n{}", current, line)),
        None => Some(line),
    }
}

async fn find_by_conversation(pool: &DbPool, conversation_id: &str) -> ZafesysResult<Option<Lead>> {
    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE conversation_id = $1")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?;
    Ok(lead)
}

/// Turns a finished voice conversation into a lead. Re-delivering the same
/// conversation returns the lead created the first time.
pub async fn process_conversation_internal(
    pool: &DbPool,
    payload: &VoiceConversationPayload,
) -> ZafesysResult<Lead> {
    let conversation_id = payload.conversation_id.trim();
    if conversation_id.is_empty() {
        return Err(ZafesysError::Validation(
            "conversation_id is required".to_string(),
        ));
    }

    if let Some(existing) = find_by_conversation(pool, conversation_id).await? {
        tracing::info!(
            "Conversation {} already processed, returning lead {}",
            conversation_id,
            existing.id
        );
        return Ok(existing);
    }

    let mut analysis = analyze(payload);
    let transcript = format_transcript(&payload.transcript);
    tracing::info!(
        "Conversation {} analysis: name={:?} phone={:?} product={:?} interest={:?}",
        conversation_id,
        analysis.name,
        analysis.phone,
        analysis.product_interest,
        analysis.interest_level
    );

    if analysis.phone.is_none() && analysis.name.is_none() {
        tracing::warn!("No customer data extracted from conversation {}", conversation_id);
        analysis.name = Some(UNIDENTIFIED_NAME.to_string());
        analysis.phone = Some(placeholder_phone(conversation_id));
    }

    let mut tx = pool.begin().await?;

    if let Some(phone) = analysis.phone.as_deref().filter(|p| !is_placeholder_phone(p)) {
        let existing: Option<Lead> =
            sqlx::query_as("SELECT * FROM leads WHERE phone = $1 FOR UPDATE")
                .bind(phone)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(lead) = existing {
            let promote = analysis.interest_level == InterestLevel::High
                && lead.status == LeadStatus::New;
            let notes = append_assistant_note(lead.notes.as_deref(), analysis.notes.as_deref());

            let updated = sqlx::query_as::<_, Lead>(
                r#"
                UPDATE leads SET
                    conversation_id = $1,
                    conversation_transcript = $2,
                    product_interest = COALESCE($3, product_interest),
                    notes = $4,
                    status = $5,
                    updated_at = NOW()
                WHERE id = $6
                RETURNING *
                "#,
            )
            .bind(conversation_id)
            .bind(&transcript)
            .bind(&analysis.product_interest)
            .bind(notes)
            .bind(if promote { LeadStatus::Potential } else { lead.status })
            .bind(lead.id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::info!("Updated lead {} from conversation {}", updated.id, conversation_id);
            return Ok(updated);
        }
    }

    let has_contact = analysis
        .phone
        .as_deref()
        .map_or(false, |p| !is_placeholder_phone(p));
    let status = initial_lead_status(analysis.interest_level, has_contact);

    let mut phone = analysis
        .phone
        .clone()
        .unwrap_or_else(|| placeholder_phone(conversation_id));
    if is_placeholder_phone(&phone) {
        let taken: Option<i32> = sqlx::query_scalar("SELECT id FROM leads WHERE phone = $1")
            .bind(&phone)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            phone = format!("{}{}", PLACEHOLDER_PHONE_PREFIX, conversation_id);
        }
    }

    let inserted = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (
            name, phone, email, address, status, source, notes,
            product_interest, conversation_id, conversation_transcript
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(analysis.name.as_deref().unwrap_or(DEFAULT_LEAD_NAME))
    .bind(&phone)
    .bind(&analysis.email)
    .bind(&analysis.address)
    .bind(status)
    .bind(LeadSource::VoiceAssistant)
    .bind(&analysis.notes)
    .bind(&analysis.product_interest)
    .bind(conversation_id)
    .bind(&transcript)
    .fetch_one(&mut *tx)
    .await;

    match inserted {
        Ok(lead) => {
            tx.commit().await?;
            tracing::info!("Created lead {} from conversation {}", lead.id, conversation_id);
            Ok(lead)
        }
        // A concurrent delivery of the same conversation won the insert
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            tx.rollback().await?;
            find_by_conversation(pool, conversation_id)
                .await?
                .ok_or_else(|| ZafesysError::Validation(format!("Lead with phone {} already exists", phone)))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn receive_voice_conversation_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ZafesysResult<Json<Lead>> {
    let signature = [SIGNATURE_HEADER, SECRET_HEADER]
        .iter()
        .filter_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()))
        .find(|v| !v.is_empty())
        .unwrap_or("");

    if !verify_signature(&state.config.voice_webhook_secret, &body, signature) {
        tracing::warn!("Rejected voice webhook with invalid signature");
        return Err(ZafesysError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let payload: VoiceConversationPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("Failed to parse voice webhook payload: {}", e);
        ZafesysError::Validation(format!("Invalid payload: {}", e))
    })?;

    let lead = process_conversation_internal(&state.pool, &payload).await?;
    Ok(Json(lead))
}

/// Creates a sample lead as if a conversation had just finished.
pub async fn voice_webhook_test_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<Value>> {
    let conversation_id = format!("test-{}", uuid::Uuid::new_v4());

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (
            name, phone, email, address, status, source, notes,
            product_interest, conversation_id, conversation_transcript
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (phone) DO UPDATE SET
            conversation_id = EXCLUDED.conversation_id,
            conversation_transcript = EXCLUDED.conversation_transcript,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind("Cliente de Prueba")
    .bind("+573001234567")
    .bind("test@example.com")
    .bind("Calle 123 #45-67, Bogota")
    .bind(LeadStatus::Potential)
    .bind(LeadSource::VoiceAssistant)
    .bind("Lead created from the webhook test endpoint")
    .bind("OS566F")
    .bind(&conversation_id)
    .bind(SAMPLE_TRANSCRIPT)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "message": "Test lead created",
        "lead_id": lead.id,
        "lead_name": lead.name,
        "lead_status": lead.status,
    })))
}

pub async fn voice_webhook_status_axum(AxumState(state): AxumState<AppState>) -> Json<Value> {
    Json(json!({
        "webhook_url": "/api/webhooks/voice/conversation",
        "secret_configured": state.config.webhook_secret_configured(),
        "agent_id_configured": !state.config.voice_agent_id.is_empty(),
        "status": "ready",
    }))
}
