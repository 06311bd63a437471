use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;

use crate::config::AppConfig;
use crate::error::{ZafesysError, ZafesysResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(config: &AppConfig) -> ZafesysResult<DbPool> {
    let opts = PgConnectOptions::from_str(&config.database_url)
        .map_err(|e| ZafesysError::Internal(format!("Invalid DB URL: {}", e)))?;

    // connect_lazy_with returns immediately; the first query opens the connection.
    Ok(PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts))
}

pub async fn init_database(pool: &DbPool) -> ZafesysResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database schema is up to date");
    Ok(())
}

// --- Enumerations (stored as TEXT) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    Pending,
    Scheduled,
    EnRoute,
    InProgress,
    Completed,
    Cancelled,
}

impl InstallationStatus {
    pub const ALL: [InstallationStatus; 6] = [
        InstallationStatus::Pending,
        InstallationStatus::Scheduled,
        InstallationStatus::EnRoute,
        InstallationStatus::InProgress,
        InstallationStatus::Completed,
        InstallationStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationStatus::Pending => "pending",
            InstallationStatus::Scheduled => "scheduled",
            InstallationStatus::EnRoute => "en_route",
            InstallationStatus::InProgress => "in_progress",
            InstallationStatus::Completed => "completed",
            InstallationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallationStatus::Completed | InstallationStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
    Nequi,
    Daviplata,
}

impl FromStr for PaymentMethod {
    type Err = ZafesysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "efectivo" => Ok(PaymentMethod::Cash),
            "transfer" | "transferencia" => Ok(PaymentMethod::Transfer),
            "card" | "tarjeta" => Ok(PaymentMethod::Card),
            "nequi" => Ok(PaymentMethod::Nequi),
            "daviplata" => Ok(PaymentMethod::Daviplata),
            other => Err(ZafesysError::Validation(format!(
                "Unknown payment method: {}",
                other
            ))),
        }
    }
}

/// Who started an installation timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimerActor {
    Admin,
    Technician,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    InConversation,
    Potential,
    ClosedWon,
    Lost,
    Converted,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 6] = [
        LeadStatus::New,
        LeadStatus::InConversation,
        LeadStatus::Potential,
        LeadStatus::ClosedWon,
        LeadStatus::Lost,
        LeadStatus::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::InConversation => "in_conversation",
            LeadStatus::Potential => "potential",
            LeadStatus::ClosedWon => "closed_won",
            LeadStatus::Lost => "lost",
            LeadStatus::Converted => "converted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Whatsapp,
    VoiceAssistant,
    Referral,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WarehouseStatus {
    Pending,
    Prepared,
    Delivered,
}

// --- Rows ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub model: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub installation_price: Decimal,
    pub stock: i32,
    pub min_stock_alert: i32,
    pub features: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub notes: Option<String>,
    pub product_interest: Option<String>,
    pub assigned_to_id: Option<i32>,
    pub conversation_id: Option<String>,
    pub conversation_transcript: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub contacted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Installation {
    pub id: i32,
    pub lead_id: i32,
    pub customer_id: Option<i32>,
    pub product_id: i32,
    pub quantity: i32,
    pub technician_id: Option<i32>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub estimated_duration: i32,
    pub address: String,
    pub city: Option<String>,
    pub address_notes: Option<String>,
    pub status: InstallationStatus,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid: Decimal,
    pub customer_notes: Option<String>,
    pub technician_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub timer_ended_at: Option<DateTime<Utc>>,
    pub timer_started_by: Option<TimerActor>,
    pub duration_minutes: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub photo_proof_url: Option<String>,
    pub signature_url: Option<String>,
    pub video_url: Option<String>,
    pub warehouse_status: WarehouseStatus,
    pub prepared_by: Option<String>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Installation joined with the names a technician or the warehouse needs to see.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstallationDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub installation: Installation,
    pub lead_name: Option<String>,
    pub lead_phone: Option<String>,
    pub product_name: Option<String>,
    pub product_model: Option<String>,
    pub product_sku: Option<String>,
    pub product_image: Option<String>,
    pub technician_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryMovement {
    pub id: i64,
    pub product_id: i32,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub stock_before: i32,
    pub stock_after: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub product_name: Option<String>,
    #[sqlx(default)]
    pub product_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Technician {
    pub id: i32,
    pub user_id: Option<i32>,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub document_id: Option<String>,
    pub zone: Option<String>,
    pub specialties: Option<String>,
    #[serde(skip)]
    pub pin_hash: Option<String>,
    pub is_available: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TechnicianLocation {
    pub id: i64,
    pub technician_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    #[sqlx(default)]
    pub technician_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
    pub lead_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Distributor {
    pub id: i32,
    pub name: String,
    pub company_name: Option<String>,
    pub nit: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zone: Option<String>,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    pub discount_percentage: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistributorSale {
    pub id: i32,
    pub distributor_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub sale_date: NaiveDate,
    pub invoice_number: Option<String>,
    pub payment_status: PaymentStatus,
    pub amount_paid: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub product_name: Option<String>,
    #[sqlx(default)]
    pub distributor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Warehouse {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WarehouseStockLine {
    pub warehouse_id: i32,
    pub warehouse_name: String,
    pub warehouse_code: String,
    pub quantity: i32,
    pub min_stock_alert: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(
            serde_json::to_value(InstallationStatus::EnRoute).unwrap(),
            "en_route"
        );
        assert_eq!(
            serde_json::to_value(LeadStatus::InConversation).unwrap(),
            "in_conversation"
        );
        assert_eq!(
            serde_json::to_value(LeadSource::VoiceAssistant).unwrap(),
            "voice_assistant"
        );
        for status in InstallationStatus::ALL {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
        for status in LeadStatus::ALL {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
    }

    #[test]
    fn test_payment_method_accepts_spanish_aliases() {
        assert_eq!(
            "efectivo".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Cash
        );
        assert_eq!("Nequi".parse::<PaymentMethod>().unwrap(), PaymentMethod::Nequi);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_technician_pin_hash_is_never_serialized() {
        let tech = Technician {
            id: 1,
            user_id: None,
            full_name: "Carlos Ruiz".into(),
            phone: "+573001112233".into(),
            email: None,
            document_id: None,
            zone: Some("Norte".into()),
            specialties: None,
            pin_hash: Some("$2b$12$hash".into()),
            is_available: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        let value = serde_json::to_value(&tech).unwrap();
        assert!(value.get("pin_hash").is_none());
        assert_eq!(value["full_name"], "Carlos Ruiz");
    }
}
