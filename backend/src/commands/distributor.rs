use crate::commands::installation::payment_status_for;
use crate::commands::inventory::{apply_movement, NewMovement};
use crate::commands::utils::{colombia_today, non_empty, normalize_phone};
use crate::db::{DbPool, Distributor, DistributorSale, MovementType, PaymentStatus};
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State as AxumState},
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const SALE_SELECT: &str = r#"
    SELECT s.*, p.name AS product_name, d.name AS distributor_name
    FROM distributor_sales s
    LEFT JOIN products p ON p.id = s.product_id
    LEFT JOIN distributors d ON d.id = s.distributor_id
"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DistributorSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub distributor: Distributor,
    pub total_sales: Decimal,
    pub total_units: i64,
}

#[derive(Debug, Deserialize)]
pub struct DistributorListQuery {
    #[serde(default)]
    pub include_inactive: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_distributors_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<DistributorListQuery>,
) -> ZafesysResult<Json<Vec<DistributorSummary>>> {
    let rows = sqlx::query_as::<_, DistributorSummary>(
        r#"
        SELECT d.*,
               COALESCE(SUM(s.total_price), 0) AS total_sales,
               COALESCE(SUM(s.quantity), 0)::BIGINT AS total_units
        FROM distributors d
        LEFT JOIN distributor_sales s ON s.distributor_id = d.id
        WHERE ($1 OR d.is_active)
        GROUP BY d.id
        ORDER BY d.created_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(params.include_inactive)
    .bind(params.skip.unwrap_or(0).max(0))
    .bind(params.limit.unwrap_or(100).clamp(1, 500))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct DistributorWithSales {
    #[serde(flatten)]
    pub distributor: Distributor,
    pub sales: Vec<DistributorSale>,
    pub total_sales_amount: Decimal,
    pub total_units_sold: i64,
}

impl DistributorWithSales {
    pub fn new(distributor: Distributor, sales: Vec<DistributorSale>) -> Self {
        let total_sales_amount = sales.iter().map(|s| s.total_price).sum();
        let total_units_sold = sales.iter().map(|s| i64::from(s.quantity)).sum();
        Self {
            distributor,
            sales,
            total_sales_amount,
            total_units_sold,
        }
    }
}

async fn get_distributor_internal(pool: &DbPool, id: i32) -> ZafesysResult<Distributor> {
    sqlx::query_as::<_, Distributor>("SELECT * FROM distributors WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Distributor"))
}

pub async fn get_distributor_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<DistributorWithSales>> {
    let distributor = get_distributor_internal(&state.pool, id).await?;
    let sql = format!(
        "{} WHERE s.distributor_id = $1 ORDER BY s.sale_date DESC, s.id DESC",
        SALE_SELECT
    );
    let sales = sqlx::query_as::<_, DistributorSale>(&sql)
        .bind(id)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(DistributorWithSales::new(distributor, sales)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDistributorRequest {
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
    #[serde(default)]
    pub discount_percentage: Decimal,
}

fn check_discount(discount: Decimal) -> ZafesysResult<()> {
    if discount < Decimal::ZERO || discount > Decimal::ONE_HUNDRED {
        return Err(ZafesysError::Validation(
            "Discount must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_distributor_axum(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<CreateDistributorRequest>,
) -> ZafesysResult<Json<Distributor>> {
    if payload.name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(ZafesysError::Validation(
            "Name and phone are required".to_string(),
        ));
    }
    check_discount(payload.discount_percentage)?;

    let distributor = sqlx::query_as::<_, Distributor>(
        r#"
        INSERT INTO distributors (name, company_name, nit, phone, email, address, city,
                                  zone, contact_person, notes, discount_percentage)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(non_empty(payload.company_name))
    .bind(non_empty(payload.nit))
    .bind(normalize_phone(payload.phone.trim()))
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.zone))
    .bind(non_empty(payload.contact_person))
    .bind(non_empty(payload.notes))
    .bind(payload.discount_percentage)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Created distributor {} ({})", distributor.id, distributor.name);
    Ok(Json(distributor))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDistributorRequest {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub nit: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zone: Option<String>,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    pub discount_percentage: Option<Decimal>,
    pub is_active: Option<bool>,
}

pub async fn update_distributor_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateDistributorRequest>,
) -> ZafesysResult<Json<Distributor>> {
    if let Some(discount) = payload.discount_percentage {
        check_discount(discount)?;
    }

    let distributor = sqlx::query_as::<_, Distributor>(
        r#"
        UPDATE distributors SET
            name = COALESCE($1, name),
            company_name = COALESCE($2, company_name),
            nit = COALESCE($3, nit),
            phone = COALESCE($4, phone),
            email = COALESCE($5, email),
            address = COALESCE($6, address),
            city = COALESCE($7, city),
            zone = COALESCE($8, zone),
            contact_person = COALESCE($9, contact_person),
            notes = COALESCE($10, notes),
            discount_percentage = COALESCE($11, discount_percentage),
            is_active = COALESCE($12, is_active),
            updated_at = NOW()
        WHERE id = $13
        RETURNING *
        "#,
    )
    .bind(non_empty(payload.name))
    .bind(non_empty(payload.company_name))
    .bind(non_empty(payload.nit))
    .bind(non_empty(payload.phone).map(|p| normalize_phone(&p)))
    .bind(non_empty(payload.email))
    .bind(non_empty(payload.address))
    .bind(non_empty(payload.city))
    .bind(non_empty(payload.zone))
    .bind(non_empty(payload.contact_person))
    .bind(non_empty(payload.notes))
    .bind(payload.discount_percentage)
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Distributor"))?;

    Ok(Json(distributor))
}

pub async fn deactivate_distributor_axum(
    AxumState(state): AxumState<AppState>,
    Path(id): Path<i32>,
) -> ZafesysResult<Json<()>> {
    let result =
        sqlx::query("UPDATE distributors SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(ZafesysError::not_found("Distributor"));
    }
    Ok(Json(()))
}

// --- Sales ---

#[derive(Debug, Deserialize)]
pub struct SaleListQuery {
    pub distributor_id: Option<i32>,
    pub product_id: Option<i32>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_sales_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<SaleListQuery>,
) -> ZafesysResult<Json<Vec<DistributorSale>>> {
    let sql = format!(
        r#"{}
        WHERE ($1::INT IS NULL OR s.distributor_id = $1)
          AND ($2::INT IS NULL OR s.product_id = $2)
          AND ($3::DATE IS NULL OR s.sale_date >= $3)
          AND ($4::DATE IS NULL OR s.sale_date <= $4)
        ORDER BY s.sale_date DESC, s.id DESC
        OFFSET $5 LIMIT $6
        "#,
        SALE_SELECT
    );
    let sales = sqlx::query_as::<_, DistributorSale>(&sql)
        .bind(params.distributor_id)
        .bind(params.product_id)
        .bind(params.from_date)
        .bind(params.to_date)
        .bind(params.skip.unwrap_or(0).max(0))
        .bind(params.limit.unwrap_or(100).clamp(1, 500))
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(sales))
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub sale_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
}

pub fn sale_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Records a sale and takes the units out of stock in one transaction.
pub async fn create_sale_internal(
    pool: &DbPool,
    distributor_id: i32,
    payload: CreateSaleRequest,
) -> ZafesysResult<DistributorSale> {
    if payload.quantity <= 0 {
        return Err(ZafesysError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if payload.unit_price < Decimal::ZERO {
        return Err(ZafesysError::Validation(
            "Unit price cannot be negative".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let distributor: Option<String> =
        sqlx::query_scalar("SELECT name FROM distributors WHERE id = $1")
            .bind(distributor_id)
            .fetch_optional(&mut *tx)
            .await?;
    let distributor_name = distributor.ok_or_else(|| ZafesysError::not_found("Distributor"))?;

    let mut sale = sqlx::query_as::<_, DistributorSale>(
        r#"
        INSERT INTO distributor_sales (distributor_id, product_id, quantity, unit_price,
                                       total_price, sale_date, invoice_number, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(distributor_id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .bind(payload.unit_price)
    .bind(sale_total(payload.unit_price, payload.quantity))
    .bind(payload.sale_date.unwrap_or_else(|| colombia_today(Utc::now())))
    .bind(non_empty(payload.invoice_number))
    .bind(non_empty(payload.notes))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            ZafesysError::not_found("Product")
        }
        other => ZafesysError::Database(other),
    })?;

    let movement = NewMovement::new(sale.product_id, MovementType::Exit, sale.quantity)
        .reference("distributor_sale", sale.id)
        .notes(Some(format!("Sale to {}", distributor_name)));
    apply_movement(&mut tx, &movement).await?;
    sale.product_name = sqlx::query_scalar("SELECT name FROM products WHERE id = $1")
        .bind(sale.product_id)
        .fetch_optional(&mut *tx)
        .await?;
    tx.commit().await?;

    sale.distributor_name = Some(distributor_name);
    tracing::info!(
        "Distributor sale {}: {} units of product {}",
        sale.id,
        sale.quantity,
        sale.product_id
    );
    Ok(sale)
}

pub async fn create_sale_axum(
    AxumState(state): AxumState<AppState>,
    Path(distributor_id): Path<i32>,
    Json(payload): Json<CreateSaleRequest>,
) -> ZafesysResult<Json<DistributorSale>> {
    Ok(Json(create_sale_internal(&state.pool, distributor_id, payload).await?))
}

/// Quantity and product are fixed once stock has moved; only the billing
/// side of a sale can change.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSaleRequest {
    pub payment_status: Option<PaymentStatus>,
    pub amount_paid: Option<Decimal>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
}

pub async fn update_sale_axum(
    AxumState(state): AxumState<AppState>,
    Path(sale_id): Path<i32>,
    Json(payload): Json<UpdateSaleRequest>,
) -> ZafesysResult<Json<DistributorSale>> {
    if payload.amount_paid.map_or(false, |a| a < Decimal::ZERO) {
        return Err(ZafesysError::Validation(
            "Amount paid cannot be negative".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;
    let current = sqlx::query_as::<_, DistributorSale>(
        "SELECT * FROM distributor_sales WHERE id = $1 FOR UPDATE",
    )
    .bind(sale_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Sale"))?;

    let amount_paid = payload.amount_paid.unwrap_or(current.amount_paid);
    let payment_status = payload.payment_status.unwrap_or_else(|| {
        if payload.amount_paid.is_some() {
            payment_status_for(current.total_price, amount_paid)
        } else {
            current.payment_status
        }
    });

    sqlx::query(
        r#"
        UPDATE distributor_sales SET
            payment_status = $1,
            amount_paid = $2,
            invoice_number = COALESCE($3, invoice_number),
            notes = COALESCE($4, notes),
            updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(payment_status)
    .bind(amount_paid)
    .bind(non_empty(payload.invoice_number))
    .bind(non_empty(payload.notes))
    .bind(sale_id)
    .execute(&mut *tx)
    .await?;

    let sql = format!("{} WHERE s.id = $1", SALE_SELECT);
    let sale = sqlx::query_as::<_, DistributorSale>(&sql)
        .bind(sale_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(sale))
}

/// Deletes a sale and puts its units back into stock.
pub async fn delete_sale_internal(pool: &DbPool, sale_id: i32) -> ZafesysResult<()> {
    let mut tx = pool.begin().await?;

    let sale = sqlx::query_as::<_, DistributorSale>(
        "SELECT * FROM distributor_sales WHERE id = $1 FOR UPDATE",
    )
    .bind(sale_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ZafesysError::not_found("Sale"))?;

    let movement = NewMovement::new(sale.product_id, MovementType::Entry, sale.quantity)
        .reference("distributor_sale", sale.id)
        .notes(Some("Sale deleted, stock restored".to_string()));
    apply_movement(&mut tx, &movement).await?;

    sqlx::query("DELETE FROM distributor_sales WHERE id = $1")
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Deleted distributor sale {}, restored {} units", sale_id, sale.quantity);
    Ok(())
}

pub async fn delete_sale_axum(
    AxumState(state): AxumState<AppState>,
    Path(sale_id): Path<i32>,
) -> ZafesysResult<Json<()>> {
    delete_sale_internal(&state.pool, sale_id).await?;
    Ok(Json(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(quantity: i32, total: i64) -> DistributorSale {
        DistributorSale {
            id: 1,
            distributor_id: 2,
            product_id: 3,
            quantity,
            unit_price: Decimal::from(total / i64::from(quantity)),
            total_price: Decimal::from(total),
            sale_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            invoice_number: None,
            payment_status: PaymentStatus::Pending,
            amount_paid: Decimal::ZERO,
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
            product_name: None,
            distributor_name: None,
        }
    }

    #[test]
    fn test_sale_total() {
        assert_eq!(sale_total(Decimal::new(45000050, 2), 3), Decimal::new(135000150, 2));
        assert_eq!(sale_total(Decimal::from(1000), 0), Decimal::ZERO);
    }

    #[test]
    fn test_distributor_totals() {
        let distributor = Distributor {
            id: 2,
            name: "Seguridad Andina".into(),
            company_name: None,
            nit: None,
            phone: "+573001112233".into(),
            email: None,
            address: None,
            city: Some("Medellin".into()),
            zone: None,
            contact_person: None,
            notes: None,
            discount_percentage: Decimal::from(15),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        let view = DistributorWithSales::new(distributor, vec![sale(2, 1_000_000), sale(5, 2_000_000)]);
        assert_eq!(view.total_units_sold, 7);
        assert_eq!(view.total_sales_amount, Decimal::from(3_000_000));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Seguridad Andina");
        assert_eq!(json["sales"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_discount_bounds() {
        assert!(check_discount(Decimal::ZERO).is_ok());
        assert!(check_discount(Decimal::ONE_HUNDRED).is_ok());
        assert!(check_discount(Decimal::from(101)).is_err());
        assert!(check_discount(Decimal::from(-1)).is_err());
    }
}
