use crate::commands::utils::{colombia_day_bounds, colombia_today};
use crate::error::ZafesysResult;
use crate::state::AppState;
use axum::{
    extract::{Query, State as AxumState},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Ok,
    Low,
    Critical,
}

pub fn stock_status(stock: i32, min_stock_alert: i32) -> StockStatus {
    if stock <= 0 {
        StockStatus::Critical
    } else if stock <= min_stock_alert {
        StockStatus::Low
    } else {
        StockStatus::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesStats {
    pub total_sold_30d: i64,
    pub total_sold_7d: i64,
    pub avg_daily_sales: f64,
    pub days_of_stock: Option<i64>,
}

pub fn sales_stats(stock: i32, sold_30d: i64, sold_7d: i64) -> SalesStats {
    let avg_daily = if sold_30d > 0 { sold_30d as f64 / 30.0 } else { 0.0 };
    let days_of_stock = if avg_daily > 0.0 && stock > 0 {
        Some((stock as f64 / avg_daily).floor() as i64)
    } else {
        None
    };
    SalesStats {
        total_sold_30d: sold_30d,
        total_sold_7d: sold_7d,
        avg_daily_sales: (avg_daily * 100.0).round() / 100.0,
        days_of_stock,
    }
}

pub fn product_alerts(stock: i32, min_stock_alert: i32, stats: &SalesStats) -> Vec<String> {
    let mut alerts = Vec::new();

    if stock <= 0 {
        alerts.push("Out of stock".to_string());
    } else if stock <= min_stock_alert {
        alerts.push(format!("Low stock: only {} units left", stock));
    }

    if let Some(days) = stats.days_of_stock {
        if days <= 7 {
            alerts.push(format!("Restock soon: about {} days of stock left", days));
        }
    }

    if stats.total_sold_30d == 0 && stock > 0 {
        alerts.push("Slow product: no sales in 30 days".to_string());
    } else if stats.total_sold_30d <= 2 && stock > 10 {
        alerts.push(format!(
            "Slow movement: only {} sales in 30 days",
            stats.total_sold_30d
        ));
    }

    alerts
}

/// Product row with its completed-installation sales.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductSalesRow {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub model: String,
    pub stock: i32,
    pub min_stock_alert: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub image_url: Option<String>,
    pub sold_30d: i64,
    pub sold_7d: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductInventory {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub model: String,
    pub stock: i32,
    pub min_stock_alert: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub image_url: Option<String>,
    pub stock_status: StockStatus,
    #[serde(flatten)]
    pub stats: SalesStats,
    pub alerts: Vec<String>,
}

impl From<ProductSalesRow> for ProductInventory {
    fn from(row: ProductSalesRow) -> Self {
        let stats = sales_stats(row.stock, row.sold_30d, row.sold_7d);
        let alerts = product_alerts(row.stock, row.min_stock_alert, &stats);
        Self {
            stock_status: stock_status(row.stock, row.min_stock_alert),
            id: row.id,
            sku: row.sku,
            name: row.name,
            model: row.model,
            stock: row.stock,
            min_stock_alert: row.min_stock_alert,
            price: row.price,
            is_active: row.is_active,
            image_url: row.image_url,
            stats,
            alerts,
        }
    }
}

/// Products needing attention first, then lowest stock.
pub fn sort_by_attention(items: &mut [ProductInventory]) {
    items.sort_by_key(|p| (p.alerts.is_empty(), p.stock));
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorySummary {
    pub total_products: usize,
    pub total_stock_value: Decimal,
    pub products_low_stock: usize,
    pub products_out_of_stock: usize,
    pub products_slow_moving: usize,
    pub total_movements_today: i64,
    pub total_movements_week: i64,
}

pub fn summarize(
    products: &[ProductSalesRow],
    movements_today: i64,
    movements_week: i64,
) -> InventorySummary {
    InventorySummary {
        total_products: products.len(),
        total_stock_value: products
            .iter()
            .map(|p| p.price * Decimal::from(p.stock))
            .sum(),
        products_low_stock: products
            .iter()
            .filter(|p| p.stock > 0 && p.stock <= p.min_stock_alert)
            .count(),
        products_out_of_stock: products.iter().filter(|p| p.stock <= 0).count(),
        products_slow_moving: products
            .iter()
            .filter(|p| p.stock > 0 && p.sold_30d <= 2)
            .count(),
        total_movements_today: movements_today,
        total_movements_week: movements_week,
    }
}

async fn fetch_product_sales(
    pool: &sqlx::PgPool,
    include_inactive: bool,
    now: DateTime<Utc>,
) -> ZafesysResult<Vec<ProductSalesRow>> {
    let rows = sqlx::query_as::<_, ProductSalesRow>(
        r#"
        SELECT p.id, p.sku, p.name, p.model, p.stock, p.min_stock_alert, p.price,
               p.is_active, p.image_url,
               COALESCE(SUM(i.quantity) FILTER (WHERE COALESCE(i.completed_at, i.created_at) >= $1), 0)::BIGINT AS sold_30d,
               COALESCE(SUM(i.quantity) FILTER (WHERE COALESCE(i.completed_at, i.created_at) >= $2), 0)::BIGINT AS sold_7d
        FROM products p
        LEFT JOIN installations i ON i.product_id = p.id AND i.status = 'completed'
        WHERE ($3 OR p.is_active)
        GROUP BY p.id
        ORDER BY p.name
        "#,
    )
    .bind(now - Duration::days(30))
    .bind(now - Duration::days(7))
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_inventory_summary_axum(
    AxumState(state): AxumState<AppState>,
) -> ZafesysResult<Json<InventorySummary>> {
    let now = Utc::now();
    let products = fetch_product_sales(&state.pool, false, now).await?;

    let (today_start, _) = colombia_day_bounds(colombia_today(now));
    let week_start = today_start - Duration::days(7);

    let (today, week): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE created_at >= $1),
               COUNT(*) FILTER (WHERE created_at >= $2)
        FROM inventory_movements
        "#,
    )
    .bind(today_start)
    .bind(week_start)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(summarize(&products, today, week)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductsInventoryQuery {
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(default)]
    pub only_alerts: bool,
}

pub async fn get_products_inventory_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<ProductsInventoryQuery>,
) -> ZafesysResult<Json<Vec<ProductInventory>>> {
    let rows = fetch_product_sales(&state.pool, params.include_inactive, Utc::now()).await?;

    let mut items: Vec<ProductInventory> = rows
        .into_iter()
        .map(ProductInventory::from)
        .filter(|p| !params.only_alerts || !p.alerts.is_empty())
        .collect();
    sort_by_attention(&mut items);

    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32, stock: i32, min: i32, price: i64, sold_30d: i64) -> ProductSalesRow {
        ProductSalesRow {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Cerradura {id}"),
            model: "OS566F".to_string(),
            stock,
            min_stock_alert: min,
            price: Decimal::from(price),
            is_active: true,
            image_url: None,
            sold_30d,
            sold_7d: 0,
        }
    }

    #[test]
    fn test_stock_status_thresholds() {
        assert_eq!(stock_status(0, 5), StockStatus::Critical);
        assert_eq!(stock_status(5, 5), StockStatus::Low);
        assert_eq!(stock_status(6, 5), StockStatus::Ok);
    }

    #[test]
    fn test_days_of_stock_projection() {
        let stats = sales_stats(12, 60, 14);
        assert_eq!(stats.avg_daily_sales, 2.0);
        assert_eq!(stats.days_of_stock, Some(6));

        let idle = sales_stats(12, 0, 0);
        assert_eq!(idle.avg_daily_sales, 0.0);
        assert_eq!(idle.days_of_stock, None);
    }

    #[test]
    fn test_alerts() {
        let stats = sales_stats(3, 60, 10);
        let alerts = product_alerts(3, 5, &stats);
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].starts_with("Low stock"));
        assert!(alerts[1].starts_with("Restock soon"));

        let slow = product_alerts(20, 5, &sales_stats(20, 1, 0));
        assert_eq!(slow, vec!["Slow movement: only 1 sales in 30 days".to_string()]);

        let dead = product_alerts(4, 2, &sales_stats(4, 0, 0));
        assert_eq!(dead, vec!["Slow product: no sales in 30 days".to_string()]);

        assert!(product_alerts(20, 5, &sales_stats(20, 10, 3)).is_empty());
    }

    #[test]
    fn test_alerting_products_sort_first() {
        let mut items: Vec<ProductInventory> = vec![
            row(1, 30, 5, 100, 10).into(),
            row(2, 0, 5, 100, 0).into(),
            row(3, 20, 5, 100, 10).into(),
        ];
        sort_by_attention(&mut items);
        let ids: Vec<i32> = items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_summary_counts() {
        let products = vec![
            row(1, 0, 5, 500, 0),
            row(2, 3, 5, 200, 4),
            row(3, 10, 5, 100, 1),
        ];
        let summary = summarize(&products, 2, 9);
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.total_stock_value, Decimal::from(3 * 200 + 10 * 100));
        assert_eq!(summary.products_low_stock, 1);
        assert_eq!(summary.products_out_of_stock, 1);
        assert_eq!(summary.products_slow_moving, 1);
        assert_eq!(summary.total_movements_today, 2);
        assert_eq!(summary.total_movements_week, 9);
    }
}
