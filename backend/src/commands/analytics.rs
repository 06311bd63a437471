use crate::commands::utils::colombia_today;
use crate::error::{ZafesysError, ZafesysResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State as AxumState},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One completed installation, as analytics sees it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompletedInstallation {
    pub id: i32,
    pub scheduled_date: Option<NaiveDate>,
    pub technician_id: Option<i32>,
    pub technician_name: Option<String>,
    pub product_id: i32,
    pub product_name: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTechnician {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_installations: usize,
    pub avg_per_day: f64,
    pub avg_duration_minutes: f64,
    pub top_technician: Option<TopTechnician>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductShare {
    pub product_id: i32,
    pub product_name: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianPerformance {
    pub id: i32,
    pub name: String,
    pub installations: usize,
    pub avg_per_day: f64,
    pub avg_duration: f64,
    pub ranking: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDuration {
    pub product_id: i32,
    pub product_name: String,
    pub avg_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationAnalytics {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: AnalyticsSummary,
    pub by_day: Vec<DayCount>,
    pub by_product: Vec<ProductShare>,
    pub by_technician: Vec<TechnicianPerformance>,
    pub duration_by_product: Vec<ProductDuration>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn average(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: i64 = values.iter().map(|v| i64::from(*v)).sum();
    round1(sum as f64 / values.len() as f64)
}

/// Current month up to today unless the caller picks a range.
pub fn analytics_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ZafesysResult<(NaiveDate, NaiveDate)> {
    let start = start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let end = end.unwrap_or(today);
    if end < start {
        return Err(ZafesysError::Validation(
            "end_date must not be before start_date".to_string(),
        ));
    }
    Ok((start, end))
}

#[derive(Default)]
struct TechnicianTally {
    name: Option<String>,
    count: usize,
    durations: Vec<i32>,
    days: BTreeSet<NaiveDate>,
}

pub fn build_analytics(
    rows: &[CompletedInstallation],
    start: NaiveDate,
    end: NaiveDate,
) -> InstallationAnalytics {
    let total = rows.len();
    let days_in_period = (end - start).num_days() + 1;

    // by day, zero-filled across the whole range
    let mut day_counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for row in rows {
        if let Some(day) = row.scheduled_date {
            *day_counts.entry(day).or_default() += 1;
        }
    }
    let by_day: Vec<DayCount> = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| DayCount {
            date,
            count: day_counts.get(&date).copied().unwrap_or(0),
        })
        .collect();

    // per product
    let mut products: BTreeMap<i32, (String, usize, Vec<i32>)> = BTreeMap::new();
    for row in rows {
        let entry = products.entry(row.product_id).or_insert_with(|| {
            let name = row
                .product_name
                .clone()
                .unwrap_or_else(|| format!("Product {}", row.product_id));
            (name, 0, Vec::new())
        });
        entry.1 += 1;
        if let Some(d) = row.duration_minutes {
            entry.2.push(d);
        }
    }
    let mut by_product: Vec<ProductShare> = products
        .iter()
        .map(|(id, (name, count, _))| ProductShare {
            product_id: *id,
            product_name: name.clone(),
            count: *count,
            percentage: if total > 0 {
                round1(*count as f64 * 100.0 / total as f64)
            } else {
                0.0
            },
        })
        .collect();
    by_product.sort_by(|a, b| b.count.cmp(&a.count).then(a.product_id.cmp(&b.product_id)));

    let mut duration_by_product: Vec<ProductDuration> = products
        .into_iter()
        .filter(|(_, (_, _, durations))| !durations.is_empty())
        .map(|(id, (name, _, durations))| ProductDuration {
            product_id: id,
            product_name: name,
            avg_minutes: average(&durations),
        })
        .collect();
    duration_by_product.sort_by(|a, b| {
        b.avg_minutes
            .total_cmp(&a.avg_minutes)
            .then(a.product_id.cmp(&b.product_id))
    });

    // per technician
    let mut technicians: BTreeMap<i32, TechnicianTally> = BTreeMap::new();
    for row in rows {
        let Some(tech_id) = row.technician_id else {
            continue;
        };
        let tally = technicians.entry(tech_id).or_default();
        tally.count += 1;
        if tally.name.is_none() {
            tally.name = row.technician_name.clone();
        }
        if let Some(d) = row.duration_minutes {
            tally.durations.push(d);
        }
        if let Some(day) = row.scheduled_date {
            tally.days.insert(day);
        }
    }
    let mut by_technician: Vec<TechnicianPerformance> = technicians
        .into_iter()
        .map(|(id, tally)| TechnicianPerformance {
            id,
            name: tally.name.unwrap_or_else(|| format!("Technician {}", id)),
            installations: tally.count,
            avg_per_day: round1(tally.count as f64 / tally.days.len().max(1) as f64),
            avg_duration: average(&tally.durations),
            ranking: 0,
        })
        .collect();
    by_technician.sort_by(|a, b| b.installations.cmp(&a.installations).then(a.id.cmp(&b.id)));
    for (i, tech) in by_technician.iter_mut().enumerate() {
        tech.ranking = i + 1;
    }

    let durations: Vec<i32> = rows.iter().filter_map(|r| r.duration_minutes).collect();
    let summary = AnalyticsSummary {
        total_installations: total,
        avg_per_day: if days_in_period > 0 {
            round1(total as f64 / days_in_period as f64)
        } else {
            0.0
        },
        avg_duration_minutes: average(&durations),
        top_technician: by_technician.first().map(|t| TopTechnician {
            name: t.name.clone(),
            count: t.installations,
        }),
    };

    InstallationAnalytics {
        start_date: start,
        end_date: end,
        summary,
        by_day,
        by_product,
        by_technician,
        duration_by_product,
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub technician_id: Option<i32>,
}

pub async fn get_installation_analytics_axum(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<AnalyticsQuery>,
) -> ZafesysResult<Json<InstallationAnalytics>> {
    let (start, end) =
        analytics_range(params.start_date, params.end_date, colombia_today(Utc::now()))?;

    let rows = sqlx::query_as::<_, CompletedInstallation>(
        r#"
        SELECT i.id, i.scheduled_date, i.technician_id, t.full_name AS technician_name,
               i.product_id, p.name AS product_name, i.duration_minutes
        FROM installations i
        LEFT JOIN technicians t ON t.id = i.technician_id
        LEFT JOIN products p ON p.id = i.product_id
        WHERE i.status = 'completed'
          AND i.scheduled_date BETWEEN $1 AND $2
          AND ($3::INT IS NULL OR i.technician_id = $3)
        "#,
    )
    .bind(start)
    .bind(end)
    .bind(params.technician_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(build_analytics(&rows, start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn row(
        id: i32,
        date: u32,
        tech: Option<(i32, &str)>,
        product: (i32, &str),
        minutes: Option<i32>,
    ) -> CompletedInstallation {
        CompletedInstallation {
            id,
            scheduled_date: Some(day(date)),
            technician_id: tech.map(|t| t.0),
            technician_name: tech.map(|t| t.1.to_string()),
            product_id: product.0,
            product_name: Some(product.1.to_string()),
            duration_minutes: minutes,
        }
    }

    fn sample() -> Vec<CompletedInstallation> {
        let carlos = Some((1, "Carlos"));
        let diana = Some((2, "Diana"));
        vec![
            row(1, 1, carlos, (10, "OS566F"), Some(40)),
            row(2, 1, carlos, (10, "OS566F"), Some(50)),
            row(3, 2, diana, (20, "OS505"), Some(90)),
            row(4, 3, carlos, (20, "OS505"), None),
        ]
    }

    #[test]
    fn test_summary() {
        let a = build_analytics(&sample(), day(1), day(4));
        assert_eq!(a.summary.total_installations, 4);
        assert_eq!(a.summary.avg_per_day, 1.0);
        assert_eq!(a.summary.avg_duration_minutes, 60.0);
        assert_eq!(
            a.summary.top_technician,
            Some(TopTechnician { name: "Carlos".into(), count: 3 })
        );
    }

    #[test]
    fn test_by_day_is_zero_filled() {
        let a = build_analytics(&sample(), day(1), day(5));
        let counts: Vec<usize> = a.by_day.iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![2, 1, 1, 0, 0]);
        assert_eq!(a.by_day[4].date, day(5));
    }

    #[test]
    fn test_by_product_and_durations() {
        let a = build_analytics(&sample(), day(1), day(4));
        // equal counts fall back to product id order
        assert_eq!(a.by_product[0].product_name, "OS566F");
        assert_eq!(a.by_product[0].percentage, 50.0);
        assert_eq!(a.by_product[1].product_name, "OS505");

        assert_eq!(a.duration_by_product[0].product_name, "OS505");
        assert_eq!(a.duration_by_product[0].avg_minutes, 90.0);
        assert_eq!(a.duration_by_product[1].avg_minutes, 45.0);
    }

    #[test]
    fn test_technician_ranking() {
        let a = build_analytics(&sample(), day(1), day(4));
        assert_eq!(a.by_technician.len(), 2);
        let carlos = &a.by_technician[0];
        assert_eq!((carlos.name.as_str(), carlos.ranking), ("Carlos", 1));
        assert_eq!(carlos.installations, 3);
        assert_eq!(carlos.avg_per_day, 1.5);
        assert_eq!(carlos.avg_duration, 45.0);
        assert_eq!(a.by_technician[1].ranking, 2);
    }

    #[test]
    fn test_empty_period() {
        let a = build_analytics(&[], day(1), day(3));
        assert_eq!(a.summary.total_installations, 0);
        assert_eq!(a.summary.avg_duration_minutes, 0.0);
        assert!(a.summary.top_technician.is_none());
        assert_eq!(a.by_day.len(), 3);
        assert!(a.by_product.is_empty());
    }

    #[test]
    fn test_default_range_is_current_month() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 17).unwrap();
        assert_eq!(analytics_range(None, None, today).unwrap(), (day(1), today));
        assert!(analytics_range(Some(day(10)), Some(day(2)), today).is_err());
    }
}
