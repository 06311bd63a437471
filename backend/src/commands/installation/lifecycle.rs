use super::timer::InstallationTimer;
use crate::db::{Installation, InstallationStatus, PaymentStatus};
use crate::error::{ZafesysError, ZafesysResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Statuses a technician may set from the field app.
pub const TECHNICIAN_STATUSES: [InstallationStatus; 3] = [
    InstallationStatus::EnRoute,
    InstallationStatus::InProgress,
    InstallationStatus::Completed,
];

/// Column values to write when an installation changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: InstallationStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub timer: InstallationTimer,
}

/// Returns `None` when the installation already has `next`.
pub fn plan_status_change(
    installation: &Installation,
    next: InstallationStatus,
    now: DateTime<Utc>,
) -> ZafesysResult<Option<StatusChange>> {
    let current = installation.status;
    if current == next {
        return Ok(None);
    }
    if current.is_terminal() {
        return Err(ZafesysError::InvalidState(format!(
            "Installation is {} and can no longer change status",
            current.as_str()
        )));
    }

    let mut timer = InstallationTimer::of(installation);
    let mut completed_at = installation.completed_at;

    if next == InstallationStatus::Completed {
        completed_at = Some(now);
        if timer.is_running() {
            timer = timer.stop(now)?;
        }
    }

    Ok(Some(StatusChange {
        status: next,
        completed_at,
        timer,
    }))
}

pub fn check_technician_access(installation: &Installation, technician_id: i32) -> ZafesysResult<()> {
    if installation.technician_id != Some(technician_id) {
        return Err(ZafesysError::Forbidden(
            "Installation is not assigned to this technician".to_string(),
        ));
    }
    Ok(())
}

pub fn check_technician_status(next: InstallationStatus) -> ZafesysResult<()> {
    if !TECHNICIAN_STATUSES.contains(&next) {
        let allowed: Vec<&str> = TECHNICIAN_STATUSES.iter().map(|s| s.as_str()).collect();
        return Err(ZafesysError::Validation(format!(
            "Invalid status. Use: {}",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Nothing collected is always pending, even on a zero total.
pub fn payment_status_for(total_price: Decimal, amount_paid: Decimal) -> PaymentStatus {
    if amount_paid <= Decimal::ZERO {
        PaymentStatus::Pending
    } else if amount_paid >= total_price {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// Adds a field payment to what was already collected.
pub fn accumulate_payment(
    total_price: Decimal,
    already_paid: Decimal,
    amount: Decimal,
) -> ZafesysResult<(Decimal, PaymentStatus)> {
    if amount <= Decimal::ZERO {
        return Err(ZafesysError::Validation(
            "Payment amount must be greater than zero".to_string(),
        ));
    }
    let amount_paid = already_paid + amount;
    Ok((amount_paid, payment_status_for(total_price, amount_paid)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{PaymentStatus, TimerActor, WarehouseStatus};
    use chrono::{Duration, TimeZone};

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    pub(crate) fn sample_installation(status: InstallationStatus) -> Installation {
        let created = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        Installation {
            id: 1,
            lead_id: 10,
            customer_id: None,
            product_id: 3,
            quantity: 1,
            technician_id: Some(4),
            scheduled_date: None,
            scheduled_time: None,
            estimated_duration: 60,
            address: "Calle 123 #45-67".to_string(),
            city: Some("Bogota".to_string()),
            address_notes: None,
            status,
            total_price: dec(850000),
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            amount_paid: Decimal::ZERO,
            customer_notes: None,
            technician_notes: None,
            internal_notes: None,
            timer_started_at: None,
            timer_ended_at: None,
            timer_started_by: None,
            duration_minutes: None,
            completed_at: None,
            photo_proof_url: None,
            signature_url: None,
            video_url: None,
            warehouse_status: WarehouseStatus::Pending,
            prepared_by: None,
            prepared_at: None,
            created_at: created,
            updated_at: None,
        }
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        let now = Utc::now();
        for terminal in [InstallationStatus::Completed, InstallationStatus::Cancelled] {
            let inst = sample_installation(terminal);
            for next in InstallationStatus::ALL {
                let result = plan_status_change(&inst, next, now);
                if next == terminal {
                    assert!(matches!(result, Ok(None)));
                } else {
                    assert!(matches!(result, Err(ZafesysError::InvalidState(_))));
                }
            }
        }
    }

    #[test]
    fn test_completing_stops_running_timer() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 15, 0, 0).unwrap();
        let mut inst = sample_installation(InstallationStatus::InProgress);
        inst.timer_started_at = Some(start);
        inst.timer_started_by = Some(TimerActor::Technician);

        let change = plan_status_change(&inst, InstallationStatus::Completed, start + Duration::minutes(45))
            .unwrap()
            .unwrap();
        assert_eq!(change.status, InstallationStatus::Completed);
        assert_eq!(change.completed_at, Some(start + Duration::minutes(45)));
        assert_eq!(change.timer.duration_minutes, Some(45));
        assert!(!change.timer.is_running());
    }

    #[test]
    fn test_completing_without_timer_keeps_it_idle() {
        let inst = sample_installation(InstallationStatus::Scheduled);
        let change = plan_status_change(&inst, InstallationStatus::Completed, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(change.timer.started_at, None);
        assert_eq!(change.timer.duration_minutes, None);
    }

    #[test]
    fn test_technician_rules() {
        let inst = sample_installation(InstallationStatus::Scheduled);
        assert!(check_technician_access(&inst, 4).is_ok());
        assert!(matches!(
            check_technician_access(&inst, 5),
            Err(ZafesysError::Forbidden(_))
        ));

        assert!(check_technician_status(InstallationStatus::EnRoute).is_ok());
        assert!(matches!(
            check_technician_status(InstallationStatus::Cancelled),
            Err(ZafesysError::Validation(_))
        ));
    }

    #[test]
    fn test_payment_accumulates_to_paid() {
        let total = dec(850000);
        let (paid, status) = accumulate_payment(total, Decimal::ZERO, dec(300000)).unwrap();
        assert_eq!(paid, dec(300000));
        assert_eq!(status, PaymentStatus::Partial);

        let (paid, status) = accumulate_payment(total, paid, dec(550000)).unwrap();
        assert_eq!(paid, total);
        assert_eq!(status, PaymentStatus::Paid);
    }

    #[test]
    fn test_unpaid_free_installation_stays_pending() {
        assert_eq!(
            payment_status_for(Decimal::ZERO, Decimal::ZERO),
            PaymentStatus::Pending
        );
        assert_eq!(payment_status_for(dec(100), Decimal::ZERO), PaymentStatus::Pending);
        assert_eq!(payment_status_for(dec(100), dec(40)), PaymentStatus::Partial);
        assert_eq!(payment_status_for(dec(100), dec(100)), PaymentStatus::Paid);
    }

    #[test]
    fn test_payment_rejects_non_positive_amounts() {
        assert!(matches!(
            accumulate_payment(dec(100), Decimal::ZERO, Decimal::ZERO),
            Err(ZafesysError::Validation(_))
        ));
        assert!(accumulate_payment(dec(100), Decimal::ZERO, dec(-5)).is_err());
    }
}
