use crate::db::{Installation, TimerActor};
use crate::error::{ZafesysError, ZafesysResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Timer columns of an installation, detached from the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTimer {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub started_by: Option<TimerActor>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerStatus {
    pub installation_id: i32,
    pub is_running: bool,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub timer_ended_at: Option<DateTime<Utc>>,
    pub timer_started_by: Option<TimerActor>,
    pub elapsed_minutes: Option<i32>,
    pub duration_minutes: Option<i32>,
}

/// Whole minutes between two instants, floored; negative spans count as zero.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let minutes = (end - start).num_minutes().max(0);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

impl InstallationTimer {
    pub fn of(installation: &Installation) -> Self {
        Self {
            started_at: installation.timer_started_at,
            ended_at: installation.timer_ended_at,
            started_by: installation.timer_started_by,
            duration_minutes: installation.duration_minutes,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }

    /// Starting a running timer leaves it untouched.
    pub fn start(&self, started_by: TimerActor, now: DateTime<Utc>) -> Self {
        if self.is_running() {
            return self.clone();
        }
        Self {
            started_at: Some(now),
            ended_at: None,
            started_by: Some(started_by),
            duration_minutes: None,
        }
    }

    pub fn stop(&self, now: DateTime<Utc>) -> ZafesysResult<Self> {
        let started_at = self
            .started_at
            .ok_or_else(|| ZafesysError::InvalidState("Timer has not been started".to_string()))?;
        if self.ended_at.is_some() {
            return Err(ZafesysError::InvalidState(
                "Timer has already been stopped".to_string(),
            ));
        }
        Ok(Self {
            started_at: Some(started_at),
            ended_at: Some(now),
            started_by: self.started_by,
            duration_minutes: Some(elapsed_minutes(started_at, now)),
        })
    }

    pub fn status(&self, installation_id: i32, now: DateTime<Utc>) -> TimerStatus {
        let is_running = self.is_running();
        let elapsed = match (self.started_at, self.ended_at) {
            (Some(start), None) => Some(elapsed_minutes(start, now)),
            (Some(_), Some(_)) => self.duration_minutes,
            _ => None,
        };
        TimerStatus {
            installation_id,
            is_running,
            timer_started_at: self.started_at,
            timer_ended_at: self.ended_at,
            timer_started_by: self.started_by,
            elapsed_minutes: elapsed,
            duration_minutes: self.duration_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn idle() -> InstallationTimer {
        InstallationTimer {
            started_at: None,
            ended_at: None,
            started_by: None,
            duration_minutes: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_stop_without_start_fails() {
        let err = idle().stop(t0()).unwrap_err();
        assert!(matches!(err, ZafesysError::InvalidState(ref m) if m == "Timer has not been started"));
    }

    #[test]
    fn test_stop_twice_fails() {
        let stopped = idle()
            .start(TimerActor::Admin, t0())
            .stop(t0() + Duration::minutes(5))
            .unwrap();
        let err = stopped.stop(t0() + Duration::minutes(6)).unwrap_err();
        assert!(matches!(err, ZafesysError::InvalidState(ref m) if m == "Timer has already been stopped"));
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let first = idle().start(TimerActor::Technician, t0());
        let second = first.start(TimerActor::Admin, t0() + Duration::minutes(3));
        assert_eq!(first, second);
        assert_eq!(second.started_by, Some(TimerActor::Technician));
    }

    #[test]
    fn test_technician_session_of_37_minutes() {
        let running = idle().start(TimerActor::Technician, t0());
        let stopped = running.stop(t0() + Duration::minutes(37)).unwrap();
        assert_eq!(stopped.duration_minutes, Some(37));
        assert_eq!(stopped.started_by, Some(TimerActor::Technician));
        assert!(!stopped.is_running());
    }

    #[test]
    fn test_duration_is_floored() {
        for seconds in [0, 59, 60, 61, 119, 3599, 3600, 5 * 3600 + 42] {
            let stopped = idle()
                .start(TimerActor::Admin, t0())
                .stop(t0() + Duration::seconds(seconds))
                .unwrap();
            assert_eq!(stopped.duration_minutes, Some((seconds / 60) as i32));
        }
    }

    #[test]
    fn test_restart_clears_previous_run() {
        let stopped = idle()
            .start(TimerActor::Admin, t0())
            .stop(t0() + Duration::minutes(10))
            .unwrap();
        let restarted = stopped.start(TimerActor::Technician, t0() + Duration::hours(1));
        assert!(restarted.is_running());
        assert_eq!(restarted.ended_at, None);
        assert_eq!(restarted.duration_minutes, None);
    }

    #[test]
    fn test_status_reports_live_elapsed_time() {
        let running = idle().start(TimerActor::Admin, t0());
        let status = running.status(9, t0() + Duration::seconds(12 * 60 + 30));
        assert!(status.is_running);
        assert_eq!(status.elapsed_minutes, Some(12));
        assert_eq!(status.duration_minutes, None);

        let stopped = running.stop(t0() + Duration::minutes(20)).unwrap();
        let status = stopped.status(9, t0() + Duration::hours(3));
        assert!(!status.is_running);
        assert_eq!(status.elapsed_minutes, Some(20));
        assert_eq!(status.duration_minutes, Some(20));

        assert_eq!(idle().status(9, t0()).elapsed_minutes, None);
    }

    #[test]
    fn test_start_replayed_over_stored_row_is_identical() {
        use crate::commands::utils::to_db_precision;

        let now = to_db_precision(t0() + Duration::nanoseconds(123_456_789));
        let first = idle().start(TimerActor::Admin, now);

        // what a later request reads back from TIMESTAMPTZ
        let stored = InstallationTimer {
            started_at: first.started_at.map(to_db_precision),
            ..first.clone()
        };
        let replay = stored.start(TimerActor::Technician, now);
        assert_eq!(replay.status(3, now), first.status(3, now));
    }

    #[test]
    fn test_clock_skew_never_yields_negative_duration() {
        assert_eq!(elapsed_minutes(t0(), t0() - Duration::minutes(4)), 0);
    }
}
