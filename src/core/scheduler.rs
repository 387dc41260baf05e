//! Daily trigger.
//!
//! The scheduler computes the next wall-clock instant matching the
//! configured local time, naps until it arrives and fires the routine. A
//! failed (or panicking) fire is logged and the scheduler re-arms for the
//! following day.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Longest single sleep before the wall clock is re-read
pub const DEFAULT_MAX_NAP: Duration = Duration::from_secs(60);

/// Invalid schedule configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Hour must be 0-23, got {0}")]
    InvalidHour(u32),

    #[error("Minute must be 0-59, got {0}")]
    InvalidMinute(u32),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

/// Daily fire time in a named time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    hour: u32,
    minute: u32,
    time_zone: Tz,
}

impl Schedule {
    /// Build a schedule from an IANA zone name (e.g. "Europe/London")
    pub fn new(hour: u32, minute: u32, time_zone: &str) -> Result<Self, ScheduleError> {
        let tz: Tz = time_zone
            .parse()
            .map_err(|_| ScheduleError::UnknownTimeZone(time_zone.to_string()))?;
        Self::in_zone(hour, minute, tz)
    }

    pub fn in_zone(hour: u32, minute: u32, time_zone: Tz) -> Result<Self, ScheduleError> {
        if hour > 23 {
            return Err(ScheduleError::InvalidHour(hour));
        }
        if minute > 59 {
            return Err(ScheduleError::InvalidMinute(minute));
        }
        Ok(Self {
            hour,
            minute,
            time_zone,
        })
    }

    /// Parse "HH:MM" plus a zone name
    pub fn parse(at: &str, time_zone: &str) -> Result<Self, ScheduleError> {
        let (h, m) = at
            .trim()
            .split_once(':')
            .ok_or_else(|| ScheduleError::InvalidTime(at.to_string()))?;
        let hour = h
            .parse()
            .map_err(|_| ScheduleError::InvalidTime(at.to_string()))?;
        let minute = m
            .parse()
            .map_err(|_| ScheduleError::InvalidTime(at.to_string()))?;
        Self::new(hour, minute, time_zone)
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    fn time_of_day(&self) -> NaiveTime {
        // Fields are range-checked at construction
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }

    /// The instant this schedule fires on a given local date.
    ///
    /// When the local time falls in a DST gap, the first valid minute after
    /// the gap is used; when it occurs twice, the earlier one.
    fn instant_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_time(self.time_of_day());
        let local = match self.time_zone.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => (1..=24 * 60).find_map(|m| {
                self.time_zone
                    .from_local_datetime(&(naive + chrono::Duration::minutes(m)))
                    .earliest()
            }),
        };
        local.map(|t| t.with_timezone(&Utc))
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "daily at {:02}:{:02} {}",
            self.hour,
            self.minute,
            self.time_zone.name()
        )
    }
}

/// Earliest instant at or after `now` matching the schedule.
///
/// Today's local fire time is used unless it is strictly before `now`, in
/// which case tomorrow's is used. `now` exactly on the fire time fires now.
pub fn next_fire_instant(now: DateTime<Utc>, schedule: &Schedule) -> DateTime<Utc> {
    let today = now.with_timezone(&schedule.time_zone).date_naive();

    (0..=7u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|date| schedule.instant_on(date))
        .find(|instant| *instant >= now)
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

/// The next `count` fire instants from `now`
pub fn upcoming_fire_instants(
    now: DateTime<Utc>,
    schedule: &Schedule,
    count: usize,
) -> Vec<DateTime<Utc>> {
    let mut instants = Vec::with_capacity(count);
    let mut from = now;
    for _ in 0..count {
        let next = next_fire_instant(from, schedule);
        instants.push(next);
        from = next + chrono::Duration::seconds(1);
    }
    instants
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Background scheduler firing once per day
pub struct Scheduler<C: Clock = SystemClock> {
    schedule: Schedule,
    clock: C,
    max_nap: Duration,
    /// Wall-clock instant of the most recent fire
    last_fired: Option<DateTime<Utc>>,
}

impl Scheduler<SystemClock> {
    pub fn new(schedule: Schedule) -> Self {
        Self::with_clock(schedule, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(schedule: Schedule, clock: C) -> Self {
        Self {
            schedule,
            clock,
            max_nap: DEFAULT_MAX_NAP,
            last_fired: None,
        }
    }

    /// Override the nap length (bounds how late a missed wake-up is noticed)
    pub fn with_max_nap(mut self, max_nap: Duration) -> Self {
        self.max_nap = max_nap.max(Duration::from_millis(1));
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Next target, never the same instant as the previous fire.
    ///
    /// The first fire time after the previous fire is returned even when it
    /// already passed (a run overran it, or the host was suspended), so it
    /// fires late instead of being dropped. Fire times are counted from the
    /// moment of the previous fire, so at most one is ever deferred.
    pub fn next_target(&self) -> DateTime<Utc> {
        match self.last_fired {
            Some(last) => next_fire_instant(last + chrono::Duration::seconds(1), &self.schedule),
            None => next_fire_instant(self.clock.now(), &self.schedule),
        }
    }

    /// Nap until the wall clock reaches `target`; returns the wake time
    pub async fn wait_until(&self, target: DateTime<Utc>) -> DateTime<Utc> {
        loop {
            let now = self.clock.now();
            if now >= target {
                return now;
            }
            let remaining = (target - now).to_std().unwrap_or_default();
            tokio::time::sleep(remaining.min(self.max_nap)).await;
        }
    }

    /// Wait for the next target and fire once
    pub async fn fire_next<F, Fut>(&mut self, on_fire: &mut F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let target = self.next_target();
        info!(
            next_fire = %target.with_timezone(&self.schedule.time_zone),
            "Waiting for next routine fire"
        );

        let woke = self.wait_until(target).await;
        let late = (woke - target).to_std().unwrap_or_default();
        if late > self.max_nap * 2 {
            warn!(
                late_seconds = late.as_secs(),
                "Fire time passed during the previous run or a suspension, firing now"
            );
        }

        // Later fire times that also passed are not replayed
        self.last_fired = Some(woke.max(target));

        match AssertUnwindSafe(on_fire()).catch_unwind().await {
            Ok(Ok(())) => debug!("Routine fire completed"),
            Ok(Err(e)) => error!(error = %format!("{:#}", e), "Routine fire failed, re-arming"),
            Err(_) => error!("Routine fire panicked, re-arming"),
        }
    }

    /// Fire forever. Never returns; ends when the task is dropped.
    pub async fn run<F, Fut>(mut self, mut on_fire: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(schedule = %self.schedule, "Scheduler started");
        loop {
            self.fire_next(&mut on_fire).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_schedule_validation() {
        assert_eq!(
            Schedule::new(24, 0, "UTC").unwrap_err(),
            ScheduleError::InvalidHour(24)
        );
        assert_eq!(
            Schedule::new(7, 60, "UTC").unwrap_err(),
            ScheduleError::InvalidMinute(60)
        );
        assert!(matches!(
            Schedule::new(7, 0, "Mars/Olympus"),
            Err(ScheduleError::UnknownTimeZone(_))
        ));
    }

    #[test]
    fn test_schedule_parse() {
        let schedule = Schedule::parse("07:05", "Europe/London").unwrap();
        assert_eq!((schedule.hour(), schedule.minute()), (7, 5));
        assert_eq!(schedule.to_string(), "daily at 07:05 Europe/London");

        assert!(matches!(
            Schedule::parse("7am", "UTC"),
            Err(ScheduleError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_before_fire_time_fires_today() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let next = next_fire_instant(utc("2026-03-10T06:59:59Z"), &schedule);
        assert_eq!(next, utc("2026-03-10T07:00:00Z"));
    }

    #[test]
    fn test_exact_boundary_fires_today() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let now = utc("2026-03-10T07:00:00Z");
        assert_eq!(next_fire_instant(now, &schedule), now);
    }

    #[test]
    fn test_after_fire_time_fires_tomorrow() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let next = next_fire_instant(utc("2026-03-10T07:00:01Z"), &schedule);
        assert_eq!(next, utc("2026-03-11T07:00:00Z"));
    }

    #[test]
    fn test_upcoming_instants_are_daily() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let upcoming = upcoming_fire_instants(utc("2026-03-10T08:00:00Z"), &schedule, 3);
        assert_eq!(
            upcoming,
            vec![
                utc("2026-03-11T07:00:00Z"),
                utc("2026-03-12T07:00:00Z"),
                utc("2026-03-13T07:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_next_target_skips_last_fire() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let clock = Arc::new(FixedClock(utc("2026-03-10T07:00:00Z")));
        let mut scheduler = Scheduler::with_clock(schedule, clock);

        assert_eq!(scheduler.next_target(), utc("2026-03-10T07:00:00Z"));
        scheduler.last_fired = Some(utc("2026-03-10T07:00:00Z"));
        assert_eq!(scheduler.next_target(), utc("2026-03-11T07:00:00Z"));
    }

    #[test]
    fn test_next_target_keeps_fire_time_passed_during_run() {
        let schedule = Schedule::new(7, 0, "UTC").unwrap();
        let clock = Arc::new(FixedClock(utc("2026-03-11T08:00:00Z")));
        let mut scheduler = Scheduler::with_clock(schedule, clock);

        scheduler.last_fired = Some(utc("2026-03-10T07:00:00Z"));
        assert_eq!(scheduler.next_target(), utc("2026-03-11T07:00:00Z"));
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}
