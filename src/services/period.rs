//! Qualifying periods
//!
//! Day and week boundaries are computed in one fixed UTC offset, once per
//! check, and handed to predicates explicitly.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc, Weekday,
};

use crate::db::schemas::Cadence;

/// Parse "+08:00", "-0530", "Z" or "UTC"
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let invalid = || format!("invalid UTC offset: {}", raw);

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Configured period rules
#[derive(Debug, Clone, Copy)]
pub struct PeriodClock {
    offset: FixedOffset,
    week_start: Weekday,
}

impl PeriodClock {
    pub fn new(offset: FixedOffset, week_start: Weekday) -> Self {
        Self { offset, week_start }
    }

    /// Boundaries for the instant `now`
    pub fn context(&self, now: DateTime<Utc>) -> PeriodContext {
        let local_day = now.with_timezone(&self.offset).date_naive();

        let days_back = (7 + local_day.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        let local_week = local_day - Days::new(u64::from(days_back));

        PeriodContext {
            now,
            day_start: self.local_midnight(local_day),
            week_start: self.local_midnight(local_week),
            local_day,
            local_week,
        }
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN)
            - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(naive, Utc)
    }
}

impl Default for PeriodClock {
    fn default() -> Self {
        Self::new(Utc.fix(), Weekday::Sun)
    }
}

/// Period boundaries for one check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodContext {
    pub now: DateTime<Utc>,
    pub day_start: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
    local_day: NaiveDate,
    local_week: NaiveDate,
}

impl PeriodContext {
    /// Ledger period key for a cadence
    pub fn key(&self, cadence: Cadence) -> String {
        match cadence {
            Cadence::OneTime => "once".to_string(),
            Cadence::Daily => format!("day:{}", self.local_day.format("%Y-%m-%d")),
            Cadence::Weekly => format!("week:{}", self.local_week.format("%Y-%m-%d")),
        }
    }

    /// Week start as the bots write it into counter keys
    pub fn week_start_label(&self) -> String {
        format!("{} 00:00:00", self.local_week.format("%Y-%m-%d"))
    }

    /// Inclusive day boundary check
    pub fn within_day(&self, at: DateTime<Utc>) -> bool {
        at >= self.day_start
    }
}
