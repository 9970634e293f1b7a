use chrono::{DateTime, Datelike, Days, NaiveTime, TimeDelta, TimeZone, Weekday};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recurrence {
    EveryMinutes(u32),
    EveryHours(u32),
    DailyAt {
        hour: u32,
        minute: u32,
    },
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    EveryWeeks(u32),
    Never,
}

impl Recurrence {
    pub const fn minutely() -> Self {
        Self::EveryMinutes(1)
    }

    pub const fn every_minutes(minutes: u32) -> Self {
        assert!(minutes > 0, "interval must be at least one minute");
        Self::EveryMinutes(minutes)
    }

    pub const fn hourly() -> Self {
        Self::EveryHours(1)
    }

    pub const fn every_hours(hours: u32) -> Self {
        assert!(hours > 0, "interval must be at least one hour");
        Self::EveryHours(hours)
    }

    pub const fn daily() -> Self {
        Self::daily_at(8, 0)
    }

    pub const fn daily_at(hour: u32, minute: u32) -> Self {
        assert!(hour < 24 && minute < 60, "time of day out of range");
        Self::DailyAt { hour, minute }
    }

    pub const fn weekly() -> Self {
        Self::weekly_on(Weekday::Mon, 8, 0)
    }

    pub const fn weekly_on(weekday: Weekday, hour: u32, minute: u32) -> Self {
        assert!(hour < 24 && minute < 60, "time of day out of range");
        Self::WeeklyAt {
            weekday,
            hour,
            minute,
        }
    }

    pub const fn monthly() -> Self {
        Self::EveryWeeks(4)
    }

    pub const fn never() -> Self {
        Self::Never
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }

    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match *self {
            Self::EveryMinutes(minutes) => {
                Some(after.clone() + TimeDelta::minutes(i64::from(minutes.max(1))))
            }
            Self::EveryHours(hours) => {
                Some(after.clone() + TimeDelta::hours(i64::from(hours.max(1))))
            }
            Self::EveryWeeks(weeks) => {
                Some(after.clone() + TimeDelta::weeks(i64::from(weeks.max(1))))
            }
            Self::DailyAt { hour, minute } => next_wall_clock(after, hour, minute, |_| true),
            Self::WeeklyAt {
                weekday,
                hour,
                minute,
            } => next_wall_clock(after, hour, minute, |day| day == weekday),
            Self::Never => None,
        }
    }
}

fn next_wall_clock<Tz: TimeZone>(
    after: &DateTime<Tz>,
    hour: u32,
    minute: u32,
    day_matches: impl Fn(Weekday) -> bool,
) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let timezone = after.timezone();
    let today = after.date_naive();

    (0..=14u64).find_map(|offset| {
        let day = today.checked_add_days(Days::new(offset))?;
        if !day_matches(day.weekday()) {
            return None;
        }
        let candidate = timezone.from_local_datetime(&day.and_time(time)).earliest()?;
        (candidate > *after).then_some(candidate)
    })
}
