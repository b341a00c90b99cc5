//! Collection window arithmetic.
//!
//! A window is anchored on local midnight of the collection day (put-out) or
//! of the following calendar day (bring-in), then widened by the lead and lag
//! offsets. Offsets are applied to wall-clock time and only the resulting
//! wall-clock bounds are resolved in the time zone, so a daylight-saving
//! change inside the window does not shift its edges.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};

use crate::models::TaskType;

/// Largest DST gap we step over when resolving a wall-clock time.
const MAX_GAP_STEPS: u32 = 4;
const GAP_STEP_MINUTES: i64 = 30;

/// Inclusive `[start, end]` interval during which a task is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInterval<Tz: TimeZone> {
    /// First instant of the window.
    pub start: DateTime<Tz>,
    /// Last instant of the window.
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> WindowInterval<Tz> {
    /// Whether `now` falls inside the closed interval.
    pub fn contains<Other: TimeZone>(&self, now: &DateTime<Other>) -> bool {
        self.start <= *now && *now <= self.end
    }
}

/// Wall-clock anchor for a task: midnight of the collection day, or of the
/// next calendar day for bring-in.
#[must_use]
pub fn anchor(date: NaiveDate, task_type: TaskType) -> NaiveDateTime {
    let day = match task_type {
        TaskType::PutOut => date,
        TaskType::BringIn => date.checked_add_days(Days::new(1)).unwrap_or(date),
    };
    day.and_time(NaiveTime::MIN)
}

/// Compute the window for a task in zone `tz`.
///
/// Returns `None` when an offset is not a finite number or pushes the bound
/// outside the representable range.
pub fn window_interval<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    task_type: TaskType,
    pre_hours: f64,
    post_hours: f64,
) -> Option<WindowInterval<Tz>> {
    let anchor = anchor(date, task_type);
    let start = anchor.checked_sub_signed(hours_delta(pre_hours)?)?;
    let end = anchor.checked_add_signed(hours_delta(post_hours)?)?;
    Some(WindowInterval {
        start: resolve_local(tz, start),
        end: resolve_local(tz, end),
    })
}

/// Whether the task is due at `now`.
///
/// A degenerate offset is an invariant violation upstream: it trips a debug
/// assertion and yields an inactive window in release builds.
pub fn is_active<Tz: TimeZone>(
    date: NaiveDate,
    task_type: TaskType,
    pre_hours: f64,
    post_hours: f64,
    now: &DateTime<Tz>,
) -> bool {
    debug_assert!(
        pre_hours.is_finite() && post_hours.is_finite(),
        "degenerate window for {date} ({pre_hours}h/{post_hours}h)"
    );
    window_interval(&now.timezone(), date, task_type, pre_hours, post_hours)
        .is_some_and(|window| window.contains(now))
}

/// Resolve a wall-clock time in `tz`.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times inside
/// a gap (clocks going forward) move to the first valid wall-clock time after
/// the gap.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = naive;
    for _ in 0..=MAX_GAP_STEPS {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => {
                candidate += TimeDelta::minutes(GAP_STEP_MINUTES);
            }
        }
    }
    tz.from_utc_datetime(&naive)
}

/// Convert fractional hours into a millisecond-precise delta.
fn hours_delta(hours: f64) -> Option<TimeDelta> {
    if !hours.is_finite() {
        return None;
    }
    // Saturating cast; out-of-range deltas are rejected by `try_milliseconds`.
    #[allow(clippy::cast_possible_truncation)]
    let millis = (hours * 3_600_000.0).round() as i64;
    TimeDelta::try_milliseconds(millis)
}
