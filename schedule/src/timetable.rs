use crate::client::{ClientError, ScheduleSource};
use crate::types::{LessonPeriod, TimetableDay};
use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::str::FromStr;

/// Widest range requested from the upstream, in days.
pub const MAX_RANGE_DAYS: u32 = 30;

/// Default length of a range when the user has not chosen one.
const DEFAULT_RANGE_DAYS: u64 = 7;

pub const EMPTY_TIMETABLE_MESSAGE: &str = "No lessons in the selected range";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("range end {end} is before start {start}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

/// Inclusive date range. Persisted as a `[start, end]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "(NaiveDate, NaiveDate)",
    into = "(NaiveDate, NaiveDate)"
)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if end < start {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// Starts today when called before noon, tomorrow otherwise, and spans a week.
    pub fn smart_default(now: NaiveDateTime) -> Self {
        let today = now.date();
        let start = if now.hour() < 12 {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        };
        let end = start
            .checked_add_days(Days::new(DEFAULT_RANGE_DAYS))
            .unwrap_or(start);
        DateRange { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// A range of the same length that starts on `start`.
    pub fn starting_at(self, start: NaiveDate) -> Self {
        let end = start
            .checked_add_days(Days::new(self.days().unsigned_abs()))
            .unwrap_or(start);
        DateRange { start, end }
    }

    /// A range of the same length that ends on `end`.
    pub fn ending_at(self, end: NaiveDate) -> Self {
        let start = end
            .checked_sub_days(Days::new(self.days().unsigned_abs()))
            .unwrap_or(end);
        DateRange { start, end }
    }

    /// Caps the range at `max_days` past its start. The flag is set when the
    /// range was shortened.
    pub fn clamp(self, max_days: u32) -> (DateRange, bool) {
        if self.days() <= i64::from(max_days) {
            return (self, false);
        }
        match self.start.checked_add_days(Days::new(u64::from(max_days))) {
            Some(end) => (DateRange { start: self.start, end }, true),
            None => (self, false),
        }
    }
}

impl TryFrom<(NaiveDate, NaiveDate)> for DateRange {
    type Error = RangeError;

    fn try_from((start, end): (NaiveDate, NaiveDate)) -> Result<Self, Self::Error> {
        DateRange::new(start, end)
    }
}

impl From<DateRange> for (NaiveDate, NaiveDate) {
    fn from(range: DateRange) -> Self {
        (range.start, range.end)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(ViewMode::List),
            "grid" => Ok(ViewMode::Grid),
            other => Err(format!("unknown view mode '{other}', expected list or grid")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimetableRequest {
    pub generation: u64,
    pub tenant_id: String,
    pub student_id: u32,
    pub range: DateRange,
    /// The requested range was wider than allowed and has been shortened.
    pub clamped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimetableApplied {
    Loaded { days: usize },
    Failed { message: String },
    Discarded,
}

/// Holds the timetable currently on display. A newer request supersedes any
/// request still in flight; the older result is dropped when it arrives.
pub struct TimetableLoader {
    max_days: u32,
    generation: u64,
    pending: Option<TimetableRequest>,
    days: Vec<TimetableDay>,
}

impl TimetableLoader {
    pub fn new(max_days: u32) -> Self {
        TimetableLoader {
            max_days,
            generation: 0,
            pending: None,
            days: Vec::new(),
        }
    }

    pub fn request(&mut self, tenant_id: &str, student_id: u32, range: DateRange) -> TimetableRequest {
        let (range, clamped) = range.clamp(self.max_days);
        if clamped {
            tracing::info!(
                start = %range.start(),
                end = %range.end(),
                max_days = self.max_days,
                "Date range shortened"
            );
        }

        // The previous timetable belongs to another student or range
        self.days.clear();
        self.generation += 1;
        let request = TimetableRequest {
            generation: self.generation,
            tenant_id: tenant_id.to_string(),
            student_id,
            range,
            clamped,
        };
        self.pending = Some(request.clone());
        request
    }

    pub fn apply(
        &mut self,
        request: &TimetableRequest,
        result: Result<Vec<TimetableDay>, ClientError>,
    ) -> TimetableApplied {
        if self.pending.as_ref() != Some(request) {
            tracing::debug!(generation = request.generation, "Discarded stale timetable");
            return TimetableApplied::Discarded;
        }
        self.pending = None;

        match result {
            Ok(days) => {
                self.days = days;
                TimetableApplied::Loaded {
                    days: self.days.len(),
                }
            }
            Err(e) => {
                tracing::warn!(student = request.student_id, error = %e, "Could not load timetable");
                TimetableApplied::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn days(&self) -> &[TimetableDay] {
        &self.days
    }
}

pub async fn fetch_timetable(
    source: &dyn ScheduleSource,
    request: &TimetableRequest,
) -> Result<Vec<TimetableDay>, ClientError> {
    source
        .get_timetable(
            &request.tenant_id,
            request.student_id,
            request.range.start(),
            request.range.end(),
        )
        .await
}

/// Sorted union of slot numbers across all days; the grid's columns.
fn slot_union<'a>(days: impl IntoIterator<Item = &'a TimetableDay>) -> Vec<u32> {
    days.into_iter()
        .flat_map(|day| day.lessons.iter().map(|slot| slot.number))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn render(days: &[TimetableDay], view: ViewMode) -> String {
    match view {
        ViewMode::List => render_list(days),
        ViewMode::Grid => render_grid(days),
    }
}

fn chronological(days: &[TimetableDay]) -> Vec<&TimetableDay> {
    let mut days: Vec<&TimetableDay> = days.iter().filter(|d| !d.lessons.is_empty()).collect();
    days.sort_by(|a, b| a.date.cmp(&b.date));
    days
}

fn describe(period: &LessonPeriod) -> String {
    let teacher = period
        .teachers_name_full
        .as_deref()
        .unwrap_or(&period.teachers_name);
    format!(
        "{}-{} {} ({}) {} {}",
        period.time_start,
        period.time_end,
        period.discipline_full_name,
        period.type_str,
        period.classroom,
        teacher
    )
}

pub fn render_list(days: &[TimetableDay]) -> String {
    let days = chronological(days);
    if days.is_empty() {
        return format!("{EMPTY_TIMETABLE_MESSAGE}\n");
    }

    let mut out = String::new();
    for day in days {
        let _ = writeln!(out, "{}", day.date);

        let mut slots: Vec<_> = day.lessons.iter().collect();
        slots.sort_by_key(|slot| slot.number);
        for slot in slots {
            for (i, period) in slot.periods.iter().enumerate() {
                let label = match i {
                    0 => format!("{}.", slot.number),
                    _ => String::new(),
                };
                let _ = writeln!(out, "  {label:<3} {}", describe(period));
                if let Some(notice) = period.notice.as_deref().filter(|n| !n.is_empty()) {
                    let _ = writeln!(out, "      {notice}");
                }
            }
        }
    }
    out
}

pub fn render_grid(days: &[TimetableDay]) -> String {
    let days = chronological(days);
    if days.is_empty() {
        return format!("{EMPTY_TIMETABLE_MESSAGE}\n");
    }

    let columns = slot_union(days.iter().copied());

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(days.len() + 1);
    rows.push(
        std::iter::once("date".to_string())
            .chain(columns.iter().map(|n| n.to_string()))
            .collect(),
    );
    for day in &days {
        let mut row = vec![day.date.clone()];
        for number in &columns {
            let cell = day
                .lessons
                .iter()
                .filter(|slot| slot.number == *number)
                .flat_map(|slot| &slot.periods)
                .map(|period| period.discipline_short_name.as_str())
                .collect::<Vec<_>>()
                .join(" / ");
            row.push(if cell.is_empty() { "-".into() } else { cell });
        }
        rows.push(row);
    }

    let widths: Vec<usize> = (0..=columns.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}
