//! Calendar windows for filtering the catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::AgendaError;

/// Time window relative to "today" in the local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateWindow {
    /// Monday through Sunday of the current week.
    Week,
    /// First through last day of the current month.
    Month,
    #[default]
    All,
}

impl DateWindow {
    /// Inclusive date bounds for this window, or `None` when unbounded.
    pub fn bounds(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            DateWindow::Week => {
                let offset = i64::from(today.weekday().num_days_from_monday());
                let monday = today - Duration::days(offset);
                Some((monday, monday + Duration::days(6)))
            }
            DateWindow::Month => {
                let first = today.with_day(1)?;
                let next_month = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                Some((first, next_month - Duration::days(1)))
            }
            DateWindow::All => None,
        }
    }

    /// Whether an event dated `date` falls inside the window.
    /// Undated events only belong to `All`.
    pub fn contains(self, date: Option<NaiveDate>, today: NaiveDate) -> bool {
        match self.bounds(today) {
            None => true,
            Some((from, to)) => date.is_some_and(|d| d >= from && d <= to),
        }
    }
}

impl FromStr for DateWindow {
    type Err = AgendaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(DateWindow::Week),
            "month" => Ok(DateWindow::Month),
            "all" => Ok(DateWindow::All),
            other => Err(AgendaError::Validation(format!(
                "Unknown range '{}'. Expected week, month or all",
                other
            ))),
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DateWindow::Week => "week",
            DateWindow::Month => "month",
            DateWindow::All => "all",
        };
        f.write_str(name)
    }
}
