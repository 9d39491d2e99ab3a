//! Working-day determination with holiday overrides.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use attend_core::UserId;
use chrono::{Datelike, NaiveDate, Weekday};

/// Monday to Friday.
pub fn is_default_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Work-schedule collaborator. Returning `None` defers to the weekday rule.
pub trait WorkCalendar: Send + Sync {
    fn working_day_override(&self, user_id: UserId, date: NaiveDate) -> Option<bool>;

    fn is_working_day(&self, user_id: UserId, date: NaiveDate) -> bool {
        self.working_day_override(user_id, date)
            .unwrap_or_else(|| is_default_working_day(date))
    }
}

/// Calendar with no overrides.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeekdayCalendar;

impl WorkCalendar for WeekdayCalendar {
    fn working_day_override(&self, _user_id: UserId, _date: NaiveDate) -> Option<bool> {
        None
    }
}

/// In-memory holiday calendar: company-wide holidays and make-up days,
/// plus per-user overrides which win over both.
#[derive(Debug, Default)]
pub struct HolidayCalendar {
    holidays: RwLock<HashSet<NaiveDate>>,
    workdays: RwLock<HashSet<NaiveDate>>,
    per_user: RwLock<HashMap<(UserId, NaiveDate), bool>>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_holiday(&self, date: NaiveDate) {
        self.workdays.write().expect("calendar lock poisoned").remove(&date);
        self.holidays.write().expect("calendar lock poisoned").insert(date);
    }

    /// Mark a weekend day as a working day.
    pub fn add_workday(&self, date: NaiveDate) {
        self.holidays.write().expect("calendar lock poisoned").remove(&date);
        self.workdays.write().expect("calendar lock poisoned").insert(date);
    }

    pub fn set_user_override(&self, user_id: UserId, date: NaiveDate, working: bool) {
        self.per_user
            .write()
            .expect("calendar lock poisoned")
            .insert((user_id, date), working);
    }
}

impl WorkCalendar for HolidayCalendar {
    fn working_day_override(&self, user_id: UserId, date: NaiveDate) -> Option<bool> {
        if let Some(working) = self
            .per_user
            .read()
            .expect("calendar lock poisoned")
            .get(&(user_id, date))
        {
            return Some(*working);
        }
        if self.holidays.read().expect("calendar lock poisoned").contains(&date) {
            return Some(false);
        }
        if self.workdays.read().expect("calendar lock poisoned").contains(&date) {
            return Some(true);
        }
        None
    }
}
