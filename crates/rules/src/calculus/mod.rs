//! Attendance time calculus: the predicates rule conditions are built on.
//!
//! Punch arithmetic lives in free functions ([`punch`]); checks that need
//! the organization directory or a work calendar go through
//! [`AttendanceCalculus`], which holds those collaborators read-only.

mod calendar;
mod device;
mod directory;
mod geo;
pub mod punch;

use std::sync::Arc;

use attend_core::UserId;
use chrono::NaiveDate;

use crate::schema::{AttendanceOutcome, AttendancePolicy, AttendanceRecord, AttendanceStatus};

pub use calendar::{is_default_working_day, HolidayCalendar, WeekdayCalendar, WorkCalendar};
pub use device::is_device_bound;
pub use directory::{AttendanceDirectory, InMemoryDirectory};
pub use geo::{haversine_meters, nearest_within, GeoPoint, EARTH_RADIUS_METERS};

pub struct AttendanceCalculus {
    directory: Arc<dyn AttendanceDirectory>,
    calendar: Arc<dyn WorkCalendar>,
}

impl Default for AttendanceCalculus {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryDirectory::new()), Arc::new(WeekdayCalendar))
    }
}

impl AttendanceCalculus {
    pub fn new(directory: Arc<dyn AttendanceDirectory>, calendar: Arc<dyn WorkCalendar>) -> Self {
        Self { directory, calendar }
    }

    /// True when either coordinate is missing (check skipped), when the
    /// user has no authorized site on file, or when some site lies within
    /// `max_distance_meters`.
    pub fn validate_location(
        &self,
        user_id: UserId,
        latitude: Option<f64>,
        longitude: Option<f64>,
        max_distance_meters: f64,
    ) -> bool {
        let (Some(lat), Some(lon)) = (latitude, longitude) else {
            return true;
        };
        let sites = self.directory.authorized_sites(user_id);
        if sites.is_empty() {
            tracing::debug!(user_id, "no authorized site on file, location check skipped");
            return true;
        }
        nearest_within(GeoPoint::new(lat, lon), &sites, max_distance_meters).is_some()
    }

    pub fn validate_device(&self, user_id: UserId, device_id: Option<&str>) -> bool {
        is_device_bound(device_id, &self.directory.bound_devices(user_id))
    }

    pub fn is_working_day(&self, user_id: UserId, date: NaiveDate) -> bool {
        self.calendar.is_working_day(user_id, date)
    }

    pub fn is_late(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> bool {
        punch::is_late(record, policy)
    }

    pub fn is_early_leave(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> bool {
        punch::is_early_leave(record, policy)
    }

    pub fn attendance_status(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> AttendanceStatus {
        punch::attendance_status(record, policy)
    }

    pub fn work_hours(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> f64 {
        punch::work_hours(record, policy)
    }

    pub fn overtime_hours(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> f64 {
        punch::overtime_hours(record, policy)
    }

    pub fn classify(&self, record: &AttendanceRecord, policy: &AttendancePolicy) -> AttendanceOutcome {
        punch::classify(record, policy)
    }
}

#[cfg(test)]
mod tests;
