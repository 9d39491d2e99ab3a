use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use super::*;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn record(punch_in: Option<NaiveTime>, punch_out: Option<NaiveTime>) -> AttendanceRecord {
    AttendanceRecord::new(1, monday(), punch_in, punch_out)
}

fn office_policy() -> AttendancePolicy {
    AttendancePolicy::shift(t(9, 0), t(18, 0))
}

// ── Punch classification ────────────────────────────────────────────

#[test]
fn late_boundary_is_not_late() {
    let policy = office_policy().with_grace(5, 0);
    assert!(!punch::is_late(&record(Some(t(9, 5)), None), &policy));
    assert!(punch::is_late(&record(Some(NaiveTime::from_hms_opt(9, 5, 1).unwrap()), None), &policy));
    assert!(!punch::is_late(&record(None, Some(t(18, 0))), &policy));
}

#[test]
fn early_leave_boundary_is_not_early() {
    let policy = office_policy().with_grace(0, 10);
    assert!(!punch::is_early_leave(&record(None, Some(t(17, 50))), &policy));
    assert!(punch::is_early_leave(&record(None, Some(t(17, 49))), &policy));
    assert!(!punch::is_early_leave(&record(Some(t(9, 0)), None), &policy));
}

#[test]
fn status_classification() {
    let policy = office_policy();
    assert_eq!(punch::attendance_status(&record(None, None), &policy), AttendanceStatus::Absent);
    assert_eq!(
        punch::attendance_status(&record(Some(t(9, 30)), Some(t(17, 0))), &policy),
        AttendanceStatus::Abnormal
    );
    assert_eq!(
        punch::attendance_status(&record(Some(t(9, 30)), Some(t(18, 0))), &policy),
        AttendanceStatus::Late
    );
    assert_eq!(
        punch::attendance_status(&record(Some(t(9, 0)), Some(t(17, 0))), &policy),
        AttendanceStatus::EarlyLeave
    );
    assert_eq!(
        punch::attendance_status(&record(Some(t(8, 55)), Some(t(18, 5))), &policy),
        AttendanceStatus::Normal
    );
}

#[test]
fn single_punch_is_never_absent() {
    let policy = office_policy();
    assert_eq!(punch::attendance_status(&record(Some(t(9, 0)), None), &policy), AttendanceStatus::Normal);
    assert_eq!(punch::attendance_status(&record(None, Some(t(17, 0))), &policy), AttendanceStatus::EarlyLeave);
}

// ── Work hours and overtime ─────────────────────────────────────────

#[test]
fn work_hours_with_and_without_break() {
    let with_break = office_policy().with_break(t(12, 0), t(13, 0));
    let day = record(Some(t(9, 0)), Some(t(18, 0)));
    assert_eq!(punch::work_hours(&day, &with_break), 8.0);
    assert_eq!(punch::work_hours(&day, &office_policy()), 9.0);
}

#[test]
fn work_hours_cross_midnight() {
    let night = AttendancePolicy::shift(t(22, 0), t(6, 0));
    assert_eq!(punch::work_hours(&record(Some(t(22, 0)), Some(t(6, 0))), &night), 8.0);

    let with_day_break = night.clone().with_break(t(12, 0), t(13, 0));
    assert_eq!(punch::work_hours(&record(Some(t(22, 0)), Some(t(6, 0))), &with_day_break), 8.0);

    let with_night_break = night.with_break(t(2, 0), t(2, 30));
    assert_eq!(punch::work_hours(&record(Some(t(22, 0)), Some(t(6, 0))), &with_night_break), 7.5);
}

#[test]
fn break_spanning_midnight_is_subtracted() {
    let policy = AttendancePolicy::shift(t(20, 0), t(4, 0)).with_break(t(23, 30), t(0, 30));
    assert_eq!(punch::work_hours(&record(Some(t(20, 0)), Some(t(4, 0))), &policy), 7.0);
}

#[test]
fn partial_break_overlap() {
    let policy = office_policy().with_break(t(12, 0), t(13, 0));
    assert_eq!(punch::work_hours(&record(Some(t(12, 30)), Some(t(18, 0))), &policy), 5.0);
}

#[test]
fn work_hours_never_negative_and_zero_without_punch() {
    let policy = office_policy().with_break(t(12, 0), t(13, 0));
    assert_eq!(punch::work_hours(&record(Some(t(12, 10)), Some(t(12, 40))), &policy), 0.0);
    assert_eq!(punch::work_hours(&record(Some(t(9, 0)), None), &policy), 0.0);
}

#[test]
fn work_hours_round_to_two_decimals() {
    let policy = office_policy();
    // 9:00 -> 9:20 is 0.3333.. hours
    assert_eq!(punch::work_hours(&record(Some(t(9, 0)), Some(t(9, 20))), &policy), 0.33);
}

#[test]
fn overtime() {
    let policy = office_policy();
    assert_eq!(punch::overtime_hours(&record(Some(t(9, 0)), None), &policy), 0.0);
    assert_eq!(punch::overtime_hours(&record(Some(t(9, 0)), Some(t(18, 0))), &policy), 0.0);
    assert_eq!(punch::overtime_hours(&record(Some(t(9, 0)), Some(t(17, 0))), &policy), 0.0);
    assert_eq!(punch::overtime_hours(&record(Some(t(9, 0)), Some(t(19, 0))), &policy), 1.0);
    assert_eq!(punch::overtime_hours(&record(Some(t(9, 0)), Some(t(18, 45))), &policy), 0.75);
}

#[test]
fn classify_bundles_outcome() {
    let policy = office_policy().with_break(t(12, 0), t(13, 0));
    let outcome = punch::classify(&record(Some(t(9, 20)), Some(t(19, 0))), &policy);
    assert_eq!(outcome.status, AttendanceStatus::Late);
    assert_eq!(outcome.work_hours, 8.67);
    assert_eq!(outcome.overtime_hours, 1.0);
}

// ── Location, device and calendar ───────────────────────────────────

fn calculus_with_site() -> AttendanceCalculus {
    let directory = InMemoryDirectory::new();
    directory.add_site(1, GeoPoint::new(31.2304, 121.4737));
    directory.add_site(1, GeoPoint::new(39.9042, 116.4074));
    directory.bind_device(1, "DEV-1");
    AttendanceCalculus::new(Arc::new(directory), Arc::new(WeekdayCalendar))
}

#[test]
fn haversine_known_distance() {
    // One degree of latitude is about 111.2 km.
    let d = haversine_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
    assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    assert_eq!(haversine_meters(GeoPoint::new(10.0, 10.0), GeoPoint::new(10.0, 10.0)), 0.0);
}

#[test]
fn missing_coordinates_skip_location_check() {
    let calculus = calculus_with_site();
    assert!(calculus.validate_location(1, None, None, 100.0));
    assert!(calculus.validate_location(1, Some(0.0), None, 100.0));
    assert!(calculus.validate_location(1, None, Some(0.0), 100.0));
}

#[test]
fn location_within_any_site() {
    let calculus = calculus_with_site();
    // ~55 m north of the first site
    assert!(calculus.validate_location(1, Some(31.2309), Some(121.4737), 100.0));
    // second site
    assert!(calculus.validate_location(1, Some(39.9042), Some(116.4074), 100.0));
    // ~1.1 km away from both
    assert!(!calculus.validate_location(1, Some(31.2404), Some(121.4737), 100.0));
}

#[test]
fn device_must_be_bound() {
    let calculus = calculus_with_site();
    assert!(calculus.validate_device(1, Some("DEV-1")));
    assert!(!calculus.validate_device(1, Some("DEV-2")));
    assert!(!calculus.validate_device(1, Some("")));
    assert!(!calculus.validate_device(1, None));
    assert!(!calculus.validate_device(2, Some("DEV-1")));
}

#[test]
fn weekday_calendar() {
    let calculus = AttendanceCalculus::default();
    assert!(calculus.is_working_day(1, monday()));
    assert!(!calculus.is_working_day(1, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
    assert!(!calculus.is_working_day(1, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
}

#[test]
fn holiday_overrides() {
    let calendar = HolidayCalendar::new();
    let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    calendar.add_holiday(monday());
    calendar.add_workday(saturday);
    calendar.set_user_override(7, monday(), true);

    let calculus = AttendanceCalculus::new(Arc::new(InMemoryDirectory::new()), Arc::new(calendar));
    assert!(!calculus.is_working_day(1, monday()));
    assert!(calculus.is_working_day(7, monday()));
    assert!(calculus.is_working_day(1, saturday));
}
