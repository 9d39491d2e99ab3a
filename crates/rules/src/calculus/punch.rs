//! Punch-time classification and hour arithmetic.
//!
//! Times are compared as seconds from midnight. Only the work-hour
//! duration wraps across midnight; late/early/overtime checks compare
//! wall-clock positions directly.

use chrono::{NaiveTime, Timelike};

use crate::schema::{AttendanceOutcome, AttendancePolicy, AttendanceRecord, AttendanceStatus};

const DAY_SECS: i64 = 86_400;

fn secs(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

fn minutes(m: u32) -> i64 {
    i64::from(m) * 60
}

/// Round half-up to two decimals.
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Punch-in strictly after `work_start + grace`. Missing punch-in is not late.
pub fn is_late(record: &AttendanceRecord, policy: &AttendancePolicy) -> bool {
    match record.punch_in {
        Some(punch_in) => secs(punch_in) > secs(policy.work_start) + minutes(policy.late_grace_minutes),
        None => false,
    }
}

/// Punch-out strictly before `work_end - grace`. Missing punch-out is not early.
pub fn is_early_leave(record: &AttendanceRecord, policy: &AttendancePolicy) -> bool {
    match record.punch_out {
        Some(punch_out) => {
            secs(punch_out) < secs(policy.work_end) - minutes(policy.early_leave_grace_minutes)
        }
        None => false,
    }
}

pub fn attendance_status(record: &AttendanceRecord, policy: &AttendancePolicy) -> AttendanceStatus {
    if record.punch_in.is_none() && record.punch_out.is_none() {
        return AttendanceStatus::Absent;
    }
    match (is_late(record, policy), is_early_leave(record, policy)) {
        (true, true) => AttendanceStatus::Abnormal,
        (true, false) => AttendanceStatus::Late,
        (false, true) => AttendanceStatus::EarlyLeave,
        (false, false) => AttendanceStatus::Normal,
    }
}

/// Hours between punches minus the break overlap, never negative.
///
/// A punch-out earlier than the punch-in is read as the next day. The break
/// is matched against the worked interval on the previous, same and next
/// day so that a night shift crossing a configured break is still reduced.
pub fn work_hours(record: &AttendanceRecord, policy: &AttendancePolicy) -> f64 {
    let (Some(punch_in), Some(punch_out)) = (record.punch_in, record.punch_out) else {
        return 0.0;
    };

    let start = secs(punch_in);
    let mut end = secs(punch_out);
    if end < start {
        end += DAY_SECS;
    }
    let mut worked = end - start;

    if let Some((break_start, break_end)) = policy.break_window() {
        let b_start = secs(break_start);
        let mut b_end = secs(break_end);
        if b_end < b_start {
            b_end += DAY_SECS;
        }
        for shift in [-DAY_SECS, 0, DAY_SECS] {
            let overlap = end.min(b_end + shift) - start.max(b_start + shift);
            if overlap > 0 {
                worked -= overlap;
            }
        }
    }

    round_hours(worked.max(0) as f64 / 3600.0)
}

/// Hours past `work_end`; zero without a punch-out or when leaving on time.
pub fn overtime_hours(record: &AttendanceRecord, policy: &AttendancePolicy) -> f64 {
    let Some(punch_out) = record.punch_out else {
        return 0.0;
    };
    let past_end = secs(punch_out) - secs(policy.work_end);
    if past_end <= 0 {
        return 0.0;
    }
    round_hours(past_end as f64 / 3600.0)
}

pub fn classify(record: &AttendanceRecord, policy: &AttendancePolicy) -> AttendanceOutcome {
    AttendanceOutcome {
        status: attendance_status(record, policy),
        work_hours: work_hours(record, policy),
        overtime_hours: overtime_hours(record, policy),
    }
}
