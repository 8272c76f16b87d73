//! Per-event validation and normalization
//!
//! Pure function of the event plus a caller-supplied `now`. Rules are applied
//! in order and the first failing rule decides the rejection reason:
//!
//! 1. `duration_ms` outside `[0, 21_600_000]` -> `InvalidDuration`
//! 2. `event_time` later than `now + 15 min` -> `FutureEventTime`
//! 3. `defect_count` below the `-1` sentinel -> `InvalidDefectCount`
//!
//! Accepted events get `defect_count == -1` rewritten to `None` and their
//! timestamps truncated to storage precision (microseconds).

use super::types::{MachineEvent, RejectionReason, UNKNOWN_DEFECT_COUNT};
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Six hours in milliseconds
pub const MAX_DURATION_MS: i64 = 21_600_000;

/// How far ahead of `now` a machine clock may report
pub const FUTURE_TOLERANCE_SECS: i64 = 15 * 60;

/// Digits of sub-second precision kept by the stores
pub const STORAGE_SUBSEC_DIGITS: u16 = 6;

/// Truncate a timestamp to what a store can round-trip
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(STORAGE_SUBSEC_DIGITS)
}

/// Validate one event and return its normalized form
pub fn validate(mut event: MachineEvent, now: DateTime<Utc>) -> Result<MachineEvent, RejectionReason> {
    if event.duration_ms < 0 || event.duration_ms > MAX_DURATION_MS {
        return Err(RejectionReason::InvalidDuration);
    }

    if event.event_time > now + Duration::seconds(FUTURE_TOLERANCE_SECS) {
        return Err(RejectionReason::FutureEventTime);
    }

    match event.defect_count {
        Some(UNKNOWN_DEFECT_COUNT) => event.defect_count = None,
        Some(count) if count < 0 => return Err(RejectionReason::InvalidDefectCount),
        _ => {}
    }

    event.event_time = to_storage_precision(event.event_time);
    event.received_time = event.received_time.map(to_storage_precision);

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn make_event(duration_ms: i64, event_time: DateTime<Utc>, defect_count: Option<i64>) -> MachineEvent {
        MachineEvent {
            event_id: "E-1".to_string(),
            event_time,
            received_time: None,
            machine_id: "M-001".to_string(),
            duration_ms,
            defect_count,
            line_id: "L-01".to_string(),
            factory_id: "F-01".to_string(),
        }
    }

    #[test]
    fn test_duration_boundaries() {
        let t = now() - Duration::hours(1);

        assert!(validate(make_event(0, t, Some(1)), now()).is_ok());
        assert!(validate(make_event(MAX_DURATION_MS, t, Some(1)), now()).is_ok());
        assert_eq!(
            validate(make_event(-1, t, Some(1)), now()),
            Err(RejectionReason::InvalidDuration)
        );
        assert_eq!(
            validate(make_event(MAX_DURATION_MS + 1, t, Some(1)), now()),
            Err(RejectionReason::InvalidDuration)
        );
    }

    #[test]
    fn test_future_event_time_boundaries() {
        let ten_min = now() + Duration::minutes(10);
        let exactly = now() + Duration::minutes(15);
        let twenty_min = now() + Duration::minutes(20);

        assert!(validate(make_event(1000, ten_min, None), now()).is_ok());
        assert!(validate(make_event(1000, exactly, None), now()).is_ok());
        assert_eq!(
            validate(make_event(1000, twenty_min, None), now()),
            Err(RejectionReason::FutureEventTime)
        );
    }

    #[test]
    fn test_duration_checked_before_event_time() {
        let far_future = now() + Duration::hours(3);
        assert_eq!(
            validate(make_event(-5, far_future, None), now()),
            Err(RejectionReason::InvalidDuration)
        );
    }

    #[test]
    fn test_sentinel_defect_count_normalized() {
        let t = now() - Duration::hours(1);

        let normalized = validate(make_event(1000, t, Some(-1)), now()).unwrap();
        assert_eq!(normalized.defect_count, None);

        let zero = validate(make_event(1000, t, Some(0)), now()).unwrap();
        assert_eq!(zero.defect_count, Some(0));
    }

    #[test]
    fn test_defect_count_below_sentinel_rejected() {
        let t = now() - Duration::hours(1);
        assert_eq!(
            validate(make_event(1000, t, Some(-7)), now()),
            Err(RejectionReason::InvalidDefectCount)
        );
    }

    #[test]
    fn test_timestamps_truncated_to_micros() {
        let t = Utc.timestamp_opt(1_768_470_000, 123_456_789).unwrap();
        let mut event = make_event(1000, t, None);
        event.received_time = Some(t);

        let normalized = validate(event, now()).unwrap();
        assert_eq!(normalized.event_time.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(normalized.received_time.unwrap().timestamp_subsec_nanos(), 123_456_000);
    }
}
