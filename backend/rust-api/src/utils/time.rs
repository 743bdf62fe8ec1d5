use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Fixed civil offset from minutes east of UTC; `None` outside (-24h, +24h).
pub fn fixed_offset(offset_minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(offset_minutes.checked_mul(60)?)
}

/// Civil date at `now` in the given offset
pub fn civil_date(now: DateTime<Utc>, offset_minutes: i32) -> Option<NaiveDate> {
    Some(now.with_timezone(&fixed_offset(offset_minutes)?).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IST_OFFSET_MINUTES;

    #[test]
    fn test_chrono_to_bson_keeps_millis() {
        let now = Utc::now();
        assert_eq!(chrono_to_bson(now).timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_fixed_offset_bounds() {
        assert_eq!(
            fixed_offset(IST_OFFSET_MINUTES).map(|o| o.local_minus_utc()),
            Some(19_800)
        );
        assert!(fixed_offset(24 * 60).is_none());
        assert!(fixed_offset(i32::MAX).is_none());
    }

    #[test]
    fn test_civil_date_rolls_over_at_ist_midnight() {
        // 18:29 UTC is 23:59 IST, 18:30 UTC is midnight IST
        let late = DateTime::parse_from_rfc3339("2024-01-15T18:29:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let midnight = DateTime::parse_from_rfc3339("2024-01-15T18:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            civil_date(late, IST_OFFSET_MINUTES),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            civil_date(midnight, IST_OFFSET_MINUTES),
            NaiveDate::from_ymd_opt(2024, 1, 16)
        );
    }
}
