use std::time::Duration;

use chrono::{DateTime, Datelike, Months, NaiveTime, Utc};
use der::asn1::{GeneralizedTime, UtcTime};
use x509_cert::time::Time;

use crate::Result;

/// Current date at 00:00 UTC
pub fn today() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn add_years(date: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(years * 12))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// UTCTime through 2049, GeneralizedTime afterwards
pub fn to_time(date: DateTime<Utc>) -> Result<Time> {
    let unix = Duration::from_secs(date.timestamp().max(0) as u64);
    if date.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(unix)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(unix)?))
    }
}

pub fn from_time(time: &Time) -> DateTime<Utc> {
    let secs = time.to_unix_duration().as_secs();
    DateTime::from_timestamp(secs as i64, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn test_today_is_midnight() {
        let today = today();
        assert_eq!((today.hour(), today.minute(), today.second()), (0, 0, 0));
    }

    #[test]
    fn test_time_encoding_switch() {
        let early = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(matches!(to_time(early).unwrap(), Time::UtcTime(_)));

        let late = add_years(early, 30);
        assert!(matches!(to_time(late).unwrap(), Time::GeneralTime(_)));
        assert_eq!(from_time(&to_time(late).unwrap()), late);
    }
}
