use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn hours_after(value: PrimitiveDateTime, hours: u64) -> PrimitiveDateTime {
    value + Duration::hours(i64::try_from(hours).unwrap_or(i64::MAX / 3600))
}

pub(crate) fn seconds_between(start: PrimitiveDateTime, end: PrimitiveDateTime) -> f64 {
    (end.assume_utc() - start.assume_utc()).as_seconds_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time};

    fn at(hour: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, 20, 30).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(at(10)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn hours_after_crosses_day_boundary() {
        let deadline = hours_after(at(10), 48);
        assert_eq!(format_primitive(deadline), "2025-01-04T10:20:30Z");
    }

    #[test]
    fn seconds_between_is_signed() {
        assert_eq!(seconds_between(at(10), at(11)), 3600.0);
        assert_eq!(seconds_between(at(11), at(10)), -3600.0);
    }
}
