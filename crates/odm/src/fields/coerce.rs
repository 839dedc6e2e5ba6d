//! Raw value to field value coercion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use crate::error::ValidationError;
use crate::types::Value;
use crate::types::params::parse_bool_str;

use super::{Field, FieldKind};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

pub(super) fn coerce(field: &Field, raw: Value) -> Result<Value, ValidationError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let invalid = |raw: &Value| ValidationError::InvalidValue {
        field: field.name().to_string(),
        kind: field.kind().name(),
        value: raw.to_string(),
    };

    match field.kind() {
        FieldKind::Id
        | FieldKind::String
        | FieldKind::Text
        | FieldKind::Unicode
        | FieldKind::UnicodeText
        | FieldKind::Binary => match raw {
            Value::Str(_) => Ok(raw),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(Value::Str(raw.to_string())),
            other => Err(invalid(&other)),
        },
        FieldKind::Integer | FieldKind::SmallInteger | FieldKind::BigInteger => match raw {
            Value::Int(_) => Ok(raw),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Float | FieldKind::Decimal => match raw {
            Value::Float(_) => Ok(raw),
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Boolean => match raw {
            Value::Bool(_) => Ok(raw),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(s) => parse_bool_str(&s)
                .map(Value::Bool)
                .ok_or_else(|| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Interval => match raw {
            Value::Interval(_) => Ok(raw),
            Value::Int(n) => TimeDelta::try_seconds(n)
                .map(Value::Interval)
                .ok_or_else(|| invalid(&Value::Int(n))),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(TimeDelta::try_seconds)
                .map(Value::Interval)
                .ok_or_else(|| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Dict => match raw {
            Value::Dict(_) => Ok(raw),
            other => Err(invalid(&other)),
        },
        FieldKind::DateTime => match raw {
            Value::DateTime(_) => Ok(raw),
            Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN).and_utc())),
            Value::Str(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Str(s) => parse_datetime(&s)
                .map(Value::DateTime)
                .ok_or_else(|| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Date => match raw {
            Value::Date(_) => Ok(raw),
            Value::DateTime(dt) => Ok(Value::Date(dt.date_naive())),
            Value::Str(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Str(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(&s).map(|dt| dt.date_naive()))
                .map(Value::Date)
                .ok_or_else(|| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        FieldKind::Time => match raw {
            Value::Time(_) => Ok(raw),
            Value::DateTime(dt) => Ok(Value::Time(dt.time())),
            Value::Str(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::Str(s) => parse_time(&s)
                .map(Value::Time)
                .ok_or_else(|| invalid(&Value::Str(s))),
            other => Err(invalid(&other)),
        },
        // Reference values never pass through scalar coercion.
        FieldKind::Reference(_) => Err(invalid(&raw)),
    }
}

/// Parses RFC 3339 timestamps, naive timestamps (read as UTC) and bare dates.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    for format in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(trimmed, format) {
            return Some(t);
        }
    }
    parse_datetime(trimmed).map(|dt| dt.time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_datetime_parses_strings() {
        let field = Field::datetime("created");
        let value = field.coerce(Value::from("2015-06-01T10:20:30Z")).unwrap();
        match value {
            Value::DateTime(dt) => {
                assert_eq!(dt.year(), 2015);
                assert_eq!(dt.hour(), 10);
            }
            other => panic!("unexpected value {:?}", other),
        }
        assert!(matches!(
            field.coerce(Value::from("2015-06-01 10:20:30")).unwrap(),
            Value::DateTime(_)
        ));
    }

    #[test]
    fn test_datetime_rejects_garbage() {
        let field = Field::datetime("created");
        let err = field.coerce(Value::from("not a date")).unwrap_err();
        assert!(err.to_string().contains("could not parse datetime"));
    }

    #[test]
    fn test_empty_datetime_and_time_are_null() {
        assert_eq!(Field::datetime("d").coerce(Value::from("")).unwrap(), Value::Null);
        assert_eq!(Field::time("t").coerce(Value::from("")).unwrap(), Value::Null);
    }

    #[test]
    fn test_time_from_datetime_string() {
        let value = Field::time("t")
            .coerce(Value::from("2015-06-01T08:09:10Z"))
            .unwrap();
        assert_eq!(value, Value::Time(NaiveTime::from_hms_opt(8, 9, 10).unwrap()));
        assert!(Field::time("t").coerce(Value::from("later")).is_err());
    }

    #[test]
    fn test_interval_from_seconds() {
        let value = Field::interval("ttl").coerce(Value::Int(3600)).unwrap();
        assert_eq!(value, Value::Interval(TimeDelta::try_hours(1).unwrap()));
    }

    #[test]
    fn test_integer_from_string() {
        let field = Field::integer("price");
        assert_eq!(field.coerce(Value::from("42")).unwrap(), Value::Int(42));
        assert!(field.coerce(Value::from("forty")).is_err());
    }

    #[test]
    fn test_boolean_spellings() {
        let field = Field::boolean("active");
        assert_eq!(field.coerce(Value::from("yes")).unwrap(), Value::Bool(true));
        assert_eq!(field.coerce(Value::Int(0)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(Field::integer("n").coerce(Value::Null).unwrap(), Value::Null);
    }
}
