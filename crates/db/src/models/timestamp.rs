use bson::{Bson, Document};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Every shape a `created_at` value is known to arrive in.
///
/// Resolved once when a record crosses the backend boundary; code past that
/// point only sees `DateTime<Utc>`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Absent,
    Native(DateTime<Utc>),
    /// Backend-native datetime that knows how to convert itself.
    Convertible(bson::DateTime),
    IsoString(String),
    EpochSeconds { seconds: i64, nanoseconds: u32 },
    Unrecognized,
}

impl RawTimestamp {
    pub fn from_bson(value: Option<&Bson>) -> Self {
        match value {
            None | Some(Bson::Null) | Some(Bson::Undefined) => Self::Absent,
            Some(Bson::DateTime(dt)) => Self::Convertible(*dt),
            Some(Bson::Timestamp(ts)) => {
                Self::Convertible(bson::DateTime::from_millis(i64::from(ts.time) * 1000))
            }
            Some(Bson::String(s)) if s.is_empty() => Self::Absent,
            Some(Bson::String(s)) => Self::IsoString(s.clone()),
            Some(Bson::Document(doc)) => epoch_seconds(doc).unwrap_or(Self::Unrecognized),
            Some(_) => Self::Unrecognized,
        }
    }

    /// Resolves to a concrete instant. Absent and unrecognized values resolve
    /// to `now`; `None` means the value names a date that cannot exist
    /// (unparsable string, epoch out of range).
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Absent | Self::Unrecognized => Some(now),
            Self::Native(dt) => Some(*dt),
            Self::Convertible(dt) => Some(dt.to_chrono()),
            Self::IsoString(s) => parse_date_string(s),
            Self::EpochSeconds {
                seconds,
                nanoseconds,
            } => seconds
                .checked_mul(1000)
                .and_then(|ms| ms.checked_add(i64::from(*nanoseconds / 1_000_000)))
                .and_then(DateTime::from_timestamp_millis),
        }
    }

    /// Like [`resolve`](Self::resolve), degrading invalid dates to `now`.
    pub fn normalize(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.resolve(now).unwrap_or(now)
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Native(dt)
    }
}

impl From<&str> for RawTimestamp {
    fn from(s: &str) -> Self {
        Self::from_bson(Some(&Bson::String(s.to_string())))
    }
}

fn epoch_seconds(doc: &Document) -> Option<RawTimestamp> {
    let seconds = doc.get("seconds").or_else(|| doc.get("_seconds"))?;
    let nanos = doc
        .get("nanoseconds")
        .or_else(|| doc.get("_nanoseconds"))
        .and_then(as_f64)
        .unwrap_or(0.0);

    let seconds = as_f64(seconds)?;
    if !seconds.is_finite() || !nanos.is_finite() {
        return None;
    }

    // Carry the fraction into whole seconds so the nanosecond part lands in
    // [0, 1e9) for negative and oversized values alike.
    let frac_nanos = ((seconds - seconds.trunc()) * 1e9).round() + nanos;
    let carry = (frac_nanos / 1e9).floor();
    let whole = seconds.trunc() + carry;
    let frac_nanos = frac_nanos - carry * 1e9;
    if whole.abs() > i64::MAX as f64 || !(0.0..1e9).contains(&frac_nanos) {
        return None;
    }

    Some(RawTimestamp::EpochSeconds {
        seconds: whole as i64,
        nanoseconds: frac_nanos as u32,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset-less date-times are read as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
