/*!
Orderable-integer packing used by manifest column statistics.

Converts a column value into a signed 64-bit integer that preserves the
original value's ordering, so min/max bounds can be compared without
carrying the original type around. Returns `None` for anything that cannot
be packed this way, which callers treat as "unpruneable".
*/

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

const MIN_SIGNED_64BIT: i128 = i64::MIN as i128;
const MAX_SIGNED_64BIT: i128 = i64::MAX as i128;

fn clamp(value: i128) -> i64 {
    value.clamp(MIN_SIGNED_64BIT, MAX_SIGNED_64BIT) as i64
}

/// Value types that [`to_int`] knows how to pack.
pub enum Orderable<'a> {
    Int(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Decimal(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

/// Packs `value` into an orderable signed 64-bit integer, or `None` if the
/// value's type cannot be packed this way.
pub fn to_int(value: &Orderable) -> Option<i64> {
    match value {
        Orderable::Int(v) => Some(clamp(*v as i128)),
        Orderable::Float(v) => Some(clamp(round_half_to_even(*v) as i128)),
        Orderable::DateTime(v) => Some(clamp(v.timestamp() as i128)),
        Orderable::Date(v) => {
            let midnight = v.and_hms_opt(0, 0, 0)?;
            Some(clamp(midnight.and_utc().timestamp() as i128))
        }
        Orderable::Time(v) => {
            let seconds = v.num_seconds_from_midnight() as i128;
            Some(clamp(seconds))
        }
        Orderable::Decimal(v) => Some(clamp(round_half_to_even(*v) as i128)),
        Orderable::Str(v) => Some(pack_bytes(v.as_bytes())),
        Orderable::Bytes(v) => Some(pack_bytes(v)),
    }
}

/// Rounds half-to-even (banker's rounding), matching the reference
/// implementation's use of Python's `round()`.
fn round_half_to_even(value: f64) -> f64 {
    let floor = value.floor();
    let diff = value - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// Right-pads or truncates to 8 bytes with NUL and reinterprets as a
/// big-endian signed 64-bit integer.
fn pack_bytes(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let take = bytes.len().min(8);
    buf[..take].copy_from_slice(&bytes[..take]);
    i64::from_be_bytes(buf)
}

trait NumSecondsFromMidnight {
    fn num_seconds_from_midnight(&self) -> u32;
}

impl NumSecondsFromMidnight for NaiveTime {
    fn num_seconds_from_midnight(&self) -> u32 {
        use chrono::Timelike;
        self.hour() * 3600 + self.minute() * 60 + self.second()
    }
}
