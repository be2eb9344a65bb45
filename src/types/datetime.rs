//! # CIM Datetime Values
//!
//! A CIM datetime is either a point in time or an interval, carried on the
//! wire and in MOF text as a fixed 25-character string:
//!
//! | Form | Layout | Example |
//! |------|--------|---------|
//! | Timestamp | `yyyymmddhhmmss.mmmmmmsutc` | `20250825133000.000000+000` |
//! | Interval | `ddddddddhhmmss.mmmmmm:000` | `00000012093000.000000:000` |
//!
//! `s` is the sign of the UTC offset and `utc` the offset in minutes; the
//! `:000` suffix marks the interval form. Wildcarded (`*`) fields are not
//! accepted; the serializer boundary only ever carries fully specified stamps.
//!
//! Inside a buffer slot the value is packed into 16 bytes (see
//! [`CimDateTime::to_bytes`]), so datetime scalars stay inline and datetime
//! arrays are a flat run of 16-byte elements in the heap.

use eyre::{bail, ensure, Result};
use std::cmp::Ordering;
use std::fmt;

const TEXT_LEN: usize = 25;

const KIND_TIMESTAMP: u8 = 0;
const KIND_INTERVAL: u8 = 1;

/// A fully specified CIM datetime: a timestamp with UTC offset, or an
/// interval of days/hours/minutes/seconds/microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CimDateTime {
    Timestamp {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
        /// UTC offset in minutes, -999..=999.
        utc_offset: i16,
    },
    Interval {
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    },
}

impl CimDateTime {
    /// Parses the fixed 25-character text form.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        ensure!(
            bytes.len() == TEXT_LEN,
            "datetime must be {} characters, got {}",
            TEXT_LEN,
            bytes.len()
        );
        ensure!(text.is_ascii(), "datetime must be ascii");
        ensure!(bytes[14] == b'.', "datetime missing '.' at position 14");
        ensure!(
            !bytes.contains(&b'*'),
            "wildcarded datetime fields are not supported"
        );

        let micros: u32 = digits(text, 15, 21)?;
        ensure!(micros < 1_000_000, "datetime microseconds out of range");

        match bytes[21] {
            b':' => {
                ensure!(
                    &text[22..25] == "000",
                    "interval datetime must end in ':000'"
                );
                let days: u32 = digits(text, 0, 8)?;
                let hours: u8 = digits(text, 8, 10)?;
                let minutes: u8 = digits(text, 10, 12)?;
                let seconds: u8 = digits(text, 12, 14)?;
                ensure!(
                    hours < 24 && minutes < 60 && seconds < 60,
                    "interval time fields out of range"
                );
                Ok(CimDateTime::Interval {
                    days,
                    hours,
                    minutes,
                    seconds,
                    micros,
                })
            }
            sign @ (b'+' | b'-') => {
                let year: u16 = digits(text, 0, 4)?;
                let month: u8 = digits(text, 4, 6)?;
                let day: u8 = digits(text, 6, 8)?;
                let hour: u8 = digits(text, 8, 10)?;
                let minute: u8 = digits(text, 10, 12)?;
                let second: u8 = digits(text, 12, 14)?;
                let offset: i16 = digits(text, 22, 25)?;
                ensure!(
                    (1..=12).contains(&month) && (1..=31).contains(&day),
                    "timestamp date fields out of range"
                );
                ensure!(
                    hour < 24 && minute < 60 && second < 60,
                    "timestamp time fields out of range"
                );
                Ok(CimDateTime::Timestamp {
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                    micros,
                    utc_offset: if sign == b'-' { -offset } else { offset },
                })
            }
            other => bail!(
                "datetime position 21 must be '+', '-' or ':', got '{}'",
                other as char
            ),
        }
    }

    /// Packs this value into the 16-byte slot payload form.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        match *self {
            CimDateTime::Timestamp {
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
                utc_offset,
            } => {
                out[0] = KIND_TIMESTAMP;
                out[1..3].copy_from_slice(&year.to_le_bytes());
                out[3] = month;
                out[4] = day;
                out[5] = hour;
                out[6] = minute;
                out[7] = second;
                out[8..12].copy_from_slice(&micros.to_le_bytes());
                out[12..14].copy_from_slice(&utc_offset.to_le_bytes());
            }
            CimDateTime::Interval {
                days,
                hours,
                minutes,
                seconds,
                micros,
            } => {
                out[0] = KIND_INTERVAL;
                out[1..5].copy_from_slice(&days.to_le_bytes());
                out[5] = hours;
                out[6] = minutes;
                out[7] = seconds;
                out[8..12].copy_from_slice(&micros.to_le_bytes());
            }
        }
        out
    }

    /// Unpacks the 16-byte slot payload form.
    pub fn from_bytes(bytes: &[u8; 16]) -> Result<Self> {
        match bytes[0] {
            KIND_TIMESTAMP => Ok(CimDateTime::Timestamp {
                year: u16::from_le_bytes([bytes[1], bytes[2]]),
                month: bytes[3],
                day: bytes[4],
                hour: bytes[5],
                minute: bytes[6],
                second: bytes[7],
                micros: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
                utc_offset: i16::from_le_bytes([bytes[12], bytes[13]]),
            }),
            KIND_INTERVAL => Ok(CimDateTime::Interval {
                days: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
                hours: bytes[5],
                minutes: bytes[6],
                seconds: bytes[7],
                micros: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            }),
            other => bail!("invalid packed datetime kind: {}", other),
        }
    }

    /// Returns true for the interval form.
    pub fn is_interval(&self) -> bool {
        matches!(self, CimDateTime::Interval { .. })
    }

    /// Microseconds on a common scale: since year 0 (offset-normalized) for
    /// timestamps, total duration for intervals. Month lengths are idealized
    /// at 30 days the way DSP0004 specifies for ordering.
    pub fn normalized_micros(&self) -> i128 {
        const MICROS_PER_MIN: i128 = 60 * 1_000_000;
        match *self {
            CimDateTime::Timestamp {
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
                utc_offset,
            } => {
                let days = year as i128 * 365 + (month as i128 - 1) * 30 + (day as i128 - 1);
                let mins = days * 24 * 60 + hour as i128 * 60 + minute as i128;
                (mins - utc_offset as i128) * MICROS_PER_MIN
                    + second as i128 * 1_000_000
                    + micros as i128
            }
            CimDateTime::Interval {
                days,
                hours,
                minutes,
                seconds,
                micros,
            } => {
                let mins = days as i128 * 24 * 60 + hours as i128 * 60 + minutes as i128;
                mins * MICROS_PER_MIN + seconds as i128 * 1_000_000 + micros as i128
            }
        }
    }
}

impl PartialOrd for CimDateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CimDateTime {
    fn cmp(&self, other: &Self) -> Ordering {
        // Timestamps order before intervals; within a kind the normalized
        // scale decides, with raw text as the tiebreak so Ord agrees with Eq.
        self.is_interval()
            .cmp(&other.is_interval())
            .then_with(|| self.normalized_micros().cmp(&other.normalized_micros()))
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl fmt::Display for CimDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CimDateTime::Timestamp {
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
                utc_offset,
            } => write!(
                f,
                "{:04}{:02}{:02}{:02}{:02}{:02}.{:06}{}{:03}",
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
                if utc_offset < 0 { '-' } else { '+' },
                utc_offset.unsigned_abs()
            ),
            CimDateTime::Interval {
                days,
                hours,
                minutes,
                seconds,
                micros,
            } => write!(
                f,
                "{:08}{:02}{:02}{:02}.{:06}:000",
                days, hours, minutes, seconds, micros
            ),
        }
    }
}

fn digits<T>(text: &str, start: usize, end: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let field = &text[start..end];
    ensure!(
        field.bytes().all(|b| b.is_ascii_digit()),
        "datetime field '{}' at position {} is not numeric",
        field,
        start
    );
    field
        .parse()
        .map_err(|e| eyre::eyre!("datetime field '{}' at position {}: {}", field, start, e))
}
