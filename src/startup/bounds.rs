//! Numeric bounds for storage sizing and retention flags.
//!
//! Sizes use base-2 suffixes (`KB` = 1024 bytes, `KiB` accepted too) and
//! durations use the `1y2w3d4h5m6s7ms` grammar. All quantities are carried as
//! `i64` in base units: bytes for sizes, milliseconds for durations.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use super::flags::{self, FlagSet};
use super::mode::Mode;

pub const KIB: i64 = 1024;
pub const MIB: i64 = 1024 * KIB;
pub const GIB: i64 = 1024 * MIB;
pub const TIB: i64 = 1024 * GIB;

pub const MILLISECOND: i64 = 1;
pub const SECOND: i64 = 1000 * MILLISECOND;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const WEEK: i64 = 7 * DAY;
pub const YEAR: i64 = 365 * DAY;

/// Smallest WAL segment accepted by either storage engine.
pub const MIN_WAL_SEGMENT_SIZE: i64 = 10 * MIB;
/// Largest WAL segment accepted by either storage engine.
pub const MAX_WAL_SEGMENT_SIZE: i64 = 256 * MIB;
pub const MIN_BLOCK_CHUNK_SEGMENT_SIZE: i64 = MIB;
pub const MAX_BLOCK_CHUNK_SEGMENT_SIZE: i64 = 2 * GIB;
pub const MAX_RETENTION: i64 = 100 * YEAR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Bytes,
    Duration,
}

impl Unit {
    fn expected(self) -> &'static str {
        match self {
            Unit::Bytes => "a size such as 64MB or 1GiB",
            Unit::Duration => "a duration such as 15d or 1h30m",
        }
    }
}

/// Inclusive range a numeric flag must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundSpec {
    pub flag: &'static str,
    pub unit: Unit,
    pub min: i64,
    pub max: i64,
}

impl BoundSpec {
    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }
}

pub const BOUNDS: &[BoundSpec] = &[
    BoundSpec {
        flag: flags::TSDB_WAL_SEGMENT_SIZE,
        unit: Unit::Bytes,
        min: MIN_WAL_SEGMENT_SIZE,
        max: MAX_WAL_SEGMENT_SIZE,
    },
    BoundSpec {
        flag: flags::AGENT_WAL_SEGMENT_SIZE,
        unit: Unit::Bytes,
        min: MIN_WAL_SEGMENT_SIZE,
        max: MAX_WAL_SEGMENT_SIZE,
    },
    BoundSpec {
        flag: flags::TSDB_MAX_BLOCK_CHUNK_SEGMENT_SIZE,
        unit: Unit::Bytes,
        min: MIN_BLOCK_CHUNK_SEGMENT_SIZE,
        max: MAX_BLOCK_CHUNK_SEGMENT_SIZE,
    },
    BoundSpec {
        flag: flags::TSDB_RETENTION_TIME,
        unit: Unit::Duration,
        min: 0,
        max: MAX_RETENTION,
    },
    BoundSpec {
        flag: flags::AGENT_RETENTION_MAX_TIME,
        unit: Unit::Duration,
        min: 0,
        max: MAX_RETENTION,
    },
];

// A bound with min > max can never be satisfied; refuse to compile one.
const _: () = {
    let mut i = 0;
    while i < BOUNDS.len() {
        assert!(BOUNDS[i].min <= BOUNDS[i].max, "bound with min > max");
        i += 1;
    }
};

/// Why a raw value could not be turned into a quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    Malformed(String),
    /// Syntactically valid but does not fit in an `i64`.
    Overflow,
}

impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityError::Malformed(reason) => f.write_str(reason),
            QuantityError::Overflow => f.write_str("value is too large"),
        }
    }
}

fn split_sign(raw: &str) -> (bool, &str) {
    match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    }
}

fn apply_sign(negative: bool, value: i64) -> i64 {
    if negative {
        -value
    } else {
        value
    }
}

/// Parse a byte size such as `128MB`, `1GiB` or `4096`.
pub fn parse_bytes(raw: &str) -> Result<i64, QuantityError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Malformed("empty value".to_string()));
    }

    let (negative, body) = split_sign(trimmed);
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, suffix) = body.split_at(digits_end);
    if digits.is_empty() {
        return Err(QuantityError::Malformed(format!(
            "expected a number, found {:?}",
            body
        )));
    }

    let multiplier = match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "KIB" => KIB,
        "MB" | "MIB" => MIB,
        "GB" | "GIB" => GIB,
        "TB" | "TIB" => TIB,
        _ => {
            return Err(QuantityError::Malformed(format!(
                "unknown size unit {:?}",
                suffix
            )))
        }
    };

    let number: i64 = digits.parse().map_err(|_| QuantityError::Overflow)?;
    let value = number
        .checked_mul(multiplier)
        .ok_or(QuantityError::Overflow)?;
    Ok(apply_sign(negative, value))
}

fn duration_regex() -> &'static Regex {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();
    DURATION_RE.get_or_init(|| {
        Regex::new(
            r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$",
        )
        .expect("duration pattern is valid")
    })
}

/// Parse a duration such as `15d`, `1h30m` or `0` into milliseconds.
pub fn parse_duration(raw: &str) -> Result<i64, QuantityError> {
    const UNITS: [i64; 7] = [YEAR, WEEK, DAY, HOUR, MINUTE, SECOND, MILLISECOND];

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Malformed("empty value".to_string()));
    }

    let (negative, body) = split_sign(trimmed);
    if body == "0" {
        return Ok(0);
    }

    let captures = duration_regex()
        .captures(body)
        .filter(|caps| caps.iter().skip(1).any(|group| group.is_some()))
        .ok_or_else(|| QuantityError::Malformed(format!("not a valid duration: {:?}", body)))?;

    let mut total: i64 = 0;
    for (index, unit) in UNITS.iter().enumerate() {
        if let Some(group) = captures.get(index + 1) {
            let count: i64 = group
                .as_str()
                .parse()
                .map_err(|_| QuantityError::Overflow)?;
            total = count
                .checked_mul(*unit)
                .and_then(|ms| total.checked_add(ms))
                .ok_or(QuantityError::Overflow)?;
        }
    }
    Ok(apply_sign(negative, total))
}

pub fn parse_quantity(unit: Unit, raw: &str) -> Result<i64, QuantityError> {
    match unit {
        Unit::Bytes => parse_bytes(raw),
        Unit::Duration => parse_duration(raw),
    }
}

/// Render a quantity in the largest unit that represents it exactly.
pub fn format_quantity(unit: Unit, value: i64) -> String {
    let steps: &[(i64, &str)] = match unit {
        Unit::Bytes => &[(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")],
        Unit::Duration => &[
            (YEAR, "y"),
            (WEEK, "w"),
            (DAY, "d"),
            (HOUR, "h"),
            (MINUTE, "m"),
            (SECOND, "s"),
        ],
    };
    if value != 0 {
        for (size, suffix) in steps {
            if value % size == 0 {
                return format!("{}{}", value / size, suffix);
            }
        }
    }
    match unit {
        Unit::Bytes => format!("{}B", value),
        Unit::Duration if value == 0 => "0s".to_string(),
        Unit::Duration => format!("{}ms", value),
    }
}

/// A bounded flag whose value was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsViolation {
    Malformed {
        mode: Mode,
        flag: &'static str,
        value: String,
        unit: Unit,
        reason: String,
    },
    OutOfRange {
        mode: Mode,
        flag: &'static str,
        value: String,
        unit: Unit,
        min: i64,
        max: i64,
    },
}

impl BoundsViolation {
    pub fn flag(&self) -> &'static str {
        match self {
            BoundsViolation::Malformed { flag, .. } | BoundsViolation::OutOfRange { flag, .. } => {
                flag
            }
        }
    }
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsViolation::Malformed {
                mode,
                flag,
                value,
                unit,
                reason,
            } => write!(
                f,
                "invalid value {:?} for flag --{} in {} mode: {} (expected {})",
                value,
                flag,
                mode,
                reason,
                unit.expected()
            ),
            BoundsViolation::OutOfRange {
                mode,
                flag,
                value,
                unit,
                min,
                max,
            } => write!(
                f,
                "value {:?} for flag --{} is out of range in {} mode: must be between {} and {}",
                value,
                flag,
                mode,
                format_quantity(*unit, *min),
                format_quantity(*unit, *max)
            ),
        }
    }
}

impl std::error::Error for BoundsViolation {}

fn check(bound: &BoundSpec, mode: Mode, raw: &str) -> Result<(), BoundsViolation> {
    let out_of_range = || BoundsViolation::OutOfRange {
        mode,
        flag: bound.flag,
        value: raw.to_string(),
        unit: bound.unit,
        min: bound.min,
        max: bound.max,
    };

    match parse_quantity(bound.unit, raw) {
        Ok(value) if bound.contains(value) => Ok(()),
        Ok(_) | Err(QuantityError::Overflow) => Err(out_of_range()),
        Err(QuantityError::Malformed(reason)) => Err(BoundsViolation::Malformed {
            mode,
            flag: bound.flag,
            value: raw.to_string(),
            unit: bound.unit,
            reason,
        }),
    }
}

/// Check every present flag named in `bounds`. Absent flags are skipped.
///
/// `mode` is only recorded in the violation; the bounds themselves do not
/// depend on it.
pub fn validate_with(
    bounds: &[BoundSpec],
    mode: Mode,
    flags: &FlagSet,
) -> Result<(), BoundsViolation> {
    bounds.iter().try_for_each(|bound| match flags.get(bound.flag) {
        Some(raw) => check(bound, mode, raw),
        None => Ok(()),
    })
}
