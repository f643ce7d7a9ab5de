//! Time, angle, and wavelength quantities
//!
//! Every quantity in this module is integer-backed so that sequence
//! generation is bit-for-bit deterministic: durations are microseconds,
//! angles are microarcseconds, wavelengths are picometers. Arithmetic is
//! total (saturating or checked) — no operation here panics on domain
//! input.
//!
//! The small tuple newtypes follow the same discipline as the index types
//! used elsewhere in the crate: a single public-by-constructor field, `as_*`
//! accessors, and derived ordering so the types can key sorted maps.

use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instant in time, UTC. Recorded events and generation reference times all
/// use this alias.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// TimeSpan
// ============================================================================

/// A non-negative span of time with microsecond resolution.
///
/// `TimeSpan` is deliberately *not* `chrono::Duration`: it cannot be
/// negative, its arithmetic is saturating, and its canonical byte encoding
/// (a big-endian `u64` of microseconds) feeds the content fingerprint.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeSpan(u64);

impl TimeSpan {
    /// The empty span.
    pub const ZERO: TimeSpan = TimeSpan(0);

    /// Construct from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        TimeSpan(us)
    }

    /// Construct from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        TimeSpan(ms * 1_000)
    }

    /// Construct from whole seconds.
    #[inline]
    pub const fn from_seconds(s: u64) -> Self {
        TimeSpan(s * 1_000_000)
    }

    /// Construct from whole minutes.
    #[inline]
    pub const fn from_minutes(m: u64) -> Self {
        TimeSpan(m * 60 * 1_000_000)
    }

    /// Construct from whole hours.
    #[inline]
    pub const fn from_hours(h: u64) -> Self {
        TimeSpan(h * 3_600 * 1_000_000)
    }

    /// Microseconds in this span.
    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Whole seconds in this span (truncating).
    #[inline]
    pub const fn as_seconds(self) -> u64 {
        self.0 / 1_000_000
    }

    /// `true` when the span is empty.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero.
    #[inline]
    pub const fn saturating_sub(self, other: TimeSpan) -> TimeSpan {
        TimeSpan(self.0.saturating_sub(other.0))
    }

    /// Exact subtraction, `None` when `other > self`.
    #[inline]
    pub const fn checked_sub(self, other: TimeSpan) -> Option<TimeSpan> {
        match self.0.checked_sub(other.0) {
            Some(us) => Some(TimeSpan(us)),
            None => None,
        }
    }

    /// How many whole copies of `unit` fit in this span. Zero when `unit`
    /// is empty (the callers treat "no time per cycle" as "no cycles fit").
    #[inline]
    pub const fn div_by(self, unit: TimeSpan) -> u64 {
        if unit.0 == 0 {
            0
        } else {
            self.0 / unit.0
        }
    }

    /// Half of this span, truncating.
    #[inline]
    pub const fn half(self) -> TimeSpan {
        TimeSpan(self.0 / 2)
    }

    /// The non-negative span from `start` to `end`; zero when `end`
    /// precedes `start`.
    pub fn between(start: Timestamp, end: Timestamp) -> TimeSpan {
        let us = end.signed_duration_since(start).num_microseconds().unwrap_or(i64::MAX);
        if us <= 0 {
            TimeSpan::ZERO
        } else {
            TimeSpan(us as u64)
        }
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    #[inline]
    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TimeSpan {
    #[inline]
    fn add_assign(&mut self, rhs: TimeSpan) {
        *self = *self + rhs;
    }
}

impl Mul<u32> for TimeSpan {
    type Output = TimeSpan;

    #[inline]
    fn mul(self, rhs: u32) -> TimeSpan {
        TimeSpan(self.0.saturating_mul(rhs as u64))
    }
}

impl Add<TimeSpan> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: TimeSpan) -> Timestamp {
        self + chrono::Duration::microseconds(rhs.0.min(i64::MAX as u64) as i64)
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06} s", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

// ============================================================================
// TimestampInterval
// ============================================================================

/// A closed time interval `[start, end]`, normalized so `start <= end`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimestampInterval {
    start: Timestamp,
    end: Timestamp,
}

impl TimestampInterval {
    /// Interval between two instants, in either order.
    pub fn between(a: Timestamp, b: Timestamp) -> Self {
        if a <= b {
            TimestampInterval { start: a, end: b }
        } else {
            TimestampInterval { start: b, end: a }
        }
    }

    /// Degenerate interval at a single instant.
    pub fn instant(at: Timestamp) -> Self {
        TimestampInterval { start: at, end: at }
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Span covered by the interval.
    pub fn duration(&self) -> TimeSpan {
        TimeSpan::between(self.start, self.end)
    }

    /// Smallest interval covering both `self` and `other`.
    pub fn union(&self, other: &TimestampInterval) -> TimestampInterval {
        TimestampInterval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Union with an optional second interval.
    pub fn union_opt(&self, other: Option<&TimestampInterval>) -> TimestampInterval {
        match other {
            Some(o) => self.union(o),
            None => *self,
        }
    }
}

// ============================================================================
// Wavelength & dithers
// ============================================================================

/// A positive wavelength in picometers.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Wavelength(u32);

impl Wavelength {
    /// Construct from picometers; `None` for zero.
    pub const fn from_pm(pm: u32) -> Option<Self> {
        if pm == 0 {
            None
        } else {
            Some(Wavelength(pm))
        }
    }

    /// Construct from whole nanometers; `None` for zero.
    pub const fn from_nm(nm: u32) -> Option<Self> {
        Wavelength::from_pm(nm * 1_000)
    }

    #[inline]
    pub const fn as_pm(self) -> u32 {
        self.0
    }

    /// Shift by a signed dither; `None` when the result would not be a
    /// positive wavelength.
    pub fn offset_by(self, dither: WavelengthDither) -> Option<Wavelength> {
        let pm = self.0 as i64 + dither.as_pm();
        if pm <= 0 || pm > u32::MAX as i64 {
            None
        } else {
            Some(Wavelength(pm as u32))
        }
    }
}

impl fmt::Display for Wavelength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03} nm", self.0 / 1_000, self.0 % 1_000)
    }
}

/// A signed wavelength shift in picometers.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WavelengthDither(i64);

impl WavelengthDither {
    pub const ZERO: WavelengthDither = WavelengthDither(0);

    #[inline]
    pub const fn from_pm(pm: i64) -> Self {
        WavelengthDither(pm)
    }

    #[inline]
    pub const fn from_nm(nm: i64) -> Self {
        WavelengthDither(nm * 1_000)
    }

    #[inline]
    pub const fn as_pm(self) -> i64 {
        self.0
    }
}

impl fmt::Display for WavelengthDither {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:03} nm", sign, abs / 1_000, abs % 1_000)
    }
}

// ============================================================================
// Offsets
// ============================================================================

/// Microarcseconds per arcsecond.
const UAS_PER_ARCSEC: i64 = 1_000_000;

/// Offset component along `p`, in microarcseconds.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OffsetP(i64);

/// Offset component along `q`, in microarcseconds.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OffsetQ(i64);

impl OffsetP {
    pub const ZERO: OffsetP = OffsetP(0);

    #[inline]
    pub const fn from_uas(uas: i64) -> Self {
        OffsetP(uas)
    }

    #[inline]
    pub const fn from_arcsec(arcsec: i64) -> Self {
        OffsetP(arcsec * UAS_PER_ARCSEC)
    }

    #[inline]
    pub const fn as_uas(self) -> i64 {
        self.0
    }
}

impl OffsetQ {
    pub const ZERO: OffsetQ = OffsetQ(0);

    #[inline]
    pub const fn from_uas(uas: i64) -> Self {
        OffsetQ(uas)
    }

    #[inline]
    pub const fn from_arcsec(arcsec: i64) -> Self {
        OffsetQ(arcsec * UAS_PER_ARCSEC)
    }

    #[inline]
    pub const fn as_uas(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn abs_uas(self) -> i64 {
        self.0.unsigned_abs() as i64
    }
}

/// Render a microarcsecond angle as arcseconds with one decimal, as used in
/// atom descriptions (`"15.0″"`).
pub(crate) fn format_arcsec(uas: i64) -> String {
    let sign = if uas < 0 { "-" } else { "" };
    let abs = uas.unsigned_abs();
    let whole = abs / UAS_PER_ARCSEC as u64;
    let tenth = (abs % UAS_PER_ARCSEC as u64) / (UAS_PER_ARCSEC as u64 / 10);
    format!("{sign}{whole}.{tenth}")
}

/// A telescope offset, `(p, q)` in microarcseconds.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Offset {
    pub p: OffsetP,
    pub q: OffsetQ,
}

impl Offset {
    pub const ZERO: Offset = Offset { p: OffsetP::ZERO, q: OffsetQ::ZERO };

    pub const fn new(p: OffsetP, q: OffsetQ) -> Self {
        Offset { p, q }
    }

    /// Offset purely in `q`.
    pub const fn in_q(q: OffsetQ) -> Self {
        Offset { p: OffsetP::ZERO, q }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}″, {}″)", format_arcsec(self.p.0), format_arcsec(self.q.0))
    }
}

// ============================================================================
// Adjustment (Δλ, q) and the lcm zip
// ============================================================================

/// One wavelength-block adjustment: a wavelength dither crossed with a
/// spatial offset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Adjustment {
    pub dither: WavelengthDither,
    pub offset: OffsetQ,
}

impl Adjustment {
    pub const fn new(dither: WavelengthDither, offset: OffsetQ) -> Self {
        Adjustment { dither, offset }
    }

    /// Zip the dither and offset lists into the adjustment cycle: both lists
    /// repeat for `lcm(|dithers|, |offsets|)` elements, with zero substituted
    /// for an empty list.
    pub fn cycle(dithers: &[WavelengthDither], offsets: &[OffsetQ]) -> Vec<Adjustment> {
        let nd = dithers.len().max(1);
        let nq = offsets.len().max(1);
        let n = lcm(nd, nq);
        (0..n)
            .map(|i| Adjustment {
                dither: dithers.get(i % nd).copied().unwrap_or(WavelengthDither::ZERO),
                offset: offsets.get(i % nq).copied().unwrap_or(OffsetQ::ZERO),
            })
            .collect()
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Δλ {}, q {}″", self.dither, format_arcsec(self.offset.as_uas()))
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

// ============================================================================
// Tests
// ============================================================================
