//! Canonical byte encoding & content fingerprints
//!
//! Every input that can influence a generated sequence is folded into an MD5
//! digest through a single canonical byte schedule, so two parameter sets
//! produce the same [`Fingerprint`] only when they are observably equivalent.
//!
//! ## Encoding discipline
//! - integers: big-endian, fixed width (2 bytes for a char code unit, 4 for
//!   an int, 8 for a long);
//! - strings and enum tags: UTF-8 bytes, no terminator;
//! - `Option`: `None` contributes nothing, `Some(x)` is transparent;
//! - collections: elements in order; maps and sets must therefore be sorted
//!   containers (`BTreeMap`/`BTreeSet`) or pre-sorted before absorbing.
//!
//! The writer never fails and the schedule is append-only: absorbing the
//! same values in the same order yields the same digest in every process.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Digest writer
// ============================================================================

/// Accumulates the canonical byte sequence into an MD5 context.
pub struct Digest {
    ctx: md5::Context,
}

impl Digest {
    pub fn new() -> Self {
        Digest { ctx: md5::Context::new() }
    }

    /// Raw bytes, as-is.
    #[inline]
    pub fn absorb_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.ctx.consume(bytes);
        self
    }

    #[inline]
    pub fn absorb_u8(&mut self, v: u8) -> &mut Self {
        self.absorb_bytes(&[v])
    }

    /// A char as its 2-byte big-endian UTF-16-style code unit.
    #[inline]
    pub fn absorb_char(&mut self, v: char) -> &mut Self {
        self.absorb_bytes(&(v as u16).to_be_bytes())
    }

    #[inline]
    pub fn absorb_i32(&mut self, v: i32) -> &mut Self {
        self.absorb_bytes(&v.to_be_bytes())
    }

    #[inline]
    pub fn absorb_u32(&mut self, v: u32) -> &mut Self {
        self.absorb_bytes(&v.to_be_bytes())
    }

    #[inline]
    pub fn absorb_i64(&mut self, v: i64) -> &mut Self {
        self.absorb_bytes(&v.to_be_bytes())
    }

    #[inline]
    pub fn absorb_u64(&mut self, v: u64) -> &mut Self {
        self.absorb_bytes(&v.to_be_bytes())
    }

    /// A bool as a single byte, `1`/`0`.
    #[inline]
    pub fn absorb_bool(&mut self, v: bool) -> &mut Self {
        self.absorb_u8(v as u8)
    }

    /// UTF-8 bytes of a string (also used for enum tags).
    #[inline]
    pub fn absorb_str(&mut self, v: &str) -> &mut Self {
        self.absorb_bytes(v.as_bytes())
    }

    /// `None` is empty, `Some(x)` is the bytes of `x`.
    pub fn absorb_opt<T: HashBytes>(&mut self, v: Option<&T>) -> &mut Self {
        if let Some(x) = v {
            x.absorb(self);
        }
        self
    }

    /// Elements in iteration order.
    pub fn absorb_all<'a, T, I>(&mut self, items: I) -> &mut Self
    where
        T: HashBytes + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for item in items {
            item.absorb(self);
        }
        self
    }

    /// Finish the schedule and produce the fingerprint.
    pub fn finalize(self) -> Fingerprint {
        Fingerprint(self.ctx.compute().0)
    }
}

impl Default for Digest {
    fn default() -> Self {
        Digest::new()
    }
}

// ============================================================================
// HashBytes
// ============================================================================

/// A value with a canonical byte encoding.
///
/// Implementations must absorb every field that can influence generated
/// output, in a fixed declaration order; cosmetic fields stay out.
pub trait HashBytes {
    fn absorb(&self, digest: &mut Digest);
}

/// Fingerprint the complete canonical encoding of one value.
pub fn fingerprint<T: HashBytes>(value: &T) -> Fingerprint {
    let mut d = Digest::new();
    value.absorb(&mut d);
    d.finalize()
}

impl HashBytes for bool {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_bool(*self);
    }
}

impl HashBytes for i32 {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_i32(*self);
    }
}

impl HashBytes for u32 {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_u32(*self);
    }
}

impl HashBytes for i64 {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_i64(*self);
    }
}

impl HashBytes for u64 {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_u64(*self);
    }
}

impl HashBytes for str {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_str(self);
    }
}

impl HashBytes for String {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_str(self);
    }
}

impl<T: HashBytes> HashBytes for Option<T> {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_opt(self.as_ref());
    }
}

impl<T: HashBytes> HashBytes for Vec<T> {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_all(self.iter());
    }
}

impl<T: HashBytes> HashBytes for [T] {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_all(self.iter());
    }
}

impl<T: HashBytes> HashBytes for BTreeSet<T> {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_all(self.iter());
    }
}

impl<K: HashBytes, V: HashBytes> HashBytes for BTreeMap<K, V> {
    fn absorb(&self, d: &mut Digest) {
        for (k, v) in self {
            k.absorb(d);
            v.absorb(d);
        }
    }
}

impl HashBytes for crate::units::TimeSpan {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_u64(self.as_micros());
    }
}

impl HashBytes for crate::units::Wavelength {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_u32(self.as_pm());
    }
}

impl HashBytes for crate::units::WavelengthDither {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_i64(self.as_pm());
    }
}

impl HashBytes for crate::units::OffsetP {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_i64(self.as_uas());
    }
}

impl HashBytes for crate::units::OffsetQ {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_i64(self.as_uas());
    }
}

impl HashBytes for crate::units::Offset {
    fn absorb(&self, d: &mut Digest) {
        self.p.absorb(d);
        self.q.absorb(d);
    }
}

impl HashBytes for crate::units::Adjustment {
    fn absorb(&self, d: &mut Digest) {
        self.dither.absorb(d);
        self.offset.absorb(d);
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// A 16-byte MD5 content fingerprint over the canonical encoding of a value.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::TimeSpan;

    #[test]
    fn identical_schedules_produce_identical_fingerprints() {
        let mut a = Digest::new();
        a.absorb_str("science").absorb_i32(42).absorb_u64(7);
        let mut b = Digest::new();
        b.absorb_str("science").absorb_i32(42).absorb_u64(7);
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn integers_are_big_endian_fixed_width() {
        // 1 as a 4-byte int must differ from 1 as an 8-byte long.
        let mut a = Digest::new();
        a.absorb_i32(1);
        let mut b = Digest::new();
        b.absorb_i64(1);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn none_is_empty_and_some_is_transparent() {
        let none: Option<TimeSpan> = None;
        let mut a = Digest::new();
        none.absorb(&mut a);
        assert_eq!(a.finalize(), Digest::new().finalize());

        let some = Some(TimeSpan::from_seconds(1));
        let mut b = Digest::new();
        some.absorb(&mut b);
        let mut c = Digest::new();
        TimeSpan::from_seconds(1).absorb(&mut c);
        assert_eq!(b.finalize(), c.finalize());
    }

    #[test]
    fn distinct_values_fingerprint_differently() {
        assert_ne!(
            fingerprint(&TimeSpan::from_seconds(300)),
            fingerprint(&TimeSpan::from_seconds(301)),
        );
    }

    #[test]
    fn fingerprint_displays_as_hex() {
        let fp = fingerprint(&0u32);
        assert_eq!(fp.to_string().len(), 32);
        assert!(fp.to_string().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
