//! Arbitrary precision integers with an `i64` fast path.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use super::error::{EvalError, EvalResult};

/// Shift counts at or above this are rejected.
const MAX_SHIFT: u64 = 512;

/// An integer value. `Big` is only used for values outside the `i64` range.
#[derive(Clone)]
pub enum Int {
    Small(i64),
    Big(Arc<BigInt>),
}

impl Int {
    pub fn from_bigint(b: BigInt) -> Int {
        match b.to_i64() {
            Some(i) => Int::Small(i),
            None => Int::Big(Arc::new(b)),
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        match self {
            Int::Small(i) => BigInt::from(*i),
            Int::Big(b) => (**b).clone(),
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Int::Small(i) => Some(*i),
            Int::Big(_) => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Int::Small(i) => *i as f64,
            Int::Big(b) => b.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// Converts an integral float; `None` for NaN and infinities.
    pub fn from_f64(f: f64) -> Option<Int> {
        if !f.is_finite() {
            return None;
        }
        let t = f.trunc();
        if t >= i64::MIN as f64 && t < i64::MAX as f64 {
            return Some(Int::Small(t as i64));
        }
        BigInt::from_f64(t).map(Int::from_bigint)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int::Small(i) => *i == 0,
            Int::Big(b) => b.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Int::Small(i) => *i < 0,
            Int::Big(b) => b.is_negative(),
        }
    }

    pub fn add(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_add(*b) {
                return Int::Small(r);
            }
        }
        Int::from_bigint(self.to_bigint() + other.to_bigint())
    }

    pub fn sub(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_sub(*b) {
                return Int::Small(r);
            }
        }
        Int::from_bigint(self.to_bigint() - other.to_bigint())
    }

    pub fn mul(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_mul(*b) {
                return Int::Small(r);
            }
        }
        Int::from_bigint(self.to_bigint() * other.to_bigint())
    }

    pub fn neg(&self) -> Int {
        if let Int::Small(a) = self {
            if let Some(r) = a.checked_neg() {
                return Int::Small(r);
            }
        }
        Int::from_bigint(-self.to_bigint())
    }

    /// Floored division.
    pub fn floor_div(&self, other: &Int) -> EvalResult<Int> {
        if other.is_zero() {
            return Err(EvalError::new("integer division by zero"));
        }
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let (Some(q), Some(r)) = (a.checked_div(*b), a.checked_rem(*b)) {
                let q = if r != 0 && ((r < 0) != (*b < 0)) { q - 1 } else { q };
                return Ok(Int::Small(q));
            }
        }
        let (a, b) = (self.to_bigint(), other.to_bigint());
        let (q, r) = (&a / &b, &a % &b);
        let q = if !r.is_zero() && (r.is_negative() != b.is_negative()) {
            q - 1
        } else {
            q
        };
        Ok(Int::from_bigint(q))
    }

    /// Floored modulo: the result has the sign of the divisor.
    pub fn modulo(&self, other: &Int) -> EvalResult<Int> {
        if other.is_zero() {
            return Err(EvalError::new("integer modulo by zero"));
        }
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_rem(*b) {
                let r = if r != 0 && ((r < 0) != (*b < 0)) { r + b } else { r };
                return Ok(Int::Small(r));
            }
        }
        let (a, b) = (self.to_bigint(), other.to_bigint());
        let r = &a % &b;
        let r = if !r.is_zero() && (r.is_negative() != b.is_negative()) {
            r + b
        } else {
            r
        };
        Ok(Int::from_bigint(r))
    }

    pub fn bitand(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a & b),
            _ => Int::from_bigint(self.to_bigint() & other.to_bigint()),
        }
    }

    pub fn bitor(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a | b),
            _ => Int::from_bigint(self.to_bigint() | other.to_bigint()),
        }
    }

    pub fn bitxor(&self, other: &Int) -> Int {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => Int::Small(a ^ b),
            _ => Int::from_bigint(self.to_bigint() ^ other.to_bigint()),
        }
    }

    pub fn invert(&self) -> Int {
        match self {
            Int::Small(a) => Int::Small(!a),
            Int::Big(b) => Int::from_bigint(-(**b).clone() - 1),
        }
    }

    fn shift_count(&self) -> EvalResult<usize> {
        if self.is_negative() {
            return Err(EvalError::new(format!("negative shift count: {}", self)));
        }
        match self.to_i64() {
            Some(n) if (n as u64) < MAX_SHIFT => Ok(n as usize),
            _ => Err(EvalError::new(format!("shift count too large: {}", self))),
        }
    }

    pub fn shl(&self, count: &Int) -> EvalResult<Int> {
        let n = count.shift_count()?;
        if let Int::Small(a) = self {
            if n < 63 {
                if let Some(r) = a.checked_mul(1i64 << n) {
                    return Ok(Int::Small(r));
                }
            }
        }
        Ok(Int::from_bigint(self.to_bigint() << n))
    }

    pub fn shr(&self, count: &Int) -> EvalResult<Int> {
        let n = count.shift_count()?;
        match self {
            Int::Small(a) => Ok(Int::Small(if n >= 64 { if *a < 0 { -1 } else { 0 } } else { a >> n })),
            Int::Big(b) => Ok(Int::from_bigint((**b).clone() >> n)),
        }
    }

    /// Deterministic hash; integral floats hash to the same value.
    pub fn hash(&self) -> u32 {
        match self {
            Int::Small(i) => {
                let u = *i as u64;
                (u ^ (u >> 32)) as u32
            }
            Int::Big(b) => super::hash_bytes(&b.to_signed_bytes_le()),
        }
    }

    pub fn to_signed_bytes_le(&self) -> Vec<u8> {
        self.to_bigint().to_signed_bytes_le()
    }

    pub fn from_signed_bytes_le(bytes: &[u8]) -> Int {
        Int::from_bigint(BigInt::from_signed_bytes_le(bytes))
    }

    /// Formats in the given base with a `0x`/`0o` style prefix omitted.
    pub fn to_str_radix(&self, radix: u32) -> String {
        self.to_bigint().to_str_radix(radix)
    }
}

impl From<i64> for Int {
    fn from(i: i64) -> Self {
        Int::Small(i)
    }
}

impl PartialEq for Int {
    fn eq(&self, other: &Int) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Int {}

impl PartialOrd for Int {
    fn partial_cmp(&self, other: &Int) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Int {
    fn cmp(&self, other: &Int) -> Ordering {
        match (self, other) {
            (Int::Small(a), Int::Small(b)) => a.cmp(b),
            _ => self.to_bigint().cmp(&other.to_bigint()),
        }
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::Small(i) => write!(f, "{}", i),
            Int::Big(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Debug for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
