//! GF(2^16) arithmetic for Reed-Solomon coding.
//!
//! The field is GF(2)[x] / (x^16 + x^12 + x^3 + x + 1), generator
//! polynomial 0x1100B, the one both parity-volume formats are built on.
//! The primitive element alpha = 2 (that is, x) has order 65535 and drives
//! the exponent/log tables.
//!
//! Multiplication is table-driven: `exp[log[a] + log[b]]`, with the
//! exponent table doubled in length so the sum never needs reducing.
//! The tables are process-wide and built once under a `OnceLock`.

pub mod slice;

#[cfg(target_arch = "x86_64")]
pub mod simd;

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};
use std::sync::OnceLock;

/// The field generator polynomial: x^16 + x^12 + x^3 + x + 1.
pub const GENERATOR_POLY: u32 = 0x1100B;

/// Order of the multiplicative group.
pub const ORDER: u32 = 65535;

struct Tables {
    /// `exp[k] = alpha^k` for `k` in `0..2*65535`, so a sum of two logs
    /// indexes directly.
    exp: Box<[u16]>,
    /// `log[v]` for `v` in `1..=65535`; entry 0 is unused.
    log: Box<[u16]>,
}

impl Tables {
    fn build() -> Tables {
        let mut exp = vec![0u16; 2 * ORDER as usize].into_boxed_slice();
        let mut log = vec![0u16; 1 << 16].into_boxed_slice();

        let mut b = 1u32;
        for k in 0..ORDER as usize {
            exp[k] = b as u16;
            exp[k + ORDER as usize] = b as u16;
            log[b as usize] = k as u16;

            b <<= 1;
            if b & 0x10000 != 0 {
                b ^= GENERATOR_POLY;
            }
        }

        Tables { exp, log }
    }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(Tables::build)
}

/// An element of GF(2^16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Gf16(u16);

impl Gf16 {
    pub const ZERO: Gf16 = Gf16(0);
    pub const ONE: Gf16 = Gf16(1);

    pub fn new(value: u16) -> Self {
        Gf16(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// alpha^k for any `k`; reduced mod the group order.
    pub fn alpha_pow(k: u32) -> Self {
        Gf16(tables().exp[(k % ORDER) as usize])
    }

    /// Raise to an integer power. `0^0 == 1`.
    pub fn pow(self, e: u32) -> Self {
        if self.0 == 0 {
            return if e == 0 { Gf16::ONE } else { Gf16::ZERO };
        }
        let t = tables();
        let log = t.log[self.0 as usize] as u64;
        Gf16(t.exp[((log * e as u64) % ORDER as u64) as usize])
    }

    /// Multiplicative inverse; `None` for zero.
    pub fn checked_inv(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        let t = tables();
        Some(Gf16(t.exp[(ORDER - t.log[self.0 as usize] as u32) as usize]))
    }

    /// Discrete log base alpha; `None` for zero.
    pub fn log(self) -> Option<u16> {
        if self.0 == 0 {
            None
        } else {
            Some(tables().log[self.0 as usize])
        }
    }
}

impl Add for Gf16 {
    type Output = Gf16;

    fn add(self, rhs: Gf16) -> Gf16 {
        Gf16(self.0 ^ rhs.0)
    }
}

impl AddAssign for Gf16 {
    fn add_assign(&mut self, rhs: Gf16) {
        self.0 ^= rhs.0;
    }
}

// Subtraction coincides with addition in characteristic 2.
impl Sub for Gf16 {
    type Output = Gf16;

    fn sub(self, rhs: Gf16) -> Gf16 {
        Gf16(self.0 ^ rhs.0)
    }
}

impl SubAssign for Gf16 {
    fn sub_assign(&mut self, rhs: Gf16) {
        self.0 ^= rhs.0;
    }
}

impl Mul for Gf16 {
    type Output = Gf16;

    fn mul(self, rhs: Gf16) -> Gf16 {
        if self.0 == 0 || rhs.0 == 0 {
            return Gf16::ZERO;
        }
        let t = tables();
        Gf16(t.exp[t.log[self.0 as usize] as usize + t.log[rhs.0 as usize] as usize])
    }
}

impl MulAssign for Gf16 {
    fn mul_assign(&mut self, rhs: Gf16) {
        *self = *self * rhs;
    }
}

impl Div for Gf16 {
    type Output = Gf16;

    fn div(self, rhs: Gf16) -> Gf16 {
        let inv = rhs
            .checked_inv()
            .expect("division by zero in GF(2^16)");
        self * inv
    }
}

impl DivAssign for Gf16 {
    fn div_assign(&mut self, rhs: Gf16) {
        *self = *self / rhs;
    }
}

impl From<u16> for Gf16 {
    fn from(value: u16) -> Self {
        Gf16(value)
    }
}

impl From<Gf16> for u16 {
    fn from(v: Gf16) -> u16 {
        v.0
    }
}

impl std::fmt::Display for Gf16 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
