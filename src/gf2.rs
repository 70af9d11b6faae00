//! # GF(2) — Carryless Polynomial Arithmetic
//!
//! Polynomials over the two-element field are packed into a `u64`: bit `i`
//! holds the coefficient of x^i. Addition is XOR, multiplication is the
//! carryless shift-and-XOR convolution, and division is schoolbook long
//! division that aligns the divisor's leading term under the remainder's.
//!
//! ## Bit Length
//!
//! Long division is driven by `bit_length` (word width minus leading-zero
//! count), which maps to the target's native `lzcnt`/`clz` instruction via
//! `u64::leading_zeros`. A value of 0 has bit length 0.
//!
//! ## Irreducibility
//!
//! `is_irreducible` is an independent trial-division check used to verify
//! sieve output. It is O(2^(deg/2)) and only meant for small degrees.

/// A GF(2) polynomial in packed form.
pub type Polynomial = u64;

/// Sum of two polynomials (coefficient-wise XOR).
#[inline]
pub fn add(a: Polynomial, b: Polynomial) -> Polynomial {
    a ^ b
}

/// Carryless product of two polynomials.
///
/// Terms shifted past bit 63 are discarded; callers that need an exact
/// product must keep `bit_length(a) + bit_length(b) - 1 <= 64`.
pub fn multiply(a: Polynomial, b: Polynomial) -> Polynomial {
    let mut product = 0;
    let mut shifted = a;
    let mut rest = b;

    while rest != 0 {
        if rest & 1 != 0 {
            product ^= shifted;
        }
        rest >>= 1;
        shifted <<= 1;
    }

    product
}

/// Number of significant bits: one more than the degree, 0 for the zero polynomial.
#[inline]
pub fn bit_length(value: Polynomial) -> u32 {
    Polynomial::BITS - value.leading_zeros()
}

/// Degree of a non-zero polynomial, `None` for zero.
pub fn degree(value: Polynomial) -> Option<u32> {
    bit_length(value).checked_sub(1)
}

/// Bit length of a product, computed from the factors without multiplying.
#[inline]
pub fn product_bit_length(a: Polynomial, b: Polynomial) -> u32 {
    if a == 0 || b == 0 {
        0
    } else {
        bit_length(a) + bit_length(b) - 1
    }
}

/// Long division: returns `(quotient, remainder)`.
///
/// # Panics
///
/// Panics if `divisor` is zero.
pub fn divide(dividend: Polynomial, divisor: Polynomial) -> (Polynomial, Polynomial) {
    assert!(divisor != 0, "division by zero polynomial");

    let divisor_len = bit_length(divisor);
    let mut quotient = 0;
    let mut remainder = dividend;
    let mut remainder_len = bit_length(remainder);

    while remainder_len >= divisor_len {
        let shift = remainder_len - divisor_len;
        quotient |= 1 << shift;
        remainder ^= divisor << shift;
        remainder_len = bit_length(remainder);
    }

    (quotient, remainder)
}

/// Remainder of long division, quotient discarded.
///
/// # Panics
///
/// Panics if `divisor` is zero.
pub fn remainder(dividend: Polynomial, divisor: Polynomial) -> Polynomial {
    assert!(divisor != 0, "division by zero polynomial");

    let divisor_len = bit_length(divisor);
    let mut remainder = dividend;
    let mut remainder_len = bit_length(remainder);

    while remainder_len >= divisor_len {
        remainder ^= divisor << (remainder_len - divisor_len);
        remainder_len = bit_length(remainder);
    }

    remainder
}

/// Trial-division irreducibility test.
///
/// A polynomial of degree d is reducible iff it has a factor of degree
/// 1..=d/2, so every candidate divisor below `2^(d/2 + 1)` is tried.
/// 0 and 1 are not irreducible.
pub fn is_irreducible(value: Polynomial) -> bool {
    let Some(deg) = degree(value) else {
        return false;
    };
    if deg == 0 {
        return false;
    }

    let limit: Polynomial = 1 << (deg / 2 + 1);
    (2..limit).all(|divisor| remainder(value, divisor) != 0)
}
