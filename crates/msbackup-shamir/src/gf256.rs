//! Galois Field GF(256) arithmetic for Shamir's Secret Sharing
//!
//! Uses the irreducible polynomial x^8 + x^4 + x^3 + x + 1 (0x11B), the AES
//! field, with generator 3. Shares produced elsewhere with the same field
//! interoperate.

/// Reduction polynomial
const POLY: u16 = 0x11B;

const fn build_tables() -> ([u8; 256], [u8; 510]) {
    let mut log = [0u8; 256];
    let mut exp = [0u8; 510];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        log[x as usize] = i as u8;
        // x *= 3, i.e. x ^ 2x with reduction
        let mut doubled = x << 1;
        if doubled & 0x100 != 0 {
            doubled ^= POLY;
        }
        x ^= doubled;
        i += 1;
    }
    (log, exp)
}

const TABLES: ([u8; 256], [u8; 510]) = build_tables();

/// log[x] = discrete log of x base 3 (log[0] is undefined)
static LOG: [u8; 256] = TABLES.0;

/// exp[i] = 3^i, repeated once so sums of two logs need no reduction
static EXP: [u8; 510] = TABLES.1;

/// Add two elements in GF(256) (XOR)
#[inline]
pub fn gf_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Subtract two elements in GF(256) (same as add in characteristic 2)
#[inline]
pub fn gf_sub(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiply two elements in GF(256)
#[inline]
pub fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let log_a = LOG[a as usize] as usize;
    let log_b = LOG[b as usize] as usize;
    EXP[log_a + log_b]
}

/// Divide two elements in GF(256)
#[inline]
pub fn gf_div(a: u8, b: u8) -> u8 {
    assert!(b != 0, "Division by zero in GF(256)");
    if a == 0 {
        return 0;
    }
    let log_a = LOG[a as usize] as usize;
    let log_b = LOG[b as usize] as usize;
    EXP[log_a + 255 - log_b]
}

/// Evaluate a polynomial at `x` (Horner).
/// `coefficients[0]` is the constant term.
pub fn poly_eval(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &coef| gf_add(gf_mul(acc, x), coef))
}

/// Lagrange interpolation at x=0 over points `(x, y)`.
///
/// Callers guarantee the x values are distinct.
pub fn lagrange_interpolate(points: &[(u8, u8)]) -> u8 {
    let mut secret = 0u8;

    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut numerator = 1u8;
        let mut denominator = 1u8;

        for (j, &(xj, _)) in points.iter().enumerate() {
            if i != j {
                // (0 - xj) == xj in characteristic 2
                numerator = gf_mul(numerator, xj);
                denominator = gf_mul(denominator, gf_sub(xi, xj));
            }
        }

        secret = gf_add(secret, gf_mul(yi, gf_div(numerator, denominator)));
    }

    secret
}
