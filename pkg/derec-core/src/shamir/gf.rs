/*
 * derec: decentralized secret recovery protocol core
 * Copyright (C) 2024 derec contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    cmp, mem,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use itertools::Itertools;
use rand::{CryptoRng, RngCore};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "wrong number of points for interpolation: polynomial needs {} but was given {}",
        needed,
        num_points
    )]
    NumPointsMismatch { needed: usize, num_points: usize },

    #[error("[critical security issue] all points must have an invertible (non-zero) x value")]
    NonInvertiblePoint,

    #[error("interpolation points must have distinct x values (x = {0:#010x} repeated)")]
    DuplicatePoint(GfElemPrimitive),
}

/// Primitive uint type for GfElems.
pub type GfElemPrimitive = u32;

/// A field element of `GF(2^32)`, with characteristic polynomial
/// `x^32 + x^22 + x^2 + x^1 + 1`.
// NOTE: PartialEq is not timing-safe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GfElem(GfElemPrimitive);

/// (x, y) in GF.
pub type GfPoint = (GfElem, GfElem);

impl GfElem {
    // Smallest degree-32 polynomial (numerically and by popcount) which is
    // irreducible and primitive over GF(2).
    //
    // x^32 + x^22 + x^2 + x^1 + 1
    const POLYNOMIAL: u64 = 0b1_0000_0000_0100_0000_0000_0000_0000_0111;

    /// Additive identity.
    pub const ZERO: GfElem = GfElem(0);

    /// Multiplicative identity.
    pub const ONE: GfElem = GfElem(1);

    pub fn new_rand<R: CryptoRng + RngCore + ?Sized>(r: &mut R) -> Self {
        Self(r.next_u32())
    }

    /// Draw a uniformly random element that is not `GfElem::ZERO`.
    pub fn new_rand_nonzero<R: CryptoRng + RngCore + ?Sized>(r: &mut R) -> Self {
        loop {
            let elem = Self::new_rand(r);
            if elem != Self::ZERO {
                return elem;
            }
        }
    }

    pub(crate) fn inner(&self) -> GfElemPrimitive {
        self.0
    }

    pub(crate) fn from_inner(v: GfElemPrimitive) -> Self {
        Self(v)
    }

    /// Take up to four bytes from the front of `bytes` (zero-padded, little
    /// endian) and return the element along with the unconsumed bytes.
    pub fn from_bytes_partial(bytes: &[u8]) -> (Self, &[u8]) {
        let len = cmp::min(bytes.len(), mem::size_of::<GfElemPrimitive>());

        let mut padded = [0u8; mem::size_of::<GfElemPrimitive>()];
        padded[..len].copy_from_slice(&bytes[..len]);

        (
            GfElem(GfElemPrimitive::from_le_bytes(padded)),
            &bytes[len..],
        )
    }

    pub fn to_bytes(&self) -> [u8; mem::size_of::<GfElemPrimitive>()] {
        self.0.to_le_bytes()
    }

    // NOTE: Branches on the exponent, which is always public for us.
    pub fn pow(self, mut n: u64) -> Self {
        let mut mult = self;
        let mut result = Self::ONE;
        while n != 0 {
            if n & 1 == 1 {
                result *= mult;
            }
            mult *= mult;
            n >>= 1;
        }
        result
    }

    /// Multiplicative inverse, computed as `a^(2^32 - 2)` (Fermat's little
    /// theorem for the multiplicative group of order `2^32 - 1`).
    pub fn inverse(self) -> Option<Self> {
        match self {
            Self::ZERO => None,
            _ => Some(self.pow((1u64 << 32) - 2)),
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for GfElem {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self(GfElemPrimitive::arbitrary(g))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().map(Self))
    }
}

impl Add for GfElem {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for GfElem {
    fn add_assign(&mut self, rhs: Self) {
        // Addition in GF(2^n) is XOR.
        #![allow(clippy::suspicious_op_assign_impl)]
        self.0 ^= rhs.0
    }
}

impl Sub for GfElem {
    type Output = Self;
    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

impl SubAssign for GfElem {
    fn sub_assign(&mut self, rhs: Self) {
        #![allow(clippy::suspicious_op_assign_impl)]
        *self += rhs
    }
}

impl Neg for GfElem {
    type Output = Self;
    fn neg(self) -> Self::Output {
        // Every element is its own additive inverse.
        self
    }
}

impl Mul for GfElem {
    type Output = Self;
    fn mul(mut self, rhs: Self) -> Self::Output {
        self *= rhs;
        self
    }
}

impl MulAssign for GfElem {
    fn mul_assign(&mut self, rhs: Self) {
        // Russian peasant multiplication, using masks rather than branches so
        // that the running time doesn't depend on the operands.
        let mut a = self.0;
        let mut b = rhs.0;
        let mut p: GfElemPrimitive = 0;
        for _ in 0..GfElemPrimitive::BITS {
            let mask = ((a >> 31) & 1).wrapping_neg() as u64;
            p ^= a & (b & 1).wrapping_neg();
            a = (((a as u64) << 1) ^ (Self::POLYNOMIAL & mask)) as GfElemPrimitive;
            b >>= 1;
        }
        self.0 = p;
    }
}

impl Div for GfElem {
    type Output = Self;
    fn div(mut self, rhs: Self) -> Self::Output {
        self /= rhs;
        self
    }
}

impl DivAssign for GfElem {
    /// Panics if `rhs` is `GfElem::ZERO`. Interpolation code checks for
    /// duplicate and zero x values before it ever divides.
    fn div_assign(&mut self, rhs: Self) {
        #![allow(clippy::suspicious_op_assign_impl)]
        *self *= rhs.inverse().expect("rhs cannot be inverted")
    }
}

/// Reject zero or repeated x values, the two inputs for which Lagrange
/// interpolation would have to divide by zero.
fn check_xs(xs: &[GfElem]) -> Result<(), Error> {
    if xs.contains(&GfElem::ZERO) {
        return Err(Error::NonInvertiblePoint);
    }
    match xs.iter().duplicates().next() {
        Some(x) => Err(Error::DuplicatePoint(x.inner())),
        None => Ok(()),
    }
}

/// A polynomial in `GF(2^32)`.
// The coefficients are in *increasing* degree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfPolynomial(Vec<GfElem>);

impl GfPolynomial {
    /// Generate a random polynomial of degree `n` with no zero coefficients.
    pub fn new_rand<R: CryptoRng + RngCore + ?Sized>(n: GfElemPrimitive, r: &mut R) -> Self {
        Self((0..=n).map(|_| GfElem::new_rand_nonzero(r)).collect())
    }

    pub fn degree(&self) -> GfElemPrimitive {
        self.0.len().saturating_sub(1) as GfElemPrimitive
    }

    /// Retreive the constant term of the polynomial.
    pub fn constant(&self) -> GfElem {
        self.0.first().copied().unwrap_or(GfElem::ZERO)
    }

    /// Replace the constant term of the polynomial. This invalidates all
    /// previously computed `GfPolynomial::evaluate` results.
    pub fn set_constant(&mut self, constant: GfElem) {
        match self.0.first_mut() {
            Some(c) => *c = constant,
            None => self.0.push(constant),
        }
    }

    /// Evaluate the polynomial at a given `x` value using Horner's method.
    pub fn evaluate(&self, x: GfElem) -> GfElem {
        self.0
            .iter()
            .rev()
            .fold(GfElem::ZERO, |acc, coeff| *coeff + x * acc)
    }

    /// Interpolate the constant term of a polynomial of degree `n` in
    /// `GF(2^32)`, given exactly `n+1` points along that polynomial.
    ///
    /// Substituting `x = 0` into the [Lagrange basis polynomials][lagrange]
    /// and moving every division to the end gives
    ///
    /// ```text
    ///   L(0) = \sum_{j} \frac{y_j}{\prod_{m != j} (1 - x_j x_m^{-1})}
    /// ```
    ///
    /// which only needs the `x_m` inverses (computed once) and a single
    /// division per point.
    ///
    /// [lagrange]: https://en.wikipedia.org/wiki/Lagrange_polynomial
    pub fn lagrange_constant<P: AsRef<[GfPoint]>>(
        n: GfElemPrimitive,
        points: P,
    ) -> Result<GfElem, Error> {
        let points = points.as_ref();
        let k = points.len();
        if k != (n as usize) + 1 {
            return Err(Error::NumPointsMismatch {
                needed: (n as usize) + 1,
                num_points: k,
            });
        }

        let (xs, ys): (Vec<_>, Vec<_>) = points.iter().copied().unzip();
        check_xs(&xs)?;

        let xs_inv = xs
            .iter()
            .map(|x| x.inverse().ok_or(Error::NonInvertiblePoint))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((0..k).fold(GfElem::ZERO, |acc, j| {
            let denominator = (0..k)
                .filter(|m| *m != j)
                .fold(GfElem::ONE, |acc, m| acc * (GfElem::ONE - xs[j] * xs_inv[m]));
            acc + ys[j] / denominator
        }))
    }

    /// Compute the Lagrange basis weights `l_j(x)` for the interpolation
    /// points `xs`, so that `L(x) = \sum_j y_j l_j(x)`.
    ///
    /// The weights only depend on the x values, so callers checking many
    /// polynomials that share the same x values (one per secret chunk) can
    /// compute them once and reuse them for every chunk.
    pub fn lagrange_weights(xs: &[GfElem], x: GfElem) -> Result<Vec<GfElem>, Error> {
        check_xs(xs)?;
        Ok((0..xs.len())
            .map(|j| {
                let (num, den) = (0..xs.len()).filter(|m| *m != j).fold(
                    (GfElem::ONE, GfElem::ONE),
                    |(num, den), m| (num * (x - xs[m]), den * (xs[j] - xs[m])),
                );
                num / den
            })
            .collect())
    }

    /// Evaluate, at `x`, the unique polynomial of degree `n` passing through
    /// the `n+1` given points.
    pub fn lagrange_evaluate<P: AsRef<[GfPoint]>>(
        n: GfElemPrimitive,
        points: P,
        x: GfElem,
    ) -> Result<GfElem, Error> {
        let points = points.as_ref();
        if points.len() != (n as usize) + 1 {
            return Err(Error::NumPointsMismatch {
                needed: (n as usize) + 1,
                num_points: points.len(),
            });
        }

        let (xs, ys): (Vec<_>, Vec<_>) = points.iter().copied().unzip();
        let weights = Self::lagrange_weights(&xs, x)?;
        Ok(ys
            .iter()
            .zip(weights)
            .fold(GfElem::ZERO, |acc, (y, w)| acc + *y * w))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for GfPolynomial {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        // Keep at least one coefficient so degree() is meaningful.
        let len = 1 + usize::arbitrary(g) % g.size().max(1);
        GfPolynomial((0..len).map(|_| GfElem::arbitrary(g)).collect())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().filter(|p| !p.is_empty()).map(Self))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::TestResult;
    use rand::{rngs::StdRng, SeedableRng};

    #[quickcheck]
    fn add_commutativity(a: GfElem, b: GfElem) -> bool {
        (a + b) == (b + a)
    }

    #[quickcheck]
    fn mul_commutativity(a: GfElem, b: GfElem) -> bool {
        (a * b) == (b * a)
    }

    #[quickcheck]
    fn add_associativity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        ((a + b) + c) == (a + (b + c))
    }

    #[quickcheck]
    fn mul_associativity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        ((a * b) * c) == (a * (b * c))
    }

    #[quickcheck]
    fn distributivity(a: GfElem, b: GfElem, c: GfElem) -> bool {
        (a * (b + c)) == ((a * b) + (a * c))
    }

    #[quickcheck]
    fn identities(a: GfElem) -> bool {
        (a + GfElem::ZERO) == a && (a * GfElem::ONE) == a && (a * GfElem::ZERO) == GfElem::ZERO
    }

    #[quickcheck]
    fn additive_inverse(a: GfElem) -> bool {
        a - a == GfElem::ZERO && a + (-a) == GfElem::ZERO
    }

    #[quickcheck]
    fn mul_inverse(a: GfElem) -> bool {
        match (a, a.inverse()) {
            (GfElem::ZERO, None) => true,
            (_, Some(a_inv)) => a * a_inv == GfElem::ONE,
            _ => false,
        }
    }

    #[quickcheck]
    fn div_mul_invertibility(a: GfElem, b: GfElem) -> TestResult {
        match b {
            GfElem::ZERO => TestResult::discard(),
            _ => TestResult::from_bool((a / b) * b == a),
        }
    }

    #[quickcheck]
    fn fractions(a: GfElem, b: GfElem, c: GfElem, d: GfElem) -> TestResult {
        match (b, d) {
            (GfElem::ZERO, _) | (_, GfElem::ZERO) => TestResult::discard(),
            _ => TestResult::from_bool(((a / b) + (c / d)) == (((a * d) + (c * b)) / (b * d))),
        }
    }

    #[test]
    fn reduction_polynomial() {
        // x^31 * x = x^32 = x^22 + x^2 + x + 1 (mod P).
        let x31 = GfElem::from_inner(1 << 31);
        let x = GfElem::from_inner(2);
        assert_eq!(x31 * x, GfElem::from_inner((1 << 22) | 0b111));
    }

    #[test]
    fn bytes_partial() {
        let (elem, remain) = GfElem::from_bytes_partial(&[1, 2, 3, 4, 5]);
        assert_eq!(elem, GfElem::from_inner(0x04030201));
        assert_eq!(remain, &[5]);

        let (elem, remain) = GfElem::from_bytes_partial(&[0xff]);
        assert_eq!(elem, GfElem::from_inner(0xff));
        assert!(remain.is_empty());
    }

    // Obviously-correct (and slow) reference for GfPolynomial::evaluate.
    fn manual_poly(poly: &GfPolynomial, x: GfElem) -> GfElem {
        poly.0
            .iter()
            .enumerate()
            .map(|(n, coeff)| *coeff * x.pow(n as u64))
            .fold(GfElem::ZERO, Add::add)
    }

    #[quickcheck]
    fn polynomial_evaluate(poly: GfPolynomial, x: GfElem) -> bool {
        poly.evaluate(x) == manual_poly(&poly, x)
    }

    #[quickcheck]
    fn polynomial_constant(poly: GfPolynomial) -> bool {
        poly.evaluate(GfElem::ZERO) == poly.constant()
    }

    fn sample_points(poly: &GfPolynomial, count: usize, seed: u64) -> Vec<GfPoint> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut xs: Vec<GfElem> = vec![];
        while xs.len() < count {
            let x = GfElem::new_rand_nonzero(&mut rng);
            if !xs.contains(&x) {
                xs.push(x);
            }
        }
        xs.into_iter().map(|x| (x, poly.evaluate(x))).collect()
    }

    #[quickcheck]
    fn polynomial_lagrange_constant(poly: GfPolynomial, seed: u64) -> bool {
        let n = poly.degree();
        let points = sample_points(&poly, n as usize + 1, seed);
        let constant = GfPolynomial::lagrange_constant(n, &points)
            .expect("should not get errors from lagrange_constant");
        poly.constant() == constant
    }

    #[quickcheck]
    fn polynomial_lagrange_evaluate(poly: GfPolynomial, x: GfElem, seed: u64) -> bool {
        let n = poly.degree();
        let points = sample_points(&poly, n as usize + 1, seed);
        let y = GfPolynomial::lagrange_evaluate(n, &points, x)
            .expect("should not get errors from lagrange_evaluate");
        poly.evaluate(x) == y
    }

    #[quickcheck]
    fn lagrange_wrong_point_count(poly: GfPolynomial, seed: u64) -> bool {
        let n = poly.degree();
        let points = sample_points(&poly, n as usize + 2, seed);
        matches!(
            GfPolynomial::lagrange_constant(n, &points),
            Err(Error::NumPointsMismatch { .. })
        )
    }

    #[test]
    fn lagrange_duplicate_points() {
        let x = GfElem::from_inner(7);
        let points = [(x, GfElem::ONE), (x, GfElem::ZERO)];
        assert!(matches!(
            GfPolynomial::lagrange_constant(1, points),
            Err(Error::DuplicatePoint(7))
        ));
        assert!(matches!(
            GfPolynomial::lagrange_evaluate(1, points, GfElem::ONE),
            Err(Error::DuplicatePoint(7))
        ));
    }

    #[test]
    fn lagrange_zero_point() {
        let points = [(GfElem::ZERO, GfElem::ONE), (GfElem::ONE, GfElem::ONE)];
        assert!(matches!(
            GfPolynomial::lagrange_constant(1, points),
            Err(Error::NonInvertiblePoint)
        ));
    }
}
