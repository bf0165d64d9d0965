use std::iter::FusedIterator;
use std::ops::Mul;
use std::ops::MulAssign;

use arbitrary::Arbitrary;
use num_traits::Zero;
use serde::Deserialize;
use serde::Serialize;
use twenty_first::math::ntt::intt;
use twenty_first::math::ntt::ntt;
use twenty_first::math::traits::FiniteField;
use twenty_first::math::traits::PrimitiveRootOfUnity;
use twenty_first::prelude::*;

use crate::error::ArithmeticDomainError;
use crate::error::USIZE_TO_U64_ERR;

type Result<T> = std::result::Result<T, ArithmeticDomainError>;

/// A coset `{offset · generator^i : i = 0..length}` of a multiplicative
/// subgroup of the field, where `length` is a power of two and `generator`
/// is a primitive `length`-th root of unity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Arbitrary)]
pub struct ArithmeticDomain {
    pub offset: BFieldElement,
    pub generator: BFieldElement,
    pub length: usize,
}

impl ArithmeticDomain {
    /// Create a new domain with the given length and offset 1.
    ///
    /// # Errors
    ///
    /// Errors if the domain length is not a power of 2, or if the field does
    /// not contain a subgroup of that order.
    pub fn of_length(length: usize) -> Result<Self> {
        let domain = Self {
            offset: bfe!(1),
            generator: Self::generator_for_length(length)?,
            length,
        };
        Ok(domain)
    }

    /// The primitive root of unity generating the subgroup of the given
    /// length.
    ///
    /// # Errors
    ///
    /// Errors if the domain length is not a power of 2, or if the field does
    /// not contain a subgroup of that order.
    pub fn generator_for_length(length: usize) -> Result<BFieldElement> {
        if !length.is_power_of_two() {
            return Err(ArithmeticDomainError::NotAPowerOfTwo(length));
        }

        let length = u64::try_from(length).expect(USIZE_TO_U64_ERR);
        BFieldElement::primitive_root_of_unity(length)
            .ok_or(ArithmeticDomainError::PrimitiveRootNotSupported(length))
    }

    #[must_use]
    pub fn with_offset(mut self, offset: BFieldElement) -> Self {
        self.offset = offset;
        self
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// Never true, but expected by clippy alongside [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The domain of half the length, consisting of the squares of this
    /// domain's elements. Offset and generator are squared.
    ///
    /// # Errors
    ///
    /// Errors if the domain has fewer than 2 elements.
    pub fn halve(&self) -> Result<Self> {
        if self.length < 2 {
            return Err(ArithmeticDomainError::TooSmallForHalving(self.length));
        }

        let domain = Self {
            offset: self.offset * self.offset,
            generator: self.generator * self.generator,
            length: self.length / 2,
        };
        Ok(domain)
    }

    /// The domain of twice the length with the same offset. The generator is
    /// a freshly looked-up primitive root of unity of the doubled order.
    ///
    /// # Errors
    ///
    /// Errors only if the field has no subgroup of the doubled order.
    pub fn double(&self) -> Result<Self> {
        let length = self.length.checked_mul(2).ok_or_else(|| {
            let length = u64::try_from(self.length).expect(USIZE_TO_U64_ERR);
            ArithmeticDomainError::PrimitiveRootNotSupported(length.saturating_mul(2))
        })?;
        let domain = Self::of_length(length)?.with_offset(self.offset);
        Ok(domain)
    }

    /// Whether the domain is the multiplicative subgroup of its length. Only
    /// then does it share points with any subgroup of at most its length; a
    /// proper coset is disjoint from all of them.
    pub fn is_subgroup(&self) -> bool {
        self.offset_to_the_length() == bfe!(1)
    }

    /// A lazy iterator over all domain elements, in order.
    pub fn elements(&self) -> DomainElements {
        DomainElements {
            next: self.offset,
            generator: self.generator,
            remaining: self.length,
        }
    }

    pub fn value(&self, index: u32) -> BFieldElement {
        self.offset * self.generator.mod_pow(u64::from(index))
    }

    /// Like [`value`](Self::value), but indexed by `usize`. Indices beyond the
    /// domain's length wrap around.
    pub fn value_at(&self, index: usize) -> BFieldElement {
        let index = u64::try_from(index).expect(USIZE_TO_U64_ERR);
        self.offset * self.generator.mod_pow(index)
    }

    pub fn values(&self) -> Vec<BFieldElement> {
        self.elements().collect()
    }

    /// Evaluate the polynomial on every point of the domain.
    ///
    /// Polynomials of degree at least the domain's length are handled
    /// correctly: their coefficients are reduced modulo `X^length - 1` after
    /// adjusting for the offset.
    pub fn evaluate<FF>(&self, polynomial: &Polynomial<FF>) -> Vec<FF>
    where
        FF: FiniteField + MulAssign<BFieldElement> + Mul<BFieldElement, Output = FF>,
    {
        let mut codeword = vec![FF::zero(); self.length];
        let mut offset_power = bfe!(1);
        for (i, &coefficient) in polynomial.coefficients().iter().enumerate() {
            codeword[i % self.length] += coefficient * offset_power;
            offset_power *= self.offset;
        }
        ntt(&mut codeword);

        codeword
    }

    /// The polynomial of degree less than the domain's length that agrees
    /// with the given values on the domain.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the domain's length.
    pub fn interpolate<FF>(&self, values: &[FF]) -> Polynomial<'static, FF>
    where
        FF: FiniteField + MulAssign<BFieldElement> + Mul<BFieldElement, Output = FF>,
    {
        assert_eq!(self.length, values.len(), "values must match the domain");

        let mut coefficients = values.to_vec();
        intt(&mut coefficients);

        let offset_inverse = self.offset.inverse();
        let mut scale = bfe!(1);
        for coefficient in &mut coefficients {
            *coefficient *= scale;
            scale *= offset_inverse;
        }

        Polynomial::new(coefficients)
    }

    pub fn low_degree_extension<FF>(&self, codeword: &[FF], target_domain: Self) -> Vec<FF>
    where
        FF: 'static + FiniteField + MulAssign<BFieldElement> + Mul<BFieldElement, Output = FF>,
    {
        target_domain.evaluate(&self.interpolate(codeword))
    }

    /// `offset^length`, the constant such that `X^length - offset^length`
    /// vanishes on the domain.
    fn offset_to_the_length(&self) -> BFieldElement {
        let length = u64::try_from(self.length).expect(USIZE_TO_U64_ERR);
        self.offset.mod_pow(length)
    }

    /// The polynomial `X^length - offset^length` that evaluates to 0 on the
    /// domain and nowhere else.
    pub fn zerofier(&self) -> Polynomial<'static, BFieldElement> {
        let mut coefficients = vec![bfe!(0); self.length + 1];
        coefficients[0] = -self.offset_to_the_length();
        coefficients[self.length] = bfe!(1);

        Polynomial::new(coefficients)
    }

    /// Multiply the given polynomial with the [zerofier](Self::zerofier),
    /// without general polynomial multiplication.
    pub fn mul_zerofier_with<FF>(&self, polynomial: Polynomial<FF>) -> Polynomial<'static, FF>
    where
        FF: FiniteField + Mul<BFieldElement, Output = FF>,
    {
        let coefficients = polynomial.coefficients();
        let constant = self.offset_to_the_length();

        let mut product = vec![FF::zero(); coefficients.len() + self.length];
        for (i, &coefficient) in coefficients.iter().enumerate() {
            product[i + self.length] += coefficient;
            product[i] -= coefficient * constant;
        }

        Polynomial::new(product)
    }

    /// Divide the given polynomial by the [zerofier](Self::zerofier).
    /// Returns the quotient and the remainder, in that order. The remainder
    /// has degree less than the domain's length and is zero if and only if
    /// the polynomial vanishes on the entire domain.
    pub fn divide_by_zerofier<FF>(
        &self,
        polynomial: &Polynomial<FF>,
    ) -> (Polynomial<'static, FF>, Polynomial<'static, FF>)
    where
        FF: FiniteField + Mul<BFieldElement, Output = FF>,
    {
        let constant = self.offset_to_the_length();
        let mut remainder = polynomial.coefficients().to_vec();
        let quotient_len = remainder.len().saturating_sub(self.length);
        let mut quotient = vec![FF::zero(); quotient_len];

        // X^n ≡ c  (mod X^n - c)
        for i in (self.length..remainder.len()).rev() {
            let leading_coefficient = remainder[i];
            if leading_coefficient.is_zero() {
                continue;
            }
            quotient[i - self.length] = leading_coefficient;
            remainder[i] = FF::zero();
            remainder[i - self.length] += leading_coefficient * constant;
        }
        remainder.truncate(self.length);

        (Polynomial::new(quotient), Polynomial::new(remainder))
    }
}

/// The elements of an [`ArithmeticDomain`], produced on demand.
///
/// Clone the iterator (or call [`ArithmeticDomain::elements`] again) to
/// restart it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DomainElements {
    next: BFieldElement,
    generator: BFieldElement,
    remaining: usize,
}

impl Iterator for DomainElements {
    type Item = BFieldElement;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let current = self.next;
        self.next *= self.generator;
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for DomainElements {}

impl FusedIterator for DomainElements {}
