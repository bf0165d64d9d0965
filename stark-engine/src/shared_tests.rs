#![cfg(test)]

use num_traits::ConstZero;
use proptest::collection::vec;
use proptest::prelude::*;
use proptest_arbitrary_interop::arb;
use twenty_first::prelude::*;

use crate::stark::Prover;
use crate::stark::StarkParameters;
use crate::stark::Verifier;

prop_compose! {
    pub(crate) fn arbitrary_polynomial()(
        degree in -1_i64..1 << 10,
    )(
        polynomial in arbitrary_polynomial_of_degree(degree),
    ) -> Polynomial<'static, XFieldElement> {
        polynomial
    }
}

prop_compose! {
    pub(crate) fn arbitrary_polynomial_of_degree(degree: i64)(
        leading_coefficient in arb::<XFieldElement>(),
        other_coefficients in vec(arb::<XFieldElement>(), degree.try_into().unwrap_or(0)),
    ) -> Polynomial<'static, XFieldElement> {
        let leading_coefficient = if leading_coefficient == XFieldElement::ZERO {
            xfe!(1)
        } else {
            leading_coefficient
        };
        let coefficients = match degree >= 0 {
            true => [other_coefficients, vec![leading_coefficient]].concat(),
            false => vec![],
        };
        let polynomial = Polynomial::new(coefficients);
        assert_eq!(degree, polynomial.degree() as i64);
        polynomial
    }
}

/// Parameters that keep tests fast. Do not use in production.
pub(crate) fn low_security_parameters() -> StarkParameters {
    StarkParameters {
        security_level: 80,
        fri_expansion_factor: 4,
        num_trace_randomizers: 4,
        num_collinearity_checks: 27,
    }
}

pub(crate) fn low_security_prover() -> Prover {
    Prover::new(low_security_parameters())
}

pub(crate) fn low_security_verifier() -> Verifier {
    Verifier::new(low_security_parameters())
}
