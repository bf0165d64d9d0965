//! Algebraic Intermediate Representation: polynomial constraints over the
//! rows of a trace table, and the machinery to turn them into quotients.
//!
//! An [`Air`] consists of four families of [`Constraint`]s:
//! - [initial](Constraint::Initial) constraints apply to the first row only,
//! - [consistency](Constraint::Consistency) constraints apply to every row,
//! - [transition](Constraint::Transition) constraints apply to every pair of
//!   consecutive rows, and
//! - [terminal](Constraint::Terminal) constraints apply to the last row only.
//!
//! Wherever constraints are combined, they are combined in this global order:
//! initial, consistency, transition, terminal. Within a family, the
//! registration order is kept.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::ops::Mul;
use std::ops::MulAssign;
use std::sync::Arc;

use itertools::Itertools;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;
use num_traits::ConstZero;
use rayon::prelude::*;
use strum::Display;
use strum::EnumDiscriminants;
use strum::EnumIter;
use twenty_first::math::traits::FiniteField;
use twenty_first::prelude::*;

use crate::arithmetic_domain::ArithmeticDomain;
use crate::error::AirError;
use crate::error::USIZE_TO_U64_ERR;
use crate::stark::ProverDomains;
use crate::table::COL_AXIS;
use crate::table::ROW_AXIS;

type Result<T> = std::result::Result<T, AirError>;

/// Evaluates a constraint on a single row.
pub type RowEvaluator = Arc<dyn Fn(&[BFieldElement]) -> BFieldElement + Send + Sync>;

/// Evaluates a constraint on a pair of consecutive rows: current, then next.
pub type RowPairEvaluator =
    Arc<dyn Fn(&[BFieldElement], &[BFieldElement]) -> BFieldElement + Send + Sync>;

/// A single polynomial constraint. Evaluates to zero on every row (or pair of
/// rows) it applies to if and only if the trace is valid.
#[derive(Clone, EnumDiscriminants)]
#[strum_discriminants(name(ConstraintKind))]
#[strum_discriminants(derive(Display, Hash, PartialOrd, Ord, EnumIter))]
pub enum Constraint {
    Initial {
        name: String,
        degree: usize,
        evaluator: RowEvaluator,
    },
    Consistency {
        name: String,
        degree: usize,
        evaluator: RowEvaluator,
    },
    Transition {
        name: String,
        degree: usize,
        evaluator: RowPairEvaluator,
    },
    Terminal {
        name: String,
        degree: usize,
        evaluator: RowEvaluator,
    },
}

impl Debug for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("degree", &self.degree())
            .finish_non_exhaustive()
    }
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        self.into()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Initial { name, .. }
            | Self::Consistency { name, .. }
            | Self::Transition { name, .. }
            | Self::Terminal { name, .. } => name,
        }
    }

    /// The degree of the constraint's polynomial in the row variables.
    pub fn degree(&self) -> usize {
        match self {
            Self::Initial { degree, .. }
            | Self::Consistency { degree, .. }
            | Self::Transition { degree, .. }
            | Self::Terminal { degree, .. } => *degree,
        }
    }

    /// Evaluate the constraint. Only [transition](Self::Transition)
    /// constraints look at the `next` row.
    pub fn evaluate(&self, current: &[BFieldElement], next: &[BFieldElement]) -> BFieldElement {
        match self {
            Self::Initial { evaluator, .. }
            | Self::Consistency { evaluator, .. }
            | Self::Terminal { evaluator, .. } => evaluator(current),
            Self::Transition { evaluator, .. } => evaluator(current, next),
        }
    }

    /// Whether the constraint applies to the row with the given index in a
    /// table of the given height.
    fn applies_to_row(&self, row_index: usize, num_rows: usize) -> bool {
        match self.kind() {
            ConstraintKind::Initial => row_index == 0,
            ConstraintKind::Consistency => true,
            ConstraintKind::Transition => row_index + 1 < num_rows,
            ConstraintKind::Terminal => row_index + 1 == num_rows,
        }
    }
}

/// A set of [`Constraint`]s over a table with a fixed number of columns.
#[derive(Debug, Clone)]
pub struct Air {
    num_columns: usize,
    initial: Vec<Constraint>,
    consistency: Vec<Constraint>,
    transition: Vec<Constraint>,
    terminal: Vec<Constraint>,
}

impl Air {
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_columns,
            initial: vec![],
            consistency: vec![],
            transition: vec![],
            terminal: vec![],
        }
    }

    #[must_use]
    pub fn with_initial_constraint<F>(mut self, name: &str, degree: usize, evaluator: F) -> Self
    where
        F: Fn(&[BFieldElement]) -> BFieldElement + Send + Sync + 'static,
    {
        self.initial.push(Constraint::Initial {
            name: name.to_string(),
            degree,
            evaluator: Arc::new(evaluator),
        });
        self
    }

    #[must_use]
    pub fn with_consistency_constraint<F>(
        mut self,
        name: &str,
        degree: usize,
        evaluator: F,
    ) -> Self
    where
        F: Fn(&[BFieldElement]) -> BFieldElement + Send + Sync + 'static,
    {
        self.consistency.push(Constraint::Consistency {
            name: name.to_string(),
            degree,
            evaluator: Arc::new(evaluator),
        });
        self
    }

    #[must_use]
    pub fn with_transition_constraint<F>(mut self, name: &str, degree: usize, evaluator: F) -> Self
    where
        F: Fn(&[BFieldElement], &[BFieldElement]) -> BFieldElement + Send + Sync + 'static,
    {
        self.transition.push(Constraint::Transition {
            name: name.to_string(),
            degree,
            evaluator: Arc::new(evaluator),
        });
        self
    }

    #[must_use]
    pub fn with_terminal_constraint<F>(mut self, name: &str, degree: usize, evaluator: F) -> Self
    where
        F: Fn(&[BFieldElement]) -> BFieldElement + Send + Sync + 'static,
    {
        self.terminal.push(Constraint::Terminal {
            name: name.to_string(),
            degree,
            evaluator: Arc::new(evaluator),
        });
        self
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// All constraints in the global order: initial, consistency, transition,
    /// terminal.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.initial
            .iter()
            .chain(&self.consistency)
            .chain(&self.transition)
            .chain(&self.terminal)
    }

    pub fn num_constraints(&self) -> usize {
        self.initial.len() + self.consistency.len() + self.transition.len() + self.terminal.len()
    }

    /// The highest degree of any constraint, but at least 1.
    pub fn max_constraint_degree(&self) -> usize {
        self.constraints()
            .map(Constraint::degree)
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// An upper bound on the degree of any polynomial the prover sends to the
    /// low-degree test, given the length of the randomized trace domain.
    pub fn max_degree(&self, randomized_trace_len: usize) -> usize {
        let interpolant_degree = randomized_trace_len.saturating_sub(1);
        self.max_constraint_degree() * interpolant_degree
    }

    /// The challenge scaling the constraint at position `index` in the
    /// global order.
    fn challenge(challenges: &[XFieldElement], index: usize) -> XFieldElement {
        challenges[index % challenges.len()]
    }

    fn check_challenges(&self, challenges: &[XFieldElement]) -> Result<()> {
        if challenges.is_empty() && self.num_constraints() > 0 {
            return Err(AirError::NoChallenges(self.num_constraints()));
        }
        Ok(())
    }

    /// One composition value per row of the table: the sum of every
    /// applicable constraint, each scaled by its own challenge.
    ///
    /// Challenges are consumed in the global constraint order and cycle if
    /// there are fewer challenges than constraints.
    ///
    /// # Errors
    ///
    /// Errors if the table's height differs from the domain's length, if the
    /// table's width differs from the [number of columns](Self::num_columns),
    /// or if there are constraints but no challenges.
    pub fn evaluate_composition(
        &self,
        table: ArrayView2<BFieldElement>,
        domain: ArithmeticDomain,
        challenges: &[XFieldElement],
    ) -> Result<Vec<XFieldElement>> {
        if table.nrows() != domain.len() {
            return Err(AirError::TableDomainMismatch {
                rows: table.nrows(),
                domain_len: domain.len(),
            });
        }
        if table.ncols() != self.num_columns {
            return Err(AirError::ColumnCountMismatch {
                expected: self.num_columns,
                got: table.ncols(),
            });
        }
        self.check_challenges(challenges)?;

        let num_rows = table.nrows();
        let composition = (0..num_rows)
            .into_par_iter()
            .map(|row_index| {
                let current = table.row(row_index).to_vec();
                let next = table.row((row_index + 1) % num_rows).to_vec();
                self.constraints()
                    .enumerate()
                    .filter(|(_, constraint)| constraint.applies_to_row(row_index, num_rows))
                    .map(|(i, constraint)| {
                        Self::challenge(challenges, i) * constraint.evaluate(&current, &next)
                    })
                    .sum()
            })
            .collect();

        Ok(composition)
    }

    /// Interpolate the composition of the trace rows and divide it by the
    /// trace domain's zerofier.
    ///
    /// The randomized table holds the trace rows on the even-indexed points of
    /// the randomized trace domain, which form the trace domain. The
    /// composition is evaluated there and set to zero on the odd coset.
    ///
    /// A non-zero remainder means that some constraint is violated. It is
    /// logged but not treated as an error; the caller decides.
    ///
    /// # Errors
    ///
    /// Errors if the randomized table does not fit the randomized trace
    /// domain, or for the same reasons as
    /// [`evaluate_composition`](Self::evaluate_composition).
    pub fn compute_quotient_polynomials(
        &self,
        randomized_table: ArrayView2<BFieldElement>,
        domains: &ProverDomains,
        challenges: &[XFieldElement],
    ) -> Result<QuotientPolynomials> {
        let randomized_trace_domain = domains.randomized_trace;
        if randomized_table.nrows() != randomized_trace_domain.len() {
            return Err(AirError::TableDomainMismatch {
                rows: randomized_table.nrows(),
                domain_len: randomized_trace_domain.len(),
            });
        }

        let trace_rows = randomized_table.slice(s![..;2, ..]);
        let composition = self.evaluate_composition(trace_rows, domains.trace, challenges)?;

        let mut composition_codeword = vec![XFieldElement::ZERO; randomized_trace_domain.len()];
        for (value, &composition_value) in composition_codeword
            .iter_mut()
            .step_by(2)
            .zip_eq(&composition)
        {
            *value = composition_value;
        }
        let composition_polynomial = randomized_trace_domain.interpolate(&composition_codeword);

        let (quotient, remainder) = domains.trace.divide_by_zerofier(&composition_polynomial);
        if remainder.degree() >= 0 {
            tracing::warn!(
                remainder_degree = remainder.degree(),
                "composition polynomial is not divisible by the trace domain's zerofier"
            );
        }

        Ok(QuotientPolynomials {
            quotient,
            remainder,
        })
    }

    /// The value of the combined quotient in a single point `x`, given the
    /// rows at `x` and at `ω·x`, where `ω` generates the trace domain.
    ///
    /// Each constraint's value is scaled by its challenge and divided by the
    /// zerofier of its family.
    ///
    /// # Errors
    ///
    /// Errors if there are constraints but no challenges.
    pub fn quotient_value(
        &self,
        current: &[BFieldElement],
        next: &[BFieldElement],
        zerofier_inverses: ZerofierInverses,
        challenges: &[XFieldElement],
    ) -> Result<XFieldElement> {
        self.check_challenges(challenges)?;
        Ok(self.unchecked_quotient_value(current, next, zerofier_inverses, challenges))
    }

    fn unchecked_quotient_value(
        &self,
        current: &[BFieldElement],
        next: &[BFieldElement],
        zerofier_inverses: ZerofierInverses,
        challenges: &[XFieldElement],
    ) -> XFieldElement {
        self.constraints()
            .enumerate()
            .map(|(i, constraint)| {
                let value = constraint.evaluate(current, next);
                let zerofier_inverse = zerofier_inverses.for_kind(constraint.kind());
                Self::challenge(challenges, i) * (value * zerofier_inverse)
            })
            .sum()
    }

    /// The combined quotient in every point of the given domain, computed
    /// pointwise from the low-degree extended table.
    ///
    /// Row `i` of the table must hold the extended columns evaluated in the
    /// `i`th point of the domain. The domain must not intersect the trace
    /// domain.
    ///
    /// # Errors
    ///
    /// Errors if the table does not fit the domain or the AIR, if the domain
    /// intersects the trace domain, or if there are constraints but no
    /// challenges.
    pub fn all_quotients_combined(
        &self,
        extended_table: ArrayView2<BFieldElement>,
        trace_domain: ArithmeticDomain,
        domain: ArithmeticDomain,
        challenges: &[XFieldElement],
    ) -> Result<Vec<XFieldElement>> {
        if extended_table.nrows() != domain.len() {
            return Err(AirError::TableDomainMismatch {
                rows: extended_table.nrows(),
                domain_len: domain.len(),
            });
        }
        if extended_table.ncols() != self.num_columns {
            return Err(AirError::ColumnCountMismatch {
                expected: self.num_columns,
                got: extended_table.ncols(),
            });
        }
        if domain.len() < trace_domain.len() {
            return Err(AirError::TableDomainMismatch {
                rows: domain.len(),
                domain_len: trace_domain.len(),
            });
        }
        if domain.is_subgroup() {
            return Err(AirError::DomainIntersectsTraceDomain(domain.offset));
        }
        self.check_challenges(challenges)?;

        let initial = initial_quotient_zerofier_inverse(domain);
        let consistency = consistency_quotient_zerofier_inverse(trace_domain, domain);
        let transition = transition_quotient_zerofier_inverse(trace_domain, domain);
        let terminal = terminal_quotient_zerofier_inverse(trace_domain, domain);

        let unit_distance = domain.len() / trace_domain.len();
        let quotient_codeword = (0..domain.len())
            .into_par_iter()
            .map(|row_index| {
                let next_row_index = (row_index + unit_distance) % domain.len();
                let current = extended_table.row(row_index).to_vec();
                let next = extended_table.row(next_row_index).to_vec();
                let zerofier_inverses = ZerofierInverses {
                    initial: initial[row_index],
                    consistency: consistency[row_index],
                    transition: transition[row_index],
                    terminal: terminal[row_index],
                };
                self.unchecked_quotient_value(&current, &next, zerofier_inverses, challenges)
            })
            .collect();

        Ok(quotient_codeword)
    }
}

/// The result of [`Air::compute_quotient_polynomials`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QuotientPolynomials {
    pub quotient: Polynomial<'static, XFieldElement>,

    /// Zero if and only if every constraint holds on every row it applies to.
    pub remainder: Polynomial<'static, XFieldElement>,
}

impl QuotientPolynomials {
    pub fn has_zero_remainder(&self) -> bool {
        self.remainder.degree() < 0
    }
}

/// The inverses of the four constraint families' zerofiers in one point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ZerofierInverses {
    pub initial: BFieldElement,
    pub consistency: BFieldElement,
    pub transition: BFieldElement,
    pub terminal: BFieldElement,
}

impl ZerofierInverses {
    /// # Panics
    ///
    /// Panics if `x` is a point of the trace domain.
    pub fn at(x: BFieldElement, trace_domain: ArithmeticDomain) -> Self {
        let trace_len = u64::try_from(trace_domain.len()).expect(USIZE_TO_U64_ERR);
        let trace_domain_generator_inverse = trace_domain.generator.inverse();
        let subgroup_zerofier_inverse = (x.mod_pow(trace_len) - bfe!(1)).inverse();

        Self {
            initial: (x - bfe!(1)).inverse(),
            consistency: subgroup_zerofier_inverse,
            transition: (x - trace_domain_generator_inverse) * subgroup_zerofier_inverse,
            terminal: (x - trace_domain_generator_inverse).inverse(),
        }
    }

    fn for_kind(self, kind: ConstraintKind) -> BFieldElement {
        match kind {
            ConstraintKind::Initial => self.initial,
            ConstraintKind::Consistency => self.consistency,
            ConstraintKind::Transition => self.transition,
            ConstraintKind::Terminal => self.terminal,
        }
    }
}

pub fn initial_quotient_zerofier_inverse(domain: ArithmeticDomain) -> Vec<BFieldElement> {
    let zerofier_codeword = domain.elements().map(|x| x - bfe!(1)).collect();
    BFieldElement::batch_inversion(zerofier_codeword)
}

pub fn consistency_quotient_zerofier_inverse(
    trace_domain: ArithmeticDomain,
    domain: ArithmeticDomain,
) -> Vec<BFieldElement> {
    let trace_len = u64::try_from(trace_domain.len()).expect(USIZE_TO_U64_ERR);
    let zerofier_codeword = domain
        .elements()
        .map(|x| x.mod_pow(trace_len) - bfe!(1))
        .collect();
    BFieldElement::batch_inversion(zerofier_codeword)
}

pub fn transition_quotient_zerofier_inverse(
    trace_domain: ArithmeticDomain,
    domain: ArithmeticDomain,
) -> Vec<BFieldElement> {
    let trace_domain_generator_inverse = trace_domain.generator.inverse();
    let domain_values = domain.values();

    let subgroup_zerofier_inverse = consistency_quotient_zerofier_inverse(trace_domain, domain);
    domain_values
        .into_par_iter()
        .zip_eq(subgroup_zerofier_inverse)
        .map(|(x, sub_z_inv)| (x - trace_domain_generator_inverse) * sub_z_inv)
        .collect()
}

pub fn terminal_quotient_zerofier_inverse(
    trace_domain: ArithmeticDomain,
    domain: ArithmeticDomain,
) -> Vec<BFieldElement> {
    // the last point of the trace domain is the generator's inverse
    let trace_domain_generator_inverse = trace_domain.generator.inverse();
    let zerofier_codeword = domain
        .elements()
        .map(|x| x - trace_domain_generator_inverse)
        .collect();
    BFieldElement::batch_inversion(zerofier_codeword)
}

/// Evaluate every polynomial on every point of the domain, in parallel across
/// polynomials. Column `i` of the result holds the evaluations of polynomial
/// `i`.
pub fn parallel_evaluate_quotients<FF>(
    polynomials: &[Polynomial<'static, FF>],
    domain: ArithmeticDomain,
) -> Array2<FF>
where
    FF: FiniteField + MulAssign<BFieldElement> + Mul<BFieldElement, Output = FF>,
{
    let mut codewords = Array2::zeros([domain.len(), polynomials.len()]);
    Zip::from(codewords.axis_iter_mut(COL_AXIS))
        .and(Array1::from_iter(polynomials).axis_iter(ROW_AXIS))
        .par_for_each(|codeword, polynomial| {
            let evaluations = domain.evaluate(polynomial[()]);
            Array1::from(evaluations).move_into(codeword);
        });

    codewords
}
