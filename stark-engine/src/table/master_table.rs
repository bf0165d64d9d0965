//! The Master Table holds all trace columns and presents them in the forms
//! the prover needs.
//!
//! The lifecycle of a [`MasterTable`] is as follows:
//! 1. The table is instantiated from the trace columns. Every column is
//!    extended by its trace randomizers and then padded to the length of the
//!    randomized trace domain. This step is also known as “trace
//!    randomization.”
//! 2. The randomized columns are used to [compute the quotients][quot] of the
//!    AIR.
//! 3. Each column is [low-degree extended][lde] onto the FRI domain.
//! 4. Each row of the low-degree extended table is hashed into one leaf of a
//!    [Merkle tree][tree], whose root commits the prover to the entire table.
//! 5. Individual rows are [revealed][reveal] to the verifier.
//!
//! The randomized column occupies the randomized trace domain as follows: the
//! first half of the column (the trace rows, or the trace rows and some
//! randomizers) lives on the trace domain, _i.e._, the even-indexed points of
//! the randomized trace domain. The second half lives on the odd-indexed
//! points.
//!
//! [quot]: MasterTable::compute_quotients
//! [lde]: MasterTable::low_degree_extend
//! [tree]: MasterTable::merkle_tree
//! [reveal]: MasterTable::reveal_rows

use itertools::Itertools;
use ndarray::Array0;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;
use num_traits::ConstZero;
use num_traits::ToBytes;
use num_traits::Zero;
use rand::prelude::*;
use rayon::prelude::*;
use twenty_first::prelude::*;

use crate::air::Air;
use crate::air::QuotientPolynomials;
use crate::config::QuotientRemainderPolicy;
use crate::config::quotient_remainder_policy;
use crate::error::AirError;
use crate::error::MasterTableError;
use crate::error::USIZE_TO_U64_ERR;
use crate::stark::ProverDomains;
use crate::table::COL_AXIS;
use crate::table::MasterTableRow;
use crate::table::ROW_AXIS;

type Result<T> = std::result::Result<T, MasterTableError>;

/// The seed from which all trace randomizers are derived.
pub type TraceRandomizerSeed = <StdRng as SeedableRng>::Seed;

#[derive(Debug, Clone)]
pub struct MasterTable {
    padded_height: usize,
    num_trace_randomizers: usize,
    trace_randomizer_seed: TraceRandomizerSeed,
    domains: ProverDomains,

    /// One row per point of the randomized trace domain.
    randomized_trace_table: Array2<BFieldElement>,

    /// One row per point of the FRI domain, once [computed][lde].
    ///
    /// [lde]: Self::low_degree_extend
    low_degree_extended_table: Option<Array2<BFieldElement>>,
}

impl MasterTable {
    /// Randomize the given trace columns and arrange them on the randomized
    /// trace domain.
    ///
    /// # Errors
    ///
    /// Errors if
    /// - there are no columns,
    /// - the columns have different lengths,
    /// - the columns are longer than the trace domain, or
    /// - the columns and their randomizers do not fit the randomized trace
    ///   domain.
    pub fn new(
        columns: &[Vec<BFieldElement>],
        domains: ProverDomains,
        num_trace_randomizers: usize,
        trace_randomizer_seed: TraceRandomizerSeed,
    ) -> Result<Self> {
        let Some(first_column) = columns.first() else {
            return Err(MasterTableError::NoColumns);
        };
        let padded_height = first_column.len();
        if let Some((column, got)) = columns
            .iter()
            .map(Vec::len)
            .find_position(|&len| len != padded_height)
        {
            return Err(MasterTableError::ColumnLengthMismatch {
                column,
                expected: padded_height,
                got,
            });
        }

        let trace_len = domains.trace.len();
        if padded_height > trace_len {
            return Err(MasterTableError::PaddedHeightExceedsTraceDomain {
                padded_height,
                trace_len,
            });
        }

        let randomized_len = domains.randomized_trace.len();
        let needed = padded_height + num_trace_randomizers;
        if padded_height == 0 || needed > randomized_len || randomized_len != 2 * trace_len {
            return Err(MasterTableError::RandomizedTraceDomainTooSmall {
                randomized_len,
                needed,
            });
        }

        let mut randomized_trace_table = Array2::zeros([randomized_len, columns.len()]);
        Zip::indexed(randomized_trace_table.axis_iter_mut(COL_AXIS)).par_for_each(
            |column_index, target_column| {
                let randomized_column = Self::randomized_column(
                    &columns[column_index],
                    column_index,
                    num_trace_randomizers,
                    trace_randomizer_seed,
                    domains,
                );
                Array1::from(randomized_column).move_into(target_column);
            },
        );

        tracing::debug!(
            padded_height,
            num_columns = columns.len(),
            randomized_len,
            "randomized trace table"
        );

        Ok(Self {
            padded_height,
            num_trace_randomizers,
            trace_randomizer_seed,
            domains,
            randomized_trace_table,
            low_degree_extended_table: None,
        })
    }

    /// The column, followed by its randomizers, followed by copies of the last
    /// element, arranged on the randomized trace domain.
    fn randomized_column(
        column: &[BFieldElement],
        column_index: usize,
        num_trace_randomizers: usize,
        seed: TraceRandomizerSeed,
        domains: ProverDomains,
    ) -> Vec<BFieldElement> {
        let randomized_len = domains.randomized_trace.len();
        let trace_len = domains.trace.len();

        let randomizers = (0..num_trace_randomizers)
            .map(|row_index| trace_randomizer(seed, column_index, row_index))
            .collect_vec();
        let mut stream = [column, &randomizers].concat();
        let last = stream.last().copied().unwrap_or_default();
        stream.resize(randomized_len, last);

        let mut randomized_column = vec![BFieldElement::ZERO; randomized_len];
        for (position, element) in stream.into_iter().enumerate() {
            randomized_column[Self::randomized_index(position, trace_len)] = element;
        }
        randomized_column
    }

    /// The index in the randomized trace domain of the element at the given
    /// position of a randomized column.
    fn randomized_index(position: usize, trace_len: usize) -> usize {
        if position < trace_len {
            2 * position
        } else {
            2 * (position - trace_len) + 1
        }
    }

    pub fn padded_height(&self) -> usize {
        self.padded_height
    }

    pub fn num_columns(&self) -> usize {
        self.randomized_trace_table.ncols()
    }

    pub fn num_trace_randomizers(&self) -> usize {
        self.num_trace_randomizers
    }

    pub fn trace_randomizer_seed(&self) -> TraceRandomizerSeed {
        self.trace_randomizer_seed
    }

    pub fn domains(&self) -> ProverDomains {
        self.domains
    }

    /// The randomized columns, one row per point of the randomized trace
    /// domain.
    pub fn randomized_table(&self) -> ArrayView2<'_, BFieldElement> {
        self.randomized_trace_table.view()
    }

    /// The trace rows, _i.e._, the rows of the [randomized table][table] on
    /// the points of the trace domain.
    ///
    /// [table]: Self::randomized_table
    pub fn trace_table(&self) -> ArrayView2<'_, BFieldElement> {
        self.randomized_trace_table.slice(s![..;2, ..])
    }

    /// The low-degree extended table, if [computed](Self::low_degree_extend).
    pub fn fri_domain_table(&self) -> Option<ArrayView2<'_, BFieldElement>> {
        self.low_degree_extended_table.as_ref().map(Array2::view)
    }

    /// Interpolate every randomized column over the randomized trace domain.
    pub fn interpolants(&self) -> Vec<Polynomial<'static, BFieldElement>> {
        let randomized_trace_domain = self.domains.randomized_trace;
        let mut interpolants = Array1::from_elem(self.num_columns(), Polynomial::zero());
        Zip::from(interpolants.axis_iter_mut(ROW_AXIS))
            .and(self.randomized_trace_table.axis_iter(COL_AXIS))
            .par_for_each(|interpolant, column| {
                let column_interpolant = randomized_trace_domain.interpolate(&column.to_vec());
                Array0::from_elem((), column_interpolant).move_into(interpolant);
            });
        interpolants.to_vec()
    }

    fn extend_all_columns(&self) -> Array2<BFieldElement> {
        let fri_domain = self.domains.fri;
        let interpolants = self.interpolants();

        let mut extended_columns = Array2::zeros([fri_domain.len(), self.num_columns()]);
        Zip::from(extended_columns.axis_iter_mut(COL_AXIS))
            .and(Array1::from(interpolants).axis_iter(ROW_AXIS))
            .par_for_each(|lde_column, interpolant| {
                let lde_codeword = fri_domain.evaluate(&interpolant[()]);
                Array1::from(lde_codeword).move_into(lde_column);
            });

        extended_columns
    }

    /// Low-degree extend all columns of the randomized trace table onto the FRI
    /// domain. The result can be accessed through
    /// [`fri_domain_table`](Self::fri_domain_table).
    ///
    /// Idempotent.
    pub fn low_degree_extend(&mut self) {
        if self.low_degree_extended_table.is_some() {
            return;
        }

        let _span = tracing::debug_span!("low-degree extension").entered();
        self.low_degree_extended_table = Some(self.extend_all_columns());
    }

    /// Hash every row of the low-degree extended table. If the table has not
    /// been [extended](Self::low_degree_extend), the extension is computed
    /// just in time, and not stored.
    pub fn hash_all_fri_domain_rows(&self) -> Vec<Digest> {
        let hash_rows = |table: ArrayView2<BFieldElement>| {
            table
                .axis_iter(ROW_AXIS)
                .into_par_iter()
                .map(|row| Tip5::hash_varlen(&row.to_vec()))
                .collect()
        };

        match self.fri_domain_table() {
            Some(table) => hash_rows(table),
            None => hash_rows(self.extend_all_columns().view()),
        }
    }

    /// Compute a Merkle tree of the low-degree extended table. Every row gives
    /// one leaf in the tree.
    ///
    /// # Errors
    ///
    /// Errors if the FRI domain's length is not a valid number of leaves.
    pub fn merkle_tree(&self) -> Result<MerkleTree> {
        let _span = tracing::debug_span!("Merkle tree").entered();
        let hashed_rows = self.hash_all_fri_domain_rows();
        Ok(MerkleTree::par_new(&hashed_rows)?)
    }

    /// Compute the quotient of the AIR's composition polynomial by the trace
    /// domain's zerofier, using the randomized columns.
    ///
    /// A non-zero remainder is handled according to the current
    /// [policy](crate::config::overwrite_quotient_remainder_policy_to).
    ///
    /// # Errors
    ///
    /// Errors if the table does not match the AIR, if there are no challenges
    /// for a non-empty AIR, or if the remainder is non-zero and the policy is
    /// [`Reject`](QuotientRemainderPolicy::Reject).
    pub fn compute_quotients(
        &self,
        air: &Air,
        challenges: &[XFieldElement],
    ) -> Result<QuotientPolynomials> {
        let _span = tracing::debug_span!("quotients").entered();
        let quotients =
            air.compute_quotient_polynomials(self.randomized_table(), &self.domains, challenges)?;

        let policy = quotient_remainder_policy();
        if policy == QuotientRemainderPolicy::Reject && !quotients.has_zero_remainder() {
            let degree = quotients.remainder.degree();
            return Err(AirError::NonZeroQuotientRemainder { degree }.into());
        }

        Ok(quotients)
    }

    /// The combined quotient of the AIR on every point of the FRI domain.
    ///
    /// # Errors
    ///
    /// See [`Air::all_quotients_combined`].
    pub fn quotient_codeword(
        &self,
        air: &Air,
        challenges: &[XFieldElement],
    ) -> Result<Vec<XFieldElement>> {
        let _span = tracing::debug_span!("quotient codeword").entered();
        let quotient_codeword = match self.fri_domain_table() {
            Some(table) => air.all_quotients_combined(
                table,
                self.domains.trace,
                self.domains.fri,
                challenges,
            ),
            None => air.all_quotients_combined(
                self.extend_all_columns().view(),
                self.domains.trace,
                self.domains.fri,
                challenges,
            ),
        }?;

        Ok(quotient_codeword)
    }

    /// The linear combination of the low-degree extended columns using the
    /// given weights, on every point of the FRI domain.
    ///
    /// # Panics
    ///
    /// Panics if the number of weights is unequal to the
    /// [number of columns][Self::num_columns].
    pub fn weighted_sum_of_columns(&self, weights: &[XFieldElement]) -> Vec<XFieldElement> {
        assert_eq!(self.num_columns(), weights.len());

        let weighted_sum = |table: ArrayView2<BFieldElement>| {
            table
                .axis_iter(ROW_AXIS)
                .into_par_iter()
                .map(|row| row.iter().zip_eq(weights).map(|(&r, &w)| w * r).sum())
                .collect()
        };

        match self.fri_domain_table() {
            Some(table) => weighted_sum(table),
            None => weighted_sum(self.extend_all_columns().view()),
        }
    }

    /// # Panics
    ///
    /// Panics if any of the requested indices is out of range; that is, larger
    /// than or equal to the length of the FRI domain.
    pub fn reveal_rows(&self, row_indices: &[usize]) -> Vec<MasterTableRow> {
        let reveal = |table: ArrayView2<BFieldElement>| {
            row_indices
                .iter()
                .map(|&row_index| table.row(row_index).to_vec())
                .collect()
        };

        match self.fri_domain_table() {
            Some(table) => reveal(table),
            None => reveal(self.extend_all_columns().view()),
        }
    }
}

/// A trace randomizer is a pseudo-random field element that only depends on the
/// seed, the column, and the row. Equal inputs give equal randomizers.
pub fn trace_randomizer(
    seed: TraceRandomizerSeed,
    column_index: usize,
    row_index: usize,
) -> BFieldElement {
    let column_index = u128::from(u64::try_from(column_index).expect(USIZE_TO_U64_ERR));
    let row_index = u128::from(u64::try_from(row_index).expect(USIZE_TO_U64_ERR));
    let offset = (column_index << 64) | row_index;

    let mut rng = rng_from_offset_seed(seed, offset);
    rng.random()
}

/// Create a [random-number generator](StdRng) from a seed and an offset.
fn rng_from_offset_seed<B>(mut seed: TraceRandomizerSeed, offset: B) -> StdRng
where
    B: ToBytes,
    <B as ToBytes>::Bytes: IntoIterator<Item = u8>,
{
    let offset_le_bytes = offset.to_le_bytes();

    // entire offset must be used
    debug_assert!(offset_le_bytes.as_ref().len() <= seed.len());

    // `to_le_bytes` yields any leading zeros _after_ bits of lesser
    // significance, making the operation independent of the target pointer
    // width. `StdRng` itself is documented as not being portable.
    for (seed_byte, offset_byte) in seed.iter_mut().zip(offset_le_bytes) {
        *seed_byte = seed_byte.wrapping_add(offset_byte);
    }

    StdRng::from_seed(seed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use assert2::assert;
    use assert2::let_assert;
    use proptest::prelude::*;
    use proptest_arbitrary_interop::arb;
    use test_strategy::proptest;

    use super::*;
    use crate::arithmetic_domain::ArithmeticDomain;
    use crate::config::overwrite_quotient_remainder_policy_to;
    use crate::error::AirError;
    use crate::example_airs::fibonacci_air;
    use crate::example_airs::fibonacci_trace;

    const SEED: TraceRandomizerSeed = [7; 32];

    fn fri_domain(length: usize) -> ArithmeticDomain {
        ArithmeticDomain::of_length(length)
            .unwrap()
            .with_offset(BFieldElement::generator())
    }

    fn domains_for(padded_height: usize, num_trace_randomizers: usize) -> ProverDomains {
        let max_degree = 2 * padded_height;
        let fri_len = (max_degree + 1).next_power_of_two() * 4;
        ProverDomains::derive(
            padded_height,
            num_trace_randomizers,
            fri_domain(fri_len),
            max_degree,
        )
        .unwrap()
    }

    fn fibonacci_table(padded_height: usize) -> MasterTable {
        let trace = fibonacci_trace(padded_height);
        let domains = domains_for(padded_height, 4);
        MasterTable::new(&trace, domains, 4, SEED).unwrap()
    }

    #[test]
    fn table_without_columns_is_rejected() {
        let domains = domains_for(8, 4);
        let_assert!(Err(err) = MasterTable::new(&[], domains, 4, SEED));
        assert!(let MasterTableError::NoColumns = err);
    }

    #[test]
    fn columns_of_different_lengths_are_rejected() {
        let columns = vec![bfe_vec![1; 8], bfe_vec![2; 8], bfe_vec![3; 7]];
        let domains = domains_for(8, 4);
        let_assert!(Err(err) = MasterTable::new(&columns, domains, 4, SEED));
        let_assert!(MasterTableError::ColumnLengthMismatch { column, expected, got } = err);
        assert!((2, 8, 7) == (column, expected, got));
    }

    #[test]
    fn columns_longer_than_trace_domain_are_rejected() {
        let columns = vec![bfe_vec![1; 16]];
        let domains = domains_for(8, 4);
        let_assert!(Err(err) = MasterTable::new(&columns, domains, 4, SEED));
        assert!(let MasterTableError::PaddedHeightExceedsTraceDomain { .. } = err);
    }

    #[test]
    fn too_many_randomizers_are_rejected() {
        let columns = vec![bfe_vec![1; 8]];
        let domains = domains_for(8, 4);
        let_assert!(Err(err) = MasterTable::new(&columns, domains, 9, SEED));
        assert!(let MasterTableError::RandomizedTraceDomainTooSmall { .. } = err);
    }

    #[test]
    fn trace_lives_on_the_trace_domain() {
        let padded_height = 16;
        let trace = fibonacci_trace(padded_height);
        let table = fibonacci_table(padded_height);

        let trace_table = table.trace_table();
        assert!(padded_height == trace_table.nrows());
        for (column, trace_column) in trace.iter().zip_eq(trace_table.axis_iter(COL_AXIS)) {
            assert!(column == &trace_column.to_vec());
        }
    }

    #[test]
    fn randomizers_and_padding_live_on_the_odd_coset() {
        let padded_height = 8;
        let num_trace_randomizers = 3;
        let columns = vec![bfe_vec![1, 2, 3, 4, 5, 6, 7, 8]];
        let domains = domains_for(padded_height, num_trace_randomizers);
        let_assert!(
            Ok(table) = MasterTable::new(&columns, domains, num_trace_randomizers, SEED)
        );

        let odd_rows = table.randomized_table().slice_move(s![1..;2, 0]).to_vec();
        let randomizers = (0..num_trace_randomizers)
            .map(|row| trace_randomizer(SEED, 0, row))
            .collect_vec();
        assert!(randomizers == odd_rows[..num_trace_randomizers]);

        let last_randomizer = randomizers[num_trace_randomizers - 1];
        assert!(odd_rows[num_trace_randomizers..].iter().all(|&e| e == last_randomizer));
    }

    #[proptest]
    fn trace_randomizers_are_stateless(
        #[strategy(arb())] seed: TraceRandomizerSeed,
        #[strategy(0_usize..100)] column: usize,
        #[strategy(0_usize..100)] row: usize,
    ) {
        prop_assert_eq!(
            trace_randomizer(seed, column, row),
            trace_randomizer(seed, column, row)
        );
    }

    #[test]
    fn trace_randomizers_differ_across_columns_and_rows() {
        let randomizers = (0..10)
            .cartesian_product(0..10)
            .map(|(column, row)| trace_randomizer(SEED, column, row))
            .collect_vec();
        assert!(randomizers.iter().all_unique());
    }

    /// Verify that the trace randomizers of different columns have large
    /// Hamming distances. If this test fails, then the random number generator
    /// is not cryptographically secure or is misused somehow.
    #[test]
    fn trace_randomizers_have_large_hamming_distances() {
        // Binomial distribution with
        // n = total number of bits
        // p = q = 1/2
        let n = BFieldElement::BYTES * 8;
        let mean = n / 2;
        let variance = n / 4;
        let stddev = (variance as f64).sqrt();
        // four-sigma rule: four nines certainty
        let threshold = (mean as f64) - 4.0 * stddev;

        for i in 0..20 {
            let randomizer_i = trace_randomizer(SEED, i, 0).value();
            for j in i + 1..20 {
                let randomizer_j = trace_randomizer(SEED, j, 0).value();
                let distance = (randomizer_i ^ randomizer_j).count_ones();
                assert!(
                    f64::from(distance) > threshold,
                    "distance: {distance}\nthreshold: {threshold}"
                );
            }
        }
    }

    #[test]
    fn low_degree_extension_agrees_with_randomized_table() {
        let mut table = fibonacci_table(8);
        table.low_degree_extend();
        let_assert!(Some(extended) = table.fri_domain_table());
        assert!(table.domains().fri.len() == extended.nrows());

        let randomized_trace_domain = table.domains().randomized_trace;
        for (interpolant, column) in table.interpolants().iter().zip_eq(extended.columns()) {
            assert!(interpolant.degree() < randomized_trace_domain.len() as isize);
            assert!(table.domains().fri.evaluate(interpolant) == column.to_vec());
        }
    }

    #[test]
    fn row_hashing_is_independent_of_low_degree_extension_caching() {
        let table = fibonacci_table(16);
        let just_in_time_digests = table.hash_all_fri_domain_rows();
        let just_in_time_rows = table.reveal_rows(&[0, 3, 17]);

        let mut table = table;
        table.low_degree_extend();
        assert!(just_in_time_digests == table.hash_all_fri_domain_rows());
        assert!(just_in_time_rows == table.reveal_rows(&[0, 3, 17]));
    }

    #[test]
    fn merkle_tree_commits_to_revealed_rows() {
        let mut table = fibonacci_table(8);
        table.low_degree_extend();
        let_assert!(Ok(tree) = table.merkle_tree());

        let indices = [1, 5, 9];
        let rows = table.reveal_rows(&indices);
        let leafs = rows.iter().map(|row| Tip5::hash_varlen(row)).collect_vec();
        let_assert!(Ok(auth_structure) = tree.authentication_structure(&indices));

        let inclusion_proof = MerkleTreeInclusionProof {
            tree_height: table.domains().fri.len().ilog2(),
            indexed_leafs: indices.into_iter().zip_eq(leafs).collect(),
            authentication_structure: auth_structure,
        };
        assert!(inclusion_proof.verify(tree.root()));
    }

    #[test]
    fn honest_trace_has_zero_quotient_remainder() {
        let table = fibonacci_table(16);
        let air = fibonacci_air(16);
        let_assert!(Ok(quotients) = table.compute_quotients(&air, &xfe_vec![1, 2, 3]));
        assert!(quotients.has_zero_remainder());
    }

    #[test]
    fn dishonest_trace_is_rejected_under_reject_policy() {
        let padded_height = 16;
        let mut trace = fibonacci_trace(padded_height);
        trace[0][3] += bfe!(1);
        let domains = domains_for(padded_height, 4);
        let_assert!(Ok(table) = MasterTable::new(&trace, domains, 4, SEED));
        let air = fibonacci_air(padded_height);

        overwrite_quotient_remainder_policy_to(QuotientRemainderPolicy::Reject);
        let_assert!(Err(err) = table.compute_quotients(&air, &xfe_vec![1, 2, 3]));
        assert!(let MasterTableError::AirError(AirError::NonZeroQuotientRemainder { .. }) = err);

        overwrite_quotient_remainder_policy_to(QuotientRemainderPolicy::Warn);
        let_assert!(Ok(quotients) = table.compute_quotients(&air, &xfe_vec![1, 2, 3]));
        assert!(!quotients.has_zero_remainder());
    }

    #[test]
    fn weighted_sum_of_columns_is_linear() {
        let table = fibonacci_table(8);
        let weights = xfe_vec![1, 0, 0];
        let weighted_sum = table.weighted_sum_of_columns(&weights);
        let first_column = table
            .reveal_rows(&(0..table.domains().fri.len()).collect_vec())
            .into_iter()
            .map(|row| row[0].lift())
            .collect_vec();
        assert!(first_column == weighted_sum);
    }
}
