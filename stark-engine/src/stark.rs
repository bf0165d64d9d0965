use std::collections::HashMap;

use arbitrary::Arbitrary;
use arbitrary::Unstructured;
use itertools::Itertools;
use rand::prelude::*;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use twenty_first::prelude::*;

use crate::air::Air;
use crate::air::ZerofierInverses;
use crate::arithmetic_domain::ArithmeticDomain;
use crate::error::ArithmeticDomainError;
use crate::error::LdtParameterError;
use crate::error::ProvingError;
use crate::error::StarkParameterError;
use crate::error::VerificationError;
use crate::fri::Fri;
use crate::proof::Claim;
use crate::proof::Proof;
use crate::proof_item::ProofItem;
use crate::proof_stream::ProofStream;
use crate::table::MasterTableRow;
use crate::table::master_table::MasterTable;
use crate::table::master_table::TraceRandomizerSeed;

/// The lowest security level, in bits, that [`StarkParameters`] accept.
pub const MIN_SECURITY_LEVEL: usize = 80;

/// All the security-related parameters for the zk-STARK.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StarkParameters {
    /// The conjectured security level in bits. Concretely, the system
    /// - is perfectly complete, and
    /// - has soundness error 2^(-security_level).
    pub security_level: usize,

    /// The ratio between the lengths of the FRI domain and the smallest
    /// domain that can hold the combination codeword's polynomial. Must be a
    /// power of 2.
    pub fri_expansion_factor: usize,

    /// The number of randomizers for the execution trace. The trace
    /// randomizers are integral for achieving zero-knowledge. Every revealed
    /// row of the low-degree extended table uses up one randomizer.
    pub num_trace_randomizers: usize,

    /// The number of collinearity checks to perform in FRI.
    pub num_collinearity_checks: usize,
}

impl StarkParameters {
    /// Derive parameters for the given security level and FRI expansion
    /// factor. The resulting parameters might not be
    /// [valid](Self::validate), for example if the security level is too low.
    pub fn new(security_level: usize, log2_of_fri_expansion_factor: usize) -> Self {
        let fri_expansion_factor = 1 << log2_of_fri_expansion_factor;
        let num_collinearity_checks =
            security_level.div_ceil(log2_of_fri_expansion_factor.max(1));

        // every collinearity check reveals two rows of the master table
        let num_trace_randomizers = 2 * num_collinearity_checks;

        Self {
            security_level,
            fri_expansion_factor,
            num_trace_randomizers,
            num_collinearity_checks,
        }
    }

    /// # Errors
    ///
    /// Errors if
    /// - the security level is below [`MIN_SECURITY_LEVEL`],
    /// - the FRI expansion factor is not a power of 2 or smaller than 2,
    /// - there are no trace randomizers, or
    /// - there are fewer than a third as many collinearity checks as bits of
    ///   security.
    ///
    /// Valid parameters can still be unfit for proving: the low-degree test
    /// needs an expansion factor of at least
    /// [`MIN_EXPANSION_FACTOR`](crate::fri::MIN_EXPANSION_FACTOR). With an
    /// expansion factor of 2, [proving](Prover::prove) and
    /// [verifying](Verifier::verify) fail with
    /// [`InvalidRate`](crate::error::LdtParameterError::InvalidRate).
    pub fn validate(&self) -> Result<(), StarkParameterError> {
        if self.security_level < MIN_SECURITY_LEVEL {
            return Err(StarkParameterError::SecurityLevelTooLow {
                min: MIN_SECURITY_LEVEL,
                got: self.security_level,
            });
        }
        if !self.fri_expansion_factor.is_power_of_two() {
            return Err(StarkParameterError::ExpansionFactorNotAPowerOfTwo(
                self.fri_expansion_factor,
            ));
        }
        if self.fri_expansion_factor < 2 {
            return Err(StarkParameterError::ExpansionFactorTooSmall(
                self.fri_expansion_factor,
            ));
        }
        if self.num_trace_randomizers == 0 {
            return Err(StarkParameterError::NoTraceRandomizers);
        }
        let min_num_collinearity_checks = self.security_level.div_ceil(3);
        if self.num_collinearity_checks < min_num_collinearity_checks {
            return Err(StarkParameterError::TooFewCollinearityChecks {
                min: min_num_collinearity_checks,
                got: self.num_collinearity_checks,
            });
        }

        Ok(())
    }

    /// The FRI domain for combination codewords of degree at most
    /// `max_degree`. Its offset is the field's generator, which keeps it
    /// disjoint from every trace domain.
    ///
    /// # Errors
    ///
    /// Errors if the field has no subgroup of the required order.
    pub fn fri_domain(&self, max_degree: usize) -> Result<ArithmeticDomain, ArithmeticDomainError> {
        let min_length = max_degree.saturating_add(1).next_power_of_two();
        let Some(length) = min_length.checked_mul(self.fri_expansion_factor) else {
            let length = u64::try_from(min_length).unwrap_or(u64::MAX);
            return Err(ArithmeticDomainError::PrimitiveRootNotSupported(length));
        };

        let domain = ArithmeticDomain::of_length(length)?.with_offset(BFieldElement::generator());
        Ok(domain)
    }

    /// All domains needed to prove or verify a trace of the given height
    /// against the given AIR.
    ///
    /// # Errors
    ///
    /// Errors if the padded height is not a power of 2, or if any of the
    /// domains is too large for the field.
    pub fn derive_domains(
        &self,
        padded_height: usize,
        air: &Air,
    ) -> Result<ProverDomains, ArithmeticDomainError> {
        let randomized_trace_len = randomized_trace_len(padded_height, self.num_trace_randomizers);
        let max_degree = air.max_degree(randomized_trace_len);
        let fri_domain = self.fri_domain(max_degree)?;

        ProverDomains::derive(
            padded_height,
            self.num_trace_randomizers,
            fri_domain,
            max_degree,
        )
    }

    /// # Errors
    ///
    /// See [`Fri::new`].
    pub fn derive_fri(&self, domains: &ProverDomains) -> Result<Fri, LdtParameterError> {
        Fri::new(
            domains.fri,
            self.fri_expansion_factor,
            self.num_collinearity_checks,
        )
    }
}

impl Default for StarkParameters {
    fn default() -> Self {
        let log_2_of_fri_expansion_factor = 2;
        let security_level = 160;

        Self::new(security_level, log_2_of_fri_expansion_factor)
    }
}

impl<'a> Arbitrary<'a> for StarkParameters {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let security_level = u.int_in_range(1..=640)?;
        let log_2_of_fri_expansion_factor = u.int_in_range(1..=8)?;
        Ok(Self::new(security_level, log_2_of_fri_expansion_factor))
    }
}

/// The domains a proof lives on, all derived from the trace's padded height.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ProverDomains {
    /// The domain on which the trace lives. Its generator is the square of the
    /// [randomized trace domain](Self::randomized_trace)'s generator.
    pub trace: ArithmeticDomain,

    /// Holds the trace, the trace randomizers, and padding. Twice as long as
    /// the [trace domain](Self::trace).
    pub randomized_trace: ArithmeticDomain,

    /// Large enough to hold any polynomial of the maximal degree. Has the same
    /// offset as the [FRI domain](Self::fri).
    pub quotient: ArithmeticDomain,

    /// The domain on which the low-degree test runs.
    pub fri: ArithmeticDomain,
}

impl ProverDomains {
    /// # Errors
    ///
    /// Errors if
    /// - the padded height is not a power of 2,
    /// - any domain is too large for the field,
    /// - the FRI domain is shorter than the randomized trace domain, or
    /// - the FRI domain intersects the trace domain.
    pub fn derive(
        padded_height: usize,
        num_trace_randomizers: usize,
        fri_domain: ArithmeticDomain,
        max_degree: usize,
    ) -> Result<Self, ArithmeticDomainError> {
        if !padded_height.is_power_of_two() {
            return Err(ArithmeticDomainError::NotAPowerOfTwo(padded_height));
        }

        let randomized_trace_len = randomized_trace_len(padded_height, num_trace_randomizers);
        let randomized_trace = ArithmeticDomain::of_length(randomized_trace_len)?;
        let trace = randomized_trace.halve()?;

        if fri_domain.len() < randomized_trace_len {
            return Err(ArithmeticDomainError::FriDomainTooShort {
                fri_len: fri_domain.len(),
                randomized_trace_len,
            });
        }
        if fri_domain.is_subgroup() {
            return Err(ArithmeticDomainError::FriDomainIntersectsTraceDomain(
                fri_domain.offset,
            ));
        }

        let quotient_len = max_degree.next_power_of_two();
        let quotient = ArithmeticDomain::of_length(quotient_len)?.with_offset(fri_domain.offset);

        let domains = Self {
            trace,
            randomized_trace,
            quotient,
            fri: fri_domain,
        };
        tracing::debug!(
            trace = domains.trace.len(),
            randomized_trace = domains.randomized_trace.len(),
            quotient = domains.quotient.len(),
            fri = domains.fri.len(),
            "derived domains"
        );

        Ok(domains)
    }

    /// The number of FRI domain points between a point and its successor in
    /// the trace domain.
    pub fn unit_distance(&self) -> usize {
        self.fri.len() / self.trace.len()
    }
}

/// The randomized trace must hold the trace and all randomizers. It is never
/// shorter than 2, so that it can be halved.
fn randomized_trace_len(padded_height: usize, num_trace_randomizers: usize) -> usize {
    padded_height
        .saturating_add(num_trace_randomizers)
        .next_power_of_two()
        .max(2)
}

/// The indices of the revealed master table rows: the given FRI indices,
/// followed by their successors in the trace domain, without duplicates.
fn revealed_row_indices(fri_indices: &[usize], domains: &ProverDomains) -> Vec<usize> {
    let unit_distance = domains.unit_distance();
    let fri_domain_len = domains.fri.len();
    let successors = fri_indices
        .iter()
        .map(|&i| (i + unit_distance) % fri_domain_len);

    fri_indices.iter().copied().chain(successors).unique().collect()
}

/// Creates proofs of valid traces.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Prover {
    parameters: StarkParameters,

    /// The seed for all randomness used while proving.
    ///
    /// For Fiat-Shamir, the proof stream must be deterministic, but the trace
    /// randomizers must not be predictable.
    randomness_seed: TraceRandomizerSeed,
}

impl Prover {
    /// A [`Prover`] with a random seed for its randomness.
    pub fn new(parameters: StarkParameters) -> Self {
        Self {
            parameters,
            randomness_seed: rand::rng().random(),
        }
    }

    /// Use a fixed seed for all randomness used while proving.
    ///
    /// Fixing the seed breaks zero-knowledge if the same seed is used for more
    /// than one trace. Only use this for reproducible proofs in testing or
    /// debugging.
    #[must_use]
    pub fn set_randomness_seed_which_may_break_zero_knowledge(
        mut self,
        seed: TraceRandomizerSeed,
    ) -> Self {
        self.randomness_seed = seed;
        self
    }

    /// Prove that the trace, given column by column, satisfies the AIR.
    ///
    /// # Errors
    ///
    /// Errors if
    /// - the parameters are invalid,
    /// - the trace does not have one column per AIR column,
    /// - the trace's height is not a power of 2 or smaller than the number of
    ///   trace randomizers, or
    /// - the trace violates the AIR and the
    ///   [quotient remainder policy](crate::config::QuotientRemainderPolicy)
    ///   is to reject.
    pub fn prove(
        &self,
        claim: &Claim,
        air: &Air,
        trace: &[Vec<BFieldElement>],
    ) -> Result<Proof, ProvingError> {
        let padded_height = trace.first().map_or(0, Vec::len);
        let _span = tracing::info_span!("prove", padded_height).entered();

        self.parameters.validate()?;
        if trace.len() != air.num_columns() {
            return Err(ProvingError::ColumnCountMismatch {
                expected: air.num_columns(),
                got: trace.len(),
            });
        }
        if !padded_height.is_power_of_two() {
            return Err(ProvingError::TraceHeightNotAPowerOfTwo(padded_height));
        }
        let num_trace_randomizers = self.parameters.num_trace_randomizers;
        if padded_height < num_trace_randomizers {
            return Err(ProvingError::TooManyTraceRandomizers {
                padded_height,
                num_trace_randomizers,
            });
        }

        let mut proof_stream = ProofStream::new();
        proof_stream.alter_fiat_shamir_state_with(claim);
        proof_stream.enqueue(ProofItem::Log2PaddedHeight(padded_height.ilog2()));

        let domains = self.parameters.derive_domains(padded_height, air)?;
        let fri = self.parameters.derive_fri(&domains)?;

        let commit_span = tracing::info_span!("commit").entered();
        let mut master_table =
            MasterTable::new(trace, domains, num_trace_randomizers, self.randomness_seed)?;
        master_table.low_degree_extend();
        let merkle_tree = master_table.merkle_tree()?;
        proof_stream.enqueue(ProofItem::MerkleRoot(merkle_tree.root()));
        drop(commit_span);

        let quotient_span = tracing::info_span!("quotient").entered();
        let challenges = proof_stream.sample_scalars(air.num_constraints());
        let quotients = master_table.compute_quotients(air, &challenges)?;
        tracing::debug!(
            quotient_degree = quotients.quotient.degree(),
            "computed quotient polynomial"
        );
        let quotient_codeword = master_table.quotient_codeword(air, &challenges)?;
        drop(quotient_span);

        let fri_span = tracing::info_span!("low-degree test").entered();
        let weights = proof_stream.sample_scalars(air.num_columns() + 1);
        let (quotient_weight, column_weights) = (weights[0], &weights[1..]);
        let combination_codeword = master_table
            .weighted_sum_of_columns(column_weights)
            .into_par_iter()
            .zip_eq(quotient_codeword)
            .map(|(column_sum, quotient)| quotient_weight * quotient + column_sum)
            .collect::<Vec<_>>();
        let fri_proof = fri.prove(&combination_codeword, &mut proof_stream)?;
        drop(fri_span);

        let _open_span = tracing::info_span!("open").entered();
        let revealed_indices = revealed_row_indices(&fri_proof.first_round_indices, &domains);
        let revealed_rows = master_table.reveal_rows(&revealed_indices);
        let auth_structure = merkle_tree.authentication_structure(&revealed_indices)?;
        proof_stream.enqueue(ProofItem::MasterTableRows(revealed_rows));
        proof_stream.enqueue(ProofItem::AuthenticationStructure(auth_structure));

        Ok(proof_stream.into())
    }
}

/// Checks proofs produced by a [`Prover`] with the same parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Verifier {
    parameters: StarkParameters,
}

impl Verifier {
    pub fn new(parameters: StarkParameters) -> Self {
        Self { parameters }
    }

    /// Verify that the proof attests to a trace satisfying the AIR, for the
    /// given claim.
    ///
    /// # Errors
    ///
    /// Errors if the proof is malformed or does not verify.
    pub fn verify(&self, claim: &Claim, air: &Air, proof: &Proof) -> Result<(), VerificationError> {
        let _span = tracing::info_span!("verify").entered();

        self.parameters.validate()?;
        if claim.version != Claim::CURRENT_VERSION {
            return Err(VerificationError::UnsupportedClaimVersion {
                expected: Claim::CURRENT_VERSION,
                got: claim.version,
            });
        }

        let mut proof_stream = ProofStream::try_from(proof)?;
        proof_stream.alter_fiat_shamir_state_with(claim);

        let log_2_padded_height = proof_stream.dequeue()?.try_into_log2_padded_height()?;
        if log_2_padded_height >= u32::BITS {
            return Err(VerificationError::Log2PaddedHeightTooLarge(
                log_2_padded_height,
            ));
        }
        let padded_height = 1 << log_2_padded_height;
        let domains = self.parameters.derive_domains(padded_height, air)?;
        let fri = self.parameters.derive_fri(&domains)?;

        let merkle_root = proof_stream.dequeue()?.try_into_merkle_root()?;
        let challenges = proof_stream.sample_scalars(air.num_constraints());
        let weights = proof_stream.sample_scalars(air.num_columns() + 1);

        let fri_span = tracing::info_span!("low-degree test").entered();
        let postscript = fri.verify(&mut proof_stream)?;
        drop(fri_span);

        let _check_span = tracing::info_span!("check combination").entered();
        let revealed_indices = revealed_row_indices(&postscript.first_round_indices, &domains);
        let revealed_rows = proof_stream.dequeue()?.try_into_master_table_rows()?;
        let auth_structure = proof_stream
            .dequeue()?
            .try_into_authentication_structure()?;
        if proof_stream.num_remaining_items() != 0 {
            return Err(VerificationError::TrailingProofItems(
                proof_stream.num_remaining_items(),
            ));
        }
        if revealed_rows.len() != revealed_indices.len() {
            return Err(VerificationError::IncorrectNumberOfRevealedRows);
        }
        if let Some(row) = revealed_rows.iter().find(|r| r.len() != air.num_columns()) {
            return Err(VerificationError::MalformedRow {
                expected: air.num_columns(),
                got: row.len(),
            });
        }

        let leaf_digests = revealed_rows
            .par_iter()
            .map(|row| Tip5::hash_varlen(row))
            .collect::<Vec<_>>();
        let inclusion_proof = MerkleTreeInclusionProof {
            tree_height: domains.fri.len().ilog2(),
            indexed_leafs: revealed_indices.iter().copied().zip_eq(leaf_digests).collect(),
            authentication_structure: auth_structure,
        };
        if !inclusion_proof.verify(merkle_root) {
            return Err(VerificationError::MasterTableAuthenticationFailure);
        }

        let rows_by_index: HashMap<_, _> = revealed_indices.into_iter().zip(&revealed_rows).collect();
        let (quotient_weight, column_weights) = (weights[0], &weights[1..]);
        let unit_distance = domains.unit_distance();
        for (&index, &revealed_value) in postscript
            .first_round_indices
            .iter()
            .zip_eq(&postscript.first_round_values)
        {
            let next_index = (index + unit_distance) % domains.fri.len();
            let (Some(current), Some(next)) = (rows_by_index.get(&index), rows_by_index.get(&next_index))
            else {
                return Err(VerificationError::IncorrectNumberOfRevealedRows);
            };

            let x = domains.fri.value_at(index);
            let zerofier_inverses = ZerofierInverses::at(x, domains.trace);
            let quotient = air.quotient_value(current, next, zerofier_inverses, &challenges)?;
            let combination =
                quotient_weight * quotient + weighted_row_sum(column_weights, current);
            if combination != revealed_value {
                return Err(VerificationError::CombinationCodewordMismatch { index });
            }
        }

        Ok(())
    }
}

fn weighted_row_sum(weights: &[XFieldElement], row: &MasterTableRow) -> XFieldElement {
    row.iter().zip_eq(weights).map(|(&r, &w)| w * r).sum()
}
