//! The “Fast Reed-Solomon Interactive Oracle Proof of Proximity” (“[FRI][fri]”)
//! low-degree test.
//!
//! [fri]: https://doi.org/10.4230/LIPIcs.ICALP.2018.14

use itertools::Itertools;
use num_traits::Zero;
use rayon::prelude::*;
use twenty_first::math::traits::FiniteField;
use twenty_first::prelude::*;

use crate::arithmetic_domain::ArithmeticDomain;
use crate::error::LdtParameterError;
use crate::error::LdtProvingError;
use crate::error::LdtVerificationError;
use crate::proof_item::FriResponse;
use crate::proof_item::ProofItem;
use crate::proof_stream::ProofStream;

type SetupResult<T> = Result<T, LdtParameterError>;
type ProverResult<T> = Result<T, LdtProvingError>;
type VerifierResult<T> = Result<T, LdtVerificationError>;

/// The smallest expansion factor, _i.e._, the reciprocal of the largest rate,
/// for which FRI instances can be constructed.
pub const MIN_EXPANSION_FACTOR: usize = 4;

/// An instance of the FRI low-degree test on a fixed domain.
///
/// Each round halves the domain until it consists of a single point. The
/// codeword of every round is committed to with a fresh Merkle tree.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Fri {
    expansion_factor: usize,
    num_collinearity_checks: usize,
    domain: ArithmeticDomain,
}

/// One round of FRI as seen by the prover.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FriLayer {
    pub codeword: Vec<XFieldElement>,
    pub domain: ArithmeticDomain,
    pub merkle_root: Digest,

    /// The randomness used to fold this layer into the next one. Is `None` for
    /// the last layer, and for the last layer only.
    pub folding_challenge: Option<XFieldElement>,
}

/// Everything the [prover](Fri::prove) computed, oldest layer first.
///
/// Can be checked exhaustively with [`Fri::verify_layers`].
#[derive(Debug, Clone, PartialEq)]
pub struct FriProof {
    pub layers: Vec<FriLayer>,

    /// The polynomial interpolating the last layer's codeword over the domain
    /// of the same length with offset 1.
    pub final_polynomial: Polynomial<'static, XFieldElement>,

    /// The soundness error claimed by the prover.
    pub soundness_error: f64,

    /// The sampled indices into the first layer's codeword.
    pub first_round_indices: Vec<usize>,
}

/// A postscript of a [FRI verification](Fri::verify), allowing to link the
/// revealed first-round values to other commitments.
#[non_exhaustive]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Postscript {
    /// The (unfolded) domain of the first round.
    pub first_round_domain: ArithmeticDomain,

    /// The indices at which the first round's codeword was revealed.
    ///
    /// In internal lingo, these are “A-indices”.
    pub first_round_indices: Vec<usize>,

    /// The authenticated values of the first round's codeword at the
    /// [first-round indices](Self::first_round_indices).
    pub first_round_values: Vec<XFieldElement>,

    /// The final, fully folded codeword.
    pub last_round_codeword: Vec<XFieldElement>,

    /// The final polynomial, corresponding to the
    /// [final codeword](Self::last_round_codeword).
    pub last_round_polynomial: Polynomial<'static, XFieldElement>,
}

#[derive(Debug)]
struct FriProver<'stream> {
    proof_stream: &'stream mut ProofStream,
    rounds: Vec<ProverRound>,
    first_round_domain: ArithmeticDomain,
    num_rounds: usize,
    num_collinearity_checks: usize,
    first_round_collinearity_check_indices: Vec<usize>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct ProverRound {
    domain: ArithmeticDomain,
    codeword: Vec<XFieldElement>,
    merkle_tree: MerkleTree,
    folding_challenge: Option<XFieldElement>,
}

impl FriProver<'_> {
    fn commit(&mut self, codeword: &[XFieldElement]) -> ProverResult<()> {
        let mut round = ProverRound::new(self.first_round_domain, codeword)?;
        self.commit_to_round(&round);

        for _ in 0..self.num_rounds {
            let folding_challenge = self.proof_stream.sample_scalars(1)[0];
            round.folding_challenge = Some(folding_challenge);

            let next_round = round.fold(folding_challenge)?;
            self.commit_to_round(&next_round);
            self.rounds.push(round);
            round = next_round;
        }

        self.send_last_codeword(&round.codeword);
        self.rounds.push(round);
        Ok(())
    }

    fn commit_to_round(&mut self, round: &ProverRound) {
        let merkle_root = round.merkle_tree.root();
        self.proof_stream.enqueue(ProofItem::MerkleRoot(merkle_root));
    }

    fn send_last_codeword(&mut self, last_codeword: &[XFieldElement]) {
        let last_polynomial = last_round_polynomial(last_codeword);
        let last_codeword = last_codeword.to_vec();
        self.proof_stream.enqueue(ProofItem::FriCodeword(last_codeword));
        self.proof_stream.enqueue(ProofItem::FriPolynomial(last_polynomial));
    }

    fn query(&mut self) -> ProverResult<()> {
        let upper_bound = self.first_round_domain.len();
        self.first_round_collinearity_check_indices = self
            .proof_stream
            .sample_indices(upper_bound, self.num_collinearity_checks)?;

        let initial_a_indices = self.first_round_collinearity_check_indices.clone();
        self.authentically_reveal_codeword_of_round_at_indices(0, &initial_a_indices)?;

        for round_number in 0..self.num_rounds {
            let b_indices = self.collinearity_check_b_indices_for_round(round_number);
            self.authentically_reveal_codeword_of_round_at_indices(round_number, &b_indices)?;
        }

        Ok(())
    }

    fn collinearity_check_b_indices_for_round(&self, round_number: usize) -> Vec<usize> {
        let domain_length = self.rounds[round_number].domain.len();
        b_indices(&self.first_round_collinearity_check_indices, domain_length)
    }

    fn authentically_reveal_codeword_of_round_at_indices(
        &mut self,
        round_number: usize,
        indices: &[usize],
    ) -> ProverResult<()> {
        let round = &self.rounds[round_number];
        let queried_leaves = indices.iter().map(|&i| round.codeword[i]).collect();
        let auth_structure = round.merkle_tree.authentication_structure(indices)?;

        let fri_response = FriResponse {
            queried_leaves,
            auth_structure,
        };
        self.proof_stream.enqueue(ProofItem::FriResponse(fri_response));
        Ok(())
    }

    fn into_fri_proof(self, soundness_error: f64) -> FriProof {
        let final_polynomial = self
            .rounds
            .last()
            .map(|round| last_round_polynomial(&round.codeword))
            .unwrap_or_else(Polynomial::zero);
        let layers = self
            .rounds
            .into_iter()
            .map(|round| FriLayer {
                merkle_root: round.merkle_tree.root(),
                codeword: round.codeword,
                domain: round.domain,
                folding_challenge: round.folding_challenge,
            })
            .collect();

        FriProof {
            layers,
            final_polynomial,
            soundness_error,
            first_round_indices: self.first_round_collinearity_check_indices,
        }
    }
}

impl ProverRound {
    fn new(domain: ArithmeticDomain, codeword: &[XFieldElement]) -> ProverResult<Self> {
        if domain.len() != codeword.len() {
            return Err(LdtProvingError::InitialCodewordMismatch {
                domain_len: domain.len(),
                codeword_len: codeword.len(),
            });
        }

        let digests = codeword_as_digests(codeword);
        let merkle_tree = MerkleTree::par_new(&digests)?;
        let round = Self {
            domain,
            codeword: codeword.to_vec(),
            merkle_tree,
            folding_challenge: None,
        };
        Ok(round)
    }

    fn fold(&self, folding_challenge: XFieldElement) -> ProverResult<Self> {
        let codeword = split_and_fold(&self.codeword, self.domain, folding_challenge);
        let domain = self.domain.halve()?;
        Self::new(domain, &codeword)
    }
}

/// Fold a codeword of length `n` into a codeword of length `n / 2`.
///
/// The points at indices `i` and `i + n/2` of the domain are `x` and `-x`. Both
/// fold into index `i` of the halved domain:
///
/// `f'(x²) = (f(x) + f(-x))/2 + challenge · (f(x) - f(-x))/(2x)`
pub fn split_and_fold(
    codeword: &[XFieldElement],
    domain: ArithmeticDomain,
    folding_challenge: XFieldElement,
) -> Vec<XFieldElement> {
    let one = xfe!(1);
    let two_inverse = xfe!(2).inverse();

    let n = codeword.len();
    let domain_points = domain.elements().take(n / 2).collect();
    let domain_point_inverses = BFieldElement::batch_inversion(domain_points);

    (0..n / 2)
        .into_par_iter()
        .map(|i| {
            let scaled_offset_inv = folding_challenge * domain_point_inverses[i];
            let left_summand = (one + scaled_offset_inv) * codeword[i];
            let right_summand = (one - scaled_offset_inv) * codeword[n / 2 + i];
            (left_summand + right_summand) * two_inverse
        })
        .collect()
}

#[derive(Debug)]
struct FriVerifier<'stream> {
    proof_stream: &'stream mut ProofStream,
    rounds: Vec<VerifierRound>,
    first_round_domain: ArithmeticDomain,
    expansion_factor: usize,
    last_round_codeword: Vec<XFieldElement>,
    last_round_polynomial: Polynomial<'static, XFieldElement>,
    num_rounds: usize,
    num_collinearity_checks: usize,
    first_round_collinearity_check_indices: Vec<usize>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct VerifierRound {
    domain: ArithmeticDomain,
    merkle_root: Digest,
    partial_codeword_a: Vec<XFieldElement>,
    auth_structure_a: Vec<Digest>,
    partial_codeword_b: Vec<XFieldElement>,
    auth_structure_b: Vec<Digest>,
    folding_challenge: Option<XFieldElement>,
}

impl FriVerifier<'_> {
    fn initialize(&mut self) -> VerifierResult<()> {
        let mut domain = self.first_round_domain;
        for round_number in 0..=self.num_rounds {
            let merkle_root = self.proof_stream.dequeue()?.try_into_merkle_root()?;
            let folding_challenge =
                (round_number < self.num_rounds).then(|| self.proof_stream.sample_scalars(1)[0]);

            self.rounds.push(VerifierRound {
                domain,
                merkle_root,
                partial_codeword_a: vec![],
                auth_structure_a: vec![],
                partial_codeword_b: vec![],
                auth_structure_b: vec![],
                folding_challenge,
            });

            if round_number < self.num_rounds {
                domain = domain
                    .halve()
                    .map_err(|_| LdtVerificationError::DomainMismatch { round: round_number })?;
            }
        }

        self.last_round_codeword = self.proof_stream.dequeue()?.try_into_fri_codeword()?;
        self.last_round_polynomial = self.proof_stream.dequeue()?.try_into_fri_polynomial()?;

        Ok(())
    }

    fn compute_last_round_folded_partial_codeword(&mut self) -> VerifierResult<()> {
        let upper_bound = self.first_round_domain.len();
        self.first_round_collinearity_check_indices = self
            .proof_stream
            .sample_indices(upper_bound, self.num_collinearity_checks)?;

        self.receive_partial_codeword_a_for_first_round()?;
        self.authenticate_partial_codeword(0, true)?;
        for round_number in 0..self.num_rounds {
            self.receive_partial_codeword_b_for_round(round_number)?;
            self.authenticate_partial_codeword(round_number, false)?;
        }

        for round_number in 0..self.num_rounds {
            let folded_partial_codeword = self.fold_partial_codeword_of_round(round_number)?;
            self.rounds[round_number + 1].partial_codeword_a = folded_partial_codeword;
        }

        Ok(())
    }

    fn receive_partial_codeword_a_for_first_round(&mut self) -> VerifierResult<()> {
        let FriResponse {
            queried_leaves,
            auth_structure,
        } = self.proof_stream.dequeue()?.try_into_fri_response()?;

        self.assert_enough_leaves_were_received(&queried_leaves)?;
        self.rounds[0].partial_codeword_a = queried_leaves;
        self.rounds[0].auth_structure_a = auth_structure;

        Ok(())
    }

    fn receive_partial_codeword_b_for_round(&mut self, round_number: usize) -> VerifierResult<()> {
        let FriResponse {
            queried_leaves,
            auth_structure,
        } = self.proof_stream.dequeue()?.try_into_fri_response()?;

        self.assert_enough_leaves_were_received(&queried_leaves)?;
        self.rounds[round_number].partial_codeword_b = queried_leaves;
        self.rounds[round_number].auth_structure_b = auth_structure;

        Ok(())
    }

    fn assert_enough_leaves_were_received(&self, leaves: &[XFieldElement]) -> VerifierResult<()> {
        if self.num_collinearity_checks == leaves.len() {
            Ok(())
        } else {
            Err(LdtVerificationError::IncorrectNumberOfRevealedLeaves)
        }
    }

    fn authenticate_partial_codeword(
        &self,
        round_number: usize,
        use_a_indices: bool,
    ) -> VerifierResult<()> {
        let round = &self.rounds[round_number];
        let (leaf_indices, revealed_leaves, auth_structure) = if use_a_indices {
            let indices = self.collinearity_check_a_indices_for_round(round_number);
            (indices, &round.partial_codeword_a, &round.auth_structure_a)
        } else {
            let indices = self.collinearity_check_b_indices_for_round(round_number);
            (indices, &round.partial_codeword_b, &round.auth_structure_b)
        };

        let revealed_digests = codeword_as_digests(revealed_leaves);
        let indexed_leafs = leaf_indices.into_iter().zip_eq(revealed_digests).collect();
        let inclusion_proof = MerkleTreeInclusionProof {
            tree_height: round.domain.len().ilog2(),
            indexed_leafs,
            authentication_structure: auth_structure.clone(),
        };

        if inclusion_proof.verify(round.merkle_root) {
            Ok(())
        } else {
            Err(LdtVerificationError::BadMerkleAuthenticationPath {
                round: round_number,
            })
        }
    }

    fn fold_partial_codeword_of_round(
        &self,
        round_number: usize,
    ) -> VerifierResult<Vec<XFieldElement>> {
        let round = &self.rounds[round_number];
        let Some(folding_challenge) = round.folding_challenge else {
            return Err(LdtVerificationError::IncorrectNumberOfLayers {
                expected: self.num_rounds + 1,
                got: round_number + 1,
            });
        };

        let a_indices = self.collinearity_check_a_indices_for_round(round_number);
        let b_indices = self.collinearity_check_b_indices_for_round(round_number);
        let folded = (0..self.num_collinearity_checks)
            .map(|i| {
                let point_a_x = round.domain.value_at(a_indices[i]).lift();
                let point_b_x = round.domain.value_at(b_indices[i]).lift();
                let point_a = (point_a_x, round.partial_codeword_a[i]);
                let point_b = (point_b_x, round.partial_codeword_b[i]);
                Polynomial::get_colinear_y(point_a, point_b, folding_challenge)
            })
            .collect();

        Ok(folded)
    }

    fn collinearity_check_a_indices_for_round(&self, round_number: usize) -> Vec<usize> {
        let domain_length = self.rounds[round_number].domain.len();
        a_indices(&self.first_round_collinearity_check_indices, domain_length)
    }

    fn collinearity_check_b_indices_for_round(&self, round_number: usize) -> Vec<usize> {
        let domain_length = self.rounds[round_number].domain.len();
        b_indices(&self.first_round_collinearity_check_indices, domain_length)
    }

    fn authenticate_last_round_codeword(&self) -> VerifierResult<()> {
        let Some(last_round) = self.rounds.last() else {
            return Err(LdtVerificationError::IncorrectNumberOfLayers {
                expected: self.num_rounds + 1,
                got: 0,
            });
        };

        if self.last_round_codeword.len() != 1 {
            return Err(LdtVerificationError::FinalDomainNotSingleton(
                self.last_round_codeword.len(),
            ));
        }

        let codeword_digests = codeword_as_digests(&self.last_round_codeword);
        let merkle_tree = MerkleTree::sequential_new(&codeword_digests)?;
        if merkle_tree.root() != last_round.merkle_root {
            return Err(LdtVerificationError::BadMerkleRootForLastCodeword);
        }

        let last_round_number = self.rounds.len() - 1;
        let received_values = self
            .collinearity_check_a_indices_for_round(last_round_number)
            .into_iter()
            .map(|index| self.last_round_codeword[index])
            .collect_vec();
        if received_values != last_round.partial_codeword_a {
            return Err(LdtVerificationError::LastCodewordMismatch);
        }

        verify_last_round_polynomial(&self.last_round_polynomial, &self.last_round_codeword)
    }

    /// Every revealed value of a round whose domain is no larger than the
    /// expansion factor must equal the final constant.
    fn check_terminal_rounds(&self) -> VerifierResult<()> {
        let final_value = self.last_round_codeword[0];
        for (round_number, round) in self.rounds.iter().enumerate() {
            if round.domain.len() > self.expansion_factor {
                continue;
            }
            let all_values_are_final = round
                .partial_codeword_a
                .iter()
                .chain(&round.partial_codeword_b)
                .all(|&value| value == final_value);
            if !all_values_are_final {
                return Err(LdtVerificationError::TerminalLayerMismatch {
                    round: round_number,
                });
            }
        }

        Ok(())
    }

    fn postscript(self) -> Postscript {
        let Self {
            rounds,
            first_round_domain,
            last_round_codeword,
            last_round_polynomial,
            first_round_collinearity_check_indices,
            ..
        } = self;

        let first_round_values = rounds
            .into_iter()
            .next()
            .map(|round| round.partial_codeword_a)
            .unwrap_or_default();

        Postscript {
            first_round_domain,
            first_round_indices: first_round_collinearity_check_indices,
            first_round_values,
            last_round_codeword,
            last_round_polynomial,
        }
    }
}

impl Fri {
    /// # Errors
    ///
    /// Errors if
    /// - the expansion factor is not a power of 2,
    /// - the rate is larger than 1/4, _i.e._, the expansion factor is smaller
    ///   than [`MIN_EXPANSION_FACTOR`],
    /// - the domain is smaller than the expansion factor, or
    /// - the number of collinearity checks is 0.
    pub fn new(
        domain: ArithmeticDomain,
        expansion_factor: usize,
        num_collinearity_checks: usize,
    ) -> SetupResult<Self> {
        if !expansion_factor.is_power_of_two() {
            return Err(LdtParameterError::ExpansionFactorNotAPowerOfTwo(
                expansion_factor,
            ));
        }
        if expansion_factor < MIN_EXPANSION_FACTOR {
            return Err(LdtParameterError::InvalidRate(expansion_factor));
        }
        if domain.len() < expansion_factor {
            return Err(LdtParameterError::DomainTooSmall {
                domain_len: domain.len(),
                expansion_factor,
            });
        }
        if num_collinearity_checks == 0 {
            return Err(LdtParameterError::NoCollinearityChecks);
        }

        Ok(Self {
            expansion_factor,
            num_collinearity_checks,
            domain,
        })
    }

    pub fn domain(&self) -> ArithmeticDomain {
        self.domain
    }

    pub fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    pub fn num_collinearity_checks(&self) -> usize {
        self.num_collinearity_checks
    }

    /// The highest polynomial degree for which low-degreeness can be proven
    /// with this FRI instance.
    pub fn max_degree(&self) -> usize {
        (self.domain.len() / self.expansion_factor) - 1
    }

    /// The number of folding rounds. The domain after the last fold is a
    /// single point.
    pub fn num_rounds(&self) -> usize {
        self.domain.len().ilog2() as usize
    }

    /// A conservative upper bound on the probability that the verifier accepts
    /// a codeword that is far from any low-degree codeword.
    ///
    /// Consists of the query error `((1 + ρ)/2)^q` for rate `ρ` and `q`
    /// collinearity checks, plus the commit error `|D| / |𝔽|` for the domain
    /// `D` over the extension field `𝔽`.
    pub fn soundness_error(&self) -> f64 {
        let rate = 1.0 / self.expansion_factor as f64;
        let num_checks = i32::try_from(self.num_collinearity_checks).unwrap_or(i32::MAX);
        let query_error = ((1.0 + rate) / 2.0).powi(num_checks);

        let field_size = (BFieldElement::P as f64).powi(3);
        let commit_error = self.domain.len() as f64 / field_size;

        query_error + commit_error
    }

    /// Prove the low-degreeness of the given codeword, which must be the
    /// evaluation of some polynomial on this instance's [domain](Self::domain).
    ///
    /// # Errors
    ///
    /// Errors if the codeword's length differs from the domain's length.
    pub fn prove(
        &self,
        codeword: &[XFieldElement],
        proof_stream: &mut ProofStream,
    ) -> ProverResult<FriProof> {
        let _span = tracing::debug_span!("FRI prove").entered();
        let mut prover = self.prover(proof_stream);
        prover.commit(codeword)?;
        prover.query()?;

        Ok(prover.into_fri_proof(self.soundness_error()))
    }

    /// Verify the low-degreeness of the codeword committed to in the proof
    /// stream through the collinearity checks.
    ///
    /// # Errors
    ///
    /// Errors if the proof stream is malformed or if any check fails.
    pub fn verify(&self, proof_stream: &mut ProofStream) -> VerifierResult<Postscript> {
        let _span = tracing::debug_span!("FRI verify").entered();
        let soundness_error = self.soundness_error();
        if soundness_error >= 0.5 {
            return Err(LdtVerificationError::SoundnessErrorTooLarge(soundness_error));
        }

        let mut verifier = self.verifier(proof_stream);
        verifier.initialize()?;
        verifier.compute_last_round_folded_partial_codeword()?;
        verifier.authenticate_last_round_codeword()?;
        verifier.check_terminal_rounds()?;

        Ok(verifier.postscript())
    }

    /// Replay every layer of a [`FriProof`] in full.
    ///
    /// The proof stream must be in the state the prover's stream was in
    /// immediately before [proving](Self::prove). Re-derives all folding
    /// challenges from the Merkle roots, then checks the roots, the folding of
    /// every point, the terminal layers, the final polynomial, and the claimed
    /// soundness error.
    ///
    /// # Errors
    ///
    /// Errors on the first inconsistency found.
    pub fn verify_layers(
        &self,
        fri_proof: &FriProof,
        proof_stream: &mut ProofStream,
    ) -> VerifierResult<()> {
        if fri_proof.soundness_error >= 0.5 || !fri_proof.soundness_error.is_finite() {
            return Err(LdtVerificationError::SoundnessErrorTooLarge(
                fri_proof.soundness_error,
            ));
        }

        let expected_num_layers = self.num_rounds() + 1;
        if fri_proof.layers.len() != expected_num_layers {
            return Err(LdtVerificationError::IncorrectNumberOfLayers {
                expected: expected_num_layers,
                got: fri_proof.layers.len(),
            });
        }

        let mut expected_domain = self.domain;
        for (round, layer) in fri_proof.layers.iter().enumerate() {
            if layer.domain != expected_domain || layer.codeword.len() != expected_domain.len() {
                return Err(LdtVerificationError::DomainMismatch { round });
            }

            let merkle_tree = MerkleTree::par_new(&codeword_as_digests(&layer.codeword))?;
            if merkle_tree.root() != layer.merkle_root {
                return Err(LdtVerificationError::MerkleRootMismatch { round });
            }
            proof_stream.alter_fiat_shamir_state_with(&ProofItem::MerkleRoot(layer.merkle_root));

            let Some(next_layer) = fri_proof.layers.get(round + 1) else {
                if layer.folding_challenge.is_some() {
                    return Err(LdtVerificationError::FoldingChallengeMismatch { round });
                }
                break;
            };

            let folding_challenge = proof_stream.sample_scalars(1)[0];
            if layer.folding_challenge != Some(folding_challenge) {
                return Err(LdtVerificationError::FoldingChallengeMismatch { round });
            }

            let folded = split_and_fold(&layer.codeword, layer.domain, folding_challenge);
            if let Some(index) = folded
                .iter()
                .zip(&next_layer.codeword)
                .position(|(folded, received)| folded != received)
            {
                return Err(LdtVerificationError::FoldMismatch { round, index });
            }

            expected_domain = layer
                .domain
                .halve()
                .map_err(|_| LdtVerificationError::DomainMismatch { round: round + 1 })?;
        }

        let Some(last_layer) = fri_proof.layers.last() else {
            return Err(LdtVerificationError::IncorrectNumberOfLayers {
                expected: expected_num_layers,
                got: 0,
            });
        };
        if last_layer.codeword.len() != 1 {
            return Err(LdtVerificationError::FinalDomainNotSingleton(
                last_layer.codeword.len(),
            ));
        }
        let final_value = last_layer.codeword[0];
        for (round, layer) in fri_proof.layers.iter().enumerate() {
            let is_terminal = layer.domain.len() <= self.expansion_factor;
            if is_terminal && layer.codeword.iter().any(|&value| value != final_value) {
                return Err(LdtVerificationError::TerminalLayerMismatch { round });
            }
        }

        verify_last_round_polynomial(&fri_proof.final_polynomial, &last_layer.codeword)
    }

    fn prover<'stream>(&self, proof_stream: &'stream mut ProofStream) -> FriProver<'stream> {
        FriProver {
            proof_stream,
            rounds: vec![],
            first_round_domain: self.domain,
            num_rounds: self.num_rounds(),
            num_collinearity_checks: self.num_collinearity_checks,
            first_round_collinearity_check_indices: vec![],
        }
    }

    fn verifier<'stream>(&self, proof_stream: &'stream mut ProofStream) -> FriVerifier<'stream> {
        FriVerifier {
            proof_stream,
            rounds: vec![],
            first_round_domain: self.domain,
            expansion_factor: self.expansion_factor,
            last_round_codeword: vec![],
            last_round_polynomial: Polynomial::zero(),
            num_rounds: self.num_rounds(),
            num_collinearity_checks: self.num_collinearity_checks,
            first_round_collinearity_check_indices: vec![],
        }
    }
}

/// The last round's polynomial must be constant and agree with the last
/// round's codeword in the point 1.
fn verify_last_round_polynomial(
    polynomial: &Polynomial<XFieldElement>,
    codeword: &[XFieldElement],
) -> VerifierResult<()> {
    if polynomial.degree() > 0 {
        return Err(LdtVerificationError::LastRoundPolynomialHasTooHighDegree);
    }

    let evaluation = polynomial.evaluate_in_same_field(xfe!(1));
    if codeword.first() != Some(&evaluation) {
        return Err(LdtVerificationError::LastRoundPolynomialEvaluationMismatch);
    }

    Ok(())
}

fn last_round_polynomial(codeword: &[XFieldElement]) -> Polynomial<'static, XFieldElement> {
    match ArithmeticDomain::of_length(codeword.len()) {
        Ok(domain) => domain.interpolate(codeword),
        Err(_) => Polynomial::zero(),
    }
}

fn a_indices(first_round_indices: &[usize], domain_length: usize) -> Vec<usize> {
    first_round_indices
        .iter()
        .map(|&i| i % domain_length)
        .collect()
}

fn b_indices(first_round_indices: &[usize], domain_length: usize) -> Vec<usize> {
    first_round_indices
        .iter()
        .map(|&i| (i + domain_length / 2) % domain_length)
        .collect()
}

fn codeword_as_digests(codeword: &[XFieldElement]) -> Vec<Digest> {
    codeword.par_iter().map(|&xfe| xfe.into()).collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use assert2::assert;
    use assert2::let_assert;
    use num_traits::ConstZero;
    use proptest::prelude::*;
    use proptest_arbitrary_interop::arb;
    use test_strategy::proptest;

    use super::*;
    use crate::proof::Proof;
    use crate::shared_tests::arbitrary_polynomial_of_degree;

    fn fri_on_domain_of_length(length: usize, num_collinearity_checks: usize) -> Fri {
        let domain = ArithmeticDomain::of_length(length)
            .unwrap()
            .with_offset(BFieldElement::generator());
        Fri::new(domain, 4, num_collinearity_checks).unwrap()
    }

    fn prove_polynomial(
        fri: &Fri,
        polynomial: &Polynomial<XFieldElement>,
    ) -> (FriProof, Proof) {
        let codeword = fri.domain().evaluate(polynomial);
        let mut proof_stream = ProofStream::new();
        let fri_proof = fri.prove(&codeword, &mut proof_stream).unwrap();
        (fri_proof, proof_stream.into())
    }

    fn verify(fri: &Fri, proof: &Proof) -> VerifierResult<Postscript> {
        let mut proof_stream = ProofStream::try_from(proof).unwrap();
        fri.verify(&mut proof_stream)
    }

    #[test]
    fn rate_one_half_is_rejected() {
        let domain = ArithmeticDomain::of_length(16).unwrap();
        let_assert!(Err(err) = Fri::new(domain, 2, 10));
        assert!(LdtParameterError::InvalidRate(2) == err);
    }

    #[test]
    fn expansion_factor_must_be_a_power_of_two() {
        let domain = ArithmeticDomain::of_length(16).unwrap();
        let_assert!(Err(err) = Fri::new(domain, 6, 10));
        assert!(LdtParameterError::ExpansionFactorNotAPowerOfTwo(6) == err);
    }

    #[test]
    fn domain_smaller_than_expansion_factor_is_rejected() {
        let domain = ArithmeticDomain::of_length(2).unwrap();
        let_assert!(Err(err) = Fri::new(domain, 4, 10));
        assert!(let LdtParameterError::DomainTooSmall { .. } = err);
    }

    #[test]
    fn zero_collinearity_checks_are_rejected() {
        let domain = ArithmeticDomain::of_length(16).unwrap();
        let_assert!(Err(err) = Fri::new(domain, 4, 0));
        assert!(LdtParameterError::NoCollinearityChecks == err);
    }

    #[test]
    fn folding_pairs_opposite_points() {
        let domain = ArithmeticDomain::of_length(16)
            .unwrap()
            .with_offset(BFieldElement::generator());
        let values = domain.values();
        let halved_domain = domain.halve().unwrap();
        for i in 0..8 {
            assert!(values[i] == -values[i + 8]);
            assert!(values[i] * values[i] == halved_domain.value(i as u32));
        }

        // a codeword that only is non-zero in index 3 and its partner affects
        // index 3 of the folded codeword only
        let mut codeword = vec![XFieldElement::ZERO; 16];
        codeword[3] = xfe!(5);
        codeword[11] = xfe!(9);
        let folded = split_and_fold(&codeword, domain, xfe!(17));
        assert!(8 == folded.len());
        for (i, value) in folded.into_iter().enumerate() {
            assert!((i == 3) == (value != XFieldElement::ZERO));
        }
    }

    #[proptest]
    fn folding_halves_the_degree(
        #[strategy(arbitrary_polynomial_of_degree(7))] polynomial: Polynomial<
            'static,
            XFieldElement,
        >,
        #[strategy(arb())] folding_challenge: XFieldElement,
    ) {
        let domain = ArithmeticDomain::of_length(32)?.with_offset(bfe!(7));
        let codeword = domain.evaluate(&polynomial);
        let folded = split_and_fold(&codeword, domain, folding_challenge);
        let folded_polynomial = domain.halve()?.interpolate(&folded);
        prop_assert!(folded_polynomial.degree() <= 3);
    }

    #[test]
    fn round_trip_on_domain_of_size_8_accepts_low_degree_polynomial() {
        let fri = fri_on_domain_of_length(8, 80);
        let polynomial = Polynomial::new(xfe_vec![3, 5]);
        let (_, proof) = prove_polynomial(&fri, &polynomial);
        let_assert!(Ok(postscript) = verify(&fri, &proof));
        assert!(80 == postscript.first_round_indices.len());
    }

    #[test]
    fn flipping_one_value_makes_verification_fail() {
        let fri = fri_on_domain_of_length(8, 80);
        let polynomial = Polynomial::new(xfe_vec![3, 5]);
        let mut codeword = fri.domain().evaluate(&polynomial);
        codeword[2] += xfe!(1);

        let mut proof_stream = ProofStream::new();
        let_assert!(Ok(_) = fri.prove(&codeword, &mut proof_stream));
        let proof = proof_stream.into();
        let_assert!(Err(err) = verify(&fri, &proof));
        assert!(let LdtVerificationError::TerminalLayerMismatch { .. } = err);
    }

    #[proptest(cases = 20)]
    fn prove_and_verify_low_degree_polynomial(
        #[strategy(0_usize..6)] log2_max_degree_plus_one: usize,
        #[strategy(arbitrary_polynomial_of_degree((1_i64 << #log2_max_degree_plus_one) - 1))]
        polynomial: Polynomial<'static, XFieldElement>,
    ) {
        let domain_length = (1 << log2_max_degree_plus_one) * 4;
        let fri = fri_on_domain_of_length(domain_length, 20);
        prop_assert!(polynomial.degree() <= fri.max_degree() as isize);

        let (fri_proof, proof) = prove_polynomial(&fri, &polynomial);
        let_assert!(Ok(postscript) = verify(&fri, &proof));

        let first_round_values = postscript
            .first_round_indices
            .iter()
            .map(|&i| fri_proof.layers[0].codeword[i])
            .collect_vec();
        prop_assert_eq!(first_round_values, postscript.first_round_values);
        prop_assert_eq!(&fri_proof.first_round_indices, &postscript.first_round_indices);

        let mut proof_stream = ProofStream::new();
        prop_assert!(fri.verify_layers(&fri_proof, &mut proof_stream).is_ok());
    }

    #[proptest(cases = 20)]
    fn prove_and_fail_to_verify_high_degree_polynomial(
        #[strategy(2_usize..6)] log2_max_degree_plus_one: usize,
        #[strategy(Just(1_i64 << (#log2_max_degree_plus_one + 1)))] degree: i64,
        #[strategy(arbitrary_polynomial_of_degree(#degree))] polynomial: Polynomial<
            'static,
            XFieldElement,
        >,
    ) {
        let domain_length = (1 << log2_max_degree_plus_one) * 4;
        let fri = fri_on_domain_of_length(domain_length, 40);
        let (fri_proof, proof) = prove_polynomial(&fri, &polynomial);
        prop_assert!(verify(&fri, &proof).is_err());

        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.verify_layers(&fri_proof, &mut proof_stream));
        let_assert!(LdtVerificationError::TerminalLayerMismatch { .. } = err);
    }

    #[test]
    fn tampering_with_a_committed_layer_gives_fold_mismatch() {
        let fri = fri_on_domain_of_length(16, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (mut fri_proof, _) = prove_polynomial(&fri, &polynomial);

        fri_proof.layers[1].codeword[0] += xfe!(1);
        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.verify_layers(&fri_proof, &mut proof_stream));
        let_assert!(LdtVerificationError::FoldMismatch { round, index } = err);
        assert!((0, 0) == (round, index));
    }

    #[test]
    fn tampering_with_a_merkle_root_is_detected() {
        let fri = fri_on_domain_of_length(16, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (mut fri_proof, _) = prove_polynomial(&fri, &polynomial);

        fri_proof.layers[2].merkle_root = Digest::default();
        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.verify_layers(&fri_proof, &mut proof_stream));
        assert!(let LdtVerificationError::MerkleRootMismatch { round: 2 } = err);
    }

    #[test]
    fn too_large_claimed_soundness_error_is_rejected() {
        let fri = fri_on_domain_of_length(16, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2]);
        let (mut fri_proof, _) = prove_polynomial(&fri, &polynomial);

        fri_proof.soundness_error = 0.5;
        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.verify_layers(&fri_proof, &mut proof_stream));
        assert!(let LdtVerificationError::SoundnessErrorTooLarge(_) = err);
    }

    #[test]
    fn final_polynomial_of_positive_degree_is_rejected() {
        let fri = fri_on_domain_of_length(16, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2]);
        let (mut fri_proof, _) = prove_polynomial(&fri, &polynomial);

        fri_proof.final_polynomial = Polynomial::new(xfe_vec![1, 1]);
        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.verify_layers(&fri_proof, &mut proof_stream));
        assert!(let LdtVerificationError::LastRoundPolynomialHasTooHighDegree = err);
    }

    #[test]
    fn proof_has_one_layer_per_round_and_ends_in_a_single_point() {
        let fri = fri_on_domain_of_length(64, 10);
        let polynomial = Polynomial::new(xfe_vec![4, 2, 0, 1]);
        let (fri_proof, _) = prove_polynomial(&fri, &polynomial);

        assert!(7 == fri_proof.layers.len());
        let_assert!(Some(last_layer) = fri_proof.layers.last());
        assert!(1 == last_layer.domain.len());
        assert!(None == last_layer.folding_challenge);
        assert!(fri_proof.layers[..6].iter().all(|l| l.folding_challenge.is_some()));
        assert!(fri_proof.final_polynomial.degree() <= 0);
    }

    #[test]
    fn soundness_error_shrinks_with_more_collinearity_checks() {
        let few_checks = fri_on_domain_of_length(64, 10);
        let many_checks = fri_on_domain_of_length(64, 100);
        assert!(few_checks.soundness_error() < 0.5);
        assert!(many_checks.soundness_error() < few_checks.soundness_error());
        assert!(few_checks.soundness_error() == few_checks.soundness_error());
    }

    #[test]
    fn codeword_of_wrong_length_cannot_be_proven() {
        let fri = fri_on_domain_of_length(16, 10);
        let mut proof_stream = ProofStream::new();
        let_assert!(Err(err) = fri.prove(&xfe_vec![1; 8], &mut proof_stream));
        assert!(let LdtProvingError::InitialCodewordMismatch { .. } = err);
    }

    #[test]
    fn tampered_authentication_structure_is_detected() {
        let fri = fri_on_domain_of_length(32, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (_, proof) = prove_polynomial(&fri, &polynomial);

        let mut proof_stream = ProofStream::try_from(&proof).unwrap();
        let_assert!(
            Some(ProofItem::FriResponse(response)) = proof_stream
                .items
                .iter_mut()
                .find(|item| matches!(item, ProofItem::FriResponse(r) if !r.auth_structure.is_empty()))
        );
        response.auth_structure[0] = Digest::default();
        let proof: Proof = proof_stream.into();
        let_assert!(Err(err) = verify(&fri, &proof));
        assert!(let LdtVerificationError::BadMerkleAuthenticationPath { .. } = err);
    }

    #[test]
    fn revealing_too_few_leaves_is_detected() {
        let fri = fri_on_domain_of_length(32, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (_, proof) = prove_polynomial(&fri, &polynomial);

        let mut proof_stream = ProofStream::try_from(&proof).unwrap();
        let_assert!(
            Some(ProofItem::FriResponse(response)) = proof_stream
                .items
                .iter_mut()
                .find(|item| matches!(item, ProofItem::FriResponse(_)))
        );
        response.queried_leaves.pop();
        let proof: Proof = proof_stream.into();
        let_assert!(Err(err) = verify(&fri, &proof));
        assert!(let LdtVerificationError::IncorrectNumberOfRevealedLeaves = err);
    }

    #[test]
    fn replacing_the_last_codeword_is_detected() {
        let fri = fri_on_domain_of_length(32, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (_, proof) = prove_polynomial(&fri, &polynomial);

        let mut proof_stream = ProofStream::try_from(&proof).unwrap();
        let_assert!(
            Some(ProofItem::FriCodeword(codeword)) = proof_stream
                .items
                .iter_mut()
                .find(|item| matches!(item, ProofItem::FriCodeword(_)))
        );
        codeword[0] += xfe!(1);
        let proof: Proof = proof_stream.into();
        let_assert!(Err(err) = verify(&fri, &proof));
        assert!(let LdtVerificationError::BadMerkleRootForLastCodeword = err);
    }

    #[test]
    fn verifying_truncated_proof_fails_gracefully() {
        let fri = fri_on_domain_of_length(32, 10);
        let polynomial = Polynomial::new(xfe_vec![1, 2, 3]);
        let (_, proof) = prove_polynomial(&fri, &polynomial);

        let mut proof_stream = ProofStream::try_from(&proof).unwrap();
        proof_stream.items.truncate(3);
        let proof: Proof = proof_stream.into();
        let_assert!(Err(err) = verify(&fri, &proof));
        assert!(let LdtVerificationError::ProofStreamError(_) = err);
    }

    #[proptest(cases = 10)]
    fn verifying_arbitrary_proof_does_not_panic(#[strategy(arb())] proof: Proof) {
        let fri = fri_on_domain_of_length(32, 10);
        let Ok(mut proof_stream) = ProofStream::try_from(&proof) else {
            return Ok(());
        };
        let _verdict = fri.verify(&mut proof_stream);
    }
}
