//! A zk-STARK proof engine for arbitrary Algebraic Intermediate
//! Representations (AIRs).
//!
//! A trace is a table of elements of the prime field with 2^64 - 2^32 + 1
//! elements, given column by column. An [`Air`](air::Air) is a set of
//! polynomial constraints on the rows of such a table. The engine proves that a
//! trace satisfies an AIR without revealing the trace. It does this by
//! - randomizing and committing to the trace with a Merkle tree,
//! - dividing the constraints by the zerofiers of the rows they apply to, and
//! - proving the low-degreeness of the result with [FRI](fri::Fri).
//!
//! All interaction between prover and verifier is made non-interactive through
//! the Fiat-Shamir heuristic, using a [proof stream](proof_stream::ProofStream).
//!
//! # Example
//!
//! ```
//! # use stark_engine::prelude::*;
//! # use stark_engine::example_airs::fibonacci_air;
//! # use stark_engine::example_airs::fibonacci_trace;
//! let num_rows = 128;
//! let air = fibonacci_air(num_rows);
//! let trace = fibonacci_trace(num_rows);
//! let claim = Claim::new(Digest::default());
//! let parameters = StarkParameters::new(80, 2);
//!
//! let proof = stark_engine::prove(parameters, &claim, &air, &trace).unwrap();
//! let verdict = stark_engine::verify(parameters, &claim, &air, &proof);
//! assert!(verdict);
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use twenty_first;

use crate::air::Air;
use crate::error::ProvingError;
use crate::proof::Claim;
use crate::proof::Proof;
use crate::stark::Prover;
use crate::stark::StarkParameters;
use crate::stark::Verifier;

pub mod air;
pub mod arithmetic_domain;
pub mod config;
pub mod error;
pub mod example_airs;
pub mod fri;
pub mod prelude;
pub mod proof;
pub mod proof_item;
pub mod proof_stream;
pub mod stark;
pub mod table;

#[cfg(test)]
mod shared_tests;

/// Prove that the trace, given column by column, satisfies the AIR.
///
/// Uses fresh randomness for the trace randomizers. For reproducible proofs,
/// see [`Prover::set_randomness_seed_which_may_break_zero_knowledge`].
///
/// # Errors
///
/// See [`Prover::prove`].
pub fn prove(
    parameters: StarkParameters,
    claim: &Claim,
    air: &Air,
    trace: &[Vec<twenty_first::prelude::BFieldElement>],
) -> Result<Proof, ProvingError> {
    Prover::new(parameters).prove(claim, air, trace)
}

/// Verify a proof generated by [`prove`].
///
/// Returns `true` if the proof is valid, `false` otherwise. For the reason a
/// proof is rejected, use [`Verifier::verify`].
#[must_use]
pub fn verify(parameters: StarkParameters, claim: &Claim, air: &Air, proof: &Proof) -> bool {
    match Verifier::new(parameters).verify(claim, air, proof) {
        Ok(()) => true,
        Err(err) => {
            tracing::info!(%err, "proof rejected");
            false
        }
    }
}
