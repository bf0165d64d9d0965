use arbitrary::Arbitrary;
use get_size2::GetSize;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use twenty_first::prelude::*;

use crate::error::ClaimError;
use crate::error::ProofStreamError;
use crate::proof_stream::ProofStream;

/// Contains the necessary cryptographic information to verify a computation.
/// Should be used together with a [`Claim`].
#[derive(
    Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, GetSize, BFieldCodec, Arbitrary,
)]
pub struct Proof(pub Vec<BFieldElement>);

impl Proof {
    /// Get the height of the trace used during proof generation.
    /// This is an upper bound on the length of the computation this proof is
    /// for. It is one of the main contributing factors to the length of the
    /// FRI domain.
    pub fn padded_height(&self) -> Result<usize, ProofStreamError> {
        let proof_stream = ProofStream::try_from(self)?;
        let log_2_padded_heights = proof_stream
            .items
            .into_iter()
            .filter_map(|item| item.try_into_log2_padded_height().ok())
            .collect_vec();

        let [log_2_padded_height] = log_2_padded_heights[..] else {
            return match log_2_padded_heights.len() {
                0 => Err(ProofStreamError::NoLog2PaddedHeight),
                _ => Err(ProofStreamError::TooManyLog2PaddedHeights),
            };
        };

        Ok(1 << log_2_padded_height)
    }
}

/// Contains the public information of a verifiably correct computation.
/// A corresponding [`Proof`] is needed to verify the computation.
/// One additional piece of public information not explicitly listed in the
/// [`Claim`] is the [`StarkParameters`](crate::stark::StarkParameters) used
/// to generate the proof.
#[derive(
    Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, GetSize, BFieldCodec, Arbitrary,
)]
pub struct Claim {
    /// The hash digest of the computation that was proven, for example the
    /// digest of a program or of a constraint system.
    pub program_digest: Digest,

    /// The version of the proof engine the claim targets. Proofs are only
    /// accepted for the [current version](Self::CURRENT_VERSION).
    pub version: u32,

    /// The public input to the computation.
    pub input: Vec<BFieldElement>,

    /// The public output of the computation.
    pub output: Vec<BFieldElement>,
}

impl Claim {
    pub const CURRENT_VERSION: u32 = 0;

    /// Create a new Claim for the current version.
    ///
    /// Assumes the computation takes no public input and produces no public
    /// output. See [`with_input`](Self::with_input) and
    /// [`with_output`](Self::with_output).
    pub fn new(program_digest: Digest) -> Self {
        Self {
            program_digest,
            version: Self::CURRENT_VERSION,
            input: vec![],
            output: vec![],
        }
    }

    /// Create a new Claim from the raw elements of a program digest.
    ///
    /// # Errors
    ///
    /// Errors if the number of elements is not exactly [`Digest::LEN`].
    pub fn from_digest_elements(elements: &[BFieldElement]) -> Result<Self, ClaimError> {
        let Ok(digest_elements) = <[BFieldElement; Digest::LEN]>::try_from(elements) else {
            return Err(ClaimError::DigestLength {
                expected: Digest::LEN,
                got: elements.len(),
            });
        };

        Ok(Self::new(Digest::new(digest_elements)))
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<Vec<BFieldElement>>) -> Self {
        self.input = input.into();
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Vec<BFieldElement>) -> Self {
        self.output = output;
        self
    }
}
