use thiserror::Error;
use twenty_first::error::BFieldCodecError;
use twenty_first::prelude::BFieldElement;
use twenty_first::util_types::merkle_tree::MerkleTreeError;

use crate::proof_item::ProofItem;
use crate::proof_item::ProofItemVariant;

pub(crate) const USIZE_TO_U64_ERR: &str =
    "internal error: type `usize` should have at most 64 bits";
pub(crate) const U32_TO_USIZE_ERR: &str =
    "internal error: type `usize` should have at least 32 bits";

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum ArithmeticDomainError {
    #[error("the domain's length must be a power of 2 but was {0}")]
    NotAPowerOfTwo(usize),

    #[error("the domain's length must be a power of 2 that the field supports, but was {0}")]
    PrimitiveRootNotSupported(u64),

    #[error("the domain's length must be at least 2 to be halved, but it was {0}")]
    TooSmallForHalving(usize),

    #[error("FRI domain of length {fri_len} is shorter than the randomized trace domain of length {randomized_trace_len}")]
    FriDomainTooShort {
        fri_len: usize,
        randomized_trace_len: usize,
    },

    #[error("FRI domain must be disjoint from the trace domain, but its offset is {0}")]
    FriDomainIntersectsTraceDomain(BFieldElement),
}

#[non_exhaustive]
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AirError {
    #[error("the table has {rows} rows but the domain has {domain_len} points")]
    TableDomainMismatch { rows: usize, domain_len: usize },

    #[error("the AIR expects {expected} columns but the table has {got}")]
    ColumnCountMismatch { expected: usize, got: usize },

    #[error("at least one challenge is required to combine {0} constraints")]
    NoChallenges(usize),

    #[error("the domain must be disjoint from the trace domain, but its offset is {0}")]
    DomainIntersectsTraceDomain(BFieldElement),

    #[error("quotient of constraint family has a non-zero remainder of degree {degree}")]
    NonZeroQuotientRemainder { degree: isize },

    #[error(transparent)]
    ArithmeticDomainError(#[from] ArithmeticDomainError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MasterTableError {
    #[error("the master table needs at least one column")]
    NoColumns,

    #[error("column {column} has length {got} but the padded height is {expected}")]
    ColumnLengthMismatch {
        column: usize,
        expected: usize,
        got: usize,
    },

    #[error("padded height {padded_height} exceeds the trace domain's length {trace_len}")]
    PaddedHeightExceedsTraceDomain {
        padded_height: usize,
        trace_len: usize,
    },

    #[error("columns must fit the randomized trace domain of length {randomized_len}, but need {needed}")]
    RandomizedTraceDomainTooSmall { randomized_len: usize, needed: usize },

    #[error(transparent)]
    MerkleTreeError(#[from] MerkleTreeError),

    #[error(transparent)]
    AirError(#[from] AirError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProofStreamError {
    #[error("queue must be non-empty in order to dequeue an item")]
    EmptyQueue,

    #[error("expected {expected}, got {got}")]
    UnexpectedItem {
        expected: ProofItemVariant,
        got: ProofItem,
    },

    #[error("the proof stream must contain a log2_padded_height item")]
    NoLog2PaddedHeight,

    #[error("the proof stream must contain exactly one log2_padded_height item")]
    TooManyLog2PaddedHeights,

    #[error("indices can only be sampled below a power of 2 that fits 32 bits, not below {0}")]
    IllegalUpperBound(usize),

    #[error(transparent)]
    DecodingError(#[from] BFieldCodecError),
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum ClaimError {
    #[error("a program digest consists of {expected} elements, got {got}")]
    DigestLength { expected: usize, got: usize },
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum StarkParameterError {
    #[error("security level must be at least {min} bits, got {got}")]
    SecurityLevelTooLow { min: usize, got: usize },

    #[error("FRI expansion factor must be a power of 2, got {0}")]
    ExpansionFactorNotAPowerOfTwo(usize),

    #[error("FRI expansion factor must be at least 2, got {0}")]
    ExpansionFactorTooSmall(usize),

    #[error("at least one trace randomizer is required")]
    NoTraceRandomizers,

    #[error("need at least {min} collinearity checks for the security level, got {got}")]
    TooFewCollinearityChecks { min: usize, got: usize },
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum LdtParameterError {
    #[error("rate must be at most 1/4, i.e., the expansion factor at least 4, got {0}")]
    InvalidRate(usize),

    #[error("expansion factor must be a power of 2, got {0}")]
    ExpansionFactorNotAPowerOfTwo(usize),

    #[error("domain of length {domain_len} is too small for expansion factor {expansion_factor}")]
    DomainTooSmall {
        domain_len: usize,
        expansion_factor: usize,
    },

    #[error("at least one collinearity check is required")]
    NoCollinearityChecks,

    #[error(transparent)]
    ArithmeticDomainError(#[from] ArithmeticDomainError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LdtProvingError {
    #[error("the codeword's length {codeword_len} differs from the domain's length {domain_len}")]
    InitialCodewordMismatch {
        domain_len: usize,
        codeword_len: usize,
    },

    #[error(transparent)]
    ArithmeticDomainError(#[from] ArithmeticDomainError),

    #[error(transparent)]
    MerkleTreeError(#[from] MerkleTreeError),

    #[error(transparent)]
    ProofStreamError(#[from] ProofStreamError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LdtVerificationError {
    #[error("the number of revealed leaves does not match the number of collinearity checks")]
    IncorrectNumberOfRevealedLeaves,

    #[error("Merkle tree authentication failed in round {round}")]
    BadMerkleAuthenticationPath { round: usize },

    #[error("received codeword of last round does not correspond to its commitment")]
    BadMerkleRootForLastCodeword,

    #[error("last round's codeword must have length 1, got {0}")]
    FinalDomainNotSingleton(usize),

    #[error("computed and received codeword of last round do not match")]
    LastCodewordMismatch,

    #[error("last round's polynomial has too high degree")]
    LastRoundPolynomialHasTooHighDegree,

    #[error("last round's polynomial does not agree with last round's codeword")]
    LastRoundPolynomialEvaluationMismatch,

    #[error("folding is inconsistent in round {round} at index {index}")]
    FoldMismatch { round: usize, index: usize },

    #[error("round {round} must hold a constant codeword but does not")]
    TerminalLayerMismatch { round: usize },

    #[error("soundness error {0} is not below 1/2")]
    SoundnessErrorTooLarge(f64),

    #[error("expected {expected} layers, got {got}")]
    IncorrectNumberOfLayers { expected: usize, got: usize },

    #[error("layer {round} has an unexpected domain")]
    DomainMismatch { round: usize },

    #[error("layer {round}'s codeword does not match its Merkle root")]
    MerkleRootMismatch { round: usize },

    #[error("layer {round}'s folding challenge differs from the transcript's")]
    FoldingChallengeMismatch { round: usize },

    #[error(transparent)]
    MerkleTreeError(#[from] MerkleTreeError),

    #[error(transparent)]
    ProofStreamError(#[from] ProofStreamError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProvingError {
    #[error("the AIR has {expected} columns but the trace has {got}")]
    ColumnCountMismatch { expected: usize, got: usize },

    #[error("the trace's height must be a non-zero power of 2, got {0}")]
    TraceHeightNotAPowerOfTwo(usize),

    #[error("padded height {padded_height} is below the number of trace randomizers {num_trace_randomizers}")]
    TooManyTraceRandomizers {
        padded_height: usize,
        num_trace_randomizers: usize,
    },

    #[error(transparent)]
    StarkParameterError(#[from] StarkParameterError),

    #[error(transparent)]
    ArithmeticDomainError(#[from] ArithmeticDomainError),

    #[error(transparent)]
    MasterTableError(#[from] MasterTableError),

    #[error(transparent)]
    LdtParameterError(#[from] LdtParameterError),

    #[error(transparent)]
    LdtProvingError(#[from] LdtProvingError),

    #[error(transparent)]
    ProofStreamError(#[from] ProofStreamError),

    #[error(transparent)]
    MerkleTreeError(#[from] MerkleTreeError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("claim version {got} is not supported, expected {expected}")]
    UnsupportedClaimVersion { expected: u32, got: u32 },

    #[error("log₂ of the padded height is out of range: {0}")]
    Log2PaddedHeightTooLarge(u32),

    #[error("the number of revealed master table rows does not match the parameters")]
    IncorrectNumberOfRevealedRows,

    #[error("revealed row has {got} elements, expected {expected}")]
    MalformedRow { expected: usize, got: usize },

    #[error("failed to verify authentication structure for the master table")]
    MasterTableAuthenticationFailure,

    #[error("received and computed combination codewords differ at index {index}")]
    CombinationCodewordMismatch { index: usize },

    #[error("the proof contains {0} unexpected trailing items")]
    TrailingProofItems(usize),

    #[error(transparent)]
    StarkParameterError(#[from] StarkParameterError),

    #[error(transparent)]
    ArithmeticDomainError(#[from] ArithmeticDomainError),

    #[error(transparent)]
    LdtParameterError(#[from] LdtParameterError),

    #[error(transparent)]
    LdtVerificationError(#[from] LdtVerificationError),

    #[error(transparent)]
    ProofStreamError(#[from] ProofStreamError),

    #[error(transparent)]
    AirError(#[from] AirError),
}
