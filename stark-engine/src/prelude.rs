//! Re-exports the most commonly-needed APIs of the proof engine.
//!
//! This module is intended to be wildcard-imported, _i.e._,
//! `use stark_engine::prelude::*;`.

pub use twenty_first;
pub use twenty_first::prelude::BFieldCodec;
pub use twenty_first::prelude::BFieldElement;
pub use twenty_first::prelude::Digest;
pub use twenty_first::prelude::Polynomial;
pub use twenty_first::prelude::Tip5;
pub use twenty_first::prelude::XFieldElement;
pub use twenty_first::prelude::bfe;
pub use twenty_first::prelude::bfe_vec;
pub use twenty_first::prelude::xfe;
pub use twenty_first::prelude::xfe_vec;

pub use crate::air::Air;
pub use crate::arithmetic_domain::ArithmeticDomain;
pub use crate::config::QuotientRemainderPolicy;
pub use crate::config::overwrite_quotient_remainder_policy_to;
pub use crate::fri::Fri;
pub use crate::proof::Claim;
pub use crate::proof::Proof;
pub use crate::proof_stream::ProofStream;
pub use crate::stark::Prover;
pub use crate::stark::StarkParameters;
pub use crate::stark::Verifier;
