use std::cell::RefCell;

use arbitrary::Arbitrary;
use serde::Deserialize;
use serde::Serialize;

thread_local! {
    pub(crate) static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// What to do when the quotient of the AIR's composition polynomial by the
/// trace domain's zerofier leaves a non-zero remainder.
///
/// A non-zero remainder means the trace does not satisfy the AIR. Either way,
/// the low-degree test of the resulting proof fails, so the policy only
/// decides how early the prover gives up.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Arbitrary,
)]
pub enum QuotientRemainderPolicy {
    /// Log a warning and continue proving.
    #[default]
    Warn,

    /// Abort proving with an error.
    Reject,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Arbitrary)]
pub(crate) struct Config {
    /// Can be accessed via [`quotient_remainder_policy`].
    pub quotient_remainder_policy: QuotientRemainderPolicy,
}

impl Config {
    pub fn new() -> Self {
        let maybe_overwrite =
            std::env::var("STARK_QUOTIENT_REMAINDER").map(|s| s.to_ascii_lowercase());
        let quotient_remainder_policy = match maybe_overwrite {
            Ok(r) if &r == "reject" => QuotientRemainderPolicy::Reject,
            _ => QuotientRemainderPolicy::Warn,
        };

        Self {
            quotient_remainder_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Overwrite the policy for non-zero quotient remainders when [proving].
/// Takes precedence over the environment variable `STARK_QUOTIENT_REMAINDER`.
///
/// Only affects the current thread.
///
/// [proving]: crate::stark::Prover::prove
pub fn overwrite_quotient_remainder_policy_to(policy: QuotientRemainderPolicy) {
    CONFIG.with_borrow_mut(|config| config.quotient_remainder_policy = policy);
}

pub(crate) fn quotient_remainder_policy() -> QuotientRemainderPolicy {
    CONFIG.with_borrow(|config| config.quotient_remainder_policy)
}
