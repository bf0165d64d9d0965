use twenty_first::prelude::*;
use twenty_first::util_types::sponge::Sponge;

use crate::error::ProofStreamError;
use crate::error::U32_TO_USIZE_ERR;
use crate::proof::Proof;
use crate::proof_item::ProofItem;

/// The transcript of the interaction between prover and verifier, made
/// non-interactive with the Fiat-Shamir heuristic.
///
/// The prover [enqueues](Self::enqueue) items, the verifier
/// [dequeues](Self::dequeue) them in the same order. Both sides absorb the
/// same items into their sponge, so verifier challenges are
/// [sampled](Self::sample_scalars) identically on either side.
///
/// The sponge has a single owner. Cloning a stream would fork the transcript,
/// which is why `ProofStream` is not `Clone`.
#[derive(Debug, Eq, PartialEq)]
pub struct ProofStream {
    pub items: Vec<ProofItem>,

    pub items_index: usize,

    sponge: Tip5,
}

impl ProofStream {
    pub fn new() -> Self {
        Self {
            items: vec![],
            items_index: 0,
            sponge: Tip5::init(),
        }
    }

    /// Alters the Fiat-Shamir's sponge state with the encoding of the given
    /// item. Does _not_ record the given item in the proof stream. This is
    /// useful for items that are not sent to the verifier, _e.g._, the
    /// [`Claim`](crate::proof::Claim).
    pub fn alter_fiat_shamir_state_with(&mut self, item: &impl BFieldCodec) {
        self.sponge.pad_and_absorb_all(&item.encode());
    }

    /// Send a proof item as prover to verifier. Some items do not need to be
    /// included in the Fiat-Shamir heuristic, _i.e._, they do not need to
    /// modify the sponge state. For those items, the sponge state is not
    /// modified.
    pub fn enqueue(&mut self, item: ProofItem) {
        if item.include_in_fiat_shamir_heuristic() {
            self.alter_fiat_shamir_state_with(&item);
        }
        self.items.push(item);
    }

    /// Receive a proof item from prover as verifier. See
    /// [`enqueue`](Self::enqueue) for details about the sponge state.
    pub fn dequeue(&mut self) -> Result<ProofItem, ProofStreamError> {
        let Some(item) = self.items.get(self.items_index) else {
            return Err(ProofStreamError::EmptyQueue);
        };
        let item = item.to_owned();
        if item.include_in_fiat_shamir_heuristic() {
            self.alter_fiat_shamir_state_with(&item);
        }
        self.items_index += 1;
        Ok(item)
    }

    /// Given an `upper_bound` that is a power of 2, produce `num_indices`
    /// uniform random numbers in the interval `[0; upper_bound)`.
    ///
    /// - `upper_bound`: The (non-inclusive) upper bound. Must be a power of
    ///   two that fits into a `u32`.
    /// - `num_indices`: The number of indices to sample
    pub fn sample_indices(
        &mut self,
        upper_bound: usize,
        num_indices: usize,
    ) -> Result<Vec<usize>, ProofStreamError> {
        let Ok(upper_bound_u32) = u32::try_from(upper_bound) else {
            return Err(ProofStreamError::IllegalUpperBound(upper_bound));
        };
        if !upper_bound.is_power_of_two() {
            return Err(ProofStreamError::IllegalUpperBound(upper_bound));
        }

        let indices = self
            .sponge
            .sample_indices(upper_bound_u32, num_indices)
            .into_iter()
            .map(|i| usize::try_from(i).expect(U32_TO_USIZE_ERR))
            .collect();
        Ok(indices)
    }

    /// A thin wrapper around [`Tip5::sample_scalars`].
    pub fn sample_scalars(&mut self, num_scalars: usize) -> Vec<XFieldElement> {
        self.sponge.sample_scalars(num_scalars)
    }

    /// The number of items not yet [dequeued](Self::dequeue).
    pub fn num_remaining_items(&self) -> usize {
        self.items.len().saturating_sub(self.items_index)
    }

    #[cfg(test)]
    pub(crate) fn reset_sponge(&mut self) {
        self.sponge = Tip5::init();
    }
}

impl Default for ProofStream {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&Proof> for ProofStream {
    type Error = ProofStreamError;

    fn try_from(proof: &Proof) -> Result<Self, ProofStreamError> {
        let items = *Vec::<ProofItem>::decode(&proof.0)?;
        let proof_stream = Self {
            items,
            ..Self::new()
        };
        Ok(proof_stream)
    }
}

impl From<&ProofStream> for Proof {
    fn from(proof_stream: &ProofStream) -> Self {
        Proof(proof_stream.items.encode())
    }
}

impl From<ProofStream> for Proof {
    fn from(proof_stream: ProofStream) -> Self {
        (&proof_stream).into()
    }
}
