use arbitrary::Arbitrary;
use strum::Display;
use strum::EnumCount;
use strum::EnumDiscriminants;
use strum::EnumIter;
use twenty_first::prelude::*;

use crate::error::ProofStreamError;
use crate::error::ProofStreamError::UnexpectedItem;
use crate::table::MasterTableRow;

/// The sibling digests needed to authenticate a set of Merkle tree leaves
/// against the tree's root.
pub type AuthenticationStructure = Vec<Digest>;

/// A [FRI](crate::fri::Fri) round's revealed values together with an
/// authentication structure.
#[derive(Debug, Clone, Eq, PartialEq, Hash, BFieldCodec, Arbitrary)]
pub struct FriResponse {
    /// The values of the queried leaves of the Merkle tree.
    pub queried_leaves: Vec<XFieldElement>,

    /// The authentication structure of the Merkle tree.
    pub auth_structure: AuthenticationStructure,
}

macro_rules! proof_items {
    ($($variant:ident($payload:ty) => $in_fiat_shamir_heuristic:literal, $try_into_fn:ident,)+) => {
        #[derive(
            Debug,
            Display,
            Clone,
            Eq,
            PartialEq,
            Hash,
            EnumCount,
            EnumDiscriminants,
            BFieldCodec,
            Arbitrary,
        )]
        #[strum_discriminants(name(ProofItemVariant))]
        // discriminants' default derives: Debug, Copy, Clone, Eq, PartialEq
        #[strum_discriminants(derive(Display, Hash, EnumIter, BFieldCodec, Arbitrary))]
        pub enum ProofItem {
            $( $variant($payload), )+
        }

        impl ProofItem {
            /// Whether a given proof item should be considered in the
            /// Fiat-Shamir heuristic.
            ///
            /// A Merkle root commits to all of its leaves. Once the root has
            /// been absorbed, the committed-to elements and their
            /// authentication structures need not be absorbed again.
            pub const fn include_in_fiat_shamir_heuristic(&self) -> bool {
                match self {
                    $( Self::$variant(_) => $in_fiat_shamir_heuristic, )+
                }
            }

            $(
            pub fn $try_into_fn(self) -> Result<$payload, ProofStreamError> {
                match self {
                    Self::$variant(payload) => Ok(payload),
                    _ => Err(UnexpectedItem {
                        expected: ProofItemVariant::$variant,
                        got: self,
                    }),
                }
            }
            )+
        }

        impl ProofItemVariant {
            pub fn payload_static_length(self) -> Option<usize> {
                match self {
                    $( Self::$variant => <$payload>::static_length(), )+
                }
            }

            /// See [`ProofItem::include_in_fiat_shamir_heuristic`].
            pub const fn include_in_fiat_shamir_heuristic(self) -> bool {
                match self {
                    $( Self::$variant => $in_fiat_shamir_heuristic, )+
                }
            }

            /// Can be used as “reflection”.
            pub const fn payload_type(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($payload), )+
                }
            }
        }
    };
}

proof_items!(
    MerkleRoot(Digest) => true, try_into_merkle_root,
    FieldElements(Vec<XFieldElement>) => true, try_into_field_elements,

    // implied by some Merkle root: not included in the Fiat-Shamir heuristic
    AuthenticationStructure(AuthenticationStructure) => false, try_into_authentication_structure,
    MasterTableRows(Vec<MasterTableRow>) => false, try_into_master_table_rows,
    Log2PaddedHeight(u32) => false, try_into_log2_padded_height,
    FriCodeword(Vec<XFieldElement>) => false, try_into_fri_codeword,
    FriPolynomial(Polynomial<'static, XFieldElement>) => false, try_into_fri_polynomial,
    FriResponse(FriResponse) => false, try_into_fri_response,
);

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use std::collections::HashSet;

    use assert2::assert;
    use assert2::let_assert;
    use proptest::prelude::*;
    use proptest_arbitrary_interop::arb;
    use strum::IntoEnumIterator;
    use test_strategy::proptest;

    use super::*;
    use crate::proof::Proof;
    use crate::proof_stream::ProofStream;

    #[proptest]
    fn serialize_fri_response_in_isolation(#[strategy(arb())] fri_response: FriResponse) {
        let encoding = fri_response.encode();
        let_assert!(Ok(decoding) = FriResponse::decode(&encoding));
        prop_assert_eq!(fri_response, *decoding);
    }

    #[proptest]
    fn serialize_fri_response_in_proof_stream(#[strategy(arb())] fri_response: FriResponse) {
        let mut proof_stream = ProofStream::new();
        proof_stream.enqueue(ProofItem::FriResponse(fri_response.clone()));
        let proof: Proof = proof_stream.into();

        let_assert!(Ok(mut proof_stream) = ProofStream::try_from(&proof));
        let_assert!(Ok(proof_item) = proof_stream.dequeue());
        let_assert!(Ok(fri_response_) = proof_item.try_into_fri_response());
        prop_assert_eq!(fri_response, fri_response_);
    }

    #[proptest]
    fn serialize_master_table_rows_in_proof_stream(
        #[strategy(arb())] rows: Vec<MasterTableRow>,
    ) {
        let mut proof_stream = ProofStream::new();
        proof_stream.enqueue(ProofItem::MasterTableRows(rows.clone()));
        let proof: Proof = proof_stream.into();

        let_assert!(Ok(mut proof_stream) = ProofStream::try_from(&proof));
        let_assert!(Ok(proof_item) = proof_stream.dequeue());
        let_assert!(Ok(rows_) = proof_item.try_into_master_table_rows());
        prop_assert_eq!(rows, rows_);
    }

    #[test]
    fn interpreting_a_merkle_root_as_anything_else_gives_appropriate_error() {
        let fake_root = Digest::default();
        let item = ProofItem::MerkleRoot(fake_root);
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_authentication_structure());
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_fri_response());
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_master_table_rows());
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_field_elements());
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_log2_padded_height());
        assert!(let Err(UnexpectedItem{..}) = item.clone().try_into_fri_codeword());
        assert!(let Err(UnexpectedItem{..}) = item.try_into_fri_polynomial());
    }

    #[test]
    fn unexpected_item_error_names_both_variants() {
        let item = ProofItem::Log2PaddedHeight(5);
        let_assert!(Err(err) = item.try_into_merkle_root());
        let message = err.to_string();
        assert!(message.contains("MerkleRoot"));
        assert!(message.contains("Log2PaddedHeight"));
    }

    #[test]
    fn only_commitments_and_explicit_field_elements_enter_fiat_shamir() {
        let included = ProofItemVariant::iter()
            .filter(|variant| variant.include_in_fiat_shamir_heuristic())
            .collect::<HashSet<_>>();
        let expected = [ProofItemVariant::MerkleRoot, ProofItemVariant::FieldElements];
        assert!(HashSet::from(expected) == included);

        let item = ProofItem::FriCodeword(vec![]);
        assert!(!item.include_in_fiat_shamir_heuristic());
    }

    #[test]
    fn proof_item_payload_static_length_is_as_expected() {
        assert!(let Some(_) = ProofItemVariant::MerkleRoot.payload_static_length());
        assert!(let Some(_) = ProofItemVariant::Log2PaddedHeight.payload_static_length());
        assert!(None == ProofItemVariant::FriCodeword.payload_static_length());
        assert!(None == ProofItemVariant::FriResponse.payload_static_length());
    }

    #[test]
    fn can_loop_over_proof_item_variants() {
        let all_discriminants: HashSet<_> = ProofItemVariant::iter()
            .map(|variant| variant.bfield_codec_discriminant())
            .collect();
        assert!(ProofItem::COUNT == all_discriminants.len());
    }

    #[test]
    fn proof_item_and_its_variant_have_same_bfield_codec_discriminant() {
        assert!(
            ProofItem::MerkleRoot(Digest::default()).bfield_codec_discriminant()
                == ProofItemVariant::MerkleRoot.bfield_codec_discriminant()
        );
        assert!(
            ProofItem::Log2PaddedHeight(0).bfield_codec_discriminant()
                == ProofItemVariant::Log2PaddedHeight.bfield_codec_discriminant()
        );
        assert!(
            ProofItem::FriCodeword(vec![]).bfield_codec_discriminant()
                == ProofItemVariant::FriCodeword.bfield_codec_discriminant()
        );
    }

    #[test]
    fn proof_item_variants_payload_type_has_expected_format() {
        assert!("Digest" == ProofItemVariant::MerkleRoot.payload_type());
        assert!("Vec<MasterTableRow>" == ProofItemVariant::MasterTableRows.payload_type());
    }
}
