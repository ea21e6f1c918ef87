//! An append-only deposit contract tree.
//!
//! Only the rightmost branch is kept, so appending a deposit, computing the root and producing a
//! proof for the latest deposit all take time proportional to the depth of the tree.

use anyhow::{ensure, Result};
use hashing::ZERO_HASHES;
use log::debug;
use ssz::{mix_in_length, SszHash as _, H256};
use thiserror::Error;
use typenum::Unsigned as _;
use types::phase0::{
    consts::{DepositContractTreeDepth, DepositProofLength},
    containers::DepositData,
    primitives::DepositIndex,
};

const DEPTH: usize = DepositContractTreeDepth::USIZE;
const MAX_DEPOSITS: DepositIndex = 1 << DEPTH;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DepositTree {
    // `branch[height]` is the root of the last complete subtree of that height.
    branch: [H256; DEPTH],
    deposit_count: DepositIndex,
}

impl Default for DepositTree {
    fn default() -> Self {
        Self {
            branch: [H256::zero(); DEPTH],
            deposit_count: 0,
        }
    }
}

impl DepositTree {
    #[must_use]
    pub const fn deposit_count(&self) -> DepositIndex {
        self.deposit_count
    }

    pub fn push(&mut self, index: DepositIndex, data: DepositData) -> Result<()> {
        self.validate_index(index)?;
        self.push_leaf(data.hash_tree_root());
        Ok(())
    }

    /// Appends `data` and returns the root of the tree with the new deposit count mixed in.
    pub fn push_and_compute_root(&mut self, index: DepositIndex, data: DepositData) -> Result<H256> {
        debug!(
            "DepositTree::push_and_compute_root (deposit_count: {}, index: {index})",
            self.deposit_count,
        );

        self.push(index, data)?;

        Ok(self.root())
    }

    /// Root with the deposit count mixed in, as stored in `Eth1Data.deposit_root`.
    #[must_use]
    pub fn root(&self) -> H256 {
        let mut node = H256::zero();
        let mut size = self.deposit_count;

        for (height, zero_hash) in ZERO_HASHES.iter().copied().take(DEPTH).enumerate() {
            node = if size & 1 == 1 {
                hashing::hash_256_256(self.branch[height], node)
            } else {
                hashing::hash_256_256(node, zero_hash)
            };

            size >>= 1;
        }

        mix_in_length(node, self.length())
    }

    /// Proof of the most recently pushed deposit against [`DepositTree::root`].
    ///
    /// The proof is bottom-up and ends with the length chunk, so it has the length of
    /// `Deposit.proof`.
    #[must_use]
    pub fn latest_proof(&self) -> Vec<H256> {
        let Some(index) = self.deposit_count.checked_sub(1) else {
            return vec![];
        };

        let mut proof = Vec::with_capacity(DepositProofLength::USIZE);

        for (height, zero_hash) in ZERO_HASHES.iter().copied().take(DEPTH).enumerate() {
            // Left siblings on the path to the latest leaf are exactly the stored branch nodes.
            // Right siblings are empty subtrees.
            if (index >> height) & 1 == 1 {
                proof.push(self.branch[height]);
            } else {
                proof.push(zero_hash);
            }
        }

        let mut length_chunk = H256::zero();
        length_chunk[..size_of::<u64>()].copy_from_slice(&self.deposit_count.to_le_bytes());
        proof.push(length_chunk);

        proof
    }

    fn push_leaf(&mut self, leaf: H256) {
        self.deposit_count += 1;

        let mut node = leaf;
        let mut size = self.deposit_count;

        for height in 0..DEPTH {
            if size & 1 == 1 {
                self.branch[height] = node;
                return;
            }

            node = hashing::hash_256_256(self.branch[height], node);
            size >>= 1;
        }
    }

    fn length(&self) -> usize {
        // The count never exceeds `MAX_DEPOSITS`, which fits in `usize` on supported targets.
        usize::try_from(self.deposit_count).unwrap_or(usize::MAX)
    }

    fn validate_index(&self, index: DepositIndex) -> Result<()> {
        ensure!(index < MAX_DEPOSITS, Error::Full { index });

        let expected = self.deposit_count;
        let actual = index;

        ensure!(
            actual == expected,
            Error::UnexpectedIndex { expected, actual },
        );

        Ok(())
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("attempted to add deposit with index {index} to full deposit tree")]
    Full { index: DepositIndex },
    #[error("expected deposit with index {expected}, received deposit with index {actual}")]
    UnexpectedIndex {
        expected: DepositIndex,
        actual: DepositIndex,
    },
}

#[cfg(test)]
mod tests {
    use bls::PublicKeyBytes;
    use helper_functions::predicates::is_valid_merkle_branch;
    use ssz::MerkleTree;
    use test_case::test_case;

    use super::*;

    fn deposit_data(index: u64) -> DepositData {
        DepositData {
            pubkey: PublicKeyBytes::from_low_u64_be(index + 1),
            amount: 32_000_000_000,
            ..DepositData::default()
        }
    }

    #[test]
    fn empty_tree_root_mixes_in_zero_length() {
        assert_eq!(
            DepositTree::default().root(),
            mix_in_length(ZERO_HASHES[DEPTH], 0),
        );
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(5)]
    #[test_case(16)]
    fn roots_match_full_merkle_tree(deposit_count: u64) -> Result<()> {
        let mut deposit_tree = DepositTree::default();
        let mut merkle_tree = MerkleTree::new(32);

        for index in 0..deposit_count {
            let data = deposit_data(index);
            let root = deposit_tree.push_and_compute_root(index, data)?;

            merkle_tree.push(data.hash_tree_root());

            assert_eq!(root, merkle_tree.root_with_length());
            assert_eq!(
                deposit_tree.latest_proof(),
                merkle_tree.proof_with_length(usize::try_from(index)?),
            );
        }

        Ok(())
    }

    #[test]
    fn latest_proof_verifies_against_root() -> Result<()> {
        let mut deposit_tree = DepositTree::default();

        for index in 0..7 {
            let data = deposit_data(index);
            let root = deposit_tree.push_and_compute_root(index, data)?;
            let proof = deposit_tree.latest_proof();

            assert_eq!(proof.len(), DepositProofLength::USIZE);
            assert!(is_valid_merkle_branch(
                data.hash_tree_root(),
                proof,
                index,
                root,
            ));
        }

        Ok(())
    }

    #[test]
    fn out_of_order_deposits_are_rejected() -> Result<()> {
        let mut deposit_tree = DepositTree::default();

        deposit_tree.push(0, deposit_data(0))?;

        let error = deposit_tree
            .push(2, deposit_data(2))
            .expect_err("index 1 must come first");

        assert_eq!(
            error.to_string(),
            "expected deposit with index 1, received deposit with index 2",
        );
        assert_eq!(deposit_tree.deposit_count(), 1);

        Ok(())
    }
}
