//! Content addressing for consensus containers.
//!
//! Only the Merkleization half of SSZ is implemented. Values are never serialized to bytes.

// These are re-exported primarily to make `ssz_derive` work without additional dependencies.
pub use ethereum_types::H256;
pub use hashing;
pub use ssz_derive::SszHash;
pub use typenum::U1;

pub use crate::{
    bit_list::BitList,
    bit_vector::BitVector,
    contiguous_list::ContiguousList,
    contiguous_vector::ContiguousVector,
    error::{IndexError, PushError, ReadError},
    merkle_tree::{merkleize_bytes, merkleize_chunks, merkleize_packed, mix_in_length, MerkleTree},
    porcelain::SszHash,
};

mod basic;
mod bit_list;
mod bit_vector;
mod contiguous_list;
mod contiguous_vector;
mod error;
mod merkle_tree;
mod porcelain;
