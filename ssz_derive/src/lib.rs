//! Derive macro for `ssz::SszHash`.
//!
//! Containers are hashed by merkleizing the roots of their fields in declaration order.
//! Fields marked `#[ssz(skip)]` do not take part in hashing.

use darling::FromDeriveInput as _;
use proc_macro::TokenStream;
use syn::{parse_macro_input, Error};

use crate::container::Container;

mod container;
mod crate_path;

#[proc_macro_derive(SszHash, attributes(ssz))]
pub fn derive_ssz_hash(input: TokenStream) -> TokenStream {
    match Container::from_derive_input(&parse_macro_input!(input)) {
        Ok(container) => container.hash_impl().unwrap_or_else(Error::into_compile_error),
        Err(error) => error.write_errors(),
    }
    .into()
}
