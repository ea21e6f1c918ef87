use darling::{ast::Data, FromDeriveInput, FromField};
use itertools::Itertools as _;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Error, Generics, Ident, Member, Path, Type};

use crate::crate_path;

#[derive(FromField)]
#[darling(attributes(ssz))]
pub struct Field {
    ident: Option<Ident>,
    ty: Type,
    #[darling(default)]
    skip: bool,
}

#[derive(FromDeriveInput)]
#[darling(attributes(ssz))]
pub struct Container {
    ident: Ident,
    generics: Generics,
    data: Data<(), Field>,
    // Needed to derive inside the `ssz` crate itself.
    #[darling(default)]
    internal: bool,
    // Newtypes hash to the root of their only field.
    #[darling(default)]
    transparent: bool,
}

impl Container {
    pub fn hash_impl(&self) -> Result<TokenStream, Error> {
        let ssz = self.ssz_path()?;
        let ident = &self.ident;
        let (impl_generics, ty_generics, where_clause) = self.generics.split_for_impl();

        let (packing_factor, root) = if self.transparent {
            let (member, field) = self.only_field()?;
            let ty = &field.ty;

            (
                quote! { <#ty as #ssz::SszHash>::PackingFactor },
                quote! { #ssz::SszHash::hash_tree_root(&self.#member) },
            )
        } else {
            (quote! { #ssz::U1 }, self.merkleized_fields(&ssz)?)
        };

        Ok(quote! {
            impl #impl_generics #ssz::SszHash for #ident #ty_generics #where_clause {
                type PackingFactor = #packing_factor;

                fn hash_tree_root(&self) -> #ssz::H256 {
                    #root
                }
            }
        })
    }

    // The tree is unrolled at compile time. Odd layers are padded with the zero subtree root of
    // the same height.
    fn merkleized_fields(&self, ssz: &Path) -> Result<TokenStream, Error> {
        let mut layer = self
            .hashed_fields()?
            .map(|(member, _)| quote! { #ssz::SszHash::hash_tree_root(&self.#member) })
            .collect_vec();

        let mut height = 0_usize;

        while layer.len() > 1 {
            let padding = quote! { #ssz::hashing::ZERO_HASHES[#height] };

            layer = layer
                .into_iter()
                .chain(core::iter::once(padding))
                .tuples()
                .map(|(left, right)| quote! { #ssz::hashing::hash_256_256(#left, #right) })
                .collect();

            height += 1;
        }

        layer
            .pop()
            .ok_or_else(|| Error::new(Span::call_site(), "container has no hashed fields"))
    }

    fn only_field(&self) -> Result<(Member, &Field), Error> {
        self.hashed_fields()?.exactly_one().map_err(|_| {
            Error::new(
                Span::call_site(),
                "transparent containers must have exactly one hashed field",
            )
        })
    }

    fn hashed_fields(&self) -> Result<impl Iterator<Item = (Member, &Field)>, Error> {
        let fields = match &self.data {
            Data::Enum(_) => {
                return Err(Error::new(Span::call_site(), "unions are not supported"));
            }
            Data::Struct(fields) => fields,
        };

        Ok(fields
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.skip)
            .map(|(position, field)| {
                let member = field
                    .ident
                    .clone()
                    .map_or_else(|| Member::Unnamed(position.into()), Member::Named);

                (member, field)
            }))
    }

    fn ssz_path(&self) -> Result<Path, Error> {
        if self.internal {
            Ok(syn::parse_quote! { crate })
        } else {
            crate_path::resolve("ssz")
        }
    }
}
