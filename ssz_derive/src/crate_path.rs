use std::borrow::Cow;

use proc_macro2::Span;
use proc_macro_crate::FoundCrate;
use syn::{parse_quote, Error, Ident, Path};

/// Resolves the path to a crate as seen from the crate being compiled.
///
/// Dependents may rename `ssz` in their `Cargo.toml`.
pub fn resolve(name: &str) -> Result<Path, Error> {
    let span = Span::call_site();

    let name = match proc_macro_crate::crate_name(name).map_err(|error| Error::new(span, error))? {
        FoundCrate::Itself => Cow::Borrowed(name),
        FoundCrate::Name(renamed) => Cow::Owned(renamed),
    };

    let ident = Ident::new(&name, span);

    Ok(parse_quote! { ::#ident })
}
