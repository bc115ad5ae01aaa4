extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned};

/// Derives `common::Logging` and a CSV `Display` for a struct with named
/// fields. Columns follow field declaration order; every field must be
/// `Display`.
#[proc_macro_derive(Logging)]
pub fn logging_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as syn::DeriveInput);
    impl_logging(&ast)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn impl_logging(
    ast: &syn::DeriveInput,
) -> syn::Result<proc_macro2::TokenStream> {
    let name = &ast.ident;
    let fields = match &ast.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(syn::FieldsNamed { ref named, .. }),
            ..
        }) => named,
        _ => {
            return Err(syn::Error::new(
                ast.span(),
                "Logging can only be derived for structs with named fields",
            ))
        }
    };
    let field_names: Vec<_> =
        fields.iter().filter_map(|field| field.ident.as_ref()).collect();

    let log_format = field_names
        .iter()
        .map(|_| "{}")
        .collect::<Vec<_>>()
        .join(",");
    let header_format = field_names
        .iter()
        .map(|field_name| field_name.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let (impl_generics, ty_generics, where_clause) =
        ast.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::common::Logging for #name #ty_generics #where_clause {
            fn header(&self) -> String {
                concat!(#header_format, "\n").to_string()
            }
        }

        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!(#log_format, "\n"), #(self.#field_names),*)
            }
        }
    })
}
