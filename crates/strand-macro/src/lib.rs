//! # strand-macro
//!
//! `#[derive(Encode)]` and `#[derive(Decode)]` for user records.
//!
//! A record maps to a JSON object with one member per named field, in
//! declaration order. The derives generate the field-visitor calls:
//! the serializer's `begin_record`/`field`/`end_record` and the
//! deserializer's mirror, which verifies each key and the separator
//! after each value.
//!
//! ```rust,ignore
//! use strand::{Decode, Encode};
//!
//! #[derive(Encode, Decode, Debug, PartialEq)]
//! struct Account {
//!     owner: String,
//!     balance: i64,
//! }
//! // {"owner":"ada","balance":42}
//! ```
//!
//! Only structs with named fields are supported; tuples already
//! serialize as JSON arrays through the built-in impls.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Fields};

fn named_fields(input: &DeriveInput) -> Result<Vec<(syn::Ident, syn::Type)>, syn::Error> {
    match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => Ok(named
                .named
                .iter()
                .map(|f| (f.ident.clone().expect("named field"), f.ty.clone()))
                .collect()),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "derive(Encode)/derive(Decode) requires named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "derive(Encode)/derive(Decode) supports structs only",
        )),
    }
}

/// Derive `strand::codec::Encode` for a named-field struct.
#[proc_macro_derive(Encode)]
pub fn derive_encode(input: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(input as DeriveInput);
    let fields = match named_fields(&input) {
        Ok(f) => f,
        Err(e) => return e.to_compile_error().into(),
    };

    for param in input.generics.type_params_mut() {
        param.bounds.push(parse_quote!(::strand::codec::Encode));
    }
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let count = fields.len();
    let steps = fields.iter().map(|(ident, _)| {
        let key = ident.to_string();
        quote! { s.field(#key, &self.#ident)?; }
    });

    let expanded = quote! {
        impl #impl_generics ::strand::codec::Encode for #name #ty_generics #where_clause {
            fn encode<W: ::strand::net::WriteBuffer>(
                &self,
                s: &mut ::strand::codec::JsonSerializer<'_, W>,
            ) -> ::strand::codec::CodecResult<()> {
                s.begin_record()?;
                #(#steps)*
                s.end_record(#count)
            }
        }
    };
    expanded.into()
}

/// Derive `strand::codec::Decode` for a named-field struct.
#[proc_macro_derive(Decode)]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(input as DeriveInput);
    let fields = match named_fields(&input) {
        Ok(f) => f,
        Err(e) => return e.to_compile_error().into(),
    };

    for param in input.generics.type_params_mut() {
        param.bounds.push(parse_quote!(::strand::codec::Decode));
    }
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let steps = fields.iter().map(|(ident, ty)| {
        let key = ident.to_string();
        quote! { let #ident: #ty = d.field(#key)?; }
    });
    let idents = fields.iter().map(|(ident, _)| ident);

    let finish = if fields.is_empty() {
        quote! { d.end_empty_record()?; }
    } else {
        // The last field's separator check consumed the closing brace.
        quote! { d.end_record()?; }
    };

    let expanded = quote! {
        impl #impl_generics ::strand::codec::Decode for #name #ty_generics #where_clause {
            fn decode<R: ::strand::net::ReadBuffer>(
                d: &mut ::strand::codec::JsonDeserializer<'_, R>,
            ) -> ::strand::codec::CodecResult<Self> {
                d.begin_record()?;
                #(#steps)*
                #finish
                Ok(Self { #(#idents),* })
            }
        }
    };
    expanded.into()
}
