use darling::ast::{Data, NestedMeta};
use darling::util::Ignored;
use darling::{Error, FromDeriveInput, FromField};
use quote::quote;
use syn::{DeriveInput, ItemStruct, parse_macro_input};

use proc_macro::TokenStream;

/// GUID tail shared by the standard Wave64 chunks after their FourCC.
const W64_GUID_SUFFIX: [u8; 12] = [
    0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

#[derive(FromField)]
#[darling(attributes(bytes))]
struct BytesField {
    ident: Option<syn::Ident>,
    #[darling(default)]
    skip: bool,
}

#[derive(FromDeriveInput)]
#[darling(attributes(bytes), supports(struct_any))]
struct BytesInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: Data<Ignored, BytesField>,
}

/// Serialises every field little-endian in declaration order. Fields marked
/// `#[bytes(skip)]` are left out.
#[proc_macro_derive(ToBytes, attributes(bytes))]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let input = match BytesInput::from_derive_input(&input) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields: Vec<syn::Member> = input
        .data
        .take_struct()
        .map(|s| s.fields)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter(|(_, f)| !f.skip)
        .map(|(i, f)| match f.ident {
            Some(ident) => ident.into(),
            None => syn::Index::from(i).into(),
        })
        .collect();

    let expanded = quote! {
        impl #impl_generics crate::byteorder::WriteBytesLe for #name #ty_generics #where_clause {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#fields, dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

/// Implements `W64Chunk` for a struct that also derives `ToBytes`.
///
/// Takes either a full 16-byte GUID or a 4-byte FourCC, which is completed
/// with the standard Wave64 GUID tail.
#[proc_macro_attribute]
pub fn w64_chunk(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let Some(arg) = args.first() else {
        return TokenStream::from(
            Error::custom("w64_chunk expects a byte string, e.g. b\"fmt \"").write_errors(),
        );
    };
    let id = match arg {
        NestedMeta::Lit(syn::Lit::ByteStr(bs)) => bs.value(),
        _ => {
            return TokenStream::from(
                syn::Error::new_spanned(arg, "w64_chunk expects a byte string").to_compile_error(),
            );
        }
    };

    let guid: Vec<u8> = match id.len() {
        16 => id,
        4 => id.into_iter().chain(W64_GUID_SUFFIX).collect(),
        _ => {
            return TokenStream::from(
                syn::Error::new_spanned(arg, "w64_chunk expects a 4-byte FourCC or 16-byte GUID")
                    .to_compile_error(),
            );
        }
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl crate::wav::W64Chunk for #name {
            fn chunk_guid(&self) -> &[u8; 16] {
                const GUID: [u8; 16] = [#(#guid),*];
                &GUID
            }

            fn chunk_data(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                crate::byteorder::WriteBytesLe::write_le(self, &mut vec);
                vec
            }
        }
    };
    TokenStream::from(expanded)
}
