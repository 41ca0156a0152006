//! Derive macro crate for `gather-config`.

use darling::{ast, FromDeriveInput, FromField, ToTokens};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Lit, LitStr};

/// Implements `GatherConfigLayer` for a clap `Args`/`Parser` struct.
///
/// Every named field not marked `#[gather_config(ignore)]` is looked up in
/// the loaded configuration under its own name, and filled in when the user
/// didn't pass it on the command line. Values are parsed with `FromStr`.
#[proc_macro_derive(GatherConfigLayer, attributes(gather_config))]
pub fn derive_gather_config_layer(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match GatherConfigLayer::from_derive_input(&input) {
        Ok(layer) => quote!(#layer).into(),
        Err(e) => e.write_errors().into(),
    }
}

#[derive(FromDeriveInput)]
#[darling(supports(struct_named))]
struct GatherConfigLayer {
    ident: syn::Ident,
    data: ast::Data<(), ConfigField>,
}

#[derive(Debug, Clone, FromField)]
#[darling(forward_attrs)]
struct ConfigField {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    attrs: Vec<syn::Attribute>,
}

fn inner_type_of_option(ty: &syn::Type) -> Option<&syn::Type> {
    if let syn::Type::Path(syn::TypePath { path, .. }) = ty {
        if let Some(p) = path.segments.iter().next() {
            if p.ident != "Option" {
                return None;
            }
            if let syn::PathArguments::AngleBracketed(ab) = &p.arguments {
                if let Some(syn::GenericArgument::Type(t)) = ab.args.first() {
                    return Some(t);
                }
            }
        }
    }
    None
}

fn is_ignore_attr(attr: &syn::Attribute) -> bool {
    if !attr.path.is_ident("gather_config") {
        return false;
    }
    match attr.parse_meta() {
        Ok(syn::Meta::List(list)) => list.nested.iter().any(|nested| {
            matches!(nested, syn::NestedMeta::Meta(syn::Meta::Path(p)) if p.is_ident("ignore"))
        }),
        _ => false,
    }
}

impl ToTokens for GatherConfigLayer {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let GatherConfigLayer { data, ident } = self;
        let fields = match data.as_ref().take_struct() {
            Some(fields) => fields.fields,
            None => {
                tokens.extend(
                    syn::Error::new(ident.span(), "GatherConfigLayer only supports structs")
                        .to_compile_error(),
                );
                return;
            }
        };
        let layers = fields
            .into_iter()
            .filter(|field| !field.attrs.iter().any(is_ignore_attr))
            .filter_map(|field| {
                let name = field.ident.as_ref()?;
                let key = Lit::Str(LitStr::new(&name.to_string(), name.span()));
                let ty = &field.ty;
                let assign = if let Some(inner) = inner_type_of_option(ty) {
                    quote! {
                        self.#name = Some(<#inner as ::std::str::FromStr>::from_str(&val).map_err(|e| {
                            ::gather_config::GatherConfigError::InvalidValue(#key.into(), e.to_string())
                        })?);
                    }
                } else {
                    quote! {
                        self.#name = <#ty as ::std::str::FromStr>::from_str(&val).map_err(|e| {
                            ::gather_config::GatherConfigError::InvalidValue(#key.into(), e.to_string())
                        })?;
                    }
                };
                Some(quote! {
                    if args.value_source(#key) != Some(::gather_config::ValueSource::CommandLine) {
                        if let Ok(val) = config.get_string(#key) {
                            #assign
                        }
                    }
                })
            });

        tokens.extend(quote! {
            impl ::gather_config::GatherConfigLayer for #ident {
                #[allow(unused_variables)]
                fn layer_config(
                    &mut self,
                    args: &::gather_config::ArgMatches,
                    config: &::gather_config::GatherConfig,
                ) -> ::miette::Result<()> {
                    #(#layers)*
                    Ok(())
                }
            }
        });
    }
}
