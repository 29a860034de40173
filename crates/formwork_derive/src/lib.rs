use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormData, attributes(form))]
pub fn derive_form_data(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormData derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormData derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormData derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let formwork = formwork_path();
    let mut inserts = Vec::new();
    let mut reads = Vec::new();

    for field in named_fields {
        let key = match field_key(&field) {
            Ok(key) => key,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;

        inserts.push(quote! {
            values.insert(
                #formwork::form::FieldKey::new(#key),
                <#field_ty as #formwork::form::FieldType>::into_field_value(
                    ::core::clone::Clone::clone(&self.#field_ident),
                ),
            );
        });
        reads.push(quote! {
            #field_ident: #formwork::form::read_field::<#field_ty>(values, #key)?
        });
    }

    quote! {
        impl #formwork::form::FormData for #model_ident {
            fn to_values(&self) -> #formwork::form::FormValues {
                let mut values = #formwork::form::FormValues::new();
                #(#inserts)*
                values
            }

            fn from_values(
                values: &#formwork::form::FormValues,
            ) -> #formwork::form::FormResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#reads,)*
                })
            }
        }
    }
    .into()
}

/// Field name as used by the form: `#[form(rename = "...")]` or the Rust
/// identifier converted to camelCase.
fn field_key(field: &Field) -> syn::Result<String> {
    let mut rename = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }
    if let Some(rename) = rename {
        return Ok(rename);
    }
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "FormData fields must be named"))?;
    Ok(to_camel_case(&ident.to_string()))
}

fn formwork_path() -> TokenStream2 {
    match crate_name("formwork") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::formwork),
    }
}

fn to_camel_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.trim_start_matches("r#").split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            if out.is_empty() {
                out.push(first);
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}
