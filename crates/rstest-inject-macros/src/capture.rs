//! Implementation of the `#[capture_logs]` macro.
//!
//! The body is wrapped in `run_guarded`, which starts the capture, marks
//! the guard failed when the body panics, and rethrows the panic after the
//! original logging configuration is restored. The guard is exposed to the
//! body as `captured_logs`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Ident, ItemFn, LitStr, Token};

use crate::utils::error_to_tokens;

#[derive(Default)]
struct CaptureArgs {
    backend: Option<LitStr>,
    target: Option<LitStr>,
    level: Option<LitStr>,
    disable: bool,
}

impl Parse for CaptureArgs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut args = Self::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            if key == "disable" {
                args.disable = true;
            } else if key == "backend" {
                input.parse::<Token![=]>()?;
                args.backend = Some(input.parse()?);
            } else if key == "target" {
                input.parse::<Token![=]>()?;
                args.target = Some(input.parse()?);
            } else if key == "level" {
                input.parse::<Token![=]>()?;
                args.level = Some(input.parse()?);
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    "unsupported `capture_logs` argument; expected `backend`, `target`, `level`, or `disable`",
                ));
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

fn level_variant(level: Option<&LitStr>) -> syn::Result<Ident> {
    let Some(level) = level else {
        return Ok(Ident::new("Trace", Span::call_site()));
    };
    let token = level.value();
    let variant = match token.trim().to_ascii_lowercase().as_str() {
        "error" => "Error",
        "warn" => "Warn",
        "info" => "Info",
        "debug" => "Debug",
        "trace" => "Trace",
        _ => {
            return Err(syn::Error::new(
                level.span(),
                "unknown level; expected `error`, `warn`, `info`, `debug`, or `trace`",
            ));
        }
    };
    Ok(Ident::new(variant, Span::call_site()))
}

pub(crate) fn capture_logs(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = syn::parse_macro_input!(item as ItemFn);
    let args = if attr.is_empty() {
        CaptureArgs::default()
    } else {
        syn::parse_macro_input!(attr as CaptureArgs)
    };
    let level = match level_variant(args.level.as_ref()) {
        Ok(variant) => variant,
        Err(err) => return error_to_tokens(&err),
    };
    let backend = args
        .backend
        .as_ref()
        .map_or_else(|| String::from("log"), LitStr::value);
    let target = args.target.as_ref().map_or_else(String::new, LitStr::value);
    let disable = args.disable;
    let attrs = &func.attrs;
    let vis = &func.vis;
    let sig = &func.sig;
    let block = &func.block;
    let output = quote! {
        #(#attrs)*
        #vis #sig {
            let __rstest_inject_request = ::rstest_inject::capture::CaptureRequest::new(#target)
                .with_level(::rstest_inject::capture::CaptureLevel::#level);
            match ::rstest_inject::capture::run_guarded(
                #backend,
                &__rstest_inject_request,
                #disable,
                |captured_logs| {
                    let _ = &captured_logs;
                    #block
                },
            ) {
                Ok(value) => value,
                Err(error) => ::core::panic!("{error}"),
            }
        }
    };
    output.into()
}
