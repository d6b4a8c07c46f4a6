//! Implementation of the `#[with_resources]` macro.
//!
//! The macro strips `#[resource(...)]` parameters from the signature and
//! binds each inside the body by building an `InjectionTarget` describing
//! the parameter and resolving it through the runtime. The module path,
//! source file, manifest directory, and holder name the runtime needs to
//! locate the file and report errors are all captured at the call site.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{FnArg, Ident, ItemFn, LitStr, Pat, Token};

use crate::utils::error_to_tokens;

pub(crate) struct FnLevelArgs {
    encoding: Option<LitStr>,
}

impl Parse for FnLevelArgs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut encoding = None;
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            if key == "encoding" {
                input.parse::<Token![=]>()?;
                encoding = Some(input.parse()?);
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    "unsupported `with_resources` argument; expected `encoding`",
                ));
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(Self { encoding })
    }
}

enum LoaderKind {
    Bytes,
    Text,
}

struct ResourceArgs {
    path: LitStr,
    encoding: Option<LitStr>,
    eol: Option<LitStr>,
    load_with: Option<(LoaderKind, syn::Path)>,
}

impl Parse for ResourceArgs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut path = None;
        let mut encoding = None;
        let mut eol = None;
        let mut load_with = None;
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            if key == "path" {
                path = Some(input.parse()?);
            } else if key == "encoding" {
                encoding = Some(input.parse()?);
            } else if key == "eol" {
                eol = Some(input.parse()?);
            } else if key == "load_with" {
                let kind_ident: Ident = input.parse()?;
                let kind = if kind_ident == "bytes" {
                    LoaderKind::Bytes
                } else if kind_ident == "text" {
                    LoaderKind::Text
                } else {
                    return Err(syn::Error::new(
                        kind_ident.span(),
                        "expected `load_with = bytes(path::to::fn)` or `load_with = text(path::to::fn)`",
                    ));
                };
                let content;
                syn::parenthesized!(content in input);
                load_with = Some((kind, content.parse::<syn::Path>()?));
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    "unsupported `resource` argument; expected `path`, `encoding`, `eol`, or `load_with`",
                ));
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        let path = path.ok_or_else(|| input.error("`resource` requires a `path` argument"))?;
        Ok(Self {
            path,
            encoding,
            eol,
            load_with,
        })
    }
}

fn param_name(pat: &Pat) -> syn::Result<String> {
    match pat {
        Pat::Ident(pat_ident) => Ok(pat_ident.ident.to_string()),
        other => Err(syn::Error::new_spanned(
            other,
            "`#[resource]` parameters must be plain identifiers",
        )),
    }
}

fn element_annotations(args: &ResourceArgs) -> Vec<TokenStream2> {
    let path = &args.path;
    let mut annotations = vec![quote! {
        ::rstest_inject::Annotation::new("resource").with_arg("path", #path)
    }];
    if let Some(encoding) = &args.encoding {
        annotations.push(quote! {
            ::rstest_inject::Annotation::new("encoding").with_arg("value", #encoding)
        });
    }
    if let Some(eol) = &args.eol {
        annotations.push(quote! {
            ::rstest_inject::Annotation::new("eol").with_arg("value", #eol)
        });
    }
    if let Some((kind, func)) = &args.load_with {
        let kind_token = match kind {
            LoaderKind::Bytes => "bytes",
            LoaderKind::Text => "text",
        };
        let func_name = quote!(#func).to_string();
        annotations.push(quote! {
            ::rstest_inject::Annotation::new("load_with")
                .with_arg("kind", #kind_token)
                .with_arg("function", #func_name)
        });
    }
    annotations
}

fn binding_for(
    pat_type: &syn::PatType,
    args: &ResourceArgs,
    fn_args: &FnLevelArgs,
    fn_name: &str,
) -> syn::Result<TokenStream2> {
    let name = param_name(&pat_type.pat)?;
    let pat = &pat_type.pat;
    let ty = &pat_type.ty;
    let element = element_annotations(args);
    let mut enclosing = Vec::new();
    if let Some(encoding) = &fn_args.encoding {
        enclosing.push(quote! {
            ::rstest_inject::Annotation::new("encoding").with_arg("value", #encoding)
        });
    }
    let resolve = match &args.load_with {
        None => quote! {
            ::rstest_inject::resource::load::<#ty>(&__rstest_inject_target, &__rstest_inject_ctx)
        },
        Some((LoaderKind::Bytes, func)) => quote! {
            ::rstest_inject::resource::load_with(
                &__rstest_inject_target,
                &__rstest_inject_ctx,
                ::rstest_inject::resource::Loader::Bytes(#func),
            )
        },
        Some((LoaderKind::Text, func)) => quote! {
            ::rstest_inject::resource::load_with(
                &__rstest_inject_target,
                &__rstest_inject_ctx,
                ::rstest_inject::resource::Loader::Text(#func),
            )
        },
    };
    Ok(quote! {
        let #pat: #ty = {
            let __rstest_inject_target = ::rstest_inject::InjectionTarget::new(
                ::rstest_inject::TargetKind::MethodParameter,
                ::rstest_inject::DeclaringScope::new(
                    ::core::module_path!(),
                    ::core::file!(),
                    ::core::env!("CARGO_MANIFEST_DIR"),
                    #fn_name,
                ),
                #name,
                ::core::any::type_name::<#ty>(),
                ::rstest_inject::AnnotationSet::new(::std::vec![#(#element),*])
                    .push_enclosing(::std::vec![#(#enclosing),*]),
            );
            match #resolve {
                Ok(value) => value,
                Err(error) => ::core::panic!("{error}"),
            }
        };
    })
}

fn expand(func: &mut ItemFn, fn_args: &FnLevelArgs) -> syn::Result<TokenStream2> {
    let fn_name = func.sig.ident.to_string();
    let mut bindings = Vec::new();
    let mut retained: Punctuated<FnArg, Token![,]> = Punctuated::new();
    for arg in std::mem::take(&mut func.sig.inputs) {
        match arg {
            FnArg::Typed(mut pat_type) => {
                let resource_index = pat_type
                    .attrs
                    .iter()
                    .position(|attr| attr.path().is_ident("resource"));
                if let Some(index) = resource_index {
                    let attr = pat_type.attrs.remove(index);
                    let args: ResourceArgs = attr.parse_args()?;
                    bindings.push(binding_for(&pat_type, &args, fn_args, &fn_name)?);
                } else {
                    retained.push(FnArg::Typed(pat_type));
                }
            }
            receiver => retained.push(receiver),
        }
    }
    func.sig.inputs = retained;
    if bindings.is_empty() {
        return Ok(quote! { #func });
    }
    let attrs = &func.attrs;
    let vis = &func.vis;
    let sig = &func.sig;
    let block = &func.block;
    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            let __rstest_inject_ctx = ::rstest_inject::ExtensionContext::for_test(
                ::core::concat!(::core::module_path!(), "::", #fn_name),
            );
            #(#bindings)*
            #block
        }
    })
}

pub(crate) fn with_resources(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut func = syn::parse_macro_input!(item as ItemFn);
    let fn_args = if attr.is_empty() {
        FnLevelArgs { encoding: None }
    } else {
        syn::parse_macro_input!(attr as FnLevelArgs)
    };
    match expand(&mut func, &fn_args) {
        Ok(tokens) => tokens.into(),
        Err(err) => error_to_tokens(&err),
    }
}
