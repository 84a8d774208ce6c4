//! Macros for the [`snapline`](../snapline/index.html) package.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{parse_macro_input, FnArg, ItemFn, LitStr, Pat, Type};

/// Expands a test function parameterized by a single `&str` path into one
/// `#[test]` per file matching a glob pattern. The pattern is resolved
/// against `CARGO_MANIFEST_DIR` at compile time.
///
/// # Example
///
/// Given a `testdata/roundtrip` folder containing `basic.swift` and
/// `comments.swift`, the expansion of
///
/// ```ignore
/// #[glob_test("testdata/roundtrip/**/*.swift")]
/// fn test(path: &str) {
///     // runs once per fixture
/// }
/// ```
///
/// keeps `test` as written and adds `#[test] fn test_basic()` and
/// `#[test] fn test_comments()`, each calling `test` with the fixture's
/// absolute path.
#[proc_macro_attribute]
pub fn glob_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(attr as LitStr);
    let function = parse_macro_input!(item as ItemFn);
    match expand(&pattern, &function) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(pattern: &LitStr, function: &ItemFn) -> syn::Result<proc_macro2::TokenStream> {
    check_signature(function)?;

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    let resolved = if manifest_dir.is_empty() {
        pattern.value()
    } else {
        format!("{manifest_dir}/{}", pattern.value())
    };

    let paths = glob::glob(&resolved)
        .map_err(|err| syn::Error::new(pattern.span(), format!("glob_test: {err}")))?;

    // Test names reuse the path with the pattern's static prefix removed.
    let cut = resolved.find('*').unwrap_or(0);

    let fn_name = &function.sig.ident;
    let mut tests = Vec::new();
    for entry in paths {
        let path =
            entry.map_err(|err| syn::Error::new(pattern.span(), format!("glob_test: {err}")))?;
        let Some(path_str) = path.to_str() else {
            let msg = "glob_test: pattern matched a non-utf8 path";
            return Err(syn::Error::new(pattern.span(), msg));
        };

        let mut suffix = path_str.get(cut..).unwrap_or(path_str).to_string();
        if let Some(dot) = suffix.rfind('.') {
            suffix.truncate(dot);
        }
        let suffix: String = suffix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        let test_name = format_ident!("{}_{}", fn_name, suffix);
        tests.push(quote! {
            #[test]
            fn #test_name() {
                #fn_name(#path_str)
            }
        });
    }

    if tests.is_empty() {
        let msg = format!("glob_test: pattern `{resolved}` matched no files");
        return Err(syn::Error::new(pattern.span(), msg));
    }

    Ok(quote! {
        #function
        #(#tests)*
    })
}

fn check_signature(function: &ItemFn) -> syn::Result<()> {
    let inputs = &function.sig.inputs;
    if inputs.len() != 1 {
        let msg = "glob_test: annotated function must take exactly one `&str` parameter";
        return Err(syn::Error::new(function.sig.span(), msg));
    }

    let FnArg::Typed(arg) = &inputs[0] else {
        let msg = "glob_test: parameter must not be `self`";
        return Err(syn::Error::new(inputs.span(), msg));
    };

    let is_str_ref = matches!(
        &*arg.ty,
        Type::Reference(reference) if matches!(
            &*reference.elem,
            Type::Path(path) if path.path.is_ident("str")
        )
    );
    if !is_str_ref {
        let msg = "glob_test: parameter type must be `&str`";
        return Err(syn::Error::new(arg.ty.span(), msg));
    }

    if !matches!(&*arg.pat, Pat::Ident(_)) {
        let msg = "glob_test: parameter must bind a plain identifier";
        return Err(syn::Error::new(arg.pat.span(), msg));
    }

    Ok(())
}
