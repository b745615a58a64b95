use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

/// Marks a function as an interposed C library entry point.
///
/// This attribute macro:
/// 1. Keeps the function name, so the exported symbol is the C name itself
/// 2. Adds `extern "C"` and `#[unsafe(no_mangle)]` (outside of `cfg(test)`,
///    so unit tests link the real libc and call the function as plain Rust)
/// 3. Registers the symbol in `crate::symbols::SHADOWED_SYMBOLS`
///
/// # Example
///
/// ```ignore
/// #[interpose]
/// pub fn getentropy(buf: *mut libc::c_void, len: libc::size_t) -> libc::c_int {
///     // implementation
/// }
/// ```
///
/// Expands to:
///
/// ```ignore
/// #[cfg_attr(not(test), unsafe(no_mangle))]
/// pub extern "C" fn getentropy(buf: *mut libc::c_void, len: libc::size_t) -> libc::c_int {
///     // implementation
/// }
///
/// #[linkme::distributed_slice(crate::symbols::SHADOWED_SYMBOLS)]
/// static _SHADOWED_GETENTROPY: (&str, crate::symbols::FnPtr) =
///     ("getentropy", crate::symbols::FnPtr(getentropy as *const ()));
/// ```
#[proc_macro_attribute]
pub fn interpose(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let attrs = &input.attrs;

    let name = &sig.ident;
    let symbol_name = name.to_string();
    let static_name = format_ident!(
        "_SHADOWED_{}",
        symbol_name.trim_start_matches('_').to_uppercase()
    );

    let inputs = &sig.inputs;
    let output = &sig.output;

    let expanded = quote! {
        #(#attrs)*
        #[cfg_attr(not(test), unsafe(no_mangle))]
        #vis extern "C" fn #name(#inputs) #output #block

        #[linkme::distributed_slice(crate::symbols::SHADOWED_SYMBOLS)]
        static #static_name: (&str, crate::symbols::FnPtr) =
            (#symbol_name, crate::symbols::FnPtr(#name as *const ()));
    };

    TokenStream::from(expanded)
}
