use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, parse_quote, ItemFn, LitStr, Path, ReturnType, Token};

/// Parses the arguments for the #[log_exceptions] attribute.
struct LogExceptionsArgs {
    /// Name reported in the log record; defaults to the function's ident.
    name: Option<LitStr>,
    /// Path to the logshield crate, for renamed dependencies.
    krate: Option<Path>,
}

impl Parse for LogExceptionsArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut name = None;
        let mut krate = None;

        while !input.is_empty() {
            // `crate` is a keyword, so plain Ident parsing would reject it
            let key = input.call(syn::Ident::parse_any)?;
            input.parse::<Token![=]>()?;
            if key == "name" {
                name = Some(input.parse()?);
            } else if key == "crate" {
                let path: LitStr = input.parse()?;
                krate = Some(path.parse::<Path>()?);
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    format!("unknown argument `{key}`, expected `name` or `crate`"),
                ));
            }
            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(LogExceptionsArgs { name, krate })
    }
}

/// Log an `Err` or panic escaping the annotated function, then pass it on.
///
/// The function must return a `Result`. Its signature is kept as written;
/// only the body is moved into `logshield::log_exceptions` (or
/// `log_exceptions_async` for `async fn`).
///
/// ```ignore
/// #[logshield::log_exceptions]
/// fn load(path: &Path) -> Result<Config, ConfigError> { ... }
///
/// #[logshield::log_exceptions(name = "checks.disk")]
/// async fn check_disk() -> anyhow::Result<()> { ... }
///
/// // With the dependency renamed to `shield` in Cargo.toml
/// #[shield::log_exceptions(crate = "shield")]
/// fn flush() -> std::io::Result<()> { ... }
/// ```
#[proc_macro_attribute]
pub fn log_exceptions(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as LogExceptionsArgs);
    let func = parse_macro_input!(item as ItemFn);

    log_exceptions_impl(args, func)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// Non-proc-macro version that can be tested
fn log_exceptions_impl(
    args: LogExceptionsArgs,
    func: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = func;

    let ret = match &sig.output {
        ReturnType::Type(_, ty) => ty,
        ReturnType::Default => {
            return Err(syn::Error::new_spanned(
                &sig,
                "#[log_exceptions] requires a function returning Result",
            ));
        }
    };

    let name = args
        .name
        .unwrap_or_else(|| LitStr::new(&sig.ident.to_string(), sig.ident.span()));

    let krate = args.krate.unwrap_or_else(|| parse_quote!(::logshield));

    let body = if sig.asyncness.is_some() {
        quote! {
            #krate::log_exceptions_async(#name, async move #block).await
        }
    } else {
        quote! {
            #krate::log_exceptions(#name, move || -> #ret #block)
        }
    };

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            #body
        }
    })
}
