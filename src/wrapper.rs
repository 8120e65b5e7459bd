//! Log failures of wrapped callables before they propagate.
//!
//! A failure is either an `Err` return or a panic. Either way exactly one
//! `ERROR` event is emitted, `Uncaught exception while running <name>`,
//! and then the failure continues to the caller untouched: the same `Err`
//! value is returned, or the same panic payload is resumed. Functions that do
//! not return a `Result` go through [`log_panics`] instead.
//!
//! Panic records carry a `backtrace` field taken at the panic site when
//! `RUST_BACKTRACE` enables capture. For this a panic hook is chained onto
//! whatever hook is installed when the first wrapper runs.
//!
//! ```ignore
//! use logshield::{log_exceptions, logged};
//!
//! fn parse_port(raw: &str) -> Result<u16, std::num::ParseIntError> {
//!     raw.parse()
//! }
//!
//! let port = log_exceptions("parse_port", || parse_port("8125"))?;
//!
//! let parse = logged!(parse_port);
//! let port = parse.call(("8125",))?;
//! ```

use futures::FutureExt;
use once_cell::sync::Lazy;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::task::Poll;
use tracing::error;

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
}

// Chains onto the hook that was installed when the first wrapper ran
static PANIC_HOOK: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if GUARD_DEPTH.with(Cell::get) > 0 {
            let backtrace = Backtrace::capture();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
        }
        previous(info);
    }));
});

/// Marks the current thread as running wrapped code, so the panic hook
/// records where a panic started.
struct PanicScope;

impl PanicScope {
    fn enter() -> Self {
        // The hook cannot be replaced while this thread is unwinding
        if !std::thread::panicking() {
            Lazy::force(&PANIC_HOOK);
        }
        let depth = GUARD_DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth
        });
        if depth == 0 {
            PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take());
        }
        PanicScope
    }
}

impl Drop for PanicScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run `f`, logging a panic under `name` before resuming it.
///
/// For callables that do not return a `Result`; the value is returned as is.
pub fn log_panics<R, F>(name: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let outcome = {
        let _scope = PanicScope::enter();
        panic::catch_unwind(AssertUnwindSafe(f))
    };
    match outcome {
        Ok(value) => value,
        Err(payload) => {
            report_panic(name, payload.as_ref());
            panic::resume_unwind(payload)
        }
    }
}

/// Await `fut`, logging a panic under `name` before resuming it.
pub async fn log_panics_async<R, Fut>(name: &str, fut: Fut) -> R
where
    Fut: Future<Output = R>,
{
    futures::pin_mut!(fut);
    let guarded = futures::future::poll_fn(move |cx| -> Poll<R> {
        let _scope = PanicScope::enter();
        fut.as_mut().poll(cx)
    });
    match AssertUnwindSafe(guarded).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => {
            report_panic(name, payload.as_ref());
            panic::resume_unwind(payload)
        }
    }
}

/// Run `f`, logging an `Err` or panic under `name` before passing it on.
pub fn log_exceptions<T, E, F>(name: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display,
{
    log_panics(name, f).map_err(|e| {
        report_error(name, &e);
        e
    })
}

/// Await `fut`, logging an `Err` or panic under `name` before passing it on.
pub async fn log_exceptions_async<T, E, Fut>(name: &str, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    log_panics_async(name, fut).await.map_err(|e| {
        report_error(name, &e);
        e
    })
}

// `details` is alternate Display (`{:#}` prints the whole anyhow chain);
// Debug output is never logged. `call_site` is the stack where the wrapper
// saw the `Err`, not where the error was built.
fn report_error<E>(name: &str, e: &E)
where
    E: fmt::Display,
{
    let details = format!("{e:#}");
    let call_site = Backtrace::capture();
    if call_site.status() == BacktraceStatus::Captured {
        error!(
            function = name,
            error = %e,
            details = %details,
            call_site = %call_site,
            "Uncaught exception while running {}",
            name
        );
    } else {
        error!(
            function = name,
            error = %e,
            details = %details,
            "Uncaught exception while running {}",
            name
        );
    }
}

fn report_panic(name: &str, payload: &(dyn Any + Send)) {
    let message = panic_message(payload);
    let origin = PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .filter(|bt| bt.status() == BacktraceStatus::Captured);
    match origin {
        Some(backtrace) => error!(
            function = name,
            error = %message,
            panic = true,
            backtrace = %backtrace,
            "Uncaught exception while running {}",
            name
        ),
        None => error!(
            function = name,
            error = %message,
            panic = true,
            "Uncaught exception while running {}",
            name
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Cow<'_, str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Cow::Borrowed(s.as_str())
    } else {
        Cow::Borrowed("Box<dyn Any>")
    }
}

/// A callable that can be invoked with its arguments packed in a tuple.
///
/// Implemented for every `Fn` of up to six arguments, which is what lets
/// [`Logged`] keep the wrapped function's own signature.
pub trait Callable<Args> {
    type Output;

    fn invoke(&self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg),*> Callable<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Out,
        {
            type Output = Out;

            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> Out {
                self($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A);
impl_callable!(A, B);
impl_callable!(A, B, C);
impl_callable!(A, B, C, D);
impl_callable!(A, B, C, D, E);
impl_callable!(A, B, C, D, E, F);

/// A function wrapped so that its failures are logged.
///
/// `Logged` holds no state besides the function and its name, so it is
/// `Send`/`Sync` whenever the function is and can be shared across threads.
#[derive(Clone)]
pub struct Logged<F> {
    name: Cow<'static, str>,
    func: F,
}

impl<F> Logged<F> {
    /// Wrap `func`, naming it after its type path.
    ///
    /// For `fn` items this is the function's own name; closures get the
    /// enclosing function's name with a `{{closure}}` suffix. Use
    /// [`Logged::named`] or [`logged!`](crate::logged) for a stable name.
    pub fn new(func: F) -> Self {
        Self {
            name: callable_name::<F>(),
            func,
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &F {
        &self.func
    }

    pub fn into_inner(self) -> F {
        self.func
    }

    /// Call the wrapped function with `args` packed as a tuple:
    /// `()`, `(a,)`, `(a, b)`, and so on.
    pub fn call<Args, T, E>(&self, args: Args) -> Result<T, E>
    where
        F: Callable<Args, Output = Result<T, E>>,
        E: fmt::Display,
    {
        log_exceptions(&self.name, || self.func.invoke(args))
    }

    /// Like [`Logged::call`] for functions that do not return a `Result`.
    /// Only panics are logged.
    pub fn call_value<Args>(&self, args: Args) -> F::Output
    where
        F: Callable<Args>,
    {
        log_panics(&self.name, || self.func.invoke(args))
    }
}

impl<F> fmt::Debug for Logged<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logged").field("name", &self.name).finish()
    }
}

fn callable_name<F>() -> Cow<'static, str> {
    let full = std::any::type_name::<F>();
    // Function pointers and trait objects carry no name of their own
    if !full.starts_with(|c: char| c == '<' || c == '_' || c.is_alphabetic())
        || full.starts_with("fn(")
        || full.starts_with("unsafe ")
        || full.starts_with("extern ")
        || full.starts_with("dyn ")
    {
        return Cow::Borrowed(full);
    }

    let mut base = full;
    while let Some(stripped) = base.strip_suffix("::{{closure}}") {
        base = stripped;
    }
    let short = last_segment(base);
    if short.is_empty() {
        return Cow::Borrowed(full);
    }

    if base.len() == full.len() {
        Cow::Borrowed(short)
    } else {
        Cow::Owned(format!("{short}::{{{{closure}}}}"))
    }
}

/// Last `::` segment outside angle brackets, without generic arguments.
/// `<a::Disk as a::Check>::check` gives `check`, `a::parse<u8>` gives `parse`.
fn last_segment(path: &str) -> &str {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    let segment = &path[start..];
    segment.split('<').next().unwrap_or(segment)
}

/// Wrap a function path in [`Logged`], using the path as its name.
///
/// ```ignore
/// let fetch = logshield::logged!(client::fetch_config);
/// assert_eq!(fetch.name(), "client::fetch_config");
/// ```
#[macro_export]
macro_rules! logged {
    ($func:path) => {
        $crate::Logged::named(::std::stringify!($func), $func)
    };
}
