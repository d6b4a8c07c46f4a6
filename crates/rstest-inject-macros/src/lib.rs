//! Attribute macros for resource injection and log capture in tests.
//!
//! `#[with_resources]` binds `#[resource(...)]`-annotated parameters to
//! values loaded through the `rstest-inject` runtime; `#[capture_logs]`
//! wraps a test body in a log-capture scope that replays the captured
//! records when the test fails.

mod capture;
mod resources;
mod utils;

use proc_macro::TokenStream;

/// Resolve `#[resource(...)]`-annotated parameters before the test body runs.
///
/// Annotated parameters are removed from the signature and bound inside the
/// body; remaining parameters are left for the host framework (e.g. rstest
/// fixtures). The attribute accepts a function-level `encoding = "..."`
/// argument applying to every resource parameter that does not choose its
/// own.
///
/// ```ignore
/// #[with_resources]
/// #[test]
/// fn reads_greeting(#[resource(path = "tests/data/greeting.txt")] content: String) {
///     assert!(content.starts_with("Hello"));
/// }
/// ```
#[proc_macro_attribute]
pub fn with_resources(attr: TokenStream, item: TokenStream) -> TokenStream {
    resources::with_resources(attr, item)
}

/// Capture log output for the duration of the test body.
///
/// Arguments: `backend = "log" | "tracing"` (default `log`), `target =
/// "scope"` (default: the root scope), `level = "trace" | ... | "error"`,
/// and bare `disable` to suppress instead of capture. The body receives a
/// `captured_logs` binding for in-test assertions; when the body panics the
/// captured records are replayed through the restored destinations before
/// the panic resumes.
///
/// ```ignore
/// #[capture_logs(target = "my_crate", level = "info")]
/// #[test]
/// fn stays_quiet_on_success() {
///     log::info!(target: "my_crate", "buffered");
///     assert_eq!(captured_logs.records().len(), 1);
/// }
/// ```
#[proc_macro_attribute]
pub fn capture_logs(attr: TokenStream, item: TokenStream) -> TokenStream {
    capture::capture_logs(attr, item)
}
