//! Annotation-driven value injection for Rust tests.
//!
//! The crate provides the runtime behind the `rstest-inject-macros`
//! attributes: a generic injection-extension mechanism that resolves
//! annotated test parameters and fixture fields to computed values, a
//! resource loader turning files into typed values with charset and
//! line-ending handling, and log-capture backends that buffer a test's log
//! output and replay it only when the test failed.
//!
//! The moving parts compose around three abstractions:
//!
//! - [`InjectionTarget`] describes one injection site (a field, a
//!   constructor parameter, or a test-function parameter) together with the
//!   annotations recorded against it and its enclosing declarations.
//! - [`InjectExtension`] is the contract extensions implement: extract the
//!   triggering annotation, validate eagerly, resolve a value. The [`inject`]
//!   driver memoises both steps per target per [`ExtensionContext`].
//! - [`capture::CaptureGuard`] is the restoration handle for log capture:
//!   dropping it restores the original logging configuration, and a guard
//!   marked failed replays the buffered records through the restored
//!   destinations.
//!
//! # Examples
//!
//! ```
//! use rstest_inject::{Annotation, AnnotationSet, Scope};
//!
//! let annotations = AnnotationSet::new(vec![
//!     Annotation::new("resource").with_arg("path", "data/greeting.txt"),
//! ])
//! .push_enclosing(vec![Annotation::new("encoding").with_arg("value", "utf-8")]);
//!
//! assert!(annotations.is_annotated("resource", Scope::ElementOnly));
//! assert!(!annotations.is_annotated("encoding", Scope::ElementOnly));
//! assert!(annotations.is_annotated("encoding", Scope::IncludeEnclosing));
//! ```

pub mod annotation;
pub mod capture;
pub mod config;
pub mod context;
pub mod encoding;
pub mod errors;
pub mod extension;
pub mod resource;
pub mod target;

pub use annotation::{Annotation, AnnotationSet, Scope};
pub use context::{ContextStore, ExtensionContext, Namespace};
pub use encoding::EncodingSelector;
pub use errors::InjectError;
pub use extension::{InjectExtension, inject, inject_fresh};
pub use target::{DeclaringScope, InjectionTarget, TargetKind};
