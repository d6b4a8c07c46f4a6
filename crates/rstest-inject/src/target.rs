//! Injection targets: fixture fields, constructor parameters, and test
//! function parameters behind one capability surface.
//!
//! A target is an immutable description of exactly one injection site,
//! created per resolution attempt by the attribute macros (or by hand in
//! tests). It exposes type lookup, scoped annotation lookup, and an error
//! factory whose concrete error kind depends on the physical site: failures
//! on parameters are parameter-resolution errors, failures on fields are
//! configuration errors.

use crate::annotation::{Annotation, AnnotationSet, Scope};
use crate::errors::InjectError;

/// Physical kind of an injection site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// A field of a fixture struct.
    Field,
    /// A parameter of a fixture constructor.
    ConstructorParameter,
    /// A parameter of a test function.
    MethodParameter,
}

impl TargetKind {
    /// Return `true` for the two parameter kinds.
    #[must_use]
    pub const fn is_parameter(self) -> bool {
        matches!(self, Self::ConstructorParameter | Self::MethodParameter)
    }
}

/// Where an injection target is declared.
///
/// Captured by the macros via `module_path!()`, `file!()`, and
/// `env!("CARGO_MANIFEST_DIR")`; the resource loader resolves relative paths
/// against the source file's directory and the manifest directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeclaringScope {
    module_path: &'static str,
    source_file: &'static str,
    manifest_dir: &'static str,
    holder: &'static str,
}

impl DeclaringScope {
    /// Construct a declaring scope.
    ///
    /// `holder` names the declaration owning the element: the test function
    /// for method parameters, the fixture type for fields.
    #[must_use]
    pub const fn new(
        module_path: &'static str,
        source_file: &'static str,
        manifest_dir: &'static str,
        holder: &'static str,
    ) -> Self {
        Self {
            module_path,
            source_file,
            manifest_dir,
            holder,
        }
    }

    /// Module path of the declaration, as produced by `module_path!()`.
    #[must_use]
    pub const fn module_path(self) -> &'static str {
        self.module_path
    }

    /// Source file of the declaration, as produced by `file!()`.
    #[must_use]
    pub const fn source_file(self) -> &'static str {
        self.source_file
    }

    /// Manifest directory of the declaring crate.
    #[must_use]
    pub const fn manifest_dir(self) -> &'static str {
        self.manifest_dir
    }

    /// Name of the declaration owning the element.
    #[must_use]
    pub const fn holder(self) -> &'static str {
        self.holder
    }
}

/// Immutable description of one injection site.
///
/// # Examples
///
/// ```
/// use rstest_inject::{
///     Annotation, AnnotationSet, DeclaringScope, InjectionTarget, Scope, TargetKind,
/// };
///
/// let target = InjectionTarget::new(
///     TargetKind::MethodParameter,
///     DeclaringScope::new(module_path!(), file!(), env!("CARGO_MANIFEST_DIR"), "my_test"),
///     "content",
///     "alloc::string::String",
///     AnnotationSet::new(vec![Annotation::new("resource").with_arg("path", "a.txt")]),
/// );
/// assert!(target.is_annotated("resource", Scope::ElementOnly));
/// ```
#[derive(Clone, Debug)]
pub struct InjectionTarget {
    kind: TargetKind,
    declaring: DeclaringScope,
    element: &'static str,
    type_name: &'static str,
    annotations: AnnotationSet,
}

impl InjectionTarget {
    /// Construct a target. The underlying element identity never changes for
    /// the lifetime of the value.
    #[must_use]
    pub fn new(
        kind: TargetKind,
        declaring: DeclaringScope,
        element: &'static str,
        type_name: &'static str,
        annotations: AnnotationSet,
    ) -> Self {
        Self {
            kind,
            declaring,
            element,
            type_name,
            annotations,
        }
    }

    /// Physical kind of the site.
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Declaring scope of the site.
    #[must_use]
    pub const fn declaring(&self) -> DeclaringScope {
        self.declaring
    }

    /// Name of the field or parameter.
    #[must_use]
    pub const fn element(&self) -> &'static str {
        self.element
    }

    /// Static type name of the site, as produced by `type_name::<T>()`.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Annotation metadata recorded for the site.
    #[must_use]
    pub const fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    /// Return `true` when an annotation with `name` is visible in `scope`.
    #[must_use]
    pub fn is_annotated(&self, name: &str, scope: Scope) -> bool {
        self.annotations.is_annotated(name, scope)
    }

    /// Find the nearest annotation with `name` visible in `scope`.
    #[must_use]
    pub fn find_annotation(&self, name: &str, scope: Scope) -> Option<&Annotation> {
        self.annotations.find(name, scope)
    }

    /// Collect every annotation with `name` visible in `scope`, in encounter
    /// order. Empty when absent.
    #[must_use]
    pub fn find_repeatable(&self, name: &str, scope: Scope) -> Vec<&Annotation> {
        self.annotations.find_repeatable(name, scope)
    }

    /// Key distinguishing this site from every other site in the process.
    #[must_use]
    pub fn unique_key(&self) -> String {
        format!(
            "{}::{}::{}",
            self.declaring.module_path(),
            self.declaring.holder(),
            self.element
        )
    }

    /// Produce the error kind appropriate for this site.
    ///
    /// Parameter sites report parameter-resolution errors; fields report
    /// configuration errors.
    #[must_use]
    pub fn create_error(&self, message: impl Into<String>) -> InjectError {
        let message = format!("{} (target '{}')", message.into(), self.unique_key());
        if self.kind.is_parameter() {
            InjectError::ParameterResolution { message }
        } else {
            InjectError::Configuration { message }
        }
    }

    /// Like [`InjectionTarget::create_error`], with an underlying cause
    /// appended to the message.
    #[must_use]
    pub fn create_error_with(
        &self,
        message: impl Into<String>,
        cause: &dyn std::error::Error,
    ) -> InjectError {
        self.create_error(format!("{}: {cause}", message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::{DeclaringScope, InjectionTarget, TargetKind};
    use crate::annotation::AnnotationSet;
    use crate::errors::InjectError;

    fn target(kind: TargetKind) -> InjectionTarget {
        InjectionTarget::new(
            kind,
            DeclaringScope::new("crate::fixtures", "src/fixtures.rs", "/tmp", "Holder"),
            "content",
            "alloc::string::String",
            AnnotationSet::default(),
        )
    }

    #[test]
    fn parameter_errors_are_resolution_errors() {
        for kind in [TargetKind::MethodParameter, TargetKind::ConstructorParameter] {
            let err = target(kind).create_error("boom");
            assert!(
                matches!(err, InjectError::ParameterResolution { .. }),
                "unexpected error for {kind:?}: {err:?}"
            );
        }
    }

    #[test]
    fn field_errors_are_configuration_errors() {
        let err = target(TargetKind::Field).create_error("boom");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("crate::fixtures::Holder::content"));
    }

    #[test]
    fn error_with_cause_keeps_the_cause_text() {
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = target(TargetKind::Field).create_error_with("load failed", &cause);
        assert!(err.to_string().contains("gone"));
    }
}
