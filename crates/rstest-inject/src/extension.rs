//! Generic injection-extension contract and driver.
//!
//! An extension turns an annotated [`InjectionTarget`] into a value. The
//! driver enforces the lifecycle per target and context: extract the
//! triggering annotation, validate eagerly (before any I/O), then resolve.
//! Validation and resolution each run at most once per target within one
//! context; outcomes are memoised in the context's store under the
//! extension's namespace.

use std::any::Any;
use std::sync::Arc;

use crate::context::{ExtensionContext, Namespace};
use crate::errors::InjectError;
use crate::target::InjectionTarget;

/// Contract implemented by injection extensions.
///
/// `Annotation` is the extension's decoded view of the annotations that
/// trigger it; `Value` is what gets injected into the site.
pub trait InjectExtension {
    /// Decoded annotation payload that triggers this extension.
    type Annotation;
    /// Value produced for the injection site.
    type Value: Any + Send + Sync;

    /// Store namespace isolating this extension's memoised state.
    fn namespace(&self) -> Namespace;

    /// Extract the triggering annotation from the target.
    ///
    /// `None` means the extension does not apply to this target.
    fn annotation(&self, target: &InjectionTarget) -> Option<Self::Annotation>;

    /// Validate the target eagerly, before any resource access.
    ///
    /// # Errors
    ///
    /// A configuration error here is fatal to the test being configured and
    /// is never retried.
    fn validate_target(
        &self,
        annotation: &Self::Annotation,
        target: &InjectionTarget,
        ctx: &Arc<ExtensionContext>,
    ) -> Result<(), InjectError>;

    /// Compute the value to inject.
    ///
    /// # Errors
    ///
    /// Resolution failures abort the single test invocation, not the run.
    fn resolve_value(
        &self,
        annotation: &Self::Annotation,
        target: &InjectionTarget,
        ctx: &Arc<ExtensionContext>,
    ) -> Result<Self::Value, InjectError>;
}

fn triggering_annotation<E: InjectExtension>(
    extension: &E,
    target: &InjectionTarget,
) -> Result<E::Annotation, InjectError> {
    extension.annotation(target).ok_or_else(|| {
        target.create_error(format!(
            "no triggering annotation for extension '{}' on '{}'",
            extension.namespace().as_str(),
            target.element()
        ))
    })
}

fn validate_once<E: InjectExtension>(
    extension: &E,
    annotation: &E::Annotation,
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
) -> Result<(), InjectError> {
    let namespace = extension.namespace();
    let key = format!("validated:{}", target.unique_key());
    if ctx.store().get::<()>(&namespace, &key).is_none() {
        extension.validate_target(annotation, target, ctx)?;
        ctx.store().put(&namespace, &key, ());
    }
    Ok(())
}

/// Resolve a target through an extension, memoising the value in the
/// context store.
///
/// The value is computed once per target per context; later calls in the
/// same context observe the stored value.
///
/// # Errors
///
/// Returns the extension's validation or resolution error unchanged, or a
/// target-appropriate error when the triggering annotation is absent.
pub fn inject<E: InjectExtension>(
    extension: &E,
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
) -> Result<Arc<E::Value>, InjectError> {
    let annotation = triggering_annotation(extension, target)?;
    validate_once(extension, &annotation, target, ctx)?;
    let key = format!("resolved:{}", target.unique_key());
    ctx.store().get_or_try_init(&extension.namespace(), &key, || {
        extension.resolve_value(&annotation, target, ctx)
    })
}

/// Resolve a target through an extension without memoising the value.
///
/// Validation is still performed at most once per target per context; the
/// value is computed fresh on every call. Used for result types that are
/// mutable or otherwise unsafe to share between tests.
///
/// # Errors
///
/// Same conditions as [`inject`].
pub fn inject_fresh<E: InjectExtension>(
    extension: &E,
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
) -> Result<E::Value, InjectError> {
    let annotation = triggering_annotation(extension, target)?;
    validate_once(extension, &annotation, target, ctx)?;
    extension.resolve_value(&annotation, target, ctx)
}
