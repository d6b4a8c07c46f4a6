//! Resource descriptors and loading.
//!
//! A `resource` annotation names a file to inject into a test. The path is
//! resolved relative to the declaring source file's directory, falling back
//! to the crate manifest directory. Built-in target types cover owned text,
//! shared immutable text, and raw bytes; anything else goes through a
//! user-supplied [`Loader`] function. Annotation combinations are validated
//! before any I/O, and a missing file is always a hard error naming the
//! requested path.
//!
//! Only immutable, safely shareable results (`Arc<str>`) are cached across
//! tests; mutable targets are re-read on every resolution so one test can
//! never observe another's edits.

use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use encoding_rs::Encoding;

use crate::annotation::Scope;
use crate::config;
use crate::context::{ExtensionContext, Namespace};
use crate::encoding::{EncodingSelector, decode};
use crate::errors::InjectError;
use crate::extension::{InjectExtension, inject, inject_fresh};
use crate::target::{DeclaringScope, InjectionTarget};


/// Annotation name carrying the resource path.
pub const ANN_RESOURCE: &str = "resource";
/// Annotation name selecting a text encoding.
pub const ANN_ENCODING: &str = "encoding";
/// Annotation name overriding line endings.
pub const ANN_EOL: &str = "eol";
/// Annotation name marking a loader-function resolution.
pub const ANN_LOAD_WITH: &str = "load_with";

/// Line-ending normalisation applied to decoded text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eol {
    /// Normalise every line break to `\n`.
    Lf,
    /// Normalise every line break to `\r\n`.
    CrLf,
    /// Normalise to the host platform's conventional line break.
    Platform,
}

impl Eol {
    /// Parse an `eol` annotation token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        if trimmed.eq_ignore_ascii_case("lf") {
            Some(Self::Lf)
        } else if trimmed.eq_ignore_ascii_case("crlf") {
            Some(Self::CrLf)
        } else if trimmed.eq_ignore_ascii_case("platform") {
            Some(Self::Platform)
        } else {
            None
        }
    }

    /// The separator this override normalises to.
    #[must_use]
    pub const fn separator(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Platform => {
                if cfg!(windows) {
                    "\r\n"
                } else {
                    "\n"
                }
            }
        }
    }

    /// Rewrite every line break in `text` to this override's separator.
    #[must_use]
    pub fn normalise(self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n");
        let separator = self.separator();
        if separator == "\n" {
            unified
        } else {
            unified.replace('\n', separator)
        }
    }
}

/// Whether a target consumes decoded text or raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// The target receives decoded text.
    Text,
    /// The target receives the raw byte sequence.
    Bytes,
}

/// Loaded content handed to [`FromResource`] implementations.
#[derive(Clone, Debug)]
pub enum ResourceContent {
    /// Decoded, line-ending-normalised text.
    Text(Arc<str>),
    /// Raw bytes as read from the file.
    Bytes(Vec<u8>),
}

/// Conversion from loaded resource content to an injectable value.
///
/// Implemented for the built-in target types: `String` (mutable text
/// buffer), `Arc<str>` (shared immutable text, cached), `Box<str>` (owned
/// immutable text), and `Vec<u8>` (raw bytes).
pub trait FromResource: Sized {
    /// Whether this target consumes text or bytes.
    const KIND: ResourceKind;
    /// Whether resolved values may be cached and shared across tests.
    const CACHEABLE: bool;

    /// Build the value from loaded content matching [`Self::KIND`].
    fn from_resource(content: ResourceContent) -> Self;
}

impl FromResource for String {
    const KIND: ResourceKind = ResourceKind::Text;
    const CACHEABLE: bool = false;

    fn from_resource(content: ResourceContent) -> Self {
        match content {
            ResourceContent::Text(text) => text.as_ref().to_owned(),
            ResourceContent::Bytes(_) => unreachable!("text target handed raw bytes"),
        }
    }
}

impl FromResource for Arc<str> {
    const KIND: ResourceKind = ResourceKind::Text;
    const CACHEABLE: bool = true;

    fn from_resource(content: ResourceContent) -> Self {
        match content {
            ResourceContent::Text(text) => text,
            ResourceContent::Bytes(_) => unreachable!("text target handed raw bytes"),
        }
    }
}

impl FromResource for Box<str> {
    const KIND: ResourceKind = ResourceKind::Text;
    const CACHEABLE: bool = false;

    fn from_resource(content: ResourceContent) -> Self {
        match content {
            ResourceContent::Text(text) => Self::from(text.as_ref()),
            ResourceContent::Bytes(_) => unreachable!("text target handed raw bytes"),
        }
    }
}

impl FromResource for Vec<u8> {
    const KIND: ResourceKind = ResourceKind::Bytes;
    const CACHEABLE: bool = false;

    fn from_resource(content: ResourceContent) -> Self {
        match content {
            ResourceContent::Bytes(bytes) => bytes,
            ResourceContent::Text(_) => unreachable!("byte target handed decoded text"),
        }
    }
}

/// User-supplied factory turning an opened resource into a custom value.
pub enum Loader<T> {
    /// Factory consuming the raw byte stream.
    Bytes(fn(&mut dyn Read) -> std::io::Result<T>),
    /// Factory consuming text decoded with the resolved encoding.
    Text(fn(&str) -> std::io::Result<T>),
}

impl<T> Loader<T> {
    const fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }
}

/// Decoded view of the resource-related annotations on one target.
#[derive(Clone, Debug)]
pub struct ResourceAnnotation {
    path: Option<String>,
    element_encoding: Option<String>,
    eol_token: Option<String>,
    load_with: bool,
}

impl ResourceAnnotation {
    fn decode(target: &InjectionTarget) -> Option<Self> {
        let resource = target.find_annotation(ANN_RESOURCE, Scope::ElementOnly)?;
        Some(Self {
            path: resource.arg("path").map(ToOwned::to_owned),
            element_encoding: target
                .find_annotation(ANN_ENCODING, Scope::ElementOnly)
                .and_then(|ann| ann.arg("value"))
                .map(ToOwned::to_owned),
            eol_token: target
                .find_annotation(ANN_EOL, Scope::ElementOnly)
                .and_then(|ann| ann.arg("value"))
                .map(ToOwned::to_owned),
            load_with: target.is_annotated(ANN_LOAD_WITH, Scope::ElementOnly),
        })
    }

    fn required_path(&self, target: &InjectionTarget) -> Result<&str, InjectError> {
        self.path
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| target.create_error("resource annotation is missing a 'path'"))
    }

    fn eol(&self, target: &InjectionTarget) -> Result<Option<Eol>, InjectError> {
        self.eol_token
            .as_deref()
            .map(|token| {
                Eol::parse(token)
                    .ok_or_else(|| target.create_error(format!("unknown eol token '{token}'")))
            })
            .transpose()
    }
}

fn candidate_paths(declaring: DeclaringScope, requested: &Utf8Path) -> Vec<Utf8PathBuf> {
    if requested.is_absolute() {
        return vec![requested.to_owned()];
    }
    let manifest = Utf8Path::new(declaring.manifest_dir());
    let mut candidates = Vec::new();
    if let Some(source_dir) = Utf8Path::new(declaring.source_file()).parent() {
        candidates.push(source_dir.join(requested));
        candidates.push(manifest.join(source_dir).join(requested));
    }
    candidates.push(manifest.join(requested));
    candidates
}

/// Resolve the requested path to an existing file.
///
/// # Errors
///
/// Returns [`InjectError::ResourceNotFound`] carrying the path exactly as
/// requested when no candidate location exists.
pub fn resolve_existing(
    declaring: DeclaringScope,
    requested: &str,
) -> Result<Utf8PathBuf, InjectError> {
    candidate_paths(declaring, Utf8Path::new(requested))
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| InjectError::ResourceNotFound {
            path: requested.to_owned(),
        })
}

fn read_bytes(path: &Utf8Path, requested: &str) -> Result<Vec<u8>, InjectError> {
    std::fs::read(path).map_err(|source| InjectError::Io {
        path: requested.to_owned(),
        source,
    })
}

fn resolved_encoding(
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
) -> Result<&'static Encoding, InjectError> {
    target
        .find_annotation(ANN_ENCODING, Scope::IncludeEnclosing)
        .and_then(|ann| ann.arg("value"))
        .map(EncodingSelector::parse)
        .or_else(|| {
            config::encoding_override()
                .or_else(|| ctx.parameter(config::DEFAULT_ENCODING_VAR))
                .map(|token| EncodingSelector::parse(&token))
        })
        .unwrap_or(EncodingSelector::Default)
        .resolve()
}

fn load_text(
    annotation: &ResourceAnnotation,
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
) -> Result<Arc<str>, InjectError> {
    let requested = annotation.required_path(target)?;
    let encoding = resolved_encoding(target, ctx)?;
    let eol = annotation.eol(target)?;
    let path = resolve_existing(target.declaring(), requested)?;
    let bytes = read_bytes(&path, requested)?;
    let decoded = decode(&bytes, encoding);
    let text = eol.map(|eol| eol.normalise(&decoded)).unwrap_or(decoded);
    Ok(Arc::from(text))
}

fn cache_key(target: &InjectionTarget, path: &Utf8Path, encoding: &'static Encoding, eol: Option<Eol>) -> String {
    let eol_tag = eol.map_or("as-is", Eol::separator);
    format!(
        "{}::{}|{}|{}|{eol_tag:?}",
        target.declaring().module_path(),
        target.declaring().holder(),
        path,
        encoding.name()
    )
}

/// Namespace holding cached immutable text values.
fn cache_namespace() -> Namespace {
    Namespace::new("rstest-inject.resource.cache")
}

/// Injection extension resolving the built-in resource target types.
pub struct ResourceExtension<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceExtension<T> {
    /// Construct the extension.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ResourceExtension<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InjectExtension for ResourceExtension<T>
where
    T: FromResource + Any + Send + Sync,
{
    type Annotation = ResourceAnnotation;
    type Value = T;

    fn namespace(&self) -> Namespace {
        Namespace::new("rstest-inject.resource")
    }

    fn annotation(&self, target: &InjectionTarget) -> Option<ResourceAnnotation> {
        ResourceAnnotation::decode(target)
    }

    fn validate_target(
        &self,
        annotation: &ResourceAnnotation,
        target: &InjectionTarget,
        _ctx: &Arc<ExtensionContext>,
    ) -> Result<(), InjectError> {
        annotation.required_path(target)?;
        annotation.eol(target)?;
        if annotation.load_with {
            return Err(target.create_error(
                "'load_with' annotation present but no loader function was supplied",
            ));
        }
        if T::KIND == ResourceKind::Bytes && annotation.element_encoding.is_some() {
            return Err(
                target.create_error("'encoding' cannot be combined with a raw-byte target")
            );
        }
        Ok(())
    }

    fn resolve_value(
        &self,
        annotation: &ResourceAnnotation,
        target: &InjectionTarget,
        ctx: &Arc<ExtensionContext>,
    ) -> Result<T, InjectError> {
        match T::KIND {
            ResourceKind::Bytes => {
                let requested = annotation.required_path(target)?;
                let path = resolve_existing(target.declaring(), requested)?;
                let bytes = read_bytes(&path, requested)?;
                Ok(T::from_resource(ResourceContent::Bytes(bytes)))
            }
            ResourceKind::Text if T::CACHEABLE => {
                let requested = annotation.required_path(target)?;
                let encoding = resolved_encoding(target, ctx)?;
                let eol = annotation.eol(target)?;
                let path = resolve_existing(target.declaring(), requested)?;
                let key = cache_key(target, &path, encoding, eol);
                let cached = ctx.root_context().store().get_or_try_init(
                    &cache_namespace(),
                    &key,
                    || load_text(annotation, target, ctx),
                )?;
                let text = Arc::clone(cached.as_ref());
                Ok(T::from_resource(ResourceContent::Text(text)))
            }
            ResourceKind::Text => {
                let text = load_text(annotation, target, ctx)?;
                Ok(T::from_resource(ResourceContent::Text(text)))
            }
        }
    }
}

/// Injection extension resolving a custom type through a [`Loader`].
pub struct LoaderExtension<T> {
    loader: Loader<T>,
}

impl<T> LoaderExtension<T> {
    /// Construct the extension around a loader function.
    #[must_use]
    pub const fn new(loader: Loader<T>) -> Self {
        Self { loader }
    }
}

impl<T> InjectExtension for LoaderExtension<T>
where
    T: Any + Send + Sync,
{
    type Annotation = ResourceAnnotation;
    type Value = T;

    fn namespace(&self) -> Namespace {
        Namespace::new("rstest-inject.resource.loader")
    }

    fn annotation(&self, target: &InjectionTarget) -> Option<ResourceAnnotation> {
        ResourceAnnotation::decode(target)
    }

    fn validate_target(
        &self,
        annotation: &ResourceAnnotation,
        target: &InjectionTarget,
        _ctx: &Arc<ExtensionContext>,
    ) -> Result<(), InjectError> {
        annotation.required_path(target)?;
        if annotation.eol_token.is_some() {
            return Err(
                target.create_error("'load_with' and 'eol' are mutually exclusive")
            );
        }
        if self.loader.is_bytes() && annotation.element_encoding.is_some() {
            return Err(target.create_error(
                "'encoding' cannot be combined with a byte-stream loader function",
            ));
        }
        Ok(())
    }

    fn resolve_value(
        &self,
        annotation: &ResourceAnnotation,
        target: &InjectionTarget,
        ctx: &Arc<ExtensionContext>,
    ) -> Result<T, InjectError> {
        let requested = annotation.required_path(target)?;
        let path = resolve_existing(target.declaring(), requested)?;
        match &self.loader {
            Loader::Bytes(factory) => {
                let mut file = File::open(&path).map_err(|source| InjectError::Io {
                    path: requested.to_owned(),
                    source,
                })?;
                factory(&mut file).map_err(|source| InjectError::Io {
                    path: requested.to_owned(),
                    source,
                })
            }
            Loader::Text(factory) => {
                let encoding = resolved_encoding(target, ctx)?;
                let bytes = read_bytes(&path, requested)?;
                let decoded = decode(&bytes, encoding);
                factory(&decoded).map_err(|source| InjectError::Io {
                    path: requested.to_owned(),
                    source,
                })
            }
        }
    }
}

/// Load a built-in resource target type for the given injection site.
///
/// Immutable shareable results (`Arc<str>`) are served from the per-run
/// cache; mutable results are read fresh on every call.
///
/// # Errors
///
/// Configuration errors for invalid annotation combinations, resolution
/// errors for missing files, and wrapped I/O errors for failed reads.
pub fn load<T>(target: &InjectionTarget, ctx: &Arc<ExtensionContext>) -> Result<T, InjectError>
where
    T: FromResource + Clone + Any + Send + Sync,
{
    let extension = ResourceExtension::<T>::new();
    if T::CACHEABLE {
        inject(&extension, target, ctx).map(|value| T::clone(&value))
    } else {
        inject_fresh(&extension, target, ctx)
    }
}

/// Load a custom type through a loader function for the given injection
/// site. The value is computed fresh on every call.
///
/// # Errors
///
/// Same conditions as [`load`].
pub fn load_with<T>(
    target: &InjectionTarget,
    ctx: &Arc<ExtensionContext>,
    loader: Loader<T>,
) -> Result<T, InjectError>
where
    T: Any + Send + Sync,
{
    inject_fresh(&LoaderExtension::new(loader), target, ctx)
}
