//! Runtime configuration for rstest-inject.
//!
//! The module currently exposes the default text-encoding parameter used by
//! the resource loader when neither the target nor any enclosing declaration
//! selects an encoding. The value is a selector token: a charset label such
//! as `windows-1252`, or one of the symbolic tokens `default`, `platform`,
//! and `locale`.

use std::sync::{Mutex, PoisonError};

/// Environment variable naming the default text-encoding selector.
pub const DEFAULT_ENCODING_VAR: &str = "RSTEST_INJECT_DEFAULT_ENCODING";

static DEFAULT_ENCODING_OVERRIDE: Mutex<Option<String>> = Mutex::new(None);

pub(crate) fn encoding_override() -> Option<String> {
    override_state()
}

fn override_state() -> Option<String> {
    DEFAULT_ENCODING_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn env_default_encoding() -> Option<String> {
    std::env::var(DEFAULT_ENCODING_VAR)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Determine the configured default-encoding selector token, if any.
///
/// The in-process override takes precedence over the environment variable.
#[must_use]
pub fn default_encoding() -> Option<String> {
    override_state().or_else(env_default_encoding)
}

/// Override the default-encoding selector for the current process.
///
/// Tests may call [`clear_default_encoding_override`] to restore environment
/// driven behaviour after toggling the override.
pub fn set_default_encoding(token: impl Into<String>) {
    *DEFAULT_ENCODING_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(token.into());
}

/// Remove any in-process override for the default-encoding selector.
pub fn clear_default_encoding_override() {
    *DEFAULT_ENCODING_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}
