//! Charset selection and decoding for text resources.
//!
//! Selectors come from annotations or the global configuration parameter.
//! A selector is either a WHATWG encoding label resolved through
//! `encoding_rs`, or one of three symbolic tokens: `default` for the library
//! default of UTF-8, `platform` for the operating system's conventional
//! encoding, and `locale` for the charset advertised by the process locale
//! variables.

use encoding_rs::Encoding;

use crate::errors::InjectError;

/// How the text encoding for a resource is chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingSelector {
    /// A WHATWG encoding label such as `utf-8` or `windows-1252`.
    Label(String),
    /// The library default, UTF-8.
    Default,
    /// The conventional encoding of the host operating system.
    Platform,
    /// The encoding advertised by `LC_ALL`, `LC_CTYPE`, or `LANG`.
    Locale,
}

impl EncodingSelector {
    /// Parse a selector token.
    ///
    /// The three symbolic tokens are matched case-insensitively; anything
    /// else is kept as a label and resolved later, so an unknown label is
    /// reported at resolution time rather than here.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        if trimmed.eq_ignore_ascii_case("default") {
            Self::Default
        } else if trimmed.eq_ignore_ascii_case("platform") {
            Self::Platform
        } else if trimmed.eq_ignore_ascii_case("locale") {
            Self::Locale
        } else {
            Self::Label(trimmed.to_owned())
        }
    }

    /// Resolve the selector to a concrete encoding.
    ///
    /// # Errors
    ///
    /// Returns [`InjectError::UnknownEncoding`] when a label is not a valid
    /// WHATWG encoding label.
    pub fn resolve(&self) -> Result<&'static Encoding, InjectError> {
        match self {
            Self::Default => Ok(encoding_rs::UTF_8),
            Self::Platform => Ok(platform_encoding()),
            Self::Locale => Ok(locale_encoding()),
            Self::Label(label) => {
                Encoding::for_label(label.as_bytes()).ok_or_else(|| InjectError::UnknownEncoding {
                    label: label.clone(),
                })
            }
        }
    }
}

fn platform_encoding() -> &'static Encoding {
    if cfg!(windows) {
        encoding_rs::WINDOWS_1252
    } else {
        encoding_rs::UTF_8
    }
}

/// Charset advertised by the locale variables, e.g. `en_GB.ISO-8859-15`.
///
/// Falls back to UTF-8 when no variable is set or the suffix is not a
/// recognised label.
fn locale_encoding() -> &'static Encoding {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|value| !value.is_empty()))
        .as_deref()
        .and_then(charset_from_locale)
        .unwrap_or(encoding_rs::UTF_8)
}

fn charset_from_locale(locale: &str) -> Option<&'static Encoding> {
    locale
        .rsplit_once('.')
        .map(|(_, charset)| charset)
        .and_then(|charset| charset.split('@').next())
        .and_then(|label| Encoding::for_label(label.as_bytes()))
}

/// Decode raw bytes with the given encoding.
///
/// Malformed sequences are replaced with U+FFFD, matching the behaviour of
/// lossy text readers; a warning is logged when replacement happened so the
/// corruption is visible in test output.
#[must_use]
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::warn!(
            "resource contained byte sequences invalid for {}; replaced with U+FFFD",
            encoding.name()
        );
    }
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::EncodingSelector;

    #[test]
    fn symbolic_tokens_parse_case_insensitively() {
        assert_eq!(EncodingSelector::parse("Default"), EncodingSelector::Default);
        assert_eq!(EncodingSelector::parse(" PLATFORM "), EncodingSelector::Platform);
        assert_eq!(EncodingSelector::parse("locale"), EncodingSelector::Locale);
    }

    #[test]
    fn labels_resolve_through_whatwg_names() {
        let encoding = EncodingSelector::parse("latin1").resolve();
        assert_eq!(
            encoding.ok().map(encoding_rs::Encoding::name),
            Some("windows-1252")
        );
    }

    #[test]
    fn unknown_labels_are_reported_with_the_label() {
        let err = EncodingSelector::parse("not-a-charset").resolve();
        let message = err.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("not-a-charset"));
    }

    #[test]
    fn default_is_utf8() {
        assert_eq!(
            EncodingSelector::Default
                .resolve()
                .ok()
                .map(encoding_rs::Encoding::name),
            Some("UTF-8")
        );
    }

    #[test]
    fn locale_charset_suffix_is_extracted() {
        let encoding = super::charset_from_locale("de_DE.ISO-8859-15@euro");
        assert_eq!(encoding.map(encoding_rs::Encoding::name), Some("ISO-8859-15"));
        assert_eq!(super::charset_from_locale("C"), None);
    }

    #[test]
    fn decode_replaces_malformed_sequences() {
        let decoded = super::decode(b"caf\xe9", encoding_rs::UTF_8);
        assert!(decoded.contains('\u{fffd}'));
        let latin = super::decode(b"caf\xe9", encoding_rs::WINDOWS_1252);
        assert_eq!(latin, "café");
    }
}
