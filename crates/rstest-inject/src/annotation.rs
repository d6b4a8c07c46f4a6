//! Declaration-site metadata attached to injection targets.
//!
//! Rust has no runtime reflection, so the attribute macros record the
//! annotations they see as [`Annotation`] values, grouped into levels: the
//! annotated element itself, then each enclosing declaration outward (the
//! surrounding function for parameters, then the declaring module chain).
//! Lookups walk those levels inner to outer, so the nearest annotation wins.

use hashbrown::HashMap;

/// Scope for annotation lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Inspect only the annotated element itself.
    ElementOnly,
    /// Inspect the element, then each enclosing declaration outward.
    IncludeEnclosing,
}

/// A single annotation recorded against a declaration site.
///
/// # Examples
///
/// ```
/// use rstest_inject::Annotation;
///
/// let ann = Annotation::new("resource").with_arg("path", "data/greeting.txt");
/// assert_eq!(ann.name(), "resource");
/// assert_eq!(ann.arg("path"), Some("data/greeting.txt"));
/// assert_eq!(ann.arg("encoding"), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Annotation {
    name: String,
    args: HashMap<String, String>,
}

impl Annotation {
    /// Construct an annotation with the given name and no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: HashMap::new(),
        }
    }

    /// Attach a named argument, returning the annotation for chaining.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Name of the annotation, e.g. `resource` or `encoding`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a named argument.
    #[must_use]
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Ordered annotation metadata for one injection target.
///
/// Level zero holds the annotations on the element itself; each call to
/// [`AnnotationSet::push_enclosing`] appends the next declaration outward.
/// Within a level, annotations keep their declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationSet {
    levels: Vec<Vec<Annotation>>,
}

impl AnnotationSet {
    /// Build a set from the annotations on the element itself.
    #[must_use]
    pub fn new(element: Vec<Annotation>) -> Self {
        Self {
            levels: vec![element],
        }
    }

    /// Append the annotations of the next enclosing declaration.
    ///
    /// For a parameter this is first the surrounding function, then the
    /// declaring type or module chain outward.
    #[must_use]
    pub fn push_enclosing(mut self, annotations: Vec<Annotation>) -> Self {
        self.levels.push(annotations);
        self
    }

    /// Return `true` when an annotation with `name` is visible in `scope`.
    #[must_use]
    pub fn is_annotated(&self, name: &str, scope: Scope) -> bool {
        self.find(name, scope).is_some()
    }

    /// Find the nearest annotation with `name` visible in `scope`.
    ///
    /// Walks levels inner to outer; the first match wins.
    #[must_use]
    pub fn find(&self, name: &str, scope: Scope) -> Option<&Annotation> {
        self.in_scope(scope).find(|ann| ann.name() == name)
    }

    /// Collect every annotation with `name` visible in `scope`.
    ///
    /// Matches keep encounter order: inner levels first, declaration order
    /// within a level. Matches are not deduplicated across levels. Returns an
    /// empty vector when nothing matches.
    #[must_use]
    pub fn find_repeatable(&self, name: &str, scope: Scope) -> Vec<&Annotation> {
        self.in_scope(scope)
            .filter(|ann| ann.name() == name)
            .collect()
    }

    fn in_scope(&self, scope: Scope) -> impl Iterator<Item = &Annotation> {
        let levels = match scope {
            Scope::ElementOnly => 1,
            Scope::IncludeEnclosing => self.levels.len(),
        };
        self.levels.iter().take(levels).flat_map(|level| level.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::{Annotation, AnnotationSet, Scope};

    fn sample() -> AnnotationSet {
        AnnotationSet::new(vec![
            Annotation::new("resource").with_arg("path", "a.txt"),
            Annotation::new("tag").with_arg("value", "inner-1"),
            Annotation::new("tag").with_arg("value", "inner-2"),
        ])
        .push_enclosing(vec![Annotation::new("encoding").with_arg("value", "utf-8")])
        .push_enclosing(vec![Annotation::new("tag").with_arg("value", "outer")])
    }

    #[test]
    fn element_scope_ignores_enclosing_levels() {
        let set = sample();
        assert!(set.is_annotated("resource", Scope::ElementOnly));
        assert!(!set.is_annotated("encoding", Scope::ElementOnly));
        assert!(set.is_annotated("encoding", Scope::IncludeEnclosing));
    }

    #[test]
    fn find_matches_is_annotated_for_every_scope() {
        let set = sample();
        for name in ["resource", "encoding", "tag", "absent"] {
            for scope in [Scope::ElementOnly, Scope::IncludeEnclosing] {
                assert_eq!(
                    set.find(name, scope).is_some(),
                    set.is_annotated(name, scope),
                    "presence must agree for '{name}' in {scope:?}"
                );
            }
        }
    }

    #[test]
    fn nearest_annotation_wins() {
        let set = sample().push_enclosing(vec![
            Annotation::new("resource").with_arg("path", "outer.txt"),
        ]);
        let found = set.find("resource", Scope::IncludeEnclosing);
        assert_eq!(found.and_then(|ann| ann.arg("path")), Some("a.txt"));
    }

    #[test]
    fn repeatable_matches_preserve_encounter_order() {
        let set = sample();
        let tags: Vec<_> = set
            .find_repeatable("tag", Scope::IncludeEnclosing)
            .into_iter()
            .filter_map(|ann| ann.arg("value"))
            .collect();
        assert_eq!(tags, ["inner-1", "inner-2", "outer"]);
    }

    #[test]
    fn repeatable_returns_empty_when_absent() {
        let set = sample();
        assert!(set.find_repeatable("absent", Scope::IncludeEnclosing).is_empty());
    }
}
