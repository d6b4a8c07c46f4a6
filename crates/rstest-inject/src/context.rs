//! Hierarchical extension contexts and their keyed value stores.
//!
//! Each test scope gets an [`ExtensionContext`] node: the process-wide root,
//! optionally a node per test module or fixture type, and one node per test
//! invocation. Every node owns a [`ContextStore`], a namespaced key/value
//! map used by extensions to memoise validation outcomes and resolved
//! values. Lookups can fall back to ancestor stores, which is how values
//! cached at an outer scope survive across test invocations.

use std::any::Any;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use hashbrown::HashMap;

/// Namespace isolating one extension's store entries from another's.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Construct a namespace from a stable identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The namespace identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

type StoredValue = Arc<dyn Any + Send + Sync>;
type EntryKey = (Namespace, String);

/// Namespaced key/value store attached to one extension context.
///
/// All operations funnel through one coarse mutex, so `get`, `put`, and
/// `get_or_try_init` are each atomic with respect to the others. The
/// initialiser passed to `get_or_try_init` runs inside the lock; keep it
/// short and do not touch the same store from within it.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: Mutex<HashMap<EntryKey, StoredValue>>,
}

impl ContextStore {
    /// Look up a value by namespace and key.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    #[must_use]
    pub fn get<T>(&self, namespace: &Namespace, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.clone(), key.to_owned()))
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Store a value under a namespace and key, replacing any previous entry.
    pub fn put<T>(&self, namespace: &Namespace, key: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((namespace.clone(), key.to_owned()), Arc::new(value));
    }

    /// Return the stored value, computing and storing it on first access.
    ///
    /// # Errors
    ///
    /// Propagates the initialiser's error; nothing is stored in that case.
    pub fn get_or_try_init<T, E>(
        &self,
        namespace: &Namespace,
        key: &str,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry_key = (namespace.clone(), key.to_owned());
        if let Some(existing) = entries
            .get(&entry_key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
        {
            return Ok(existing);
        }
        let value = Arc::new(init()?);
        let stored: StoredValue = Arc::clone(&value) as StoredValue;
        entries.insert(entry_key, stored);
        Ok(value)
    }
}

/// One node in the test-scope hierarchy.
///
/// Contexts are created root-outermost; children hold a reference to their
/// parent, and inherited lookups walk the chain upward.
#[derive(Debug)]
pub struct ExtensionContext {
    unique_id: String,
    parent: Option<Arc<ExtensionContext>>,
    store: ContextStore,
    parameters: Mutex<HashMap<String, String>>,
}

static GLOBAL_ROOT: LazyLock<Arc<ExtensionContext>> =
    LazyLock::new(|| ExtensionContext::root("rstest-inject"));

impl ExtensionContext {
    /// Create a root context with the given identifier.
    #[must_use]
    pub fn root(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            unique_id: id.into(),
            parent: None,
            store: ContextStore::default(),
            parameters: Mutex::new(HashMap::new()),
        })
    }

    /// The process-wide root context shared by macro-generated tests.
    ///
    /// Values cached here survive for the whole test run, which is what
    /// allows repeated injections to share one underlying resource read.
    #[must_use]
    pub fn global_root() -> Arc<Self> {
        Arc::clone(&GLOBAL_ROOT)
    }

    /// Create a child context for a nested test scope.
    #[must_use]
    pub fn child(self: &Arc<Self>, id_segment: &str) -> Arc<Self> {
        Arc::new(Self {
            unique_id: format!("{}/{}", self.unique_id, id_segment),
            parent: Some(Arc::clone(self)),
            store: ContextStore::default(),
            parameters: Mutex::new(HashMap::new()),
        })
    }

    /// Create the per-invocation context for one test, parented on the
    /// process-wide root.
    #[must_use]
    pub fn for_test(test_id: &str) -> Arc<Self> {
        Self::global_root().child(test_id)
    }

    /// Identifier distinguishing this context from every other.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// The store attached to this context node.
    #[must_use]
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Parent context, absent on roots.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// The outermost ancestor of this context.
    #[must_use]
    pub fn root_context(self: &Arc<Self>) -> Arc<Self> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Look up a value in this store, falling back to ancestor stores.
    #[must_use]
    pub fn get_inherited<T>(&self, namespace: &Namespace, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.store.get(namespace, key).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.get_inherited(namespace, key))
        })
    }

    /// Set a configuration parameter on this context node.
    pub fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Look up a configuration parameter.
    ///
    /// Resolution order: this node, ancestor nodes, then the process
    /// environment.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<String> {
        let local = self
            .parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        local
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|parent| parent.parameter(key))
            })
            .or_else(|| std::env::var(key).ok())
    }
}
