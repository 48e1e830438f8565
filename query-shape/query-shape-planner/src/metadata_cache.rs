//! Request-scoped memoization of type hierarchy resolution

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use query_shape_model::{TypeId, catalog::Catalog};
use tracing::trace;

/// A type together with its resolved hierarchy.
#[derive(Debug)]
pub struct ResolvedType {
    pub id: TypeId,
    /// The type itself followed by all its descendants, ancestors before descendants
    pub hierarchy: Arc<[TypeId]>,
    pub has_derived: bool,
}

impl ResolvedType {
    pub fn derived(&self) -> &[TypeId] {
        &self.hierarchy[1..]
    }
}

/// Memoizes hierarchy resolution for the lifetime of one logical request.
///
/// The cache may be shared between sub-requests planned concurrently.
/// The first resolution of a type wins and is never replaced, so every reader
/// observes the same [ResolvedType] instance. Only misses take the lock.
pub struct MetadataCache<'c, C: Catalog + ?Sized> {
    catalog: &'c C,
    entries: Box<[OnceLock<Arc<ResolvedType>>]>,
    miss_lock: Mutex<()>,
}

impl<'c, C: Catalog + ?Sized> MetadataCache<'c, C> {
    pub fn new(catalog: &'c C) -> Self {
        Self {
            catalog,
            entries: (0..catalog.type_count()).map(|_| OnceLock::new()).collect(),
            miss_lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &'c C {
        self.catalog
    }

    /// Resolve a type by its full name
    pub fn resolve(&self, full_name: &str) -> Option<Arc<ResolvedType>> {
        self.resolve_id(self.catalog.find_type(full_name)?)
    }

    /// Resolve a type by id. Returns None for ids outside the catalog.
    pub fn resolve_id(&self, id: TypeId) -> Option<Arc<ResolvedType>> {
        let entry = self.entries.get(id.index())?;
        if let Some(resolved) = entry.get() {
            return Some(resolved.clone());
        }

        let _guard = self.miss_lock.lock().unwrap_or_else(PoisonError::into_inner);

        Some(entry.get_or_init(|| Arc::new(self.compute(id))).clone())
    }

    fn compute(&self, id: TypeId) -> ResolvedType {
        trace!(
            "resolving hierarchy of `{}`",
            self.catalog.type_info(id).name
        );

        let has_derived = self.catalog.has_derived_types(id);
        let mut hierarchy = vec![id];
        if has_derived {
            hierarchy.extend(self.catalog.resolve_derived_types(id));
        }

        debug_assert!(
            hierarchy.iter().enumerate().skip(1).all(|(index, ty)| {
                self.catalog
                    .type_info(*ty)
                    .base
                    .is_some_and(|base| hierarchy[..index].contains(&base))
            }),
            "hierarchy of {id:?} is not topologically ordered"
        );

        ResolvedType {
            id,
            hierarchy: hierarchy.into(),
            has_derived,
        }
    }
}
