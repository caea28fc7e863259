//! Per-import mapping from feed-supplied natural keys to generated
//! surrogate keys.
//!
//! One [`ReferenceCache`] is created at the start of each agency import and
//! discarded with the transaction. It is never shared across agencies or
//! across imports of the same agency.

use crate::error::ImportError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

/// Entity types whose natural keys are rewritten during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Agency,
    Stop,
    Route,
    Service,
    Trip,
    Shape,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Agency => "agency",
            EntityKind::Stop => "stop",
            EntityKind::Route => "route",
            EntityKind::Service => "service",
            EntityKind::Trip => "trip",
            EntityKind::Shape => "shape",
        };
        f.write_str(name)
    }
}

pub struct ReferenceCache {
    maps: HashMap<EntityKind, HashMap<String, i64>>,
    single_agency_fallback: bool,
}

impl ReferenceCache {
    pub fn new(single_agency_fallback: bool) -> Self {
        Self {
            maps: HashMap::new(),
            single_agency_fallback,
        }
    }

    /// Record a natural-key to surrogate-key mapping. Last write wins,
    /// though well-formed feeds never write the same key twice.
    pub fn put(&mut self, kind: EntityKind, natural_key: &str, surrogate: i64) {
        self.maps
            .entry(kind)
            .or_default()
            .insert(natural_key.to_string(), surrogate);
    }

    pub fn get(&self, kind: EntityKind, natural_key: &str) -> Option<i64> {
        self.maps.get(&kind)?.get(natural_key).copied()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    /// Resolve a natural key or fail with a reference-resolution error.
    ///
    /// The agency kind gets one fallback: when the key is blank or unknown
    /// and exactly one agency is cached, that agency's surrogate key is
    /// used. The fallback is a named policy because it can mask genuine data
    /// errors in multi-agency feeds.
    pub fn require(&self, kind: EntityKind, natural_key: &str) -> Result<i64, ImportError> {
        if let Some(id) = self.get(kind, natural_key) {
            return Ok(id);
        }

        if kind == EntityKind::Agency && self.single_agency_fallback {
            if let Some(map) = self.maps.get(&EntityKind::Agency) {
                if map.len() == 1 {
                    if let Some(&id) = map.values().next() {
                        return Ok(id);
                    }
                }
            }
        }

        Err(ImportError::ReferenceResolution {
            kind,
            natural_key: natural_key.to_string(),
        })
    }

    /// Return the cached surrogate key for a shape, or run `create` to
    /// insert the row and memoize the result. Safe to call repeatedly for
    /// the same key across batches; the row is only created once.
    pub async fn get_or_create_shape<F, Fut>(
        &mut self,
        natural_key: &str,
        create: F,
    ) -> Result<i64, ImportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, ImportError>>,
    {
        if let Some(id) = self.get(EntityKind::Shape, natural_key) {
            return Ok(id);
        }

        let id = create().await?;
        self.put(EntityKind::Shape, natural_key, id);
        Ok(id)
    }
}
