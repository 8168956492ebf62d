use serde_json::Value;

use crate::path::Path;
use crate::variant::get_internal_variant_key;
use crate::view::indexed_variant::IndexedVariant;

/// A snapshot with two qualifiers: whether it reflects a real point-in-time
/// state (`fully_initialized`) and whether a query filter may have pruned
/// children (`filtered`), in which case completeness only holds for children
/// actually present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheNode {
    indexed_variant: IndexedVariant,
    fully_initialized: bool,
    filtered: bool,
}

impl CacheNode {
    pub fn new(indexed_variant: IndexedVariant, fully_initialized: bool, filtered: bool) -> Self {
        Self {
            indexed_variant,
            fully_initialized,
            filtered,
        }
    }

    pub fn indexed_variant(&self) -> &IndexedVariant {
        &self.indexed_variant
    }

    pub fn variant(&self) -> &Value {
        self.indexed_variant.variant()
    }

    pub fn fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    pub fn filtered(&self) -> bool {
        self.filtered
    }

    pub fn is_complete_for_path(&self, path: &Path) -> bool {
        match path.front() {
            None => self.fully_initialized && !self.filtered,
            Some(front) => self.is_complete_for_child(front),
        }
    }

    pub fn is_complete_for_child(&self, key: &str) -> bool {
        (self.fully_initialized && !self.filtered)
            || get_internal_variant_key(self.variant(), key).is_some()
    }
}

/// The pair of snapshots a view maintains: what the local app should see
/// (pending writes layered over server state) and what the server has told
/// us. Never mutated; every processed operation produces a new instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewCache {
    local_snap: CacheNode,
    server_snap: CacheNode,
}

impl ViewCache {
    pub fn new(local_snap: CacheNode, server_snap: CacheNode) -> Self {
        Self {
            local_snap,
            server_snap,
        }
    }

    pub fn local_snap(&self) -> &CacheNode {
        &self.local_snap
    }

    pub fn server_snap(&self) -> &CacheNode {
        &self.server_snap
    }

    pub fn get_complete_local_snap(&self) -> Option<&Value> {
        if self.local_snap.fully_initialized() {
            Some(self.local_snap.variant())
        } else {
            None
        }
    }

    pub fn get_complete_server_snap(&self) -> Option<&Value> {
        if self.server_snap.fully_initialized() {
            Some(self.server_snap.variant())
        } else {
            None
        }
    }

    pub fn update_local_snap(
        &self,
        local_snap: IndexedVariant,
        complete: bool,
        filtered: bool,
    ) -> ViewCache {
        ViewCache {
            local_snap: CacheNode::new(local_snap, complete, filtered),
            server_snap: self.server_snap.clone(),
        }
    }

    pub fn update_server_snap(
        &self,
        server_snap: IndexedVariant,
        complete: bool,
        filtered: bool,
    ) -> ViewCache {
        ViewCache {
            local_snap: self.local_snap.clone(),
            server_snap: CacheNode::new(server_snap, complete, filtered),
        }
    }
}
