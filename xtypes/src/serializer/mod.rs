//! Serializers between an entity graph and the JSON wire format.
//!
//! - **Export** ([`export`]): breadth-first, cycle-safe and depth-bounded
//!   traversal from a root entity, one wire node per visited identifier.
//! - **Import** ([`import`]): single-node import producing deferred facts,
//!   a loader adapter for lazy graph import, and an eager two-phase graph
//!   import.
//! - **Wire** ([`wire`]): typed view of the wire format for tooling that
//!   works on dumps without a registry.

pub mod export;
pub mod import;
pub mod wire;

pub use export::export_to;
pub use import::{import_from, import_graph, install_spec_loader};

/// Options for [`export_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Depth up to which neighbours are expanded; negative means unbounded.
    ///
    /// `0` exports the root without relations, `1` adds its relations and
    /// the neighbours without theirs, and so on.
    pub max_depth: i32,
    /// Emit `delete_policy` and `relation_dir_forward` for every edge.
    pub relation_metadata: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_depth: -1,
            relation_metadata: false,
        }
    }
}

impl ExportOptions {
    /// Unbounded export without relation metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expansion depth.
    #[must_use]
    pub fn max_depth(mut self, max_depth: i32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enables or disables relation metadata on edges.
    #[must_use]
    pub fn relation_metadata(mut self, enabled: bool) -> Self {
        self.relation_metadata = enabled;
        self
    }

    /// Checks whether a node first seen at `depth` has its relations expanded.
    #[must_use]
    pub fn expands(&self, depth: i32) -> bool {
        self.max_depth < 0 || depth < self.max_depth
    }
}
