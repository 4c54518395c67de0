//! Graph Nodes
//!
//! The dependency graph has two kinds of nodes. Cells are the leaves: they
//! hold no computation, only the set of effects that read them. Effects are
//! the computations: they hold the set of cells they read, the body to rerun,
//! and the cleanups registered by the previous run.
//!
//! Edges are stored on both sides as index sets and never own the other end.
//! Keys are generation-checked, so an id that outlives its node simply stops
//! resolving instead of aliasing a newer node in the same slot.

use indexmap::IndexSet;
use slotmap::new_key_type;
use smallvec::SmallVec;

use super::effect::Cleanup;

new_key_type! {
    /// Identifier of a reactive cell in the runtime arena.
    pub struct CellId;

    /// Identifier of an effect in the runtime arena.
    pub struct EffectId;
}

/// The body of an effect, type-erased. Returns the cleanup for this run, if any.
pub(crate) type EffectBody = Box<dyn FnMut() -> Option<Cleanup>>;

/// Arena record for a reactive cell.
#[derive(Debug, Default)]
pub(crate) struct CellNode {
    /// Effects that read this cell during their latest run.
    pub(crate) subscribers: IndexSet<EffectId>,
}

/// Arena record for an effect.
pub(crate) struct EffectNode {
    /// `None` while the body is executing.
    pub(crate) body: Option<EffectBody>,

    /// Cells read during the latest run.
    pub(crate) dependencies: IndexSet<CellId>,

    /// Cleanups to run before the next run or at disposal, in order.
    pub(crate) cleanups: SmallVec<[Cleanup; 2]>,

    pub(crate) first_run: bool,

    /// When false, the very first run skips the body.
    pub(crate) init_run: bool,

    /// Number of times the body has actually been invoked.
    pub(crate) runs: usize,
}

impl EffectNode {
    pub(crate) fn new(body: EffectBody, init_run: bool) -> Self {
        Self {
            body: Some(body),
            dependencies: IndexSet::new(),
            cleanups: SmallVec::new(),
            first_run: true,
            init_run,
            runs: 0,
        }
    }

    /// Whether the upcoming run should skip the body.
    pub(crate) fn skips_body(&self) -> bool {
        self.first_run && !self.init_run
    }
}

impl std::fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectNode")
            .field("running", &self.body.is_none())
            .field("dependencies", &self.dependencies)
            .field("cleanups", &self.cleanups.len())
            .field("first_run", &self.first_run)
            .field("init_run", &self.init_run)
            .field("runs", &self.runs)
            .finish()
    }
}
