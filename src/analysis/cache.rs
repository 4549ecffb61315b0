//! Generation-checked analysis caches.
//!
//! Each [`ControlFlowGraph`] owns an [`AnalysisCache`]. A rewriting pass asks for
//! the analyses it needs with [`ControlFlowGraph::acquire`], which recomputes
//! whatever is missing or stale and hands back an [`AnalysisSnapshot`]. The
//! snapshot borrows the graph immutably, so the graph cannot be mutated while
//! any analysis result is in use; a pass plans its rewrites against the
//! snapshot, drops it, applies the rewrites and acquires again.
//!
//! # Example
//!
//! ```rust,ignore
//! use ember_midend::analysis::CacheKind;
//!
//! let snapshot = cfg.acquire(CacheKind::USE_DEF_CHAINS)?;
//! let chains = snapshot.chains()?;
//! let dead: Vec<_> = snapshot.tree()?.variables().iter()
//!     .filter(|&&v| chains.is_unused(v))
//!     .copied()
//!     .collect();
//! drop(snapshot);
//! // mutate cfg here
//! ```

use bitflags::bitflags;

use crate::{
    analysis::{Liveness, PropertiesOfVariables, SpanningTree, UseDefChains},
    ir::ControlFlowGraph,
    Error, Result,
};

bitflags! {
    /// Selects analyses to acquire.
    ///
    /// Dependencies are pulled in automatically: every analysis needs the
    /// spanning tree, liveness also needs the variable properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CacheKind: u8 {
        /// Operator and variable numbering
        const SPANNING_TREE = 0x01;
        /// Use and def chains
        const USE_DEF_CHAINS = 0x02;
        /// Address-taken and argument flags
        const VARIABLE_PROPERTIES = 0x04;
        /// Block live-in/live-out sets
        const LIVENESS = 0x08;
    }
}

impl CacheKind {
    fn with_dependencies(self) -> Self {
        let mut kinds = self | CacheKind::SPANNING_TREE;
        if kinds.contains(CacheKind::LIVENESS) {
            kinds |= CacheKind::VARIABLE_PROPERTIES;
        }
        kinds
    }
}

/// Lazily computed analyses of one graph.
#[derive(Debug, Clone, Default)]
pub struct AnalysisCache {
    tree: Option<SpanningTree>,
    chains: Option<UseDefChains>,
    properties: Option<PropertiesOfVariables>,
    liveness: Option<Liveness>,
    recomputations: usize,
}

impl AnalysisCache {
    /// Drops every cached analysis.
    pub fn invalidate(&mut self) {
        self.tree = None;
        self.chains = None;
        self.properties = None;
        self.liveness = None;
    }

    /// Returns how many individual analyses have been computed so far.
    #[must_use]
    pub const fn recomputations(&self) -> usize {
        self.recomputations
    }

    fn refresh(&mut self, cfg: &ControlFlowGraph, kinds: CacheKind) {
        let generation = cfg.generation();

        if self.tree.as_ref().map(SpanningTree::generation) != Some(generation) {
            self.tree = Some(SpanningTree::compute(cfg));
            self.recomputations += 1;
        }
        let Some(tree) = self.tree.as_ref() else {
            return;
        };

        if kinds.contains(CacheKind::USE_DEF_CHAINS)
            && self.chains.as_ref().map(UseDefChains::generation) != Some(generation)
        {
            self.chains = Some(UseDefChains::compute(cfg, tree));
            self.recomputations += 1;
        }

        if kinds.contains(CacheKind::VARIABLE_PROPERTIES)
            && self
                .properties
                .as_ref()
                .map(PropertiesOfVariables::generation)
                != Some(generation)
        {
            self.properties = Some(PropertiesOfVariables::compute(cfg, tree));
            self.recomputations += 1;
        }

        if kinds.contains(CacheKind::LIVENESS)
            && self.liveness.as_ref().map(Liveness::generation) != Some(generation)
        {
            if let Some(properties) = self.properties.as_ref() {
                self.liveness = Some(Liveness::compute(cfg, tree, properties));
                self.recomputations += 1;
            }
        }
    }
}

fn fresh<'a, T>(
    slot: Option<&'a T>,
    cache: &'static str,
    generation_of: impl Fn(&T) -> u64,
    graph_generation: u64,
) -> Result<Option<&'a T>> {
    match slot {
        Some(value) if generation_of(value) != graph_generation => Err(Error::StaleCache {
            cache,
            cache_generation: generation_of(value),
            graph_generation,
        }),
        other => Ok(other),
    }
}

/// Read-only view of a graph together with up-to-date analyses.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSnapshot<'a> {
    cfg: &'a ControlFlowGraph,
    kinds: CacheKind,
    tree: Option<&'a SpanningTree>,
    chains: Option<&'a UseDefChains>,
    properties: Option<&'a PropertiesOfVariables>,
    liveness: Option<&'a Liveness>,
}

impl<'a> AnalysisSnapshot<'a> {
    fn new(cfg: &'a ControlFlowGraph, kinds: CacheKind) -> Result<Self> {
        let cache = &cfg.analysis;
        let generation = cfg.generation();
        let pick = |wanted: CacheKind| kinds.contains(wanted);

        Ok(AnalysisSnapshot {
            cfg,
            kinds,
            tree: fresh(
                cache.tree.as_ref(),
                "spanning tree",
                SpanningTree::generation,
                generation,
            )?,
            chains: fresh(
                cache.chains.as_ref().filter(|_| pick(CacheKind::USE_DEF_CHAINS)),
                "use/def chains",
                UseDefChains::generation,
                generation,
            )?,
            properties: fresh(
                cache
                    .properties
                    .as_ref()
                    .filter(|_| pick(CacheKind::VARIABLE_PROPERTIES)),
                "variable properties",
                PropertiesOfVariables::generation,
                generation,
            )?,
            liveness: fresh(
                cache.liveness.as_ref().filter(|_| pick(CacheKind::LIVENESS)),
                "liveness",
                Liveness::generation,
                generation,
            )?,
        })
    }

    /// Returns the graph the analyses describe.
    #[must_use]
    pub const fn cfg(&self) -> &'a ControlFlowGraph {
        self.cfg
    }

    /// Returns the analyses this snapshot was acquired with, dependencies included.
    #[must_use]
    pub const fn kinds(&self) -> CacheKind {
        self.kinds
    }

    /// Returns the spanning tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the analysis is missing from the snapshot.
    pub fn tree(&self) -> Result<&'a SpanningTree> {
        self.tree
            .ok_or_else(|| invariant_error!("spanning tree not acquired"))
    }

    /// Returns the use/def chains.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if [`CacheKind::USE_DEF_CHAINS`] was not requested.
    pub fn chains(&self) -> Result<&'a UseDefChains> {
        self.chains
            .ok_or_else(|| invariant_error!("use/def chains not acquired"))
    }

    /// Returns the variable properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if [`CacheKind::VARIABLE_PROPERTIES`] was not requested.
    pub fn properties(&self) -> Result<&'a PropertiesOfVariables> {
        self.properties
            .ok_or_else(|| invariant_error!("variable properties not acquired"))
    }

    /// Returns the liveness sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if [`CacheKind::LIVENESS`] was not requested.
    pub fn liveness(&self) -> Result<&'a Liveness> {
        self.liveness
            .ok_or_else(|| invariant_error!("liveness not acquired"))
    }

    /// Checks that every use is reached by a definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseBeforeDefinition`] for the first violation, or
    /// [`Error::Invariant`] if chains or properties were not acquired.
    pub fn verify_definitions(&self) -> Result<()> {
        self.chains()?
            .verify(self.cfg, self.tree()?, self.properties()?)
    }
}

impl ControlFlowGraph {
    /// Brings the requested analyses up to date and returns a snapshot of them.
    ///
    /// Analyses whose generation still matches the graph are reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleCache`] if a cached analysis disagrees with the
    /// graph generation after refreshing.
    pub fn acquire(&mut self, kinds: CacheKind) -> Result<AnalysisSnapshot<'_>> {
        let kinds = kinds.with_dependencies();

        let mut cache = std::mem::take(&mut self.analysis);
        cache.refresh(self, kinds);
        self.analysis = cache;

        AnalysisSnapshot::new(self, kinds)
    }

    /// Drops all cached analyses of this graph.
    pub fn invalidate_analyses(&mut self) {
        self.analysis.invalidate();
    }

    /// Returns how many analyses this graph has computed so far.
    #[must_use]
    pub const fn analysis_recomputations(&self) -> usize {
        self.analysis.recomputations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CfgBuilder, Expression, IrType, MethodId};

    fn sample() -> ControlFlowGraph {
        CfgBuilder::new(MethodId::new(0), "f")
            .arg("a", IrType::I32)
            .build_with(|f| {
                let a = f.arg(0);
                f.block(0, |b| {
                    let t = b.add(a, Expression::int(1));
                    b.ret_val(t);
                });
            })
            .unwrap()
    }

    #[test]
    fn test_acquire_reuses_fresh_analyses() {
        let mut cfg = sample();
        {
            let snap = cfg.acquire(CacheKind::USE_DEF_CHAINS).unwrap();
            assert!(snap.chains().is_ok());
            assert!(snap.liveness().is_err());
        }
        let first = cfg.analysis_recomputations();
        assert_eq!(first, 2);

        cfg.acquire(CacheKind::USE_DEF_CHAINS).unwrap();
        assert_eq!(cfg.analysis_recomputations(), first);

        cfg.acquire(CacheKind::LIVENESS).unwrap();
        // properties and liveness are new, tree and chains reused
        assert_eq!(cfg.analysis_recomputations(), first + 2);
    }

    #[test]
    fn test_mutation_forces_recompute() {
        let mut cfg = sample();
        let g = {
            let snap = cfg.acquire(CacheKind::USE_DEF_CHAINS).unwrap();
            snap.tree().unwrap().generation()
        };

        cfg.add_temporary(IrType::I32);
        let snap = cfg.acquire(CacheKind::USE_DEF_CHAINS).unwrap();
        let tree = snap.tree().unwrap();
        assert!(tree.generation() > g);
        assert_eq!(tree.generation(), snap.cfg().generation());
        assert_eq!(snap.chains().unwrap().generation(), tree.generation());
    }

    #[test]
    fn test_invalidate_drops_everything() {
        let mut cfg = sample();
        cfg.acquire(CacheKind::all()).unwrap();
        let before = cfg.analysis_recomputations();
        cfg.invalidate_analyses();
        cfg.acquire(CacheKind::SPANNING_TREE).unwrap();
        assert_eq!(cfg.analysis_recomputations(), before + 1);
    }

    #[test]
    fn test_stale_entry_is_reported() {
        let mut cfg = sample();
        cfg.acquire(CacheKind::USE_DEF_CHAINS).unwrap();
        cfg.add_temporary(IrType::I32);

        let err = AnalysisSnapshot::new(&cfg, CacheKind::USE_DEF_CHAINS).unwrap_err();
        assert!(matches!(err, Error::StaleCache { .. }));
    }

    #[test]
    fn test_verify_definitions() {
        let mut cfg = sample();
        let snap = cfg
            .acquire(CacheKind::USE_DEF_CHAINS | CacheKind::VARIABLE_PROPERTIES)
            .unwrap();
        snap.verify_definitions().unwrap();
    }
}
