//! Block-level variable liveness.
//!
//! Classic backward dataflow over the reachable blocks: a variable is live into
//! a block if the block reads it before writing it, or if it is live out and the
//! block does not write it. Variables whose address is taken are treated as
//! live everywhere, since a store through any pointer may observe them.

use crate::{
    analysis::{PropertiesOfVariables, SpanningTree},
    ir::{BlockId, ControlFlowGraph, VarId},
    utils::BitSet,
};

/// Live-in and live-out sets per block, indexed by variable arena index.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    generation: u64,
    live_in: Vec<BitSet>,
    live_out: Vec<BitSet>,
    iterations: usize,
}

impl Liveness {
    /// Solves liveness for the blocks numbered by `tree`.
    #[must_use]
    pub fn compute(
        cfg: &ControlFlowGraph,
        tree: &SpanningTree,
        properties: &PropertiesOfVariables,
    ) -> Self {
        let block_slots = cfg.blocks().map(|b| b.id().index() + 1).max().unwrap_or(0);
        let var_count = cfg.variable_count();

        let mut pinned = BitSet::new(var_count);
        for var in properties.address_taken() {
            pinned.insert(var.index());
        }

        // upward-exposed reads and writes of every block
        let mut exposed = vec![BitSet::new(var_count); block_slots];
        let mut kill = vec![BitSet::new(var_count); block_slots];
        for &block in tree.blocks() {
            let Some(bb) = cfg.block(block) else {
                continue;
            };
            let (g, k) = (&mut exposed[block.index()], &mut kill[block.index()]);
            for &op in bb.operators() {
                let Some(operator) = cfg.operator(op) else {
                    continue;
                };
                for var in operator.kind.used_variables() {
                    if !k.contains(var.index()) {
                        g.insert(var.index());
                    }
                }
                if let Some(dest) = operator.kind.result() {
                    k.insert(dest.index());
                }
            }
        }

        let mut live_in = vec![BitSet::new(var_count); block_slots];
        let mut live_out = vec![BitSet::new(var_count); block_slots];
        let mut iterations = 0;
        let mut changed = true;

        while changed {
            changed = false;
            iterations += 1;

            for &block in tree.blocks().iter().rev() {
                let b = block.index();

                let mut out = pinned.clone();
                for succ in cfg.block_successors(block) {
                    if let Some(succ_in) = live_in.get(succ.index()) {
                        out.union_with(succ_in);
                    }
                }

                let mut inp = exposed[b].clone();
                for var in out.iter() {
                    if !kill[b].contains(var) {
                        inp.insert(var);
                    }
                }
                inp.union_with(&pinned);

                if out.count() != live_out[b].count() {
                    changed = true;
                }
                if inp.count() != live_in[b].count() {
                    changed = true;
                }
                live_out[b] = out;
                live_in[b] = inp;
            }
        }

        Liveness {
            generation: tree.generation(),
            live_in,
            live_out,
            iterations,
        }
    }

    /// Returns the graph generation these sets describe.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of sweeps the solver needed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the variables live on entry to `block`, `None` if it was not analyzed.
    #[must_use]
    pub fn live_in(&self, block: BlockId) -> Option<&BitSet> {
        self.live_in.get(block.index())
    }

    /// Returns the variables live on exit from `block`, `None` if it was not analyzed.
    #[must_use]
    pub fn live_out(&self, block: BlockId) -> Option<&BitSet> {
        self.live_out.get(block.index())
    }

    /// Returns `true` if `var` is live on exit from `block`.
    #[must_use]
    pub fn is_live_out(&self, block: BlockId, var: VarId) -> bool {
        self.live_out(block).is_some_and(|s| s.contains(var.index()))
    }
}
