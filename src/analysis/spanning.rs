//! Spanning-tree numbering of operators and variables.
//!
//! Reachable blocks are laid out in reverse postorder from the entry and their
//! operators numbered contiguously, so the operators of one block occupy a
//! consecutive index range. Range questions such as "is `v` written strictly
//! between positions `a` and `b`" become a slice scan.
//!
//! Variables are numbered by first appearance: the method arguments first, in
//! declaration order, then every other variable the first time an operator
//! defines or reads it. Variables no reachable operator mentions get no index.

use std::collections::HashMap;

use crate::{
    ir::{BlockId, ControlFlowGraph, OperatorId, VarId},
    utils::graph::{algorithms, NodeId},
};

/// Numbering of one graph generation.
#[derive(Debug, Clone, Default)]
pub struct SpanningTree {
    generation: u64,
    blocks: Vec<BlockId>,
    operators: Vec<OperatorId>,
    operator_index: HashMap<OperatorId, usize>,
    block_ranges: HashMap<BlockId, (usize, usize)>,
    variables: Vec<VarId>,
    variable_index: Vec<Option<usize>>,
}

impl SpanningTree {
    /// Numbers the reachable part of `cfg`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let mut tree = SpanningTree {
            generation: cfg.generation(),
            variable_index: vec![None; cfg.variable_count()],
            ..Self::default()
        };

        for &arg in cfg.arguments() {
            tree.number_variable(arg);
        }

        let Some(entry) = cfg.entry() else {
            return tree;
        };

        for node in algorithms::reverse_postorder(cfg, NodeId::new(entry.index())) {
            let block_id = BlockId::new(node.index());
            let Some(block) = cfg.block(block_id) else {
                continue;
            };

            let start = tree.operators.len();
            for &op in block.operators() {
                let Some(operator) = cfg.operator(op) else {
                    continue;
                };
                tree.operator_index.insert(op, tree.operators.len());
                tree.operators.push(op);

                if let Some(dest) = operator.kind.result() {
                    tree.number_variable(dest);
                }
                for var in operator.kind.used_variables() {
                    tree.number_variable(var);
                }
            }
            tree.block_ranges
                .insert(block_id, (start, tree.operators.len()));
            tree.blocks.push(block_id);
        }

        tree
    }

    fn number_variable(&mut self, var: VarId) {
        if let Some(slot) = self.variable_index.get_mut(var.index()) {
            if slot.is_none() {
                *slot = Some(self.variables.len());
                self.variables.push(var);
            }
        }
    }

    /// Returns the graph generation this numbering describes.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the reachable blocks in reverse postorder.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Returns all numbered operators; position in the slice is the spanning index.
    #[must_use]
    pub fn operators(&self) -> &[OperatorId] {
        &self.operators
    }

    /// Returns all numbered variables; position in the slice is the spanning index.
    #[must_use]
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    /// Returns the spanning index of an operator, `None` if it is unreachable.
    #[must_use]
    pub fn operator_index(&self, op: OperatorId) -> Option<usize> {
        self.operator_index.get(&op).copied()
    }

    /// Returns the spanning index of a variable.
    #[must_use]
    pub fn variable_index(&self, var: VarId) -> Option<usize> {
        self.variable_index.get(var.index()).copied().flatten()
    }

    /// Returns the block holding the operator at spanning position `index`.
    #[must_use]
    pub fn block_of(&self, index: usize) -> Option<BlockId> {
        self.blocks.iter().copied().find(|b| {
            self.block_ranges
                .get(b)
                .is_some_and(|&(start, end)| (start..end).contains(&index))
        })
    }

    /// Returns the half-open index range `[start, end)` occupied by a block.
    #[must_use]
    pub fn block_range(&self, block: BlockId) -> Option<(usize, usize)> {
        self.block_ranges.get(&block).copied()
    }

    /// Returns the operators strictly between spanning positions `start` and `end`.
    ///
    /// Empty when `end <= start + 1`.
    #[must_use]
    pub fn operators_between(&self, start: usize, end: usize) -> &[OperatorId] {
        let lo = (start + 1).min(self.operators.len());
        let hi = end.min(self.operators.len());
        if lo >= hi {
            &[]
        } else {
            &self.operators[lo..hi]
        }
    }

    pub(crate) fn variable_slots(&self) -> &[Option<usize>] {
        &self.variable_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CfgBuilder, Condition, Expression, IrType, MethodId};

    #[test]
    fn test_blocks_numbered_contiguously_in_rpo() {
        let cfg = CfgBuilder::new(MethodId::new(0), "f")
            .arg("a", IrType::I32)
            .build_with(|f| {
                let a = f.arg(0);
                f.block(0, |b| {
                    let t = b.compare(Condition::Eq, a, Expression::int(0));
                    b.branch(t, 1, 2);
                });
                f.block(1, |b| b.jump(3));
                f.block(2, |b| {
                    b.nop();
                    b.jump(3);
                });
                f.block(3, |b| b.ret_val(a));
                f.block(4, |b| b.ret());
            })
            .unwrap();

        let tree = SpanningTree::compute(&cfg);
        assert_eq!(tree.blocks().first(), Some(&BlockId::new(0)));
        assert_eq!(tree.blocks().last(), Some(&BlockId::new(3)));
        // block 4 is unreachable
        assert_eq!(tree.blocks().len(), 4);
        assert_eq!(tree.operators().len(), 6);

        let (start, end) = tree.block_range(BlockId::new(2)).unwrap();
        assert_eq!(end - start, 2);
        assert_eq!(tree.block_of(start + 1), Some(BlockId::new(2)));
        assert_eq!(tree.block_of(tree.operators().len()), None);
        for (i, &op) in tree.operators().iter().enumerate() {
            assert_eq!(tree.operator_index(op), Some(i));
        }
    }

    #[test]
    fn test_arguments_numbered_first() {
        let cfg = CfgBuilder::new(MethodId::new(0), "f")
            .arg("a", IrType::I32)
            .arg("b", IrType::I32)
            .build_with(|f| {
                let b_arg = f.arg(1);
                f.local("unused", IrType::I32);
                f.block(0, |b| {
                    let t = b.copy(b_arg);
                    b.ret_val(t);
                });
            })
            .unwrap();

        let tree = SpanningTree::compute(&cfg);
        assert_eq!(tree.variable_index(cfg.arguments()[0]), Some(0));
        assert_eq!(tree.variable_index(cfg.arguments()[1]), Some(1));
        assert_eq!(tree.variables().len(), 3);
        assert_eq!(tree.variable_index(crate::ir::VarId::new(2)), None);
    }

    #[test]
    fn test_operators_between() {
        let cfg = CfgBuilder::new(MethodId::new(0), "f")
            .build_with(|f| {
                f.block(0, |b| {
                    b.nop();
                    b.nop();
                    b.nop();
                    b.ret();
                });
            })
            .unwrap();
        let tree = SpanningTree::compute(&cfg);
        assert_eq!(tree.operators_between(0, 3).len(), 2);
        assert!(tree.operators_between(1, 2).is_empty());
        assert!(tree.operators_between(3, 1).is_empty());
    }
}
