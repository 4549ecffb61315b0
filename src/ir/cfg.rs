//! The per-method control-flow graph arena.
//!
//! Blocks, operators and variables live in three arenas addressed by stable ids.
//! Deleting an operator or block leaves a tombstone, so ids held by other
//! structures never dangle into a different entity.
//!
//! Every structural mutation goes through a `&mut self` method that bumps the
//! graph's [`generation`](ControlFlowGraph::generation). Analysis caches record
//! the generation they were computed for and are rebuilt when it moves.

use std::fmt;

use crate::{
    analysis::AnalysisCache,
    ir::{
        BasicBlock, BlockId, BlockKind, Expression, IrType, MethodId, Operator, OperatorId,
        OperatorKind, VarId, Variable, VariableKind,
    },
    utils::{
        graph::{algorithms, GraphBase, NodeId, Predecessors, Successors},
        BitSet,
    },
    Result,
};

/// Control-flow graph of one method body.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    method: MethodId,
    name: String,
    blocks: Vec<BasicBlock>,
    operators: Vec<Option<Operator>>,
    variables: Vec<Variable>,
    arguments: Vec<VarId>,
    return_type: Option<IrType>,
    entry: Option<BlockId>,
    generation: u64,
    pub(crate) analysis: AnalysisCache,
}

impl ControlFlowGraph {
    /// Creates an empty graph for `method`.
    #[must_use]
    pub fn new(method: MethodId, name: impl Into<String>) -> Self {
        ControlFlowGraph {
            method,
            name: name.into(),
            blocks: Vec::new(),
            operators: Vec::new(),
            variables: Vec::new(),
            arguments: Vec::new(),
            return_type: None,
            entry: None,
            generation: 0,
            analysis: AnalysisCache::default(),
        }
    }

    /// Returns the method this graph belongs to.
    #[must_use]
    pub const fn method(&self) -> MethodId {
        self.method
    }

    /// Returns the method's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mutation counter. Every structural change increments it.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the entry block, if one has been added.
    #[must_use]
    pub const fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    /// Returns the declared return type, `None` for `void` methods.
    #[must_use]
    pub const fn return_type(&self) -> Option<IrType> {
        self.return_type
    }

    /// Sets the declared return type.
    pub fn set_return_type(&mut self, ty: Option<IrType>) {
        self.return_type = ty;
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    fn add_variable(&mut self, name: String, ty: IrType, kind: VariableKind) -> VarId {
        let id = VarId::new(self.variables.len());
        self.variables.push(Variable { id, name, ty, kind });
        self.bump();
        id
    }

    /// Declares the next method argument.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_argument(&mut self, name: impl Into<String>, ty: IrType) -> VarId {
        let position = self.arguments.len() as u32;
        let id = self.add_variable(name.into(), ty, VariableKind::Argument(position));
        self.arguments.push(id);
        id
    }

    /// Declares a named local.
    pub fn add_local(&mut self, name: impl Into<String>, ty: IrType) -> VarId {
        self.add_variable(name.into(), ty, VariableKind::Local)
    }

    /// Declares a compiler temporary.
    pub fn add_temporary(&mut self, ty: IrType) -> VarId {
        let name = format!("$t{}", self.variables.len());
        self.add_variable(name, ty, VariableKind::Temporary)
    }

    /// Adds an empty block. The first [`BlockKind::Entry`] block becomes the graph's entry.
    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, kind));
        if kind == BlockKind::Entry && self.entry.is_none() {
            self.entry = Some(id);
        }
        self.bump();
        id
    }

    pub(crate) fn set_block_kind(&mut self, block: BlockId, kind: BlockKind) {
        if let Some(b) = self.blocks.get_mut(block.index()) {
            if b.kind != kind {
                b.kind = kind;
                self.bump();
            }
        }
    }

    /// Returns a live block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).filter(|b| !b.removed)
    }

    /// Iterates live blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| !b.removed)
    }

    /// Returns the number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Returns a live operator.
    #[must_use]
    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(id.index()).and_then(Option::as_ref)
    }

    /// Iterates live operators, block by block in id order.
    pub fn operators(&self) -> impl Iterator<Item = (OperatorId, &Operator)> {
        self.blocks().flat_map(move |block| {
            block
                .operators
                .iter()
                .filter_map(move |&op| self.operator(op).map(|o| (op, o)))
        })
    }

    /// Returns the number of live operators.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operators.iter().filter(|o| o.is_some()).count()
    }

    /// Returns a variable.
    #[must_use]
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Returns all declared variables in id order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns the number of declared variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns the argument variables in declaration order.
    #[must_use]
    pub fn arguments(&self) -> &[VarId] {
        &self.arguments
    }

    /// Returns the type of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the variable is not declared in this graph.
    pub fn variable_type(&self, id: VarId) -> Result<IrType> {
        self.variable(id)
            .map(Variable::ty)
            .ok_or_else(|| invariant_error!("{} is not declared in {}", id, self.name))
    }

    /// Returns the terminator of a live block, if it has one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<OperatorId> {
        let last = self.block(block)?.last_operator()?;
        self.operator(last)
            .filter(|op| op.kind.is_control())
            .map(|_| last)
    }

    /// Returns the index of `op` within its block.
    #[must_use]
    pub fn position(&self, op: OperatorId) -> Option<usize> {
        let block = self.operator(op)?.block;
        self.blocks[block.index()]
            .operators
            .iter()
            .position(|&o| o == op)
    }

    /// Returns the operator preceding `op` in its block.
    #[must_use]
    pub fn previous_operator(&self, op: OperatorId) -> Option<OperatorId> {
        let block = self.operator(op)?.block;
        let pos = self.position(op)?;
        pos.checked_sub(1)
            .map(|p| self.blocks[block.index()].operators[p])
    }

    /// Returns the operator following `op` in its block.
    #[must_use]
    pub fn next_operator(&self, op: OperatorId) -> Option<OperatorId> {
        let block = self.operator(op)?.block;
        let pos = self.position(op)?;
        self.blocks[block.index()].operators.get(pos + 1).copied()
    }

    /// Returns the successors of a live block, taken from its terminator.
    #[must_use]
    pub fn block_successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .and_then(|t| self.operator(t))
            .map(|op| op.kind.successors())
            .unwrap_or_default()
    }

    /// Returns the live predecessors of a block, in block id order.
    #[must_use]
    pub fn block_predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks()
            .filter(|b| self.block_successors(b.id).contains(&block))
            .map(BasicBlock::id)
            .collect()
    }

    /// Returns the set of block indices reachable from the entry, entry included.
    #[must_use]
    pub fn reachable_blocks(&self) -> BitSet {
        let mut reached = BitSet::new(self.blocks.len());
        if let Some(entry) = self.entry {
            for node in algorithms::postorder(self, NodeId::new(entry.index())) {
                reached.insert(node.index());
            }
        }
        reached
    }

    fn live_block_mut(&mut self, block: BlockId) -> Result<&mut BasicBlock> {
        match self.blocks.get_mut(block.index()) {
            Some(b) if !b.removed => Ok(b),
            _ => Err(invariant_error!("{} is not a live block", block)),
        }
    }

    fn live_operator(&self, op: OperatorId) -> Result<&Operator> {
        self.operator(op)
            .ok_or_else(|| invariant_error!("{} is not a live operator", op))
    }

    fn allocate_operator(&mut self, block: BlockId, kind: OperatorKind) -> OperatorId {
        let id = OperatorId::new(self.operators.len());
        self.operators.push(Some(Operator { kind, block }));
        id
    }

    /// Appends an operator at the end of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the block is not live or already terminated.
    pub fn append(&mut self, block: BlockId, kind: OperatorKind) -> Result<OperatorId> {
        if self.terminator(block).is_some() {
            return Err(invariant_error!(
                "cannot append '{}' to {}: block already terminated",
                kind,
                block
            ));
        }
        self.live_block_mut(block)?;

        let id = self.allocate_operator(block, kind);
        self.blocks[block.index()].operators.push(id);
        self.bump();
        Ok(id)
    }

    /// Inserts a non-control operator immediately before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if `anchor` is not live or `kind` is a control operator.
    pub fn insert_before(&mut self, anchor: OperatorId, kind: OperatorKind) -> Result<OperatorId> {
        if kind.is_control() {
            return Err(invariant_error!(
                "control operator '{}' cannot be inserted mid-block",
                kind
            ));
        }
        let block = self.live_operator(anchor)?.block;
        let pos = self
            .position(anchor)
            .ok_or_else(|| invariant_error!("{} missing from its block", anchor))?;

        let id = self.allocate_operator(block, kind);
        self.blocks[block.index()].operators.insert(pos, id);
        self.bump();
        Ok(id)
    }

    /// Deletes a non-control operator and returns its instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if `op` is not live or is a block terminator.
    pub fn remove_operator(&mut self, op: OperatorId) -> Result<OperatorKind> {
        let operator = self.live_operator(op)?;
        if operator.kind.is_control() {
            return Err(invariant_error!(
                "terminator {} of {} cannot be removed",
                op,
                operator.block
            ));
        }
        let block = operator.block;

        self.blocks[block.index()].operators.retain(|&o| o != op);
        let removed = self.operators[op.index()].take();
        self.bump();
        removed
            .map(|o| o.kind)
            .ok_or_else(|| invariant_error!("{} vanished during removal", op))
    }

    /// Replaces the instruction of `op` in place and returns the previous one.
    ///
    /// A terminator may only be replaced by another control operator and vice versa.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if `op` is not live or control-ness would change.
    pub fn replace_operator(&mut self, op: OperatorId, kind: OperatorKind) -> Result<OperatorKind> {
        let current = self.live_operator(op)?;
        if current.kind.is_control() != kind.is_control() {
            return Err(invariant_error!(
                "replacing '{}' with '{}' would change the block terminator",
                current.kind,
                kind
            ));
        }

        let slot = self.operators[op.index()]
            .as_mut()
            .ok_or_else(|| invariant_error!("{} vanished during replacement", op))?;
        let old = std::mem::replace(&mut slot.kind, kind);
        self.bump();
        Ok(old)
    }

    /// Replaces every read of `var` in `op` with `with`.
    ///
    /// # Returns
    ///
    /// `true` if an argument was replaced. The generation only moves on change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if `op` is not live.
    pub fn substitute_usage(
        &mut self,
        op: OperatorId,
        var: VarId,
        with: Expression,
    ) -> Result<bool> {
        let slot = self
            .operators
            .get_mut(op.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| invariant_error!("{} is not a live operator", op))?;
        let changed = slot.kind.substitute_usage(var, with);
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    /// Sets the terminator of `block`, replacing the current one or appending if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the block is not live or `kind` is not a control operator.
    pub fn set_terminator(&mut self, block: BlockId, kind: OperatorKind) -> Result<OperatorId> {
        if !kind.is_control() {
            return Err(invariant_error!("'{}' is not a control operator", kind));
        }
        self.live_block_mut(block)?;

        if let Some(term) = self.terminator(block) {
            self.replace_operator(term, kind)?;
            Ok(term)
        } else {
            self.append(block, kind)
        }
    }

    /// Deletes a block together with all of its operators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the block is not live or is the entry block.
    pub fn remove_block(&mut self, block: BlockId) -> Result<()> {
        if self.entry == Some(block) {
            return Err(invariant_error!("entry block {} cannot be removed", block));
        }
        let b = self.live_block_mut(block)?;
        b.removed = true;
        let ops = std::mem::take(&mut b.operators);
        for op in ops {
            self.operators[op.index()] = None;
        }
        self.bump();
        Ok(())
    }

    /// Checks structural well-formedness.
    ///
    /// Every live block must be non-empty and end in exactly one control operator,
    /// every operator must name its owning block, and every branch target must
    /// be a live block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry
            .ok_or_else(|| invariant_error!("{} has no entry block", self.name))?;
        if self.block(entry).is_none() {
            return Err(invariant_error!("entry block {} was removed", entry));
        }

        for block in self.blocks() {
            let Some(&last) = block.operators.last() else {
                return Err(invariant_error!("{} in {} is empty", block.id, self.name));
            };

            for (i, &op) in block.operators.iter().enumerate() {
                let operator = self.live_operator(op)?;
                if operator.block != block.id {
                    return Err(invariant_error!(
                        "{} listed in {} but owned by {}",
                        op,
                        block.id,
                        operator.block
                    ));
                }
                if operator.kind.is_control() != (op == last) {
                    return Err(invariant_error!(
                        "{} in {} (position {}) breaks the single-terminator rule",
                        op,
                        block.id,
                        i
                    ));
                }
                for target in operator.kind.successors() {
                    if self.block(target).is_none() {
                        return Err(invariant_error!(
                            "{} targets missing block {}",
                            op,
                            target
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.blocks().map(|b| NodeId::new(b.id.index()))
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_successors(BlockId::new(node.index()))
            .into_iter()
            .map(|b| NodeId::new(b.index()))
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_predecessors(BlockId::new(node.index()))
            .into_iter()
            .map(|b| NodeId::new(b.index()))
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method {} {}(", self.method, self.name)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(var) = self.variable(*arg) {
                write!(f, "{arg} {var}")?;
            }
        }
        writeln!(f, ")")?;

        for block in self.blocks() {
            writeln!(f, "{} ({}):", block.id, block.kind)?;
            for &op in &block.operators {
                if let Some(operator) = self.operator(op) {
                    writeln!(f, "    {op}: {}", operator.kind)?;
                }
            }
        }
        Ok(())
    }
}
