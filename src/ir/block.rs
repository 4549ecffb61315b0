use std::fmt;

use crate::ir::{BlockId, OperatorId};

/// Role of a basic block in its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// The unique entry block
    Entry,
    /// An ordinary block
    Normal,
    /// The unique exit block, target of every return path
    Exit,
    /// Start of an exception handler
    Handler,
}

impl BlockKind {
    /// Returns `true` for anything other than [`BlockKind::Normal`].
    ///
    /// Special blocks have entry edges the CFG does not show (method entry,
    /// unwinding) and are excluded from cross-block rewrites.
    #[must_use]
    pub const fn is_special(self) -> bool {
        !matches!(self, BlockKind::Normal)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockKind::Entry => "entry",
            BlockKind::Normal => "normal",
            BlockKind::Exit => "exit",
            BlockKind::Handler => "handler",
        };
        f.write_str(s)
    }
}

/// A straight-line sequence of operators ending in one control operator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    pub(crate) operators: Vec<OperatorId>,
    pub(crate) removed: bool,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, kind: BlockKind) -> Self {
        BasicBlock {
            id,
            kind,
            operators: Vec::new(),
            removed: false,
        }
    }

    /// Returns this block's id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns this block's role.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns the operators of this block in execution order.
    #[must_use]
    pub fn operators(&self) -> &[OperatorId] {
        &self.operators
    }

    /// Returns the last operator, which is the terminator in a well-formed block.
    #[must_use]
    pub fn last_operator(&self) -> Option<OperatorId> {
        self.operators.last().copied()
    }

    /// Returns `true` if the block has been deleted from its graph.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }
}
