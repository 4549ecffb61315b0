//! Phase catalogue and ordering.
//!
//! The [`PhaseCatalogue`] holds every registered phase together with its
//! [`PhaseDescriptor`]. [`PhaseCatalogue::schedule`] turns the descriptors'
//! must-run-after and pipeline-block constraints into one linear order:
//!
//! 1. Every pipeline block, and every phase outside a block, becomes one group
//! 2. Constraints between members of different groups order the groups
//! 3. Constraints inside a group order its members
//!
//! Concatenating the ordered groups keeps each block contiguous. Where the
//! constraints leave a choice, registration order wins, so the default
//! catalogue runs in the order it is listed.

use std::collections::HashMap;

use crate::{
    compiler::{
        phases::{
            CollectRegisterAllocationConstraints, ExpandFieldAccesses, LayoutTypes,
            PrepareForRegisterAllocation, ReduceNumberOfTemporaries, VerifyIr,
        },
        IrLevel, Phase, PhaseDescriptor,
    },
    utils::graph::{algorithms, DirectedGraph, GraphBase, NodeId},
    Error, Result,
};

/// Name of the phase that lays out types and builds the calls database.
pub const LAYOUT_TYPES: &str = "LayoutTypes";

/// A registered phase.
pub(crate) struct PhaseEntry {
    pub(crate) descriptor: PhaseDescriptor,
    pub(crate) phase: Box<dyn Phase>,
}

/// All phases known to a pipeline, in registration order.
#[derive(Default)]
pub struct PhaseCatalogue {
    entries: Vec<PhaseEntry>,
}

impl PhaseCatalogue {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard middle-end pipeline.
    ///
    /// | Phase | After | Block | From level |
    /// |-------|-------|-------|------------|
    /// | `VerifyIr` | | | any |
    /// | `LayoutTypes` | `VerifyIr` | layout | `ConcreteTypes` |
    /// | `ExpandFieldAccesses` | `LayoutTypes` | layout | `ConcreteTypes` |
    /// | `ReduceNumberOfTemporaries` | `ExpandFieldAccesses` | | any |
    /// | `PrepareForRegisterAllocation` | `ReduceNumberOfTemporaries` | | `ScalarValues` |
    /// | `CollectRegisterAllocationConstraints` | `PrepareForRegisterAllocation` | | `Lowest`, disabled |
    #[must_use]
    pub fn with_default_phases() -> Self {
        let mut catalogue = Self::new();
        catalogue.push(PhaseDescriptor::new("VerifyIr"), Box::new(VerifyIr));
        catalogue.push(
            PhaseDescriptor::new(LAYOUT_TYPES)
                .after("VerifyIr")
                .in_block("layout")
                .from_level(IrLevel::ConcreteTypes),
            Box::new(LayoutTypes::new()),
        );
        catalogue.push(
            PhaseDescriptor::new("ExpandFieldAccesses")
                .after(LAYOUT_TYPES)
                .in_block("layout")
                .from_level(IrLevel::ConcreteTypes),
            Box::new(ExpandFieldAccesses),
        );
        catalogue.push(
            PhaseDescriptor::new("ReduceNumberOfTemporaries").after("ExpandFieldAccesses"),
            Box::new(ReduceNumberOfTemporaries::new()),
        );
        catalogue.push(
            PhaseDescriptor::new("PrepareForRegisterAllocation")
                .after("ReduceNumberOfTemporaries")
                .from_level(IrLevel::ScalarValues),
            Box::new(PrepareForRegisterAllocation),
        );
        catalogue.push(
            PhaseDescriptor::new("CollectRegisterAllocationConstraints")
                .after("PrepareForRegisterAllocation")
                .from_level(IrLevel::Lowest)
                .disabled(),
            Box::new(CollectRegisterAllocationConstraints),
        );
        catalogue
    }

    fn push(&mut self, descriptor: PhaseDescriptor, phase: Box<dyn Phase>) {
        self.entries.push(PhaseEntry { descriptor, phase });
    }

    /// Registers a phase.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Ordering and applicability of the phase
    /// * `phase` - The implementation
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePhase`] if a phase with the same name exists.
    pub fn register(&mut self, descriptor: PhaseDescriptor, phase: Box<dyn Phase>) -> Result<()> {
        if self.contains(&descriptor.name) {
            return Err(Error::DuplicatePhase(descriptor.name));
        }
        self.push(descriptor, phase);
        Ok(())
    }

    /// Returns `true` if a phase with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.descriptor.name == name)
    }

    /// Returns the descriptor of a phase.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&PhaseDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .find(|d| d.name == name)
    }

    /// Iterates descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PhaseDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Returns the number of registered phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no phase is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the execution order.
    ///
    /// # Returns
    ///
    /// Phase names in execution order, one entry per registered phase.
    /// Disabled phases are scheduled too; whether they run is decided when
    /// control reaches them.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownPhase`] if a constraint names an unregistered phase
    /// - [`Error::PhaseCycle`] if the constraints admit no linear order
    pub fn schedule(&self) -> Result<Vec<String>> {
        Ok(self
            .order()?
            .into_iter()
            .map(|i| self.entries[i].descriptor.name.clone())
            .collect())
    }

    /// Consumes the catalogue, returning its entries in execution order.
    pub(crate) fn into_scheduled(mut self) -> Result<Vec<PhaseEntry>> {
        let order = self.order()?;
        let mut slots: Vec<Option<PhaseEntry>> = self.entries.drain(..).map(Some).collect();
        order
            .into_iter()
            .map(|i| {
                slots[i]
                    .take()
                    .ok_or_else(|| invariant_error!("phase {} scheduled twice", i))
            })
            .collect()
    }

    /// Indices into `entries` in execution order.
    fn order(&self) -> Result<Vec<usize>> {
        let index: HashMap<&str, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.descriptor.name.as_str(), i))
            .collect();

        // (earlier, later) pairs
        let mut constraints = Vec::new();
        for (later, entry) in self.entries.iter().enumerate() {
            for name in &entry.descriptor.must_run_after {
                let earlier = *index
                    .get(name.as_str())
                    .ok_or_else(|| Error::UnknownPhase(name.clone()))?;
                constraints.push((earlier, later));
            }
        }

        // One group per pipeline block, one per unblocked phase
        let mut groups: DirectedGraph<()> = DirectedGraph::new();
        let mut blocks: HashMap<&str, NodeId> = HashMap::new();
        let mut group_of = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let group = match entry.descriptor.block.as_deref() {
                Some(block) => *blocks.entry(block).or_insert_with(|| groups.add_node(())),
                None => groups.add_node(()),
            };
            group_of.push(group);
        }
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); groups.node_count()];
        for (i, group) in group_of.iter().enumerate() {
            members[group.index()].push(i);
        }

        for &(earlier, later) in &constraints {
            let (from, to) = (group_of[earlier], group_of[later]);
            if from != to {
                groups.add_edge(from, to)?;
            }
        }

        let group_order = algorithms::topological_sort(&groups).ok_or_else(|| {
            let cycle = algorithms::find_cycle(&groups).unwrap_or_default();
            Error::PhaseCycle(
                cycle
                    .into_iter()
                    .map(|g| self.group_label(&members[g.index()]))
                    .collect(),
            )
        })?;

        let mut order = Vec::with_capacity(self.entries.len());
        for group in group_order {
            order.extend(self.order_within(&members[group.index()], &constraints)?);
        }
        Ok(order)
    }

    /// Orders the members of one group by the constraints among them.
    fn order_within(&self, members: &[usize], constraints: &[(usize, usize)]) -> Result<Vec<usize>> {
        if members.len() == 1 {
            return Ok(members.to_vec());
        }

        let mut graph: DirectedGraph<usize> = DirectedGraph::with_capacity(members.len());
        let local: HashMap<usize, NodeId> = members
            .iter()
            .map(|&phase| (phase, graph.add_node(phase)))
            .collect();
        for (earlier, later) in constraints {
            if let (Some(&from), Some(&to)) = (local.get(earlier), local.get(later)) {
                graph.add_edge(from, to)?;
            }
        }

        let resolve = |node: NodeId| graph.node(node).copied().unwrap_or_default();
        match algorithms::topological_sort(&graph) {
            Some(order) => Ok(order.into_iter().map(resolve).collect()),
            None => {
                let cycle = algorithms::find_cycle(&graph).unwrap_or_default();
                Err(Error::PhaseCycle(
                    cycle
                        .into_iter()
                        .map(|n| self.entries[resolve(n)].descriptor.name.clone())
                        .collect(),
                ))
            }
        }
    }

    fn group_label(&self, members: &[usize]) -> String {
        match members {
            [single] => self.entries[*single].descriptor.name.clone(),
            _ => {
                let block = members
                    .first()
                    .and_then(|&i| self.entries[i].descriptor.block.as_deref())
                    .unwrap_or_default();
                format!("[{block}]")
            }
        }
    }
}
