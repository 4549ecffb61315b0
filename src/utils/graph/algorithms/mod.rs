//! Graph algorithms used by the pipeline.
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | [`topological_sort`] | O((V + E) log V) | Phase ordering with stable tie-break |
//! | [`find_cycle`] | O(V + E) | Reporting unsatisfiable ordering constraints |
//! | [`reverse_postorder`] | O(V + E) | Block numbering, forward data flow |
//! | [`reachable_from`] | O(V + E) | Calls-database flattening, block reachability |

mod cycles;
mod topological;
mod traversal;

pub use cycles::find_cycle;
pub use topological::topological_sort;
pub use traversal::{postorder, reachable_from, reverse_postorder};
