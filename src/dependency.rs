//! Access-conflict analysis for systems
//!
//! Splits an ordered system list into consecutive batches whose declared
//! accesses do not conflict. Batches never reorder systems, so running each
//! batch's members concurrently would keep the sequential semantics.

use crate::system::SystemAccess;

/// Systems that could run together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStage {
    /// Positions in the ordered system list
    pub system_indices: Vec<usize>,
}

/// Dependency graph for systems
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    stages: Vec<ExecutionStage>,
}

impl DependencyGraph {
    /// Create graph from system accesses, in execution order
    pub fn new(system_accesses: &[SystemAccess]) -> Self {
        Self {
            stages: Self::build_stages(system_accesses),
        }
    }

    /// Group consecutive non-conflicting systems
    fn build_stages(accesses: &[SystemAccess]) -> Vec<ExecutionStage> {
        let mut stages: Vec<ExecutionStage> = Vec::new();
        let mut current: Vec<usize> = Vec::new();

        for (idx, access) in accesses.iter().enumerate() {
            let conflicts = current
                .iter()
                .any(|&member| accesses[member].conflicts_with(access));
            if conflicts {
                stages.push(ExecutionStage {
                    system_indices: std::mem::take(&mut current),
                });
            }
            current.push(idx);
        }

        if !current.is_empty() {
            stages.push(ExecutionStage {
                system_indices: current,
            });
        }
        stages
    }

    /// Get execution stages
    pub fn stages(&self) -> &[ExecutionStage] {
        &self.stages
    }

    /// Get number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_conflicts_parallel() {
        let graph = DependencyGraph::new(&[
            SystemAccess::empty().reading::<i32>(),
            SystemAccess::empty().reading::<f32>(),
        ]);
        assert_eq!(graph.stage_count(), 1, "Should execute in parallel");
    }

    #[test]
    fn test_write_conflict_sequential() {
        let graph = DependencyGraph::new(&[
            SystemAccess::empty().reading::<i32>().writing::<f32>(),
            SystemAccess::empty().reading::<f32>(),
        ]);
        assert_eq!(graph.stage_count(), 2, "Should execute sequentially");
    }

    #[test]
    fn test_batches_never_reorder() {
        // c does not conflict with a, but b sits between them
        let graph = DependencyGraph::new(&[
            SystemAccess::empty().writing::<u8>(),
            SystemAccess::empty().reading::<u8>(),
            SystemAccess::empty().writing::<u16>(),
        ]);
        let stages: Vec<Vec<usize>> = graph
            .stages()
            .iter()
            .map(|s| s.system_indices.clone())
            .collect();
        assert_eq!(stages, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(DependencyGraph::new(&[]).stage_count(), 0);
    }
}
