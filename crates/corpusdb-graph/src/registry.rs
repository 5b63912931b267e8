//! The graph-storage registry.
//!
//! Maps stable implementation names to back-ends, selects a representation
//! for a component from its statistics, and loads/saves storages for
//! snapshots. Every component can always be forced back to the fallback
//! adjacency representation.

use std::io::Read;
use std::sync::Arc;

use corpusdb_core::{Component, ComponentType};

use crate::error::{GraphError, GraphResult};
use crate::graph::AnnotationGraph;
use crate::storage::adjacency::AdjacencyListStorage;
use crate::storage::linear::LinearStorage;
use crate::storage::prepost::PrePostOrderStorage;
use crate::storage::{GraphStatistic, GraphStorage, NumValue};

/// The writable fallback storage.
pub const ADJACENCY: &str = "AdjacencyListStorage";
/// Linear storage with 8-bit positions.
pub const LINEAR_P8: &str = "LinearStorageP8";
/// Linear storage with 16-bit positions.
pub const LINEAR_P16: &str = "LinearStorageP16";
/// Linear storage with 32-bit positions.
pub const LINEAR_P32: &str = "LinearStorageP32";
/// Pre/post order storage with 16-bit orders and 8-bit levels.
pub const PREPOST_O16_L8: &str = "PrePostOrderStorageO16L8";
/// Pre/post order storage with 16-bit orders and 32-bit levels.
pub const PREPOST_O16_L32: &str = "PrePostOrderStorageO16L32";
/// Pre/post order storage with 32-bit orders and 8-bit levels.
pub const PREPOST_O32_L8: &str = "PrePostOrderStorageO32L8";
/// Pre/post order storage with 32-bit orders and 32-bit levels.
pub const PREPOST_O32_L32: &str = "PrePostOrderStorageO32L32";

/// The registry name of [`LinearStorage`] with position width `P`.
#[must_use]
pub fn linear_id<P: NumValue>() -> &'static str {
    match P::BITS {
        8 => LINEAR_P8,
        16 => LINEAR_P16,
        _ => LINEAR_P32,
    }
}

/// The registry name of [`PrePostOrderStorage`] with order width `O` and
/// level width `L`.
#[must_use]
pub fn prepost_id<O: NumValue, L: NumValue>() -> &'static str {
    match (O::BITS, L::BITS) {
        (16, 8) => PREPOST_O16_L8,
        (16, _) => PREPOST_O16_L32,
        (_, 8) => PREPOST_O32_L8,
        _ => PREPOST_O32_L32,
    }
}

/// Creates an empty writable storage.
#[must_use]
pub fn create_writeable() -> AdjacencyListStorage {
    AdjacencyListStorage::new()
}

/// Selects the best implementation name for a component from its
/// statistics.
///
/// Rules:
/// 1. ORDERING chains use linear storage, sized by maximum depth.
/// 2. DOMINANCE trees/DAGs use pre/post order, sized by node count and
///    maximum depth.
/// 3. COVERAGE (and everything else) stays on the inverse-indexed
///    adjacency fallback, as do cyclic or otherwise unsuitable components.
#[must_use]
pub fn get_optimized_impl(component: &Component, stats: Option<&GraphStatistic>) -> &'static str {
    let Some(stats) = stats else {
        return ADJACENCY;
    };

    match component.ctype {
        ComponentType::Ordering => {
            // the linear storage can only hold acyclic chains
            if stats.cyclic || stats.max_fan_out > 1 {
                ADJACENCY
            } else if stats.max_depth < u8::MAX as usize {
                LINEAR_P8
            } else if stats.max_depth < u16::MAX as usize {
                LINEAR_P16
            } else {
                LINEAR_P32
            }
        }
        ComponentType::Dominance => {
            if stats.cyclic {
                ADJACENCY
            } else {
                prepost_by_size(stats)
            }
        }
        _ => ADJACENCY,
    }
}

fn prepost_by_size(stats: &GraphStatistic) -> &'static str {
    // a tree assigns exactly one order entry per node, so two order values
    // (pre and post) bound the order width; DAGs can exceed that
    let max_level = i8::MAX as usize;
    if stats.rooted_tree {
        if stats.nodes < (u16::MAX as usize) / 2 {
            if stats.max_depth < max_level {
                PREPOST_O16_L8
            } else {
                PREPOST_O16_L32
            }
        } else if stats.nodes < (u32::MAX as usize) / 2 && stats.max_depth < max_level {
            PREPOST_O32_L8
        } else {
            PREPOST_O32_L32
        }
    } else if stats.max_depth < max_level {
        PREPOST_O32_L8
    } else {
        PREPOST_O32_L32
    }
}

/// Creates an empty storage by implementation name.
pub fn create_by_name(name: &str) -> GraphResult<Box<dyn GraphStorage>> {
    let gs: Box<dyn GraphStorage> = match name {
        ADJACENCY => Box::new(AdjacencyListStorage::new()),
        LINEAR_P8 => Box::new(LinearStorage::<u8>::new()),
        LINEAR_P16 => Box::new(LinearStorage::<u16>::new()),
        LINEAR_P32 => Box::new(LinearStorage::<u32>::new()),
        PREPOST_O16_L8 => Box::new(PrePostOrderStorage::<u16, u8>::new()),
        PREPOST_O16_L32 => Box::new(PrePostOrderStorage::<u16, u32>::new()),
        PREPOST_O32_L8 => Box::new(PrePostOrderStorage::<u32, u8>::new()),
        PREPOST_O32_L32 => Box::new(PrePostOrderStorage::<u32, u32>::new()),
        unknown => return Err(GraphError::UnknownImplementation(unknown.to_string())),
    };
    Ok(gs)
}

/// Builds a new storage with the given implementation from an existing
/// representation of the same component.
pub fn create_copy(
    graph: &AnnotationGraph,
    name: &str,
    orig: &dyn GraphStorage,
) -> GraphResult<Arc<dyn GraphStorage>> {
    let mut gs = create_by_name(name)?;
    gs.copy_from(graph, orig)?;
    Ok(Arc::from(gs))
}

/// Deserializes a storage by implementation name from a snapshot stream.
pub fn load_by_name(name: &str, input: &mut dyn Read) -> GraphResult<Arc<dyn GraphStorage>> {
    let gs: Arc<dyn GraphStorage> = match name {
        ADJACENCY => Arc::new(bincode::deserialize_from::<_, AdjacencyListStorage>(input)?),
        LINEAR_P8 => Arc::new(bincode::deserialize_from::<_, LinearStorage<u8>>(input)?),
        LINEAR_P16 => Arc::new(bincode::deserialize_from::<_, LinearStorage<u16>>(input)?),
        LINEAR_P32 => Arc::new(bincode::deserialize_from::<_, LinearStorage<u32>>(input)?),
        PREPOST_O16_L8 => {
            Arc::new(bincode::deserialize_from::<_, PrePostOrderStorage<u16, u8>>(input)?)
        }
        PREPOST_O16_L32 => {
            Arc::new(bincode::deserialize_from::<_, PrePostOrderStorage<u16, u32>>(input)?)
        }
        PREPOST_O32_L8 => {
            Arc::new(bincode::deserialize_from::<_, PrePostOrderStorage<u32, u8>>(input)?)
        }
        PREPOST_O32_L32 => {
            Arc::new(bincode::deserialize_from::<_, PrePostOrderStorage<u32, u32>>(input)?)
        }
        unknown => return Err(GraphError::UnknownImplementation(unknown.to_string())),
    };
    Ok(gs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> GraphStatistic {
        GraphStatistic {
            nodes: 100,
            avg_fan_out: 1.0,
            max_fan_out: 1,
            fan_out_99_percentile: 1,
            max_depth: 99,
            cyclic: false,
            rooted_tree: true,
            dfs_visit_ratio: 1.0,
        }
    }

    fn component(ctype: ComponentType) -> Component {
        Component::new(ctype, "annis", "")
    }

    #[test]
    fn ordering_uses_linear_by_depth() {
        let mut s = stats();
        assert_eq!(LINEAR_P8, get_optimized_impl(&component(ComponentType::Ordering), Some(&s)));

        s.max_depth = 1000;
        assert_eq!(LINEAR_P16, get_optimized_impl(&component(ComponentType::Ordering), Some(&s)));

        s.max_depth = 100_000;
        assert_eq!(LINEAR_P32, get_optimized_impl(&component(ComponentType::Ordering), Some(&s)));
    }

    #[test]
    fn branching_ordering_falls_back() {
        let mut s = stats();
        s.max_fan_out = 2;
        assert_eq!(ADJACENCY, get_optimized_impl(&component(ComponentType::Ordering), Some(&s)));
    }

    #[test]
    fn dominance_tree_sized_by_nodes_and_depth() {
        let mut s = stats();
        s.max_depth = 10;
        assert_eq!(
            PREPOST_O16_L8,
            get_optimized_impl(&component(ComponentType::Dominance), Some(&s))
        );

        s.nodes = 1_000_000;
        assert_eq!(
            PREPOST_O32_L8,
            get_optimized_impl(&component(ComponentType::Dominance), Some(&s))
        );

        s.max_depth = 200;
        assert_eq!(
            PREPOST_O32_L32,
            get_optimized_impl(&component(ComponentType::Dominance), Some(&s))
        );
    }

    #[test]
    fn non_tree_dominance_uses_wide_orders() {
        let mut s = stats();
        s.rooted_tree = false;
        s.max_depth = 10;
        assert_eq!(
            PREPOST_O32_L8,
            get_optimized_impl(&component(ComponentType::Dominance), Some(&s))
        );
    }

    #[test]
    fn coverage_and_unknown_stats_use_fallback() {
        assert_eq!(
            ADJACENCY,
            get_optimized_impl(&component(ComponentType::Coverage), Some(&stats()))
        );
        assert_eq!(ADJACENCY, get_optimized_impl(&component(ComponentType::Ordering), None));
    }

    #[test]
    fn unknown_implementation_name_is_rejected() {
        assert!(create_by_name("NoSuchStorage").is_err());
        let data: Vec<u8> = Vec::new();
        assert!(load_by_name("NoSuchStorage", &mut data.as_slice()).is_err());
    }

    #[test]
    fn every_registered_name_roundtrips() {
        for name in [
            ADJACENCY,
            LINEAR_P8,
            LINEAR_P16,
            LINEAR_P32,
            PREPOST_O16_L8,
            PREPOST_O16_L32,
            PREPOST_O32_L8,
            PREPOST_O32_L32,
        ] {
            let gs = create_by_name(name).expect("create");
            assert_eq!(name, gs.serialization_id());

            let mut data: Vec<u8> = Vec::new();
            gs.save_data(&mut data).expect("save");
            let restored = load_by_name(name, &mut data.as_slice()).expect("load");
            assert_eq!(name, restored.serialization_id());
        }
    }
}
