use crate::abstraction::ClusterAbstraction;
use crate::build::cluster_builder::PartitionStats;
use crate::build::dominance::{self, TrimStats};
use crate::build::entrance_discovery::{self, EntranceStats};
use crate::build::inter_connector::{self, InterStats};
use crate::build::intra_connector::{self, IntraStats};
use anyhow::{anyhow, Result};

/// Ordered stages of the entrance-building phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    Entrances,
    Inter,
    Trim,
    Intra,
}

impl Stage {
    pub fn key(self) -> &'static str {
        match self {
            Stage::Entrances => "abstraction_stage_entrances",
            Stage::Inter => "abstraction_stage_inter",
            Stage::Trim => "abstraction_stage_trim",
            Stage::Intra => "abstraction_stage_intra",
        }
    }

    pub fn all() -> &'static [Stage] {
        &[Stage::Entrances, Stage::Inter, Stage::Trim, Stage::Intra]
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EntranceBuildStats {
    pub entrances: EntranceStats,
    pub inter: InterStats,
    pub trim: TrimStats,
    pub intra: IntraStats,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
    pub partition: PartitionStats,
    pub entrances: EntranceBuildStats,
}

/// Runs the entrance stages in order with a validation pass after each,
/// mirroring the staged pipeline the abstraction is constructed by.
pub fn run_entrance_stages(aca: &mut ClusterAbstraction) -> Result<EntranceBuildStats> {
    let mut stats = EntranceBuildStats::default();

    let (transitions, entrance_stats) = entrance_discovery::discover_transitions(
        &aca.map,
        &aca.table,
        &aca.clusters,
        aca.columns,
    );
    stats.entrances = entrance_stats;

    stats.inter = inter_connector::connect_inter(aca, &transitions);
    validate_graph(aca, Stage::Inter)?;

    stats.trim = dominance::trim_dominated(aca);
    validate_graph(aca, Stage::Trim)?;

    stats.intra = intra_connector::connect_intra(aca);
    validate_graph(aca, Stage::Intra)?;

    Ok(stats)
}

/// Structural invariants that must hold between stages: one cache entry
/// per abstract edge, parent labels consistent with the graph, and every
/// node geometrically inside its cluster.
fn validate_graph(aca: &ClusterAbstraction, stage: Stage) -> Result<()> {
    if aca.cache.len() != aca.graph.num_edges() {
        return Err(anyhow!(
            "{}: cache size {} != edge count {}",
            stage.key(),
            aca.cache.len(),
            aca.graph.num_edges()
        ));
    }
    for node in aca.graph.nodes() {
        let cluster = aca
            .cluster(node.cluster)
            .ok_or_else(|| anyhow!("{}: node references unknown cluster", stage.key()))?;
        if !cluster.contains(node.origin) {
            return Err(anyhow!(
                "{}: node at {} lies outside cluster {:?}",
                stage.key(),
                node.origin,
                node.cluster
            ));
        }
        match aca.parent_of(node.origin) {
            Some(id) if id == node.id => {}
            other => {
                return Err(anyhow!(
                    "{}: tile {} has parent label {:?}, expected {:?}",
                    stage.key(),
                    node.origin,
                    other,
                    node.id
                ));
            }
        }
    }
    for edge in aca.graph.edges() {
        if !aca.cache.contains(edge.id) {
            return Err(anyhow!(
                "{}: edge {:?} has no cached path",
                stage.key(),
                edge.id
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::map::TileMap;

    #[test]
    fn stages_are_ordered_and_keyed() {
        let all = Stage::all();
        assert_eq!(all.first(), Some(&Stage::Entrances));
        assert_eq!(all.last(), Some(&Stage::Intra));
        let keys: std::collections::BTreeSet<&str> = all.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), all.len());
    }

    #[test]
    fn pipeline_leaves_cache_in_sync() {
        let map = TileMap::parse(
            "..........\n..........\n..........\n..........\n..........\n\
             ..........\n..........\n..........\n..........\n..........\n",
        )
        .unwrap();
        let opts = BuildOptions {
            cluster_size: 5,
            ..BuildOptions::default()
        };
        let (aca, stats) = crate::abstraction::ClusterAbstraction::build(map, &opts).unwrap();
        assert_eq!(stats.partition.clusters_created, 4);
        assert!(stats.entrances.inter.edges_created > 0);
        assert_eq!(aca.cache_len(), aca.abstract_graph().num_edges());
    }

    #[test]
    fn all_obstacle_map_builds_an_empty_abstraction() {
        let map = TileMap::parse("@@@@\n@@@@\n@@@@\n@@@@\n").unwrap();
        let opts = BuildOptions {
            cluster_size: 2,
            ..BuildOptions::default()
        };
        let (aca, stats) = crate::abstraction::ClusterAbstraction::build(map, &opts).unwrap();
        assert_eq!(stats.partition.clusters_created, 4);
        assert_eq!(aca.abstract_graph().num_nodes(), 0);
        assert_eq!(aca.abstract_graph().num_edges(), 0);
        assert_eq!(aca.cache_len(), 0);
        assert_eq!(aca.base_graph().num_nodes(), 0);
    }
}
