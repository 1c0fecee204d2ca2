use crate::abstraction::ClusterAbstraction;
use crate::graph::{ClusterId, EdgeId, EdgeKind, NodeId};
use crate::map::{Capability, Point};
use crate::search::AnnotatedSearch;
use anyhow::bail;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How aggressively redundant entrance transitions are discarded.
///
/// `High` applies the full dominance relation (annotation subsumption plus
/// an intra-cluster reachability check between the competing endpoints);
/// `Medium` drops the reachability clause and prunes on annotations alone;
/// `Low` keeps every maximal-segment transition. Since `Medium`'s test is a
/// relaxation of `High`'s, the surviving edge sets nest as
/// Medium ⊆ High ⊆ Low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Quality, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => bail!("unknown abstraction quality: {}", other),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Low => write!(f, "low"),
            Quality::Medium => write!(f, "medium"),
            Quality::High => write!(f, "high"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TrimStats {
    pub edges_before: usize,
    pub edges_removed: usize,
    pub edges_after: usize,
}

#[derive(Clone, Copy, Debug)]
struct InterEdgeInfo {
    id: EdgeId,
    capability: Capability,
    clearance: u16,
    /// Endpoint (node, origin tile) per cluster of the normalised pair.
    in_a: (NodeId, Point),
    in_b: (NodeId, Point),
}

/// Discards dominated inter-edges according to the abstraction quality.
/// Only edges connecting the same unordered cluster pair compete; abstract
/// nodes are never removed here, even when trimming leaves them isolated.
pub fn trim_dominated(aca: &mut ClusterAbstraction) -> TrimStats {
    let mut stats = TrimStats {
        edges_before: aca.graph.num_edges(),
        ..TrimStats::default()
    };
    if aca.quality == Quality::Low {
        stats.edges_after = stats.edges_before;
        log::info!("[dominance] low quality abstraction, keeping all transitions");
        return stats;
    }

    // Group inter-edges by their unordered cluster pair.
    let mut groups: BTreeMap<(ClusterId, ClusterId), Vec<InterEdgeInfo>> = BTreeMap::new();
    for edge in aca.graph.edges() {
        if edge.kind != EdgeKind::Inter {
            continue;
        }
        let from = aca.graph.node(edge.from).expect("live edge endpoint");
        let to = aca.graph.node(edge.to).expect("live edge endpoint");
        let (pair, in_a, in_b) = if from.cluster <= to.cluster {
            (
                (from.cluster, to.cluster),
                (from.id, from.origin),
                (to.id, to.origin),
            )
        } else {
            (
                (to.cluster, from.cluster),
                (to.id, to.origin),
                (from.id, from.origin),
            )
        };
        groups.entry(pair).or_default().push(InterEdgeInfo {
            id: edge.id,
            capability: edge.capability,
            clearance: edge.clearance,
            in_a,
            in_b,
        });
    }

    let mut to_remove: Vec<EdgeId> = Vec::new();
    for ((cluster_a, cluster_b), group) in groups.iter() {
        if group.len() < 2 {
            continue;
        }
        let mut removed = vec![false; group.len()];
        for i in 0..group.len() {
            for j in 0..group.len() {
                if i == j || removed[j] {
                    continue;
                }
                if !annotation_dominates(&group[j], &group[i]) {
                    continue;
                }
                // Mutual (identical) annotations keep the earlier edge.
                if annotation_dominates(&group[i], &group[j]) && j > i {
                    continue;
                }
                if aca.quality == Quality::High
                    && !endpoints_reachable(aca, *cluster_a, *cluster_b, &group[j], &group[i])
                {
                    continue;
                }
                removed[i] = true;
                break;
            }
        }
        for (k, flag) in removed.iter().enumerate() {
            if *flag {
                to_remove.push(group[k].id);
            }
        }
    }

    for id in to_remove {
        aca.graph.remove_edge(id);
        aca.cache.remove(id);
        stats.edges_removed += 1;
    }
    stats.edges_after = aca.graph.num_edges();
    log::info!(
        "[dominance] quality {}: {} -> {} edges ({} dominated transitions removed)",
        aca.quality,
        stats.edges_before,
        stats.edges_after,
        stats.edges_removed
    );
    stats
}

/// Pure annotation subsumption: every agent admitted by `dominated` is
/// also admitted by `dominant`.
fn annotation_dominates(dominant: &InterEdgeInfo, dominated: &InterEdgeInfo) -> bool {
    dominated.capability.contains(dominant.capability)
        && dominant.clearance >= dominated.clearance
}

/// The reachability clause of the full dominance relation: within each of
/// the two clusters, the dominated edge's endpoint must be reachable from
/// the dominant edge's endpoint under the dominated annotation.
fn endpoints_reachable(
    aca: &ClusterAbstraction,
    cluster_a: ClusterId,
    cluster_b: ClusterId,
    dominant: &InterEdgeInfo,
    dominated: &InterEdgeInfo,
) -> bool {
    for (cluster, from, to) in [
        (cluster_a, dominant.in_a.1, dominated.in_a.1),
        (cluster_b, dominant.in_b.1, dominated.in_b.1),
    ] {
        let bounds = aca.cluster_rect(cluster);
        let mut search = AnnotatedSearch::new(dominated.capability, dominated.clearance);
        if search
            .grid_path(&aca.map, &aca.table, Some(bounds), from, to)
            .is_none()
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::ClusterAbstraction;
    use crate::build::entrance_discovery::discover_transitions;
    use crate::build::inter_connector::connect_inter;
    use crate::config::BuildOptions;
    use crate::map::{Capability as Cap, TileMap};

    fn with_inter_edges(text: &str, s: u32, quality: Quality) -> ClusterAbstraction {
        let map = TileMap::parse(text).unwrap();
        let opts = BuildOptions {
            cluster_size: s,
            quality,
            ..BuildOptions::default()
        };
        let mut aca = ClusterAbstraction::new(map, &opts).unwrap();
        aca.partition().unwrap();
        let (ts, _) = discover_transitions(&aca.map, &aca.table, &aca.clusters, aca.columns);
        connect_inter(&mut aca, &ts);
        aca
    }

    const OPEN_8X4: &str = "........\n........\n........\n........\n";

    #[test]
    fn low_quality_keeps_everything() {
        let mut aca = with_inter_edges(OPEN_8X4, 4, Quality::Low);
        let before = aca.graph.num_edges();
        let stats = trim_dominated(&mut aca);
        assert_eq!(stats.edges_removed, 0);
        assert_eq!(aca.graph.num_edges(), before);
        assert_eq!(aca.cache.len(), before);
    }

    #[test]
    fn ground_edge_dominates_mixed_capability_twin() {
        // On an open map both classes pick the same border tiles, and the
        // widest ground crossing admits every agent any of the others do:
        // the ground-only annotation subsumes the mixed one, and the wider
        // crossing subsumes the narrower (the narrower endpoints are
        // reachable from the wider ones inside both clusters).
        let mut aca = with_inter_edges(OPEN_8X4, 4, Quality::High);
        assert_eq!(aca.graph.num_edges(), 4);
        let stats = trim_dominated(&mut aca);
        assert_eq!(stats.edges_removed, 3);
        let survivor = aca.graph.edges().next().unwrap();
        assert_eq!(survivor.capability, Cap::GROUND);
        assert_eq!(survivor.clearance, 4);
        // Nodes stay even though their edges went away.
        assert_eq!(aca.graph.num_nodes(), 4);
        assert_eq!(aca.cache.len(), 1);
    }

    #[test]
    fn unrelated_annotations_both_survive() {
        // Border admits ground rows and trees rows at disjoint offsets;
        // neither annotation subsumes the other.
        let mut aca = with_inter_edges(
            "......\n......\nTTTTTT\nTTTTTT\n",
            3,
            Quality::Medium,
        );
        let before_ground_or_trees = aca
            .graph
            .edges()
            .filter(|e| e.capability == Cap::GROUND || e.capability == Cap::TREES)
            .count();
        trim_dominated(&mut aca);
        let after = aca
            .graph
            .edges()
            .filter(|e| e.capability == Cap::GROUND || e.capability == Cap::TREES)
            .count();
        assert_eq!(before_ground_or_trees, after);
        // The mixed-capability transitions lose to the single-terrain ones
        // only where annotation dominance holds; ground (clearance >= its
        // own) vs mixed differs per border, but cache stays consistent.
        assert_eq!(aca.cache.len(), aca.graph.num_edges());
    }

    #[test]
    fn high_quality_requires_intra_cluster_reachability() {
        // Two parallel one-tile corridors cross the vertical border, split
        // by a full-width obstacle wall inside both clusters. The two
        // ground transitions carry identical annotations, but neither can
        // reach the other's endpoint inside the clusters, so High keeps
        // both while Medium collapses them into one.
        let corridor = "......\n\
                        @@@@@@\n\
                        ......\n";
        let ground_edges = |aca: &ClusterAbstraction| {
            aca.graph
                .edges()
                .filter(|e| e.capability == Cap::GROUND)
                .count()
        };

        let mut high = with_inter_edges(corridor, 3, Quality::High);
        assert_eq!(ground_edges(&high), 2);
        trim_dominated(&mut high);
        assert_eq!(ground_edges(&high), 2, "disconnected twins must survive");

        let mut medium = with_inter_edges(corridor, 3, Quality::Medium);
        trim_dominated(&mut medium);
        assert_eq!(ground_edges(&medium), 1, "medium prunes on annotations alone");
    }

    #[test]
    fn quality_nesting_medium_within_high_within_low() {
        let text = "...T..\n\
                    ......\n\
                    TT....\n\
                    ......\n\
                    ..@@..\n\
                    ......\n";
        let mut ids = BTreeMap::new();
        for q in [Quality::Low, Quality::High, Quality::Medium] {
            let mut aca = with_inter_edges(text, 3, q);
            trim_dominated(&mut aca);
            let set: Vec<EdgeId> = aca.graph.edges().map(|e| e.id).collect();
            ids.insert(format!("{}", q), set);
        }
        let low = &ids["low"];
        let high = &ids["high"];
        let medium = &ids["medium"];
        assert!(high.iter().all(|e| low.contains(e)));
        assert!(medium.iter().all(|e| high.contains(e)));
    }
}
