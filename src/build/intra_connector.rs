use crate::abstraction::ClusterAbstraction;
use crate::graph::{EdgeKind, NodeId};
use crate::map::{Capability, Point, Rect};
use crate::search::{AnnotatedSearch, SearchStats};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default)]
pub struct IntraStats {
    pub clusters_processed: usize,
    pub edges_created: usize,
}

/// A feasible intra-cluster connection between two abstract nodes.
#[derive(Clone, Debug)]
pub(crate) struct IntraCandidate {
    pub capability: Capability,
    pub clearance: u16,
    pub cost: f64,
    pub path: Vec<Point>,
}

/// Connects the abstract nodes inside each cluster. For every unordered
/// pair and every capability class present on their incident inter-edges,
/// the least-cost concrete path at the largest feasible clearance becomes
/// an intra-edge with a cached path.
pub fn connect_intra(aca: &mut ClusterAbstraction) -> IntraStats {
    let mut stats = IntraStats::default();
    let mut scratch = SearchStats::default();

    for cluster_idx in 0..aca.clusters.len() {
        let parents = aca.clusters[cluster_idx].parents.clone();
        if parents.len() < 2 {
            continue;
        }
        let bounds = aca.clusters[cluster_idx].bounds();

        for i in 0..parents.len() {
            for j in (i + 1)..parents.len() {
                let (u, v) = (parents[i], parents[j]);
                let caps = incident_inter_capabilities(aca, u, v);
                let u_origin = aca.graph.node(u).expect("parent node").origin;
                let v_origin = aca.graph.node(v).expect("parent node").origin;
                let candidates = pair_candidates(
                    aca,
                    bounds,
                    u_origin,
                    v_origin,
                    &caps,
                    &mut scratch,
                );
                for c in candidates {
                    let eid = aca.graph.add_edge(
                        u,
                        v,
                        c.cost,
                        c.capability,
                        c.clearance,
                        EdgeKind::Intra,
                    );
                    aca.cache.insert(eid, u_origin, c.path);
                    stats.edges_created += 1;
                }
            }
        }
        stats.clusters_processed += 1;
    }

    log::info!(
        "[intra_connector] {} clusters connected, {} intra-edges",
        stats.clusters_processed,
        stats.edges_created
    );
    stats
}

/// Capability classes appearing on inter-edges incident to either node.
fn incident_inter_capabilities(
    aca: &ClusterAbstraction,
    u: NodeId,
    v: NodeId,
) -> Vec<Capability> {
    let mut caps: BTreeSet<Capability> = BTreeSet::new();
    for n in [u, v] {
        for eid in aca.graph.incident(n) {
            if let Some(e) = aca.graph.edge(*eid) {
                if e.kind == EdgeKind::Inter {
                    caps.insert(e.capability);
                }
            }
        }
    }
    caps.into_iter().collect()
}

/// Computes the surviving intra-edge candidates for one node pair: per
/// capability class, the least-cost path at the largest clearance any path
/// exists for, with candidates subsumed by a cheaper, wider, less demanding
/// one dropped.
pub(crate) fn pair_candidates(
    aca: &ClusterAbstraction,
    bounds: Rect,
    u_origin: Point,
    v_origin: Point,
    caps: &[Capability],
    stats: &mut SearchStats,
) -> Vec<IntraCandidate> {
    let mut candidates: Vec<IntraCandidate> = Vec::new();

    for &cap in caps {
        let upper = aca
            .table
            .clearance(&aca.map, u_origin, cap)
            .min(aca.table.clearance(&aca.map, v_origin, cap));
        if upper == 0 {
            continue;
        }
        for k in (1..=upper).rev() {
            let mut search = AnnotatedSearch::new(cap, k);
            let found = search.grid_path(&aca.map, &aca.table, Some(bounds), u_origin, v_origin);
            stats.absorb(&search.stats);
            if let Some(p) = found {
                candidates.push(IntraCandidate {
                    capability: cap,
                    clearance: k,
                    cost: p.cost,
                    path: p.tiles,
                });
                break;
            }
        }
    }

    // A candidate is redundant when another admits every agent it admits
    // at no greater cost; identical candidates keep the earliest class.
    let mut removed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        for j in 0..candidates.len() {
            if i == j || removed[j] {
                continue;
            }
            if !candidate_dominates(&candidates[j], &candidates[i]) {
                continue;
            }
            if candidate_dominates(&candidates[i], &candidates[j]) && j > i {
                continue;
            }
            removed[i] = true;
            break;
        }
    }
    candidates
        .into_iter()
        .zip(removed)
        .filter(|(_, r)| !r)
        .map(|(c, _)| c)
        .collect()
}

fn candidate_dominates(dominant: &IntraCandidate, dominated: &IntraCandidate) -> bool {
    dominated.capability.contains(dominant.capability)
        && dominant.clearance >= dominated.clearance
        && dominant.cost <= dominated.cost + 1e-9
}
