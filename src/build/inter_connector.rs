use crate::abstraction::ClusterAbstraction;
use crate::base_graph::CARDINAL_COST;
use crate::build::entrance_discovery::Transition;
use crate::graph::{ClusterId, EdgeKind, NodeId};
use crate::map::Point;

#[derive(Clone, Copy, Debug, Default)]
pub struct InterStats {
    pub nodes_created: usize,
    pub edges_created: usize,
}

/// Materialises the discovered transitions: creates (or reuses) an abstract
/// node for each endpoint tile, connects the pair with an inter-edge
/// carrying the transition's annotation, and installs the two-tile border
/// crossing as the edge's cached path.
pub fn connect_inter(aca: &mut ClusterAbstraction, transitions: &[Transition]) -> InterStats {
    let mut stats = InterStats::default();

    for t in transitions {
        let na = ensure_parent(aca, t.tile_a, t.cluster_a, &mut stats);
        let nb = ensure_parent(aca, t.tile_b, t.cluster_b, &mut stats);
        let eid = aca.graph.add_edge(
            na,
            nb,
            CARDINAL_COST,
            t.capability,
            t.clearance,
            EdgeKind::Inter,
        );
        aca.cache.insert(eid, t.tile_a, vec![t.tile_a, t.tile_b]);
        stats.edges_created += 1;
    }

    log::info!(
        "[inter_connector] {} abstract nodes, {} inter-edges",
        stats.nodes_created,
        stats.edges_created
    );
    stats
}

/// Finds the abstract node for `tile`, creating and labelling one when the
/// tile does not participate in the abstract graph yet.
fn ensure_parent(
    aca: &mut ClusterAbstraction,
    tile: Point,
    cluster: ClusterId,
    stats: &mut InterStats,
) -> NodeId {
    let idx = aca.map.index(tile);
    if let Some(id) = aca.parents[idx] {
        return id;
    }
    let id = aca.graph.add_node(tile, cluster, 1);
    aca.parents[idx] = Some(id);
    aca.clusters[cluster.0].parents.push(id);
    stats.nodes_created += 1;
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::ClusterAbstraction;
    use crate::build::entrance_discovery::discover_transitions;
    use crate::config::BuildOptions;
    use crate::map::TileMap;

    fn clustered(text: &str, s: u32) -> ClusterAbstraction {
        let map = TileMap::parse(text).unwrap();
        let opts = BuildOptions {
            cluster_size: s,
            ..BuildOptions::default()
        };
        let mut aca = ClusterAbstraction::new(map, &opts).unwrap();
        aca.partition().unwrap();
        aca
    }

    #[test]
    fn shared_endpoint_tiles_reuse_one_node() {
        // Open 8x4 map, S=4: each class places crossings at offsets 1 and
        // 0 of the sloping border; the ground+trees transitions land on
        // the same tiles as the ground ones, so four edges share four
        // nodes.
        let mut aca = clustered("........\n........\n........\n........\n", 4);
        let (ts, _) = discover_transitions(&aca.map, &aca.table, &aca.clusters, aca.columns);
        let stats = connect_inter(&mut aca, &ts);
        assert_eq!(stats.nodes_created, 4);
        assert_eq!(stats.edges_created, 4);
        assert_eq!(aca.graph.num_nodes(), 4);
        assert_eq!(aca.graph.num_edges(), 4);
        assert_eq!(aca.cache.len(), 4);
        // Tile labels point back at the created nodes.
        let na = aca.parent_of(Point::new(3, 1)).unwrap();
        assert_eq!(aca.graph.node(na).unwrap().origin, Point::new(3, 1));
        assert_eq!(aca.graph.node(na).unwrap().level, 1);
        // Cluster parent lists carry one node per border tile.
        assert_eq!(aca.clusters[0].parents.len(), 2);
        assert_eq!(aca.clusters[1].parents.len(), 2);
    }

    #[test]
    fn cached_paths_are_the_border_crossings() {
        let mut aca = clustered("....\n....\n", 2);
        let (ts, _) = discover_transitions(&aca.map, &aca.table, &aca.clusters, aca.columns);
        connect_inter(&mut aca, &ts);
        for edge in aca.graph.edges() {
            let path = aca.cache.get(edge.id).expect("every edge has a cache entry");
            assert_eq!(path.len(), 2);
            assert_eq!(path[0], aca.graph.node(edge.from).unwrap().origin);
            assert_eq!(path[1], aca.graph.node(edge.to).unwrap().origin);
            assert_eq!(edge.weight, CARDINAL_COST);
        }
    }

    #[test]
    fn node_origin_lies_inside_its_cluster() {
        let mut aca = clustered("......\n......\n......\n......\n......\n......\n", 3);
        let (ts, _) = discover_transitions(&aca.map, &aca.table, &aca.clusters, aca.columns);
        connect_inter(&mut aca, &ts);
        for node in aca.graph.nodes() {
            assert!(
                aca.clusters[node.cluster.0].contains(node.origin),
                "node at {} escaped cluster {:?}",
                node.origin,
                node.cluster
            );
        }
    }
}
