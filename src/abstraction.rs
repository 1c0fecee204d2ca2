use crate::base_graph::BaseGraph;
use crate::build::cluster_builder::{self, PartitionStats};
use crate::build::executor::{self, BuildStats, EntranceBuildStats};
use crate::build::Quality;
use crate::cache::PathCache;
use crate::clearance::ClearanceTable;
use crate::cluster::Cluster;
use crate::config::BuildOptions;
use crate::graph::{AbstractGraph, ClusterId, NodeId};
use crate::map::{Capability, Point, Rect, TileMap};
use crate::search::SearchStats;
use crate::surgeon::SurgeonState;
use anyhow::{bail, Result};
use serde::Serialize;

/// Construction lifecycle. Queries are only legal in `Ready`; a query in
/// flight (between insert and remove) holds the `Querying` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    Empty,
    Clustered,
    Ready,
    Querying,
}

/// Effort counters for the most recent query, split into the insertion
/// phase (surgeon) and the abstract search phase. Reset when the next
/// query starts.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct QueryStats {
    pub insertion: SearchStats,
    pub search: SearchStats,
}

impl QueryStats {
    pub fn combined(&self) -> SearchStats {
        let mut s = self.insertion;
        s.absorb(&self.search);
        s
    }
}

/// The annotated cluster abstraction: owns the map annotation, the level-0
/// graph, the cluster partition, the level-1 annotated graph and the path
/// cache. Built once, then queried for any (capability, clearance) agent.
#[derive(Debug)]
pub struct ClusterAbstraction {
    pub(crate) map: TileMap,
    pub(crate) table: ClearanceTable,
    pub(crate) base: BaseGraph,
    pub(crate) graph: AbstractGraph,
    pub(crate) clusters: Vec<Cluster>,
    pub(crate) columns: usize,
    pub(crate) cache: PathCache,
    /// Per-tile abstract-node label; `None` when the tile has no parent.
    pub(crate) parents: Vec<Option<NodeId>>,
    pub(crate) state: BuildState,
    pub(crate) cluster_size: u32,
    pub(crate) quality: Quality,
    pub(crate) surgeon: SurgeonState,
    pub(crate) stats: QueryStats,
}

impl ClusterAbstraction {
    /// Annotates the map (clearance table + base graph) and prepares an
    /// empty abstraction. No clusters exist yet.
    pub fn new(map: TileMap, options: &BuildOptions) -> Result<ClusterAbstraction> {
        if options.cluster_size < 2 {
            bail!(
                "cluster size must be at least 2, got {}",
                options.cluster_size
            );
        }
        let classes = Capability::classes(options.terrains);
        if classes.is_empty() {
            bail!("valid terrain set is empty");
        }
        let table = ClearanceTable::build(&map, &classes);
        let base = BaseGraph::build(&map);
        let tile_count = (map.width() * map.height()) as usize;
        Ok(ClusterAbstraction {
            map,
            table,
            base,
            graph: AbstractGraph::new(),
            clusters: Vec::new(),
            columns: 0,
            cache: PathCache::new(),
            parents: vec![None; tile_count],
            state: BuildState::Empty,
            cluster_size: options.cluster_size,
            quality: options.quality,
            surgeon: SurgeonState::default(),
            stats: QueryStats::default(),
        })
    }

    /// Empty -> Clustered.
    pub fn partition(&mut self) -> Result<PartitionStats> {
        if self.state != BuildState::Empty {
            bail!("partition called in state {:?}", self.state);
        }
        let (clusters, stats) = cluster_builder::partition(&self.map, self.cluster_size)?;
        self.clusters = clusters;
        self.columns = stats.columns;
        self.state = BuildState::Clustered;
        Ok(stats)
    }

    /// Clustered -> Ready. Runs entrance discovery, the dominance trimmer
    /// and the intra-cluster connector, populating the abstract graph and
    /// the path cache.
    pub fn build_entrances(&mut self) -> Result<EntranceBuildStats> {
        if self.state != BuildState::Clustered {
            bail!("build_entrances called in state {:?}", self.state);
        }
        let stats = executor::run_entrance_stages(self)?;
        self.state = BuildState::Ready;
        Ok(stats)
    }

    /// Convenience: runs the whole pipeline on a freshly parsed map.
    pub fn build(map: TileMap, options: &BuildOptions) -> Result<(ClusterAbstraction, BuildStats)> {
        let mut aca = ClusterAbstraction::new(map, options)?;
        let partition = aca.partition()?;
        let entrances = aca.build_entrances()?;
        Ok((aca, BuildStats {
            partition,
            entrances,
        }))
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn clearance_table(&self) -> &ClearanceTable {
        &self.table
    }

    pub fn base_graph(&self) -> &BaseGraph {
        &self.base
    }

    pub fn abstract_graph(&self) -> &AbstractGraph {
        &self.graph
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.0)
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// The abstract node labelling this tile, if any.
    pub fn parent_of(&self, p: Point) -> Option<NodeId> {
        self.parents[self.map.index(p)]
    }

    pub fn cluster_of(&self, p: Point) -> ClusterId {
        cluster_builder::cluster_of(p, self.cluster_size, self.columns)
    }

    pub(crate) fn cluster_rect(&self, id: ClusterId) -> Rect {
        self.clusters[id.0].bounds()
    }

    /// Statistics recorded by the most recent query.
    pub fn query_stats(&self) -> &QueryStats {
        &self.stats
    }

    /// The concrete path cached for an abstract edge, if any.
    pub fn cached_path(&self, edge: crate::graph::EdgeId) -> Option<&Vec<Point>> {
        self.cache.get(edge)
    }

    /// Reinstalls one abstract node from persisted data. Only valid while
    /// restoring, between `partition` and `finish_restore`.
    pub(crate) fn restore_node(
        &mut self,
        origin: Point,
        cluster_idx: usize,
        level: u8,
    ) -> Result<NodeId> {
        if self.state != BuildState::Clustered {
            bail!("restore_node called in state {:?}", self.state);
        }
        let cluster = self
            .clusters
            .get(cluster_idx)
            .ok_or_else(|| anyhow::anyhow!("unknown cluster index {}", cluster_idx))?;
        if !cluster.contains(origin) {
            bail!("node at {} lies outside cluster {}", origin, cluster_idx);
        }
        let idx = self.map.index(origin);
        if self.parents[idx].is_some() {
            bail!("tile {} already has an abstract node", origin);
        }
        let id = self.graph.add_node(origin, ClusterId(cluster_idx), level);
        self.parents[idx] = Some(id);
        self.clusters[cluster_idx].parents.push(id);
        Ok(id)
    }

    /// Reinstalls one annotated edge and its cached path from persisted
    /// data.
    pub(crate) fn restore_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: f64,
        capability: Capability,
        clearance: u16,
        kind: crate::graph::EdgeKind,
        path: Vec<Point>,
    ) -> Result<crate::graph::EdgeId> {
        if self.state != BuildState::Clustered {
            bail!("restore_edge called in state {:?}", self.state);
        }
        let from_origin = self
            .graph
            .node(from)
            .ok_or_else(|| anyhow::anyhow!("edge references unknown node {:?}", from))?
            .origin;
        let to_origin = self
            .graph
            .node(to)
            .ok_or_else(|| anyhow::anyhow!("edge references unknown node {:?}", to))?
            .origin;
        let ends = (path.first().copied(), path.last().copied());
        if ends != (Some(from_origin), Some(to_origin))
            && ends != (Some(to_origin), Some(from_origin))
        {
            bail!("cached path endpoints do not match edge {:?} -> {:?}", from, to);
        }
        let id = self.graph.add_edge(from, to, weight, capability, clearance, kind);
        self.cache.insert(id, from_origin, path);
        Ok(id)
    }

    /// Ends a restore: checks the cache invariant and marks the
    /// abstraction ready for queries.
    pub(crate) fn finish_restore(&mut self) -> Result<()> {
        if self.state != BuildState::Clustered {
            bail!("finish_restore called in state {:?}", self.state);
        }
        if self.cache.len() != self.graph.num_edges() {
            bail!(
                "restored cache has {} entries for {} edges",
                self.cache.len(),
                self.graph.num_edges()
            );
        }
        self.state = BuildState::Ready;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BuildOptions {
        BuildOptions {
            cluster_size: 5,
            ..BuildOptions::default()
        }
    }

    fn open_map(w: u32, h: u32) -> TileMap {
        let row = ".".repeat(w as usize);
        TileMap::parse(&(0..h).map(|_| row.clone()).collect::<Vec<_>>().join("\n")).unwrap()
    }

    #[test]
    fn state_machine_enforces_stage_order() {
        let mut aca = ClusterAbstraction::new(open_map(10, 10), &options()).unwrap();
        assert_eq!(aca.state(), BuildState::Empty);
        // Entrances before clustering is rejected.
        assert!(aca.build_entrances().is_err());
        aca.partition().unwrap();
        assert_eq!(aca.state(), BuildState::Clustered);
        // Repartitioning a clustered abstraction is rejected.
        assert!(aca.partition().is_err());
        aca.build_entrances().unwrap();
        assert_eq!(aca.state(), BuildState::Ready);
    }

    #[test]
    fn queries_rejected_before_ready() {
        let mut aca = ClusterAbstraction::new(open_map(10, 10), &options()).unwrap();
        let err = aca
            .insert_start_goal(Some(Point::new(0, 0)), Some(Point::new(9, 9)))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::QueryError::InvalidState(BuildState::Empty)
        ));
        aca.partition().unwrap();
        let err = aca
            .insert_start_goal(Some(Point::new(0, 0)), Some(Point::new(9, 9)))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::QueryError::InvalidState(BuildState::Clustered)
        ));
    }

    #[test]
    fn rejects_cluster_size_below_two() {
        let opts = BuildOptions {
            cluster_size: 1,
            ..BuildOptions::default()
        };
        assert!(ClusterAbstraction::new(open_map(4, 4), &opts).is_err());
    }
}
