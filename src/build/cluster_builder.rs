use crate::cluster::Cluster;
use crate::graph::ClusterId;
use crate::map::{Point, TileMap};
use anyhow::{bail, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct PartitionStats {
    pub clusters_created: usize,
    pub columns: usize,
    pub rows: usize,
}

/// Splits the map into ceil(W/S) x ceil(H/S) clusters in row-major order.
/// Edge clusters keep the remainder widths/heights. The cluster at origin
/// `(floor(x/S)*S, floor(y/S)*S)` owns tile `(x, y)`.
pub fn partition(map: &TileMap, cluster_size: u32) -> Result<(Vec<Cluster>, PartitionStats)> {
    if cluster_size < 2 {
        bail!("cluster size must be at least 2, got {}", cluster_size);
    }
    let columns = map.width().div_ceil(cluster_size) as usize;
    let rows = map.height().div_ceil(cluster_size) as usize;

    let mut clusters = Vec::with_capacity(columns * rows);
    for row in 0..rows as u32 {
        for col in 0..columns as u32 {
            let origin = Point::new(col * cluster_size, row * cluster_size);
            clusters.push(Cluster {
                id: ClusterId(clusters.len()),
                origin,
                width: cluster_size.min(map.width() - origin.x),
                height: cluster_size.min(map.height() - origin.y),
                parents: Vec::new(),
            });
        }
    }

    let stats = PartitionStats {
        clusters_created: clusters.len(),
        columns,
        rows,
    };
    log::info!(
        "[cluster_builder] partitioned {}x{} map into {} clusters ({}x{}, S={})",
        map.width(),
        map.height(),
        stats.clusters_created,
        columns,
        rows,
        cluster_size
    );
    Ok((clusters, stats))
}

/// Id of the cluster owning `p`, given the partition layout.
pub fn cluster_of(p: Point, cluster_size: u32, columns: usize) -> ClusterId {
    let col = (p.x / cluster_size) as usize;
    let row = (p.y / cluster_size) as usize;
    ClusterId(row * columns + col)
}
