use crate::clearance::ClearanceTable;
use crate::cluster::Cluster;
use crate::graph::ClusterId;
use crate::map::{Capability, Point, TileMap};
use std::collections::BTreeSet;

/// Runs longer than this get a representative transition at each end
/// instead of a single one at the midpoint.
pub const MAX_MIDPOINT_RUN: u32 = 6;

/// One representative crossing of a cluster border for a specific
/// capability class: a pair of facing tiles, annotated with the clearance
/// available at that offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub cluster_a: ClusterId,
    pub cluster_b: ClusterId,
    pub tile_a: Point,
    pub tile_b: Point,
    pub capability: Capability,
    pub clearance: u16,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EntranceStats {
    pub borders_scanned: usize,
    pub runs_found: usize,
    pub transitions_emitted: usize,
}

/// Scans every shared border between adjacent clusters and emits the
/// representative transitions for each capability class and clearance
/// threshold.
///
/// An offset admits (C, k) when the facing tiles on both sides are
/// C-traversable with clearance at least k. For every clearance threshold
/// present on the border, the maximal contiguous admitted runs become
/// entrances; a wide sub-run buried inside a longer narrow run therefore
/// gets its own crossing instead of being shadowed by the narrow run's
/// representatives. Runs of up to [`MAX_MIDPOINT_RUN`] offsets are
/// represented by one transition at their midpoint, longer runs by two
/// transitions placed one offset in from either end; an offset is never
/// represented twice for the same class.
pub fn discover_transitions(
    map: &TileMap,
    table: &ClearanceTable,
    clusters: &[Cluster],
    columns: usize,
) -> (Vec<Transition>, EntranceStats) {
    let mut transitions = Vec::new();
    let mut stats = EntranceStats::default();
    let rows = clusters.len() / columns.max(1);

    for cluster in clusters {
        let col = cluster.id.0 % columns;
        let row = cluster.id.0 / columns;

        // Border with the right-hand neighbour.
        if col + 1 < columns {
            let neighbour = &clusters[cluster.id.0 + 1];
            let ax = cluster.origin.x + cluster.width - 1;
            let offsets: Vec<(Point, Point)> = (0..cluster.height)
                .map(|dy| {
                    let y = cluster.origin.y + dy;
                    (Point::new(ax, y), Point::new(ax + 1, y))
                })
                .collect();
            stats.borders_scanned += 1;
            scan_border(
                map, table, cluster.id, neighbour.id, &offsets, &mut transitions, &mut stats,
            );
        }

        // Border with the neighbour below.
        if row + 1 < rows {
            let neighbour = &clusters[cluster.id.0 + columns];
            let ay = cluster.origin.y + cluster.height - 1;
            let offsets: Vec<(Point, Point)> = (0..cluster.width)
                .map(|dx| {
                    let x = cluster.origin.x + dx;
                    (Point::new(x, ay), Point::new(x, ay + 1))
                })
                .collect();
            stats.borders_scanned += 1;
            scan_border(
                map, table, cluster.id, neighbour.id, &offsets, &mut transitions, &mut stats,
            );
        }
    }

    log::info!(
        "[entrance_discovery] {} borders, {} runs, {} transitions",
        stats.borders_scanned,
        stats.runs_found,
        stats.transitions_emitted
    );
    (transitions, stats)
}

fn scan_border(
    map: &TileMap,
    table: &ClearanceTable,
    cluster_a: ClusterId,
    cluster_b: ClusterId,
    offsets: &[(Point, Point)],
    transitions: &mut Vec<Transition>,
    stats: &mut EntranceStats,
) {
    for &cap in table.classes() {
        // Width of the crossing at each offset: the widest agent the
        // facing pair of tiles lets through under this class.
        let widths: Vec<u16> = offsets
            .iter()
            .map(|&(a, b)| {
                table
                    .clearance(map, a, cap)
                    .min(table.clearance(map, b, cap))
            })
            .collect();
        let thresholds: BTreeSet<u16> = widths.iter().copied().filter(|w| *w > 0).collect();

        let mut seen_runs: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut picked: BTreeSet<usize> = BTreeSet::new();
        for &k in &thresholds {
            let mut run_start: Option<usize> = None;
            for i in 0..=widths.len() {
                let admitted = i < widths.len() && widths[i] >= k;
                if admitted {
                    if run_start.is_none() {
                        run_start = Some(i);
                    }
                } else if let Some(s) = run_start.take() {
                    let e = i - 1;
                    // The same maximal run recurs at every threshold up to
                    // its narrowest point; handle it once.
                    if !seen_runs.insert((s, e)) {
                        continue;
                    }
                    stats.runs_found += 1;
                    emit_run(
                        cluster_a,
                        cluster_b,
                        offsets,
                        &widths,
                        s,
                        e,
                        cap,
                        &mut picked,
                        transitions,
                        stats,
                    );
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_run(
    cluster_a: ClusterId,
    cluster_b: ClusterId,
    offsets: &[(Point, Point)],
    widths: &[u16],
    s: usize,
    e: usize,
    cap: Capability,
    picked: &mut BTreeSet<usize>,
    transitions: &mut Vec<Transition>,
    stats: &mut EntranceStats,
) {
    let len = (e - s + 1) as u32;
    let mut picks = Vec::with_capacity(2);
    if len <= MAX_MIDPOINT_RUN {
        picks.push((s + e) / 2);
    } else {
        // Long corridors are represented at both ends, one offset in.
        picks.push(s + 1);
        picks.push(e - 1);
    }
    for i in picks {
        // A narrower run may already have placed a crossing here; its
        // annotation is the full width at that offset, so nothing is lost.
        if !picked.insert(i) {
            continue;
        }
        let (a, b) = offsets[i];
        transitions.push(Transition {
            cluster_a,
            cluster_b,
            tile_a: a,
            tile_b: b,
            capability: cap,
            clearance: widths[i],
        });
        stats.transitions_emitted += 1;
    }
}
