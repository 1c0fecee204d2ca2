use crate::abstraction::{BuildState, ClusterAbstraction};
use crate::build::Quality;
use crate::config::BuildOptions;
use crate::graph::{EdgeId, EdgeKind, NodeId};
use crate::map::{Capability, Point, TileMap};
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OpenFlags, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub fn open_ro<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(conn)
}

pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn with_tx<T, F: FnOnce(&Transaction) -> Result<T>>(conn: &mut Connection, f: F) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS clusters (
            cluster_id INTEGER PRIMARY KEY,
            origin_x   INTEGER NOT NULL,
            origin_y   INTEGER NOT NULL,
            width      INTEGER NOT NULL,
            height     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS abstract_nodes (
            node_id    INTEGER PRIMARY KEY,
            cluster_id INTEGER NOT NULL REFERENCES clusters(cluster_id),
            x          INTEGER NOT NULL,
            y          INTEGER NOT NULL,
            level      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS abstract_edges (
            edge_id    INTEGER PRIMARY KEY,
            node_from  INTEGER NOT NULL REFERENCES abstract_nodes(node_id),
            node_to    INTEGER NOT NULL REFERENCES abstract_nodes(node_id),
            weight     REAL    NOT NULL,
            capability INTEGER NOT NULL,
            clearance  INTEGER NOT NULL,
            kind       TEXT    NOT NULL CHECK (kind IN ('inter','intra'))
        );

        CREATE TABLE IF NOT EXISTS cached_paths (
            edge_id   INTEGER PRIMARY KEY REFERENCES abstract_edges(edge_id),
            path_blob BLOB NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Persists a built abstraction. Ids are compacted to a dense range on the
/// way out; path blobs are written only when `store_paths` is set.
pub fn save_abstraction(
    conn: &mut Connection,
    aca: &ClusterAbstraction,
    store_paths: bool,
) -> Result<()> {
    if aca.state() != BuildState::Ready {
        bail!("cannot save an abstraction in state {:?}", aca.state());
    }
    create_schema(conn)?;

    let mut node_ids: BTreeMap<NodeId, i64> = BTreeMap::new();
    for (i, node) in aca.abstract_graph().nodes().enumerate() {
        node_ids.insert(node.id, i as i64);
    }
    let mut edge_ids: BTreeMap<EdgeId, i64> = BTreeMap::new();
    for (i, edge) in aca.abstract_graph().edges().enumerate() {
        edge_ids.insert(edge.id, i as i64);
    }

    with_tx(conn, |tx| {
        tx.execute_batch(
            "DELETE FROM cached_paths; DELETE FROM abstract_edges;
             DELETE FROM abstract_nodes; DELETE FROM clusters; DELETE FROM meta;",
        )?;

        let mut meta = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
        meta.execute(params!["map_width", aca.map().width().to_string()])?;
        meta.execute(params!["map_height", aca.map().height().to_string()])?;
        meta.execute(params!["cluster_size", aca.cluster_size().to_string()])?;
        meta.execute(params!["quality", aca.quality().to_string()])?;
        meta.execute(params![
            "terrains",
            aca.clearance_table()
                .classes()
                .iter()
                .fold(Capability::empty(), |a, c| a | *c)
                .bits()
                .to_string()
        ])?;
        meta.execute(params!["store_paths", if store_paths { "1" } else { "0" }])?;

        let mut ins_cluster = tx.prepare(
            "INSERT INTO clusters (cluster_id, origin_x, origin_y, width, height)
             VALUES (?1,?2,?3,?4,?5)",
        )?;
        for c in aca.clusters() {
            ins_cluster.execute(params![
                c.id.0 as i64,
                c.origin.x,
                c.origin.y,
                c.width,
                c.height
            ])?;
        }

        let mut ins_node = tx.prepare(
            "INSERT INTO abstract_nodes (node_id, cluster_id, x, y, level)
             VALUES (?1,?2,?3,?4,?5)",
        )?;
        for node in aca.abstract_graph().nodes() {
            ins_node.execute(params![
                node_ids[&node.id],
                node.cluster.0 as i64,
                node.origin.x,
                node.origin.y,
                node.level
            ])?;
        }

        let mut ins_edge = tx.prepare(
            "INSERT INTO abstract_edges
             (edge_id, node_from, node_to, weight, capability, clearance, kind)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
        )?;
        let mut ins_path =
            tx.prepare("INSERT INTO cached_paths (edge_id, path_blob) VALUES (?1, ?2)")?;
        for edge in aca.abstract_graph().edges() {
            let kind = match edge.kind {
                EdgeKind::Inter => "inter",
                EdgeKind::Intra => "intra",
            };
            ins_edge.execute(params![
                edge_ids[&edge.id],
                node_ids[&edge.from],
                node_ids[&edge.to],
                edge.weight,
                edge.capability.bits(),
                edge.clearance,
                kind
            ])?;
            if store_paths {
                let path = aca
                    .cached_path(edge.id)
                    .ok_or_else(|| anyhow!("edge {:?} has no cached path", edge.id))?;
                ins_path.execute(params![edge_ids[&edge.id], encode_path_blob(path)])?;
            }
        }
        Ok(())
    })?;

    log::info!(
        "[persist] saved {} nodes, {} edges ({} path blobs)",
        node_ids.len(),
        edge_ids.len(),
        if store_paths { edge_ids.len() } else { 0 }
    );
    Ok(())
}

/// Reconstructs a query-ready abstraction from a saved database plus the
/// original map. The map is annotated from scratch; the graph and path
/// cache are restored row by row.
pub fn load_abstraction(conn: &Connection, map: TileMap) -> Result<ClusterAbstraction> {
    let meta = |key: &str| -> Result<String> {
        conn.query_row("SELECT value FROM meta WHERE key=?1", [key], |r| r.get(0))
            .with_context(|| format!("missing meta key {}", key))
    };

    let width: u32 = meta("map_width")?.parse()?;
    let height: u32 = meta("map_height")?.parse()?;
    if width != map.width() || height != map.height() {
        bail!(
            "map is {}x{} but the saved abstraction was built for {}x{}",
            map.width(),
            map.height(),
            width,
            height
        );
    }
    let cluster_size: u32 = meta("cluster_size")?.parse()?;
    let quality: Quality = meta("quality")?.parse()?;
    let terrains = Capability::from_bits(meta("terrains")?.parse::<u8>()?)
        .ok_or_else(|| anyhow!("invalid terrain bits in meta"))?;
    if meta("store_paths")? != "1" {
        bail!("saved abstraction has no cached paths; rebuild with store-paths enabled");
    }

    let opts = BuildOptions {
        cluster_size,
        quality,
        terrains,
        ..BuildOptions::default()
    };
    let mut aca = ClusterAbstraction::new(map, &opts)?;
    aca.partition()?;

    let cluster_count: i64 = conn.query_row("SELECT COUNT(*) FROM clusters", [], |r| r.get(0))?;
    if cluster_count as usize != aca.num_clusters() {
        bail!(
            "saved abstraction has {} clusters, partition produced {}",
            cluster_count,
            aca.num_clusters()
        );
    }

    // Nodes in id order map 1:1 onto fresh arena ids.
    let mut node_stmt = conn.prepare(
        "SELECT node_id, cluster_id, x, y, level FROM abstract_nodes ORDER BY node_id",
    )?;
    let rows = node_stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, u32>(2)?,
            r.get::<_, u32>(3)?,
            r.get::<_, u8>(4)?,
        ))
    })?;
    for row in rows {
        let (node_id, cluster_id, x, y, level) = row?;
        let restored = aca.restore_node(Point::new(x, y), cluster_id as usize, level)?;
        if restored.0 as i64 != node_id {
            bail!("node ids are not dense; database is damaged");
        }
    }

    let mut edge_stmt = conn.prepare(
        "SELECT e.edge_id, e.node_from, e.node_to, e.weight, e.capability, e.clearance, e.kind,
                p.path_blob
         FROM abstract_edges e LEFT JOIN cached_paths p ON p.edge_id = e.edge_id
         ORDER BY e.edge_id",
    )?;
    let rows = edge_stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, i64>(2)?,
            r.get::<_, f64>(3)?,
            r.get::<_, u8>(4)?,
            r.get::<_, u16>(5)?,
            r.get::<_, String>(6)?,
            r.get::<_, Option<Vec<u8>>>(7)?,
        ))
    })?;
    for row in rows {
        let (edge_id, from, to, weight, cap_bits, clearance, kind, blob) = row?;
        let capability = Capability::from_bits(cap_bits)
            .ok_or_else(|| anyhow!("invalid capability bits on edge {}", edge_id))?;
        let kind = match kind.as_str() {
            "inter" => EdgeKind::Inter,
            "intra" => EdgeKind::Intra,
            other => bail!("unknown edge kind {:?}", other),
        };
        let blob =
            blob.ok_or_else(|| anyhow!("edge {} has no cached path blob", edge_id))?;
        let path = decode_path_blob(&blob)?;
        let restored = aca.restore_edge(
            NodeId(from as usize),
            NodeId(to as usize),
            weight,
            capability,
            clearance,
            kind,
            path,
        )?;
        if restored.0 as i64 != edge_id {
            bail!("edge ids are not dense; database is damaged");
        }
    }

    aca.finish_restore()?;
    Ok(aca)
}

/// Little-endian coordinate pairs, eight bytes per tile.
pub fn encode_path_blob(path: &[Point]) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len() * 8);
    for p in path {
        out.extend_from_slice(&p.x.to_le_bytes());
        out.extend_from_slice(&p.y.to_le_bytes());
    }
    out
}

pub fn decode_path_blob(blob: &[u8]) -> Result<Vec<Point>> {
    if blob.len() % 8 != 0 {
        bail!("path blob length {} is not a multiple of 8", blob.len());
    }
    let mut out = Vec::with_capacity(blob.len() / 8);
    for chunk in blob.chunks_exact(8) {
        let x = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let y = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
        out.push(Point::new(x, y));
    }
    Ok(out)
}
