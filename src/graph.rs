use crate::map::{Capability, Point};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Crosses a cluster border; represents an entrance transition.
    Inter,
    /// Connects two nodes inside one cluster via a cached concrete path.
    Intra,
}

/// A level-1 node standing in for one level-0 tile on an entrance (or a
/// transient start/goal endpoint).
#[derive(Clone, Debug)]
pub struct AbstractNode {
    pub id: NodeId,
    pub origin: Point,
    pub cluster: ClusterId,
    pub level: u8,
}

/// An abstract edge with a single (capability, clearance) annotation. Two
/// nodes may be connected by several parallel edges carrying different
/// annotations.
#[derive(Clone, Debug)]
pub struct AnnotatedEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    pub capability: Capability,
    pub clearance: u16,
    pub kind: EdgeKind,
}

impl AnnotatedEdge {
    /// An edge annotated `(ce, ke)` admits an agent `(cap, clearance)` iff
    /// the agent can enter every terrain on the represented path and fits
    /// through its narrowest point.
    pub fn admits(&self, cap: Capability, clearance: u16) -> bool {
        cap.contains(self.capability) && self.clearance >= clearance
    }

    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    pub fn other(&self, n: NodeId) -> NodeId {
        if self.from == n {
            self.to
        } else {
            self.from
        }
    }
}

/// Arena-backed undirected graph with stable integer ids. Removed slots are
/// left as `None` so ids handed out earlier stay valid.
#[derive(Clone, Debug, Default)]
pub struct AbstractGraph {
    nodes: Vec<Option<AbstractNode>>,
    edges: Vec<Option<AnnotatedEdge>>,
    adjacency: Vec<Vec<EdgeId>>,
    num_nodes: usize,
    num_edges: usize,
}

impl AbstractGraph {
    pub fn new() -> AbstractGraph {
        AbstractGraph::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn add_node(&mut self, origin: Point, cluster: ClusterId, level: u8) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(AbstractNode {
            id,
            origin,
            cluster,
            level,
        }));
        self.adjacency.push(Vec::new());
        self.num_nodes += 1;
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&AbstractNode> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: f64,
        capability: Capability,
        clearance: u16,
        kind: EdgeKind,
    ) -> EdgeId {
        debug_assert!(self.node(from).is_some() && self.node(to).is_some());
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(AnnotatedEdge {
            id,
            from,
            to,
            weight,
            capability,
            clearance,
            kind,
        }));
        self.adjacency[from.0].push(id);
        self.adjacency[to.0].push(id);
        self.num_edges += 1;
        id
    }

    pub fn edge(&self, id: EdgeId) -> Option<&AnnotatedEdge> {
        self.edges.get(id.0).and_then(|e| e.as_ref())
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<AnnotatedEdge> {
        let edge = self.edges.get_mut(id.0)?.take()?;
        self.adjacency[edge.from.0].retain(|e| *e != id);
        self.adjacency[edge.to.0].retain(|e| *e != id);
        self.num_edges -= 1;
        Some(edge)
    }

    /// Removes a node together with any edges still incident to it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<AbstractNode> {
        self.nodes.get(id.0)?.as_ref()?;
        while let Some(&eid) = self.adjacency[id.0].first() {
            self.remove_edge(eid);
        }
        let node = self.nodes[id.0].take();
        self.num_nodes -= 1;
        node
    }

    /// Edge ids incident to `n`, in insertion order.
    pub fn incident(&self, n: NodeId) -> &[EdgeId] {
        &self.adjacency[n.0]
    }

    pub fn neighbours(&self, n: NodeId) -> impl Iterator<Item = (&AnnotatedEdge, NodeId)> + '_ {
        self.adjacency[n.0].iter().filter_map(move |eid| {
            let e = self.edge(*eid)?;
            Some((e, e.other(n)))
        })
    }

    /// The cheapest edge between `a` and `b` admitting `(cap, clearance)`
    /// with weight at most `max_weight`.
    pub fn find_annotated_edge(
        &self,
        a: NodeId,
        b: NodeId,
        cap: Capability,
        clearance: u16,
        max_weight: f64,
    ) -> Option<&AnnotatedEdge> {
        self.adjacency
            .get(a.0)?
            .iter()
            .filter_map(|eid| self.edge(*eid))
            .filter(|e| e.connects(a, b) && e.admits(cap, clearance) && e.weight <= max_weight)
            .min_by(|x, y| x.weight.total_cmp(&y.weight))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AbstractNode> + '_ {
        self.nodes.iter().filter_map(|n| n.as_ref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &AnnotatedEdge> + '_ {
        self.edges.iter().filter_map(|e| e.as_ref())
    }
}
