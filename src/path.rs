use crate::node::{NodeId, Slot};

/// A pointer slot on the way down the tree.
///
/// Edges name their host by id instead of holding the node, because the host
/// may be relocated while the edge is still on the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The tree's root pointer.
    Root,
    /// The `slot` child pointer of `host`.
    Child { host: NodeId, slot: Slot },
}

impl Edge {
    pub fn child(host: NodeId, slot: Slot) -> Self {
        Edge::Child { host, slot }
    }

    pub fn host(&self) -> Option<NodeId> {
        match self {
            Edge::Root => None,
            Edge::Child { host, .. } => Some(*host),
        }
    }
}

/// The edges from the root pointer down to the node being visited.
///
/// The last edge is always the incoming pointer of the current node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    edges: Vec<Edge>,
}

impl Default for TreePath {
    fn default() -> Self {
        Self::new()
    }
}

impl TreePath {
    pub fn new() -> Self {
        Self {
            edges: vec![Edge::Root],
        }
    }

    pub fn push(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Removes the last edge. The root edge is never popped.
    pub fn pop(&mut self) -> Option<Edge> {
        if self.edges.len() > 1 {
            self.edges.pop()
        } else {
            None
        }
    }

    pub fn last(&self) -> Edge {
        self.edges.last().copied().unwrap_or(Edge::Root)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Depth of the node the last edge points at; the root sits at depth 0.
    pub fn depth(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<Edge> {
        self.edges.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().copied()
    }

    /// Moves the edge hosted by `old` onto `new` after a relocation.
    pub fn rehost(&mut self, old: NodeId, new: NodeId) {
        for edge in self.edges.iter_mut().rev() {
            match edge {
                Edge::Child { host, .. } if *host == old => {
                    *host = new;
                    return;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_edge_is_permanent() {
        let mut path = TreePath::new();

        assert_eq!(path.last(), Edge::Root);
        assert_eq!(path.depth(), 0);
        assert_eq!(path.pop(), None);
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_push_pop_track_depth() {
        let mut path = TreePath::new();
        path.push(Edge::child(NodeId::new(1), Slot::Left));
        path.push(Edge::child(NodeId::new(2), Slot::Right));

        assert_eq!(path.depth(), 2);
        assert_eq!(path.last(), Edge::child(NodeId::new(2), Slot::Right));
        assert_eq!(path.pop(), Some(Edge::child(NodeId::new(2), Slot::Right)));
        assert_eq!(path.depth(), 1);
    }

    #[test]
    fn test_rehost_moves_only_the_matching_edge() {
        let mut path = TreePath::new();
        path.push(Edge::child(NodeId::new(1), Slot::Left));
        path.push(Edge::child(NodeId::new(2), Slot::Right));

        path.rehost(NodeId::new(2), NodeId::new(9));
        path.rehost(NodeId::new(5), NodeId::new(6));

        let edges: Vec<_> = path.iter().collect();
        assert_eq!(
            edges,
            vec![
                Edge::Root,
                Edge::child(NodeId::new(1), Slot::Left),
                Edge::child(NodeId::new(9), Slot::Right),
            ]
        );
    }
}
