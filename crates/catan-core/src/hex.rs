//! Hex coordinate system using axial coordinates (q, r).
//!
//! The board is a pointy-top hex grid. Three coordinate types cover it:
//! - `HexCoord`: a tile
//! - `NodeCoord`: a corner where up to three tiles meet (settlements, cities)
//! - `EdgeCoord`: a side shared by two tiles (roads, ships)
//!
//! Nodes are named by the one hex whose North or South point they are, which
//! makes the representation unique without a canonicalization pass. Edges have
//! two equivalent descriptions and are canonicalized to the lexicographically
//! smaller hex.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which pointy vertex of a hex a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeDirection {
    North,
    South,
}

/// Direction of an edge relative to a hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeDirection {
    NorthEast,
    East,
    SouthEast,
    SouthWest,
    West,
    NorthWest,
}

impl EdgeDirection {
    /// All edge directions in clockwise order starting from NorthEast.
    pub const ALL: [EdgeDirection; 6] = [
        EdgeDirection::NorthEast,
        EdgeDirection::East,
        EdgeDirection::SouthEast,
        EdgeDirection::SouthWest,
        EdgeDirection::West,
        EdgeDirection::NorthWest,
    ];
}

/// Axial hex coordinate. `q` grows east, `r` grows southeast; the implicit
/// third coordinate satisfies q + r + s = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    /// The six neighboring hexes.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        EdgeDirection::ALL.map(|d| self.neighbor(d))
    }

    /// The neighbor across the given edge.
    pub fn neighbor(&self, direction: EdgeDirection) -> HexCoord {
        match direction {
            EdgeDirection::East => HexCoord::new(self.q + 1, self.r),
            EdgeDirection::NorthEast => HexCoord::new(self.q + 1, self.r - 1),
            EdgeDirection::NorthWest => HexCoord::new(self.q, self.r - 1),
            EdgeDirection::West => HexCoord::new(self.q - 1, self.r),
            EdgeDirection::SouthWest => HexCoord::new(self.q - 1, self.r + 1),
            EdgeDirection::SouthEast => HexCoord::new(self.q, self.r + 1),
        }
    }

    /// Distance in hex steps.
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// All six corner nodes of this hex, clockwise from the North point.
    pub fn nodes(&self) -> [NodeCoord; 6] {
        [
            NodeCoord::new(*self, NodeDirection::North),
            NodeCoord::new(self.neighbor(EdgeDirection::NorthEast), NodeDirection::South),
            NodeCoord::new(self.neighbor(EdgeDirection::SouthEast), NodeDirection::North),
            NodeCoord::new(*self, NodeDirection::South),
            NodeCoord::new(self.neighbor(EdgeDirection::SouthWest), NodeDirection::North),
            NodeCoord::new(self.neighbor(EdgeDirection::NorthWest), NodeDirection::South),
        ]
    }

    /// All six edges of this hex.
    pub fn edges(&self) -> [EdgeCoord; 6] {
        EdgeDirection::ALL.map(|dir| EdgeCoord::new(*self, dir))
    }
}

/// Node coordinate: a corner where up to three hexes meet.
///
/// Every node of the grid is the North point of exactly one hex or the South
/// point of exactly one hex, so `(hex, direction)` is already canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeCoord {
    pub hex: HexCoord,
    pub direction: NodeDirection,
}

impl NodeCoord {
    pub const fn new(hex: HexCoord, direction: NodeDirection) -> Self {
        Self { hex, direction }
    }

    /// The three hexes that touch this node.
    pub fn touching_hexes(&self) -> [HexCoord; 3] {
        match self.direction {
            NodeDirection::North => [
                self.hex,
                self.hex.neighbor(EdgeDirection::NorthWest),
                self.hex.neighbor(EdgeDirection::NorthEast),
            ],
            NodeDirection::South => [
                self.hex,
                self.hex.neighbor(EdgeDirection::SouthWest),
                self.hex.neighbor(EdgeDirection::SouthEast),
            ],
        }
    }

    /// The three edges that meet at this node.
    pub fn touching_edges(&self) -> [EdgeCoord; 3] {
        match self.direction {
            NodeDirection::North => [
                EdgeCoord::new(self.hex, EdgeDirection::NorthWest),
                EdgeCoord::new(self.hex, EdgeDirection::NorthEast),
                EdgeCoord::new(self.hex.neighbor(EdgeDirection::NorthWest), EdgeDirection::East),
            ],
            NodeDirection::South => [
                EdgeCoord::new(self.hex, EdgeDirection::SouthWest),
                EdgeCoord::new(self.hex, EdgeDirection::SouthEast),
                EdgeCoord::new(self.hex.neighbor(EdgeDirection::SouthWest), EdgeDirection::East),
            ],
        }
    }

    /// The three nodes one edge away, for the distance rule.
    pub fn adjacent_nodes(&self) -> [NodeCoord; 3] {
        self.touching_edges().map(|edge| {
            let [a, b] = edge.endpoints();
            if a == *self {
                b
            } else {
                a
            }
        })
    }
}

/// Edge coordinate: a side of a hex. Shared by two hexes; canonicalized to
/// the description from the lexicographically smaller hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeCoord {
    pub hex: HexCoord,
    pub direction: EdgeDirection,
}

impl EdgeCoord {
    pub fn new(hex: HexCoord, direction: EdgeDirection) -> Self {
        Self { hex, direction }.canonical()
    }

    fn new_raw(hex: HexCoord, direction: EdgeDirection) -> Self {
        Self { hex, direction }
    }

    fn canonical(self) -> Self {
        let (other_hex, other_dir) = self.other_representation();
        if (self.hex.q, self.hex.r) <= (other_hex.q, other_hex.r) {
            self
        } else {
            Self::new_raw(other_hex, other_dir)
        }
    }

    fn other_representation(&self) -> (HexCoord, EdgeDirection) {
        let neighbor = self.hex.neighbor(self.direction);
        let opposite = match self.direction {
            EdgeDirection::NorthEast => EdgeDirection::SouthWest,
            EdgeDirection::East => EdgeDirection::West,
            EdgeDirection::SouthEast => EdgeDirection::NorthWest,
            EdgeDirection::SouthWest => EdgeDirection::NorthEast,
            EdgeDirection::West => EdgeDirection::East,
            EdgeDirection::NorthWest => EdgeDirection::SouthEast,
        };
        (neighbor, opposite)
    }

    /// The two hexes that share this edge.
    pub fn touching_hexes(&self) -> [HexCoord; 2] {
        [self.hex, self.hex.neighbor(self.direction)]
    }

    /// The two nodes at the ends of this edge.
    pub fn endpoints(&self) -> [NodeCoord; 2] {
        match self.direction {
            EdgeDirection::NorthEast => [
                NodeCoord::new(self.hex, NodeDirection::North),
                NodeCoord::new(self.hex.neighbor(EdgeDirection::NorthEast), NodeDirection::South),
            ],
            EdgeDirection::East => [
                NodeCoord::new(self.hex.neighbor(EdgeDirection::NorthEast), NodeDirection::South),
                NodeCoord::new(self.hex.neighbor(EdgeDirection::SouthEast), NodeDirection::North),
            ],
            EdgeDirection::SouthEast => [
                NodeCoord::new(self.hex.neighbor(EdgeDirection::SouthEast), NodeDirection::North),
                NodeCoord::new(self.hex, NodeDirection::South),
            ],
            EdgeDirection::SouthWest => [
                NodeCoord::new(self.hex, NodeDirection::South),
                NodeCoord::new(self.hex.neighbor(EdgeDirection::SouthWest), NodeDirection::North),
            ],
            EdgeDirection::West => [
                NodeCoord::new(self.hex.neighbor(EdgeDirection::SouthWest), NodeDirection::North),
                NodeCoord::new(self.hex.neighbor(EdgeDirection::NorthWest), NodeDirection::South),
            ],
            EdgeDirection::NorthWest => [
                NodeCoord::new(self.hex.neighbor(EdgeDirection::NorthWest), NodeDirection::South),
                NodeCoord::new(self.hex, NodeDirection::North),
            ],
        }
    }

    /// Edges that share a node with this one, for road connectivity.
    pub fn adjacent_edges(&self) -> Vec<EdgeCoord> {
        let mut adjacent = HashSet::new();
        for node in self.endpoints() {
            for edge in node.touching_edges() {
                if edge != *self {
                    adjacent.insert(edge);
                }
            }
        }
        adjacent.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_neighbors_are_distinct_and_adjacent() {
        let center = HexCoord::new(0, 0);
        let neighbors = center.neighbors();

        let unique: HashSet<_> = neighbors.iter().collect();
        assert_eq!(unique.len(), 6);

        for neighbor in &neighbors {
            assert_eq!(center.distance_to(neighbor), 1);
        }
    }

    #[test]
    fn hex_distance() {
        let a = HexCoord::new(0, 0);
        assert_eq!(a.distance_to(&HexCoord::new(2, -1)), 2);
        assert_eq!(a.distance_to(&HexCoord::new(-3, 3)), 3);
    }

    #[test]
    fn hex_nodes_are_unique() {
        let nodes = HexCoord::new(0, 0).nodes();
        let unique: HashSet<_> = nodes.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn hex_edges_are_unique() {
        let edges = HexCoord::new(0, 0).edges();
        let unique: HashSet<_> = edges.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn edge_canonical_equality() {
        // Same edge described from the two hexes that share it
        let e1 = EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::East);
        let e2 = EdgeCoord::new(HexCoord::new(1, 0), EdgeDirection::West);
        assert_eq!(e1, e2);
    }

    #[test]
    fn edge_endpoints_are_distinct() {
        let e = EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::NorthEast);
        let [a, b] = e.endpoints();
        assert_ne!(a, b);
    }

    #[test]
    fn edge_has_four_adjacent_edges() {
        let e = EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::East);
        let adjacent = e.adjacent_edges();
        assert_eq!(adjacent.len(), 4);
        assert!(!adjacent.contains(&e));
    }

    #[test]
    fn node_touching_edges_have_node_as_endpoint() {
        let n = NodeCoord::new(HexCoord::new(0, 0), NodeDirection::North);
        for edge in n.touching_edges() {
            assert!(edge.endpoints().contains(&n));
        }
    }

    #[test]
    fn adjacent_nodes_are_distinct_from_origin() {
        let n = NodeCoord::new(HexCoord::new(0, 0), NodeDirection::North);
        for adj in n.adjacent_nodes() {
            assert_ne!(adj, n);
        }
    }

    #[test]
    fn shared_node_between_neighbor_hexes() {
        // The NE neighbor's South node is a corner of the origin hex too
        let origin = HexCoord::new(0, 0);
        let ne = origin.neighbor(EdgeDirection::NorthEast);
        let shared = NodeCoord::new(ne, NodeDirection::South);
        assert!(origin.nodes().contains(&shared));
        assert!(shared.touching_hexes().contains(&origin));
    }
}
