//! Board geometry: tiles, buildings, roads and ships, ports, robber and
//! pirate.
//!
//! Tiles live in an arena (`Vec<Tile>`) and are referred to by small positive
//! `TileId` handles; the wire protocol sign-encodes a robber move as `id` and
//! a pirate move as `-id`. Nodes and edges are keyed by their canonical
//! coordinates.
//!
//! The board never checks placement legality when mutated: the server is the
//! authority, and the mirror applies whatever it is told. Legality questions
//! belong to the oracle module.

use crate::hex::{EdgeCoord, HexCoord, NodeCoord};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Seat number at the table (0-based). Up to 6 in a six-player game.
pub type Seat = u8;

/// Sentinel seat used when cancelling our own refused placements, so tracker
/// bookkeeping runs the same code paths as a real opponent placement.
pub const DUMMY_CANCEL_SEAT: Seat = u8::MAX;

/// 1-based handle into the board's tile arena. Negated on the wire to mean
/// "the pirate", not the robber.
pub type TileId = i32;

/// The five tradeable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Clay,
    Ore,
    Sheep,
    Wheat,
    Wood,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Clay,
        Resource::Ore,
        Resource::Sheep,
        Resource::Wheat,
        Resource::Wood,
    ];

    /// Stable index into per-resource arrays.
    pub fn index(self) -> usize {
        match self {
            Resource::Clay => 0,
            Resource::Ore => 1,
            Resource::Sheep => 2,
            Resource::Wheat => 3,
            Resource::Wood => 4,
        }
    }
}

/// What a tile produces, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Resource(Resource),
    Desert,
    /// Gold field: the owner of an adjacent building picks any resources.
    Gold,
    Water,
}

/// A 3:1 or 2:1 trade port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Port {
    /// 3:1, any resource
    Misc,
    /// 2:1 for the named resource
    Resource(Resource),
}

/// One tile of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub coord: HexCoord,
    pub kind: TileKind,
    /// Dice number that triggers production; None for desert and water.
    pub dice_number: Option<u8>,
}

impl Tile {
    pub fn resource(&self) -> Option<Resource> {
        match self.kind {
            TileKind::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_land(&self) -> bool {
        !matches!(self.kind, TileKind::Water)
    }
}

/// What occupies a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePiece {
    Settlement(Seat),
    City(Seat),
}

impl NodePiece {
    pub fn owner(&self) -> Seat {
        match self {
            NodePiece::Settlement(s) | NodePiece::City(s) => *s,
        }
    }
}

/// What occupies an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgePiece {
    Road(Seat),
    Ship(Seat),
}

impl EdgePiece {
    pub fn owner(&self) -> Seat {
        match self {
            EdgePiece::Road(s) | EdgePiece::Ship(s) => *s,
        }
    }
}

/// A port on a coastal edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPlacement {
    pub edge: EdgeCoord,
    pub port: Port,
}

/// The board: tile arena, placed pieces, ports, robber and pirate.
///
/// Serialized through [`BoardRepr`]: JSON cannot key maps by coordinate
/// structs, so placements travel as lists and the coordinate indexes are
/// rebuilt on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoardRepr", into = "BoardRepr")]
pub struct Board {
    tiles: Vec<Tile>,
    tile_index: HashMap<HexCoord, TileId>,
    nodes: HashMap<NodeCoord, NodePiece>,
    edges: HashMap<EdgeCoord, EdgePiece>,
    ports: Vec<PortPlacement>,
    robber: TileId,
    pirate: Option<TileId>,
    /// Pirate fortress node, in the pirate-islands scenario.
    fortress: Option<NodeCoord>,
}

/// Wire shape of a board: arrays instead of coordinate-keyed maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRepr {
    tiles: Vec<Tile>,
    nodes: Vec<(NodeCoord, NodePiece)>,
    edges: Vec<(EdgeCoord, EdgePiece)>,
    ports: Vec<PortPlacement>,
    robber: TileId,
    pirate: Option<TileId>,
    fortress: Option<NodeCoord>,
}

impl From<Board> for BoardRepr {
    fn from(board: Board) -> Self {
        Self {
            nodes: board.nodes.into_iter().collect(),
            edges: board.edges.into_iter().collect(),
            tiles: board.tiles,
            ports: board.ports,
            robber: board.robber,
            pirate: board.pirate,
            fortress: board.fortress,
        }
    }
}

impl From<BoardRepr> for Board {
    fn from(repr: BoardRepr) -> Self {
        let tile_index = repr
            .tiles
            .iter()
            .enumerate()
            .map(|(i, t)| (t.coord, i as TileId + 1))
            .collect();
        Self {
            tile_index,
            tiles: repr.tiles,
            nodes: repr.nodes.into_iter().collect(),
            edges: repr.edges.into_iter().collect(),
            ports: repr.ports,
            robber: repr.robber,
            pirate: repr.pirate,
            fortress: repr.fortress,
        }
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            tile_index: HashMap::new(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            ports: Vec::new(),
            robber: 0,
            pirate: None,
            fortress: None,
        }
    }

    /// Standard 19-hex board with randomized tiles, numbers and ports.
    pub fn standard() -> Self {
        let mut rng = rand::thread_rng();
        Self::standard_with_rng(&mut rng)
    }

    /// Standard board from a caller-provided RNG, for deterministic replays
    /// and tests.
    pub fn standard_with_rng<R: Rng>(rng: &mut R) -> Self {
        let mut board = Self::new();

        // 19 land hexes: center, ring of 6, ring of 12
        let land_coords: Vec<HexCoord> = vec![
            HexCoord::new(0, 0),
            HexCoord::new(1, 0),
            HexCoord::new(1, -1),
            HexCoord::new(0, -1),
            HexCoord::new(-1, 0),
            HexCoord::new(-1, 1),
            HexCoord::new(0, 1),
            HexCoord::new(2, 0),
            HexCoord::new(2, -1),
            HexCoord::new(2, -2),
            HexCoord::new(1, -2),
            HexCoord::new(0, -2),
            HexCoord::new(-1, -1),
            HexCoord::new(-2, 0),
            HexCoord::new(-2, 1),
            HexCoord::new(-2, 2),
            HexCoord::new(-1, 2),
            HexCoord::new(0, 2),
            HexCoord::new(1, 1),
        ];

        // 4 wood, 4 wheat, 4 sheep, 3 ore, 3 clay, 1 desert
        let mut kinds: Vec<Option<Resource>> = vec![
            Some(Resource::Wood),
            Some(Resource::Wood),
            Some(Resource::Wood),
            Some(Resource::Wood),
            Some(Resource::Wheat),
            Some(Resource::Wheat),
            Some(Resource::Wheat),
            Some(Resource::Wheat),
            Some(Resource::Sheep),
            Some(Resource::Sheep),
            Some(Resource::Sheep),
            Some(Resource::Sheep),
            Some(Resource::Ore),
            Some(Resource::Ore),
            Some(Resource::Ore),
            Some(Resource::Clay),
            Some(Resource::Clay),
            Some(Resource::Clay),
            None,
        ];
        kinds.shuffle(rng);

        let numbers: Vec<u8> = vec![2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];
        let resource_positions: Vec<usize> = kinds
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.map(|_| i))
            .collect();
        let assignment =
            assign_numbers_avoiding_adjacent_68(&land_coords, &resource_positions, &numbers, rng);

        let mut desert_id = 0;
        for (i, coord) in land_coords.iter().enumerate() {
            match kinds[i] {
                Some(resource) => {
                    let slot = resource_positions.iter().position(|&p| p == i).unwrap();
                    board.push_tile(Tile {
                        coord: *coord,
                        kind: TileKind::Resource(resource),
                        dice_number: Some(assignment[slot]),
                    });
                }
                None => {
                    desert_id = board.push_tile(Tile {
                        coord: *coord,
                        kind: TileKind::Desert,
                        dice_number: None,
                    });
                }
            }
        }
        board.robber = desert_id;

        // Water ring around the land
        let mut water: Vec<HexCoord> = Vec::new();
        for coord in &land_coords {
            for neighbor in coord.neighbors() {
                if !board.tile_index.contains_key(&neighbor) && !water.contains(&neighbor) {
                    water.push(neighbor);
                }
            }
        }
        for coord in water {
            board.push_tile(Tile {
                coord,
                kind: TileKind::Water,
                dice_number: None,
            });
        }

        board.add_standard_ports(rng);
        board
    }

    fn push_tile(&mut self, tile: Tile) -> TileId {
        let id = self.tiles.len() as TileId + 1;
        self.tile_index.insert(tile.coord, id);
        self.tiles.push(tile);
        id
    }

    /// 4 misc ports and one 2:1 port per resource, on spread-out coastal
    /// edges that never share a node.
    fn add_standard_ports<R: Rng>(&mut self, rng: &mut R) {
        let mut port_kinds = vec![
            Port::Misc,
            Port::Misc,
            Port::Misc,
            Port::Misc,
            Port::Resource(Resource::Clay),
            Port::Resource(Resource::Ore),
            Port::Resource(Resource::Sheep),
            Port::Resource(Resource::Wheat),
            Port::Resource(Resource::Wood),
        ];
        port_kinds.shuffle(rng);

        let mut coastal = self.coastal_edges();
        coastal.shuffle(rng);

        let mut taken_nodes: HashSet<NodeCoord> = HashSet::new();
        for port in port_kinds {
            let Some(pos) = coastal
                .iter()
                .position(|e| e.endpoints().iter().all(|n| !taken_nodes.contains(n)))
            else {
                break;
            };
            let edge = coastal.remove(pos);
            for n in edge.endpoints() {
                taken_nodes.insert(n);
            }
            self.ports.push(PortPlacement { edge, port });
        }
    }

    // ==================== Tile queries ====================

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        if id < 1 {
            return None;
        }
        self.tiles.get(id as usize - 1)
    }

    pub fn tile_id(&self, coord: &HexCoord) -> Option<TileId> {
        self.tile_index.get(coord).copied()
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.tiles.iter().enumerate().map(|(i, t)| (i as TileId + 1, t))
    }

    pub fn land_tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.tiles().filter(|(_, t)| t.is_land())
    }

    pub fn robber_tile(&self) -> TileId {
        self.robber
    }

    pub fn pirate_tile(&self) -> Option<TileId> {
        self.pirate
    }

    pub fn fortress_node(&self) -> Option<NodeCoord> {
        self.fortress
    }

    pub fn set_fortress_node(&mut self, node: Option<NodeCoord>) {
        self.fortress = node;
    }

    pub fn ports(&self) -> &[PortPlacement] {
        &self.ports
    }

    // ==================== Piece queries ====================

    pub fn node_piece(&self, node: &NodeCoord) -> Option<NodePiece> {
        self.nodes.get(node).copied()
    }

    pub fn edge_piece(&self, edge: &EdgeCoord) -> Option<EdgePiece> {
        self.edges.get(edge).copied()
    }

    pub fn node_pieces(&self) -> impl Iterator<Item = (&NodeCoord, &NodePiece)> {
        self.nodes.iter()
    }

    pub fn edge_pieces(&self) -> impl Iterator<Item = (&EdgeCoord, &EdgePiece)> {
        self.edges.iter()
    }

    /// All nodes adjacent to at least one land tile.
    pub fn land_nodes(&self) -> HashSet<NodeCoord> {
        let mut nodes = HashSet::new();
        for (_, tile) in self.land_tiles() {
            for node in tile.coord.nodes() {
                nodes.insert(node);
            }
        }
        nodes
    }

    /// All edges of land tiles.
    pub fn land_edges(&self) -> HashSet<EdgeCoord> {
        let mut edges = HashSet::new();
        for (_, tile) in self.land_tiles() {
            for edge in tile.coord.edges() {
                edges.insert(edge);
            }
        }
        edges
    }

    /// Edges bordering both land and water.
    pub fn coastal_edges(&self) -> Vec<EdgeCoord> {
        let mut coastal = Vec::new();
        for (_, tile) in self.land_tiles() {
            for edge in tile.coord.edges() {
                let touching = edge.touching_hexes();
                let has_land = touching
                    .iter()
                    .any(|h| self.tile_at(h).is_some_and(Tile::is_land));
                let has_water = touching.iter().any(|h| match self.tile_at(h) {
                    Some(t) => !t.is_land(),
                    None => true,
                });
                if has_land && has_water && !coastal.contains(&edge) {
                    coastal.push(edge);
                }
            }
        }
        coastal
    }

    fn tile_at(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tile_id(coord).and_then(|id| self.tile(id))
    }

    /// Land tiles adjacent to a node, for production and placement value.
    pub fn tiles_at_node(&self, node: &NodeCoord) -> Vec<&Tile> {
        node.touching_hexes()
            .iter()
            .filter_map(|h| self.tile_at(h))
            .filter(|t| t.is_land())
            .collect()
    }

    pub fn is_land_node(&self, node: &NodeCoord) -> bool {
        node.touching_hexes()
            .iter()
            .any(|h| self.tile_at(h).is_some_and(Tile::is_land))
    }

    pub fn is_land_edge(&self, edge: &EdgeCoord) -> bool {
        edge.touching_hexes()
            .iter()
            .any(|h| self.tile_at(h).is_some_and(Tile::is_land))
    }

    /// An edge a ship may occupy: touching water on at least one side.
    pub fn is_sea_edge(&self, edge: &EdgeCoord) -> bool {
        edge.touching_hexes().iter().any(|h| match self.tile_at(h) {
            Some(t) => !t.is_land(),
            None => false,
        })
    }

    /// No settlement or city on this node or any adjacent node.
    pub fn satisfies_distance_rule(&self, node: &NodeCoord) -> bool {
        if self.nodes.contains_key(node) {
            return false;
        }
        node.adjacent_nodes()
            .iter()
            .all(|adj| !self.nodes.contains_key(adj))
    }

    /// Is this node reachable from the seat's road or ship network?
    pub fn is_connected_to_route(&self, node: &NodeCoord, seat: Seat) -> bool {
        node.touching_edges()
            .iter()
            .any(|e| self.edge_piece(e).is_some_and(|p| p.owner() == seat))
    }

    /// Does this empty edge connect to the seat's network (a building at an
    /// endpoint, or a road/ship through an endpoint not blocked by an enemy
    /// building)?
    pub fn edge_connects_to_network(&self, edge: &EdgeCoord, seat: Seat) -> bool {
        for endpoint in edge.endpoints() {
            match self.node_piece(&endpoint) {
                Some(p) if p.owner() == seat => return true,
                Some(_) => continue, // enemy building blocks through-traffic
                None => {
                    for adj in endpoint.touching_edges() {
                        if adj != *edge && self.edge_piece(&adj).is_some_and(|p| p.owner() == seat)
                        {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Ports reachable through the seat's buildings.
    pub fn ports_for(&self, seat: Seat) -> Vec<Port> {
        let mut result = Vec::new();
        for placement in &self.ports {
            for endpoint in placement.edge.endpoints() {
                if self.node_piece(&endpoint).is_some_and(|p| p.owner() == seat) {
                    result.push(placement.port);
                    break;
                }
            }
        }
        result
    }

    /// Seats with a building on a corner of the given tile.
    pub fn seats_adjacent_to_tile(&self, id: TileId) -> HashSet<Seat> {
        let mut seats = HashSet::new();
        if let Some(tile) = self.tile(id) {
            for node in tile.coord.nodes() {
                if let Some(piece) = self.node_piece(&node) {
                    seats.insert(piece.owner());
                }
            }
        }
        seats
    }

    // ==================== Mutation ====================

    pub fn place_settlement(&mut self, node: NodeCoord, seat: Seat) {
        self.nodes.insert(node, NodePiece::Settlement(seat));
    }

    pub fn upgrade_to_city(&mut self, node: NodeCoord, seat: Seat) {
        self.nodes.insert(node, NodePiece::City(seat));
    }

    pub fn place_road(&mut self, edge: EdgeCoord, seat: Seat) {
        self.edges.insert(edge, EdgePiece::Road(seat));
    }

    pub fn place_ship(&mut self, edge: EdgeCoord, seat: Seat) {
        self.edges.insert(edge, EdgePiece::Ship(seat));
    }

    pub fn remove_node_piece(&mut self, node: &NodeCoord) -> Option<NodePiece> {
        self.nodes.remove(node)
    }

    pub fn remove_edge_piece(&mut self, edge: &EdgeCoord) -> Option<EdgePiece> {
        self.edges.remove(edge)
    }

    /// Revert a city back to the settlement it upgraded.
    pub fn downgrade_city(&mut self, node: NodeCoord, seat: Seat) {
        self.nodes.insert(node, NodePiece::Settlement(seat));
    }

    pub fn move_ship(&mut self, from: &EdgeCoord, to: EdgeCoord) {
        if let Some(piece @ EdgePiece::Ship(_)) = self.edges.remove(from) {
            self.edges.insert(to, piece);
        }
    }

    pub fn move_robber(&mut self, to: TileId) {
        self.robber = to;
    }

    pub fn move_pirate(&mut self, to: TileId) {
        self.pirate = Some(to);
    }
}

/// Shuffle dice numbers until no 6 or 8 lands adjacent to another 6 or 8.
fn assign_numbers_avoiding_adjacent_68<R: Rng>(
    land_coords: &[HexCoord],
    resource_positions: &[usize],
    numbers: &[u8],
    rng: &mut R,
) -> Vec<u8> {
    const MAX_ATTEMPTS: usize = 100;

    let valid = |assignment: &[u8]| {
        let mut by_coord: HashMap<HexCoord, u8> = HashMap::new();
        for (slot, &pos) in resource_positions.iter().enumerate() {
            by_coord.insert(land_coords[pos], assignment[slot]);
        }
        for (coord, &n) in &by_coord {
            if n == 6 || n == 8 {
                for neighbor in coord.neighbors() {
                    if let Some(&m) = by_coord.get(&neighbor) {
                        if m == 6 || m == 8 {
                            return false;
                        }
                    }
                }
            }
        }
        true
    };

    let mut shuffled = numbers.to_vec();
    for _ in 0..MAX_ATTEMPTS {
        shuffled.shuffle(rng);
        if valid(&shuffled) {
            return shuffled;
        }
    }
    // Rare; accept the last shuffle rather than loop forever
    shuffled
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn board() -> Board {
        let mut rng = StdRng::seed_from_u64(7);
        Board::standard_with_rng(&mut rng)
    }

    #[test]
    fn standard_board_has_19_land_tiles() {
        assert_eq!(board().land_tiles().count(), 19);
    }

    #[test]
    fn standard_board_has_one_desert_with_robber() {
        let b = board();
        let deserts: Vec<TileId> = b
            .land_tiles()
            .filter(|(_, t)| t.kind == TileKind::Desert)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(deserts.len(), 1);
        assert_eq!(b.robber_tile(), deserts[0]);
        assert!(b.pirate_tile().is_none());
    }

    #[test]
    fn standard_board_has_nine_ports_on_distinct_nodes() {
        let b = board();
        assert_eq!(b.ports().len(), 9);
        let mut nodes = HashSet::new();
        for p in b.ports() {
            for n in p.edge.endpoints() {
                assert!(nodes.insert(n), "port nodes overlap");
            }
        }
    }

    #[test]
    fn tile_ids_round_trip() {
        let b = board();
        for (id, tile) in b.tiles() {
            assert_eq!(b.tile_id(&tile.coord), Some(id));
            assert_eq!(b.tile(id).unwrap().coord, tile.coord);
        }
        assert!(b.tile(0).is_none());
        assert!(b.tile(-3).is_none());
    }

    #[test]
    fn distance_rule_blocks_adjacent_nodes() {
        let mut b = board();
        let node = *b.land_nodes().iter().next().unwrap();
        assert!(b.satisfies_distance_rule(&node));

        b.place_settlement(node, 1);
        assert!(!b.satisfies_distance_rule(&node));
        for adj in node.adjacent_nodes() {
            assert!(!b.satisfies_distance_rule(&adj));
        }
    }

    #[test]
    fn edge_network_connectivity() {
        let mut b = board();
        let node = *b.land_nodes().iter().next().unwrap();
        b.place_settlement(node, 2);

        let edge = node.touching_edges()[0];
        assert!(b.edge_connects_to_network(&edge, 2));
        assert!(!b.edge_connects_to_network(&edge, 3));

        // Extending past our own road also connects
        b.place_road(edge, 2);
        let [a, other] = edge.endpoints();
        let far = if a == node { other } else { a };
        for next in far.touching_edges() {
            if next != edge {
                assert!(b.edge_connects_to_network(&next, 2));
            }
        }
    }

    #[test]
    fn enemy_building_blocks_through_traffic() {
        let mut b = board();
        let node = *b.land_nodes().iter().next().unwrap();
        let edge = node.touching_edges()[0];
        b.place_road(edge, 2);
        b.place_settlement(node, 3);

        // Seat 2 may not build through seat 3's settlement
        for next in node.touching_edges() {
            if next != edge {
                assert!(!b.edge_connects_to_network(&next, 2));
            }
        }
    }

    #[test]
    fn ports_for_seat() {
        let mut b = board();
        assert!(b.ports_for(0).is_empty());
        let placement = b.ports()[0].clone();
        b.place_settlement(placement.edge.endpoints()[0], 0);
        assert_eq!(b.ports_for(0), vec![placement.port]);
    }

    #[test]
    fn board_json_round_trip() {
        let mut b = board();
        let node = *b.land_nodes().iter().next().unwrap();
        b.place_settlement(node, 1);
        b.place_road(node.touching_edges()[0], 1);

        let text = serde_json::to_string(&b).unwrap();
        let back: Board = serde_json::from_str(&text).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn move_ship_keeps_owner() {
        let mut b = board();
        let coastal = b.coastal_edges();
        b.place_ship(coastal[0], 1);
        b.move_ship(&coastal[0], coastal[1]);
        assert_eq!(b.edge_piece(&coastal[0]), None);
        assert_eq!(b.edge_piece(&coastal[1]), Some(EdgePiece::Ship(1)));
    }
}
