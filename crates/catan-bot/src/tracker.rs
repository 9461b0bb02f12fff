//! Per-seat player trackers: the possible-piece lattices and the walk that
//! keeps them coherent with the board.
//!
//! On every placement the whole set of trackers is walked in three passes:
//! reconcile each lattice with the world event, clear threat lists, then
//! recompute threats and finally ETAs. The ordering matters: threat
//! recomputation must observe the newly added or removed state.
//!
//! Our own refused placements run the same cancel path with the dummy-cancel
//! seat, so the bookkeeping stays symmetric with real opponent placements.

use crate::possible::{PieceId, PossiblePiece, PossibleTag};
use crate::speed::BuildSpeed;
use catan_core::messages::{PieceCoord, PieceKind};
use catan_core::{oracle, EdgeCoord, Game, NodeCoord, Seat};
use std::collections::{BTreeMap, HashMap};

/// One seat's lattice of candidate placements.
#[derive(Debug, Clone)]
pub struct PlayerTracker {
    pub seat: Seat,
    /// Roads and ships, keyed by edge.
    pub possible_roads: HashMap<EdgeCoord, PossiblePiece>,
    pub possible_settlements: HashMap<NodeCoord, PossiblePiece>,
    pub possible_cities: HashMap<NodeCoord, PossiblePiece>,
    /// Initial settlement waiting for its road before being tracked.
    pub pending_init_settlement: Option<NodeCoord>,
}

impl PlayerTracker {
    pub fn new(seat: Seat) -> Self {
        Self {
            seat,
            possible_roads: HashMap::new(),
            possible_settlements: HashMap::new(),
            possible_cities: HashMap::new(),
            pending_init_settlement: None,
        }
    }

    fn add_possible_road(&mut self, game: &Game, edge: EdgeCoord) {
        if self.possible_roads.contains_key(&edge) {
            return;
        }
        let road_ok = oracle::is_potential_road(game, self.seat, &edge);
        let ship_ok = oracle::is_potential_ship(game, self.seat, &edge);
        let piece = match (road_ok, ship_ok) {
            (true, true) => PossiblePiece::ship(self.seat, edge, true),
            (true, false) => PossiblePiece::road(self.seat, edge),
            (false, true) => PossiblePiece::ship(self.seat, edge, false),
            (false, false) => return,
        };
        self.possible_roads.insert(edge, piece);
    }

    fn add_possible_settlement(&mut self, game: &Game, node: NodeCoord) {
        if self.possible_settlements.contains_key(&node) {
            return;
        }
        if oracle::is_potential_settlement(game, self.seat, &node) {
            self.possible_settlements
                .insert(node, PossiblePiece::settlement(self.seat, node));
        }
    }

    /// Reconcile this lattice with a new settlement on the board.
    fn add_new_settlement(&mut self, game: &Game, placed_seat: Seat, node: NodeCoord) {
        if placed_seat == self.seat {
            self.possible_settlements.remove(&node);
            self.possible_cities
                .entry(node)
                .or_insert_with(|| PossiblePiece::city(self.seat, node));
            for edge in node.touching_edges() {
                self.add_possible_road(game, edge);
            }
        }
        self.prune(game);
    }

    fn cancel_wrong_settlement(&mut self, node: NodeCoord) {
        self.possible_settlements.remove(&node);
        self.possible_cities.remove(&node);
    }

    /// Reconcile with a new road or ship on the board.
    fn add_new_road_or_ship(&mut self, game: &Game, placed_seat: Seat, edge: EdgeCoord) {
        if placed_seat == self.seat {
            self.possible_roads.remove(&edge);
            for adjacent in edge.adjacent_edges() {
                self.add_possible_road(game, adjacent);
            }
            for node in edge.endpoints() {
                self.add_possible_settlement(game, node);
            }
        }
        self.prune(game);
    }

    fn cancel_wrong_road_or_ship(&mut self, edge: EdgeCoord) {
        self.possible_roads.remove(&edge);
    }

    /// Reconcile with a settlement upgraded to a city. Only the owner's
    /// lattice holds possible cities.
    fn add_our_new_city(&mut self, node: NodeCoord) {
        self.possible_cities.remove(&node);
    }

    fn cancel_wrong_city(&mut self, node: NodeCoord) {
        self.possible_cities.remove(&node);
    }

    /// Drop possibles the board no longer permits.
    fn prune(&mut self, game: &Game) {
        let seat = self.seat;
        self.possible_settlements
            .retain(|node, _| oracle::is_potential_settlement(game, seat, node));
        self.possible_roads.retain(|edge, piece| match piece.tag() {
            PossibleTag::Ship => {
                oracle::is_potential_ship(game, seat, edge)
                    || oracle::is_potential_road(game, seat, edge)
            }
            _ => oracle::is_potential_road(game, seat, edge),
        });
        self.possible_cities
            .retain(|node, _| oracle::is_potential_city(game, seat, node));
    }

    fn clear_all_threats(&mut self) {
        for piece in self.possible_roads.values_mut() {
            piece.clear_threats();
        }
        for piece in self.possible_settlements.values_mut() {
            piece.clear_threats();
        }
    }

    /// Every possible piece of this lattice, for planning.
    pub fn all_possibles(&self) -> impl Iterator<Item = &PossiblePiece> {
        self.possible_roads
            .values()
            .chain(self.possible_settlements.values())
            .chain(self.possible_cities.values())
    }
}

/// Read-only snapshot of every lattice, used while recomputing one seat's
/// threats against the others without aliasing the trackers themselves.
struct LatticeView {
    roads: HashMap<Seat, HashMap<EdgeCoord, (PieceId, u32)>>,
    settlements: HashMap<Seat, HashMap<NodeCoord, (PieceId, u32)>>,
}

impl LatticeView {
    fn of(trackers: &BTreeMap<Seat, PlayerTracker>) -> Self {
        let mut roads = HashMap::new();
        let mut settlements = HashMap::new();
        for (seat, tracker) in trackers {
            roads.insert(
                *seat,
                tracker
                    .possible_roads
                    .iter()
                    .map(|(e, p)| (*e, (p.id(), p.eta)))
                    .collect(),
            );
            settlements.insert(
                *seat,
                tracker
                    .possible_settlements
                    .iter()
                    .map(|(n, p)| (*n, (p.id(), p.eta)))
                    .collect(),
            );
        }
        Self { roads, settlements }
    }
}

/// All trackers for one game, walked together.
#[derive(Debug, Clone)]
pub struct TrackerSet {
    our_seat: Seat,
    trackers: BTreeMap<Seat, PlayerTracker>,
}

impl TrackerSet {
    /// One tracker per occupied seat, ours included. Seats that sit down
    /// later are added with [`TrackerSet::add_tracker`].
    pub fn new(game: &Game, our_seat: Seat) -> Self {
        let mut trackers = BTreeMap::new();
        for player in game.occupied_seats() {
            trackers.insert(player.seat, PlayerTracker::new(player.seat));
        }
        trackers
            .entry(our_seat)
            .or_insert_with(|| PlayerTracker::new(our_seat));
        Self { our_seat, trackers }
    }

    pub fn add_tracker(&mut self, seat: Seat) {
        self.trackers.entry(seat).or_insert_with(|| PlayerTracker::new(seat));
    }

    pub fn tracker(&self, seat: Seat) -> Option<&PlayerTracker> {
        self.trackers.get(&seat)
    }

    pub fn our(&self) -> &PlayerTracker {
        &self.trackers[&self.our_seat]
    }

    pub fn our_mut(&mut self) -> &mut PlayerTracker {
        self.trackers.get_mut(&self.our_seat).expect("our tracker exists")
    }

    pub fn set_pending_init_settlement(&mut self, seat: Seat, node: Option<NodeCoord>) {
        if let Some(tracker) = self.trackers.get_mut(&seat) {
            tracker.pending_init_settlement = node;
        }
    }

    /// Track a placement already applied to the mirror. During initial
    /// placement, settlements are deferred until their road arrives, in case
    /// the placement is cancelled and moved.
    pub fn track_put_piece(&mut self, game: &Game, seat: Seat, kind: PieceKind, coord: PieceCoord) {
        match (kind, coord) {
            (PieceKind::Settlement, PieceCoord::Node(node)) => {
                if game.is_initial_placement() {
                    self.set_pending_init_settlement(seat, Some(node));
                } else {
                    self.track_new_settlement(game, seat, node, false);
                }
            }
            (PieceKind::City, PieceCoord::Node(node)) => {
                self.track_new_city(game, seat, node, false);
            }
            (PieceKind::Road | PieceKind::Ship, PieceCoord::Edge(edge)) => {
                if game.is_initial_placement() {
                    if let Some(pending) = self
                        .trackers
                        .get_mut(&seat)
                        .and_then(|t| t.pending_init_settlement.take())
                    {
                        self.track_new_settlement(game, seat, pending, false);
                    }
                }
                self.track_new_road_or_ship(game, seat, edge, false);
            }
            _ => {}
        }
    }

    /// Track a ship move: the vacated edge reopens, the target closes.
    pub fn track_move_piece(&mut self, game: &Game, seat: Seat, to: EdgeCoord) {
        self.track_new_road_or_ship(game, seat, to, false);
    }

    /// Walk all trackers for a settlement event. `is_cancel` runs the
    /// invalidation path used when the server refused our own placement.
    pub fn track_new_settlement(&mut self, game: &Game, seat: Seat, node: NodeCoord, is_cancel: bool) {
        for tracker in self.trackers.values_mut() {
            if is_cancel {
                tracker.cancel_wrong_settlement(node);
            } else {
                tracker.add_new_settlement(game, seat, node);
            }
        }
        self.finish_walk(game, is_cancel);
    }

    pub fn track_new_city(&mut self, game: &Game, seat: Seat, node: NodeCoord, is_cancel: bool) {
        if let Some(tracker) = self.trackers.get_mut(&seat) {
            if is_cancel {
                tracker.cancel_wrong_city(node);
            } else {
                tracker.add_our_new_city(node);
            }
        }
        // city cancels use the dummy seat; invalidate our own lattice then
        if is_cancel && seat == catan_core::DUMMY_CANCEL_SEAT {
            self.our_mut().cancel_wrong_city(node);
        }
        self.finish_walk(game, is_cancel);
    }

    pub fn track_new_road_or_ship(&mut self, game: &Game, seat: Seat, edge: EdgeCoord, is_cancel: bool) {
        for tracker in self.trackers.values_mut() {
            if is_cancel {
                tracker.cancel_wrong_road_or_ship(edge);
            } else {
                tracker.add_new_road_or_ship(game, seat, edge);
            }
        }
        self.finish_walk(game, is_cancel);
    }

    /// Passes two and three: clear threats, recompute them, then refresh
    /// ETAs. Cancels skip the ETA refresh; nothing was bought or placed.
    fn finish_walk(&mut self, game: &Game, is_cancel: bool) {
        for tracker in self.trackers.values_mut() {
            tracker.clear_all_threats();
        }
        self.update_threats();
        if !is_cancel {
            self.update_etas(game);
        }
        self.recalc_longest_road_eta();
    }

    /// Recompute threat lists from the full lattice snapshot.
    pub fn update_threats(&mut self) {
        let view = LatticeView::of(&self.trackers);

        for (seat, tracker) in self.trackers.iter_mut() {
            for (edge, piece) in tracker.possible_roads.iter_mut() {
                for (other_seat, roads) in &view.roads {
                    if other_seat == seat {
                        continue;
                    }
                    if let Some((id, _)) = roads.get(edge) {
                        piece.add_threat(*id);
                    }
                }
                for (other_seat, settlements) in &view.settlements {
                    if other_seat == seat {
                        continue;
                    }
                    for node in edge.endpoints() {
                        if let Some((id, _)) = settlements.get(&node) {
                            piece.add_threat(*id);
                        }
                    }
                }
                piece.mark_threats_updated();
            }

            for (node, piece) in tracker.possible_settlements.iter_mut() {
                for (other_seat, settlements) in &view.settlements {
                    if other_seat == seat {
                        continue;
                    }
                    if let Some((id, _)) = settlements.get(node) {
                        piece.add_threat(*id);
                    }
                    for adjacent in node.adjacent_nodes() {
                        if let Some((id, _)) = settlements.get(&adjacent) {
                            piece.add_threat(*id);
                        }
                    }
                }
                for (other_seat, roads) in &view.roads {
                    if other_seat == seat {
                        continue;
                    }
                    for edge in node.touching_edges() {
                        if let Some((id, _)) = roads.get(&edge) {
                            piece.add_threat(*id);
                        }
                    }
                }
                piece.mark_threats_updated();
            }
        }

        self.refresh_biggest_threats(&view);
    }

    /// Biggest threats are the listed threats with the soonest ETA, judged
    /// against the pre-refresh ETA snapshot.
    fn refresh_biggest_threats(&mut self, view: &LatticeView) {
        let eta_of = |id: &PieceId| -> u32 {
            match id.tag {
                PossibleTag::Road | PossibleTag::Ship => id
                    .coord
                    .and_then(PieceCoord::edge)
                    .and_then(|e| view.roads.get(&id.seat).and_then(|m| m.get(&e)))
                    .map(|(_, eta)| *eta)
                    .unwrap_or(u32::MAX),
                PossibleTag::Settlement => id
                    .coord
                    .and_then(PieceCoord::node)
                    .and_then(|n| view.settlements.get(&id.seat).and_then(|m| m.get(&n)))
                    .map(|(_, eta)| *eta)
                    .unwrap_or(u32::MAX),
                _ => u32::MAX,
            }
        };

        for tracker in self.trackers.values_mut() {
            for piece in tracker
                .possible_roads
                .values_mut()
                .chain(tracker.possible_settlements.values_mut())
            {
                if piece.threats.is_empty() {
                    piece.biggest_threats.clear();
                    continue;
                }
                let soonest = piece.threats.iter().map(eta_of).min().unwrap_or(u32::MAX);
                piece.biggest_threats =
                    piece.threats.iter().copied().filter(|t| eta_of(t) == soonest).collect();
            }
        }
    }

    /// Refresh every possible piece's ETA from its owner's current
    /// production and hand.
    pub fn update_etas(&mut self, game: &Game) {
        for (seat, tracker) in self.trackers.iter_mut() {
            let Some(player) = game.player(*seat) else {
                continue;
            };
            let speed = BuildSpeed::for_seat(game, *seat);
            for piece in tracker
                .possible_roads
                .values_mut()
                .chain(tracker.possible_settlements.values_mut())
                .chain(tracker.possible_cities.values_mut())
            {
                piece.eta = speed.eta(&player.resources, &piece.resources_to_build());
            }
        }
    }

    /// Extension point: longest-road threat propagation is not wired yet.
    /// Kept separate so the walk has a stable place to call it from.
    fn recalc_longest_road_eta(&mut self) {}

    /// Invalidate a piece the server refused, with the dummy-cancel seat
    /// standing in for ours.
    pub fn cancel_piece(&mut self, game: &Game, kind: PieceKind, coord: PieceCoord) {
        match (kind, coord) {
            (PieceKind::Settlement, PieceCoord::Node(node)) => {
                self.track_new_settlement(game, catan_core::DUMMY_CANCEL_SEAT, node, true);
            }
            (PieceKind::City, PieceCoord::Node(node)) => {
                self.track_new_city(game, catan_core::DUMMY_CANCEL_SEAT, node, true);
            }
            (PieceKind::Road | PieceKind::Ship, PieceCoord::Edge(edge)) => {
                self.track_new_road_or_ship(game, catan_core::DUMMY_CANCEL_SEAT, edge, true);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catan_core::{Board, GameOptions, GamePhase};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> Game {
        let mut rng = StdRng::seed_from_u64(17);
        let board = Board::standard_with_rng(&mut rng);
        let mut game = Game::new("track".into(), board, GameOptions::default());
        for seat in 0..4u8 {
            game.sit_down(seat, format!("p{seat}"));
        }
        game.set_phase(GamePhase::Play);
        game
    }

    fn place_settlement(game: &mut Game, trackers: &mut TrackerSet, seat: Seat, node: NodeCoord) {
        game.apply_put_piece(seat, PieceKind::Settlement, PieceCoord::Node(node));
        trackers.track_put_piece(game, seat, PieceKind::Settlement, PieceCoord::Node(node));
    }

    #[test]
    fn own_settlement_opens_city_and_roads() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();

        place_settlement(&mut g, &mut trackers, 0, node);

        let ours = trackers.our();
        assert!(ours.possible_cities.contains_key(&node));
        assert!(
            node.touching_edges()
                .iter()
                .any(|e| ours.possible_roads.contains_key(e)),
            "settlement should open adjacent possible roads"
        );
    }

    #[test]
    fn opponent_settlement_kills_contested_possibles() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();

        // our road next to the node makes it a possible settlement for us
        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        trackers.track_put_piece(&g, 0, PieceKind::Road, PieceCoord::Edge(edge));
        assert!(trackers.our().possible_settlements.contains_key(&node));

        place_settlement(&mut g, &mut trackers, 1, node);
        assert!(!trackers.our().possible_settlements.contains_key(&node));
    }

    #[test]
    fn own_road_expands_lattice() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();
        place_settlement(&mut g, &mut trackers, 0, node);

        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        trackers.track_put_piece(&g, 0, PieceKind::Road, PieceCoord::Edge(edge));

        let ours = trackers.our();
        assert!(!ours.possible_roads.contains_key(&edge));
        let far_end = edge
            .endpoints()
            .into_iter()
            .find(|n| *n != node)
            .unwrap();
        assert!(
            far_end
                .touching_edges()
                .iter()
                .filter(|e| **e != edge)
                .any(|e| ours.possible_roads.contains_key(e)),
            "road should open continuations"
        );
    }

    #[test]
    fn threats_recorded_for_contested_edge() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let nodes: Vec<NodeCoord> = g.board.land_nodes().into_iter().collect();

        // two settlements of different seats sharing a potential edge
        let shared = nodes
            .iter()
            .find_map(|n| {
                for e in n.touching_edges() {
                    let [a, b] = e.endpoints();
                    let other = if a == *n { b } else { a };
                    // need both endpoints on land, non-adjacent placements stay legal
                    if g.board.is_land_node(&other) && n.adjacent_nodes().contains(&other) {
                        return Some((*n, other, e));
                    }
                }
                None
            })
            .map(|(a, b, _)| (a, b));
        let Some((node_a, node_b)) = shared else {
            panic!("board should have adjacent land nodes");
        };

        // place them two apart via a middle edge is impossible; instead give
        // each seat a road touching the same empty edge
        let contested = node_a
            .touching_edges()
            .into_iter()
            .find(|e| e.endpoints().contains(&node_b))
            .unwrap();

        // seat 0 settlement on node_a's far side feeding the contested edge
        place_settlement(&mut g, &mut trackers, 0, node_a);
        // give seat 1 a road network reaching node_b
        let feeder = node_b
            .touching_edges()
            .into_iter()
            .find(|e| *e != contested)
            .unwrap();
        g.apply_put_piece(1, PieceKind::Road, PieceCoord::Edge(feeder));
        trackers.track_put_piece(&g, 1, PieceKind::Road, PieceCoord::Edge(feeder));

        let ours = trackers.our();
        if let Some(piece) = ours.possible_roads.get(&contested) {
            assert!(
                piece.threats.iter().any(|t| t.seat == 1),
                "contested edge should list seat 1's possible road as a threat"
            );
        }
    }

    #[test]
    fn cancel_uses_dummy_seat_and_removes_everywhere() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();
        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        trackers.track_put_piece(&g, 0, PieceKind::Road, PieceCoord::Edge(edge));
        assert!(trackers.our().possible_settlements.contains_key(&node));

        // server refuses our settlement there; mirror reverts, tracker cancels
        trackers.cancel_piece(&g, PieceKind::Settlement, PieceCoord::Node(node));
        assert!(!trackers.our().possible_settlements.contains_key(&node));
    }

    #[test]
    fn initial_settlement_deferred_until_road() {
        let mut g = game();
        g.set_phase(GamePhase::InitSettle1A);
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();

        g.apply_put_piece(0, PieceKind::Settlement, PieceCoord::Node(node));
        trackers.track_put_piece(&g, 0, PieceKind::Settlement, PieceCoord::Node(node));
        assert_eq!(trackers.our().pending_init_settlement, Some(node));
        assert!(!trackers.our().possible_cities.contains_key(&node));

        g.set_phase(GamePhase::InitRoad1B);
        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        trackers.track_put_piece(&g, 0, PieceKind::Road, PieceCoord::Edge(edge));

        assert_eq!(trackers.our().pending_init_settlement, None);
        assert!(trackers.our().possible_cities.contains_key(&node));
    }

    #[test]
    fn etas_follow_resources() {
        let mut g = game();
        let mut trackers = TrackerSet::new(&g, 0);
        let node = *g.board.land_nodes().iter().next().unwrap();
        place_settlement(&mut g, &mut trackers, 0, node);

        let eta_before = trackers.our().possible_cities[&node].eta;
        assert!(eta_before > 0);

        // hand the player a full city cost; ETA drops to zero
        let p = g.player_mut(0).unwrap();
        p.resources = catan_core::ResourceSet::with_amounts(0, 3, 0, 2, 0);
        trackers.update_etas(&g);
        assert_eq!(trackers.our().possible_cities[&node].eta, 0);
    }
}
