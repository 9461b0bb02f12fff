//! Possible pieces: candidate placements and purchases the trackers reason
//! about.
//!
//! One struct with shared header fields (owner, coordinate, ETA, score,
//! threat lists, bookkeeping flags) and a kind payload for the arm-specific
//! data. Threat lists hold lightweight `PieceId` handles rather than
//! references, so the lattice stays an acyclic arena.

use catan_core::messages::{BuildKind, PieceCoord};
use catan_core::player::ResourceSet;
use catan_core::{costs, EdgeCoord, NodeCoord, Seat};
use serde::{Deserialize, Serialize};

/// Discriminant for identifying a possible piece without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PossibleTag {
    Road,
    Ship,
    Settlement,
    City,
    Card,
    SpecialItem,
}

/// Stable identity of a possible piece: owner, tag and coordinate. Used in
/// threat lists in place of references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId {
    pub seat: Seat,
    pub tag: PossibleTag,
    pub coord: Option<PieceCoord>,
}

/// Arm-specific payload of a possible piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PossibleKind {
    Road,
    Ship {
        /// A coastal edge could hold either a road or a ship; placement
        /// requests default to roads for these.
        coastal: bool,
    },
    Settlement,
    City,
    /// Buy a development card.
    Card,
    /// Pick a scenario special item.
    SpecialItem {
        type_key: String,
        game_index: i32,
        player_index: i32,
        cost: ResourceSet,
    },
}

impl PossibleKind {
    pub fn tag(&self) -> PossibleTag {
        match self {
            PossibleKind::Road => PossibleTag::Road,
            PossibleKind::Ship { .. } => PossibleTag::Ship,
            PossibleKind::Settlement => PossibleTag::Settlement,
            PossibleKind::City => PossibleTag::City,
            PossibleKind::Card => PossibleTag::Card,
            PossibleKind::SpecialItem { .. } => PossibleTag::SpecialItem,
        }
    }
}

/// A candidate future placement or purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossiblePiece {
    pub kind: PossibleKind,
    pub seat: Seat,
    pub coord: Option<PieceCoord>,
    /// Estimated turns until the resources are attainable.
    pub eta: u32,
    /// Mutable planner score.
    pub score: f32,
    /// Opponent possibles whose realization would invalidate or contest this.
    pub threats: Vec<PieceId>,
    /// The subset of threats with the soonest ETA.
    pub biggest_threats: Vec<PieceId>,
    threat_updated: bool,
    pub expanded: bool,
}

impl PossiblePiece {
    fn new(kind: PossibleKind, seat: Seat, coord: Option<PieceCoord>) -> Self {
        Self {
            kind,
            seat,
            coord,
            eta: 0,
            score: 0.0,
            threats: Vec::new(),
            biggest_threats: Vec::new(),
            threat_updated: false,
            expanded: false,
        }
    }

    pub fn road(seat: Seat, edge: EdgeCoord) -> Self {
        Self::new(PossibleKind::Road, seat, Some(PieceCoord::Edge(edge)))
    }

    pub fn ship(seat: Seat, edge: EdgeCoord, coastal: bool) -> Self {
        Self::new(PossibleKind::Ship { coastal }, seat, Some(PieceCoord::Edge(edge)))
    }

    pub fn settlement(seat: Seat, node: NodeCoord) -> Self {
        Self::new(PossibleKind::Settlement, seat, Some(PieceCoord::Node(node)))
    }

    pub fn city(seat: Seat, node: NodeCoord) -> Self {
        Self::new(PossibleKind::City, seat, Some(PieceCoord::Node(node)))
    }

    pub fn card(seat: Seat) -> Self {
        Self::new(PossibleKind::Card, seat, None)
    }

    pub fn special_item(
        seat: Seat,
        type_key: String,
        game_index: i32,
        player_index: i32,
        cost: ResourceSet,
    ) -> Self {
        Self::new(
            PossibleKind::SpecialItem { type_key, game_index, player_index, cost },
            seat,
            None,
        )
    }

    pub fn id(&self) -> PieceId {
        PieceId {
            seat: self.seat,
            tag: self.kind.tag(),
            coord: self.coord,
        }
    }

    pub fn tag(&self) -> PossibleTag {
        self.kind.tag()
    }

    /// The build-request kind this piece maps to, if it is a board piece or
    /// card; special items go through their own request.
    pub fn build_kind(&self) -> Option<BuildKind> {
        match self.kind {
            PossibleKind::Road => Some(BuildKind::Road),
            PossibleKind::Ship { .. } => Some(BuildKind::Ship),
            PossibleKind::Settlement => Some(BuildKind::Settlement),
            PossibleKind::City => Some(BuildKind::City),
            PossibleKind::Card => Some(BuildKind::Card),
            PossibleKind::SpecialItem { .. } => None,
        }
    }

    /// Resources needed to realize this piece.
    pub fn resources_to_build(&self) -> ResourceSet {
        match &self.kind {
            PossibleKind::Road => costs::road(),
            PossibleKind::Ship { .. } => costs::ship(),
            PossibleKind::Settlement => costs::settlement(),
            PossibleKind::City => costs::city(),
            PossibleKind::Card => costs::dev_card(),
            PossibleKind::SpecialItem { cost, .. } => cost.clone(),
        }
    }

    pub fn edge(&self) -> Option<EdgeCoord> {
        self.coord.and_then(PieceCoord::edge)
    }

    pub fn node(&self) -> Option<NodeCoord> {
        self.coord.and_then(PieceCoord::node)
    }

    /// Add a threat if not already listed.
    pub fn add_threat(&mut self, threat: PieceId) {
        if !self.threats.contains(&threat) {
            self.threats.push(threat);
        }
    }

    /// Clear the threat lists if they were filled since the last clear.
    pub fn clear_threats(&mut self) {
        if self.threat_updated {
            self.threats.clear();
            self.biggest_threats.clear();
            self.threat_updated = false;
        }
    }

    pub fn mark_threats_updated(&mut self) {
        self.threat_updated = true;
    }

    pub fn threats_updated(&self) -> bool {
        self.threat_updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catan_core::hex::{EdgeDirection, HexCoord, NodeDirection};

    #[test]
    fn ids_identify_by_owner_tag_and_coord() {
        let edge = EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::East);
        let a = PossiblePiece::road(1, edge);
        let b = PossiblePiece::ship(1, edge, false);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), PossiblePiece::road(1, edge).id());
    }

    #[test]
    fn threats_deduplicate() {
        let edge = EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::East);
        let mut piece = PossiblePiece::road(0, edge);
        let threat = PossiblePiece::road(2, edge).id();

        piece.add_threat(threat);
        piece.add_threat(threat);
        assert_eq!(piece.threats.len(), 1);
    }

    #[test]
    fn clear_threats_only_after_update() {
        let node = NodeCoord::new(HexCoord::new(1, 0), NodeDirection::North);
        let mut piece = PossiblePiece::settlement(0, node);
        let threat = PossiblePiece::settlement(1, node).id();

        piece.add_threat(threat);
        piece.clear_threats();
        // not marked updated, so the list survives
        assert_eq!(piece.threats.len(), 1);

        piece.mark_threats_updated();
        piece.clear_threats();
        assert!(piece.threats.is_empty());
    }

    #[test]
    fn build_kinds_and_costs() {
        let node = NodeCoord::new(HexCoord::new(0, 0), NodeDirection::South);
        assert_eq!(PossiblePiece::city(0, node).build_kind(), Some(BuildKind::City));
        assert_eq!(PossiblePiece::card(0).build_kind(), Some(BuildKind::Card));
        assert_eq!(PossiblePiece::card(0).resources_to_build(), costs::dev_card());
    }
}
