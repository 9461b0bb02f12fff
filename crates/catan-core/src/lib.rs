//! Game-side foundations for the Catan robot client.
//!
//! This crate holds everything the robot mirrors and queries but never
//! decides: the board and coordinate system, per-seat player state, the game
//! model mirror driven by inbound messages, the read-only legal-move oracle,
//! and the wire message types themselves.
//!
//! # Modules
//!
//! - [`hex`]: coordinate system for tiles, nodes and edges
//! - [`board`]: tiles, placed pieces, ports, robber and pirate
//! - [`player`]: resources (with hidden-card pool), dev cards, pieces
//! - [`game`]: the message-driven game model mirror
//! - [`oracle`]: pure legality and probability queries over the mirror
//! - [`messages`]: inbound `Message` and outbound `Action` enums

pub mod board;
pub mod game;
pub mod hex;
pub mod messages;
pub mod oracle;
pub mod player;

// Re-export commonly used types
pub use board::{Board, EdgePiece, NodePiece, Port, Resource, Seat, Tile, TileId, TileKind, DUMMY_CANCEL_SEAT};
pub use game::{Game, GameOptions, GamePhase, ResourceAssertOutcome};
pub use hex::{EdgeCoord, EdgeDirection, HexCoord, NodeCoord, NodeDirection};
pub use messages::{
    Action, BuildKind, DevCardOp, ElementField, ElementOp, Message, PieceCoord, PieceKind,
    SimpleActionKind, SimpleRequestKind, SpecialItemOp,
};
pub use player::{costs, DevCard, DevCardInventory, Player, ResourceSet, TradeOffer, MAX_SEATS};
