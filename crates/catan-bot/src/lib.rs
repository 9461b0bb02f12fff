//! Autonomous robot player for the Catan server.
//!
//! One [`brain::RobotBrain`] actor plays one game: it mirrors the
//! authoritative state from the message stream, tracks every seat's possible
//! pieces, plans what to build, negotiates trades, and recovers from server
//! rejections. The [`client`] module multiplexes many brains over one
//! WebSocket connection.
//!
//! # Modules
//!
//! - [`brain`]: the event-driven state machine (the driver)
//! - [`tracker`] / [`possible`] / [`speed`]: opponent and self modeling
//! - [`planner`] / [`negotiator`] / [`strategy`]: decision making
//! - [`pinger`]: the 1 Hz tick task
//! - [`client`]: WebSocket plumbing and the per-game brain registry
//! - [`config`]: per-brain knobs

pub mod brain;
pub mod client;
pub mod config;
pub mod negotiator;
pub mod pinger;
pub mod planner;
pub mod possible;
pub mod speed;
pub mod strategy;
pub mod tracker;

pub use brain::{Expectations, PlannedBuild, RobotBrain, Waits, MAX_DENIED_BUILDING_PER_TURN};
pub use client::{BotClient, BrainHandle, ClientError, ClientFrame, ServerFrame};
pub use config::{BotConfig, Strategy};
pub use negotiator::{Negotiator, OfferResponse};
pub use planner::Planner;
pub use possible::{PieceId, PossibleKind, PossiblePiece, PossibleTag};
pub use speed::BuildSpeed;
pub use tracker::{PlayerTracker, TrackerSet};
