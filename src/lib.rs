//! Shared game-state synchronizer for a buzzer-based trivia game.
//!
//! Every client owns a [`state::SyncStore`]: the single authority over its
//! [`state::document::StateDocument`]. Mutations enter as [`state::action::Action`]
//! values, are validated and applied locally, then propagated to the remote
//! room store and to same-device peers. Winner-take-all buzzer locks go
//! through the remote store's atomic compare-and-set so exactly one team wins
//! a contested buzz.

pub mod config;
pub mod dao;
mod error;
pub mod services;
pub mod state;

pub use config::SyncConfig;
pub use error::StoreError;
pub use state::{
    ConnectionStatus, PeerHub, PeerUpdate, RemoteAdapters, SharedStore, StoreAdapters, SyncStore,
};
