//! Persistence adapters: local snapshots, the remote room store and the
//! remote question catalog.

pub mod memory;
pub mod models;
pub mod room_store;
pub mod snapshot;
pub mod storage;
#[cfg(feature = "supabase-store")]
pub mod supabase;
