/// Background reconciliation tasks keeping a store in step with the remote
/// room and same-device peers.
pub mod sync_service;
