//! Peer networking placeholder.
//!
//! Block/transaction gossip and peer discovery live outside this protocol
//! core; this crate exists so the workspace carries a networking seam for
//! whatever transport gets wired in later.
