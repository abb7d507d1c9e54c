//! JSON-RPC server placeholder.
//!
//! The account/block/tx query surface this would expose lives outside this
//! protocol core; this crate exists so the workspace carries an RPC seam
//! for whatever API gets wired in later.
