//! # votepipe-server
//!
//! HTTP surfaces of the pipeline. The `vote` surface accepts ballots and
//! hands them to intake; the `result` surface serves the live results page
//! and streams aggregate snapshots to viewers over a WebSocket.

pub mod handlers;
pub mod infra;
pub mod routes;
pub mod views;
