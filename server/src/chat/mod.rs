//! Chat-side boundary: WebSocket connect plus message fan-out over the
//! generic hub.

pub mod routes;
