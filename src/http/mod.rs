//! HTTP surface of the gateway
//!
//! `POST /mcp` carries single or batched JSON-RPC envelopes; `/health` and
//! `/.well-known/mcp` are public metadata endpoints. Routing lives in
//! `build_app`.

pub mod handlers;
