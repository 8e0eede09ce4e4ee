//! Model Context Protocol (MCP) JSON-RPC core
//!
//! Provides envelope validation and formatting, the method registry and the
//! dispatcher that routes validated requests to registered actions.

pub mod dispatcher;
pub mod registry;
pub mod rpc;
