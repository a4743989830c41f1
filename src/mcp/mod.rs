//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the price tools to AI assistants as JSON-RPC 2.0
//! methods. The dispatcher is transport-agnostic; two transports feed it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │   │  Transport  │───▶│  Dispatcher  │───▶│    Tools     │    │
//! │   │ (stdio/http)│    │  (routing)   │    │  (executor)  │    │
//! │   └─────────────┘    └──────────────┘    └──────────────┘    │
//! │          │                  │                   │            │
//! │          ▼                  ▼                   ▼            │
//! │   ┌──────────────────────────────────────────────────┐       │
//! │   │                JSON-RPC Messages                 │       │
//! │   └──────────────────────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod http;
pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, MessageHandler};
pub use transport::StdioTransport;
