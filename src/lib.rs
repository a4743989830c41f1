//! pricecatcher-mcp: MCP server for Malaysian retail price tools
//!
//! This library lets AI assistants look up, compare and summarise retail
//! prices of essential goods across Malaysian states and outlets.
//!
//! # Architecture
//!
//! A tool call flows through a fixed pipeline:
//!
//! - **Dispatcher** ([`mcp::server`]): decodes JSON-RPC and routes methods
//! - **Executor** ([`tools::executor`]): rate limits, interprets the query,
//!   calls the price provider
//! - **Pricing** ([`pricing`]): query parsing, statistics, response text
//!
//! Tool-level failures (no data, provider down, rate limited) come back as
//! readable text. Only malformed protocol interaction produces JSON-RPC
//! errors.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation and transports
//! - [`pricing`]: Price records, query parser, statistics, formatting, providers
//! - [`ratelimit`]: Per-client request ceilings
//! - [`tools`]: Tool registry and executor

pub mod config;
pub mod error;
pub mod mcp;
pub mod pricing;
pub mod ratelimit;
pub mod tools;
