//! # Azure SQL MCP Server
//!
//! A read-only Model Context Protocol (MCP) server that lets LLM agents
//! explore and query a Northwind-style Azure SQL / SQL Server database.
//!
//! This crate provides:
//! - **Gateway**: a closed set of tool invocations, validated before any
//!   database access, each producing a query result or a structured error
//! - **Security**: a read-only guard for free-form queries and safe
//!   identifier and LIKE-pattern handling
//! - **Database**: per-invocation connections behind a bounded, timed gate
//!
//! ## Architecture
//!
//! `main` builds the [`Config`], a [`Gateway`] over a SQL backend, and the
//! [`AzureSqlMcpServer`] that exposes the gateway as MCP tools over stdio.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod tools;

pub use config::Config;
pub use error::{ConfigError, ErrorKind, GatewayError};
pub use gateway::{ErrorResult, Gateway, InvocationOutcome, ToolInvocation};
pub use server::AzureSqlMcpServer;
