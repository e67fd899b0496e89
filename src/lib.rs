#![deny(missing_docs)]

//! Core library for the PDF question-answering server.

/// HTTP routing and handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// In-memory vector index.
pub mod index;
/// Chat-completion client.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answer metrics helpers.
pub mod metrics;
/// Question-answering pipeline.
pub mod processing;
/// HTML page rendering.
pub mod web;
