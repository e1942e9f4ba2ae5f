//! Folio Catalog Kernel Library
//!
//! This library exposes the catalog API, query composer and storage
//! backends for integration testing. The main entry point for running the
//! server is the `folio` binary.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod services;
pub mod state;
