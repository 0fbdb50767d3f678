// src/lib.rs

//! Revision Harvester Library
//!
//! Harvests the full edit history of one wiki article, resolves author
//! metadata, converts markup to plain text, and scores every edit.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
