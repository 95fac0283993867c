// src/lib.rs

//! Owlscope: scope- and freshness-aware crawl coordination and scoped queries.

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
