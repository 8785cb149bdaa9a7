//! Core types, config, errors, and conversation model for Voxlink.

pub mod candidate;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
