//! Core types shared by every pipeline component.

pub mod config;
pub mod errors;
pub mod ids;
