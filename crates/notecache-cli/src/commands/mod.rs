//! Command handlers

pub mod config;
pub mod folder;
pub mod note;
pub mod search;
pub mod status;
