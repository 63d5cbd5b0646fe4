//! CLI wiring: command definitions and handlers.

pub mod commands;
pub mod handlers;
