pub mod activities;
pub mod common;
pub mod completions;
pub mod config;
pub mod edit;
pub mod pending;
pub mod sync;
pub mod vote;
