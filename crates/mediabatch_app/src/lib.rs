//! Terminal front-end pieces that do not touch the terminal itself.
pub mod cli;
pub mod command;
pub mod config;
pub mod render;
