//! Daemon wiring and command-line surface for linkmirror.

#![allow(missing_docs)]

pub mod app;
pub mod cli;
pub mod commands;
