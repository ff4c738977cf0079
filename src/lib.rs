//! ZILNOVA - keyword-driven desktop voice assistant
//!
//! The binary wires these modules together; everything with behavior lives
//! here so it can be tested without audio hardware.

pub mod commands;
pub mod config;
pub mod controller;
pub mod launcher;
pub mod listen;
pub mod paths;
pub mod preflight;
pub mod shell;
pub mod speech;
pub mod transcript;
pub mod validation;
pub mod weather;
pub mod worker;

#[cfg(test)]
mod testing;
