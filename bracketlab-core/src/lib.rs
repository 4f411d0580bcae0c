//! BracketLab Core: signal evaluation, bracket-order lifecycle, simulated broker.
//!
//! This crate contains:
//! - Domain types (bars, order legs, notifications, position state)
//! - Moving-average crossover evaluation
//! - The bracket controller and its order-group state machine
//! - The order gateway trait and a deterministic simulated broker
//! - The bar-by-bar step loop and its configuration

pub mod broker;
pub mod config;
pub mod controller;
pub mod data;
pub mod domain;
pub mod engine;
pub mod gateway;
pub mod indicators;
pub mod signal;
