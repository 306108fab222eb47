#![deny(clippy::all)]
#![warn(unused_crate_dependencies)]

pub mod api;
pub mod channel;
pub mod common;
pub mod config;
pub mod counters;
pub mod event;
pub mod lifecycle;
pub mod net;
