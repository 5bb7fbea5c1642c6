//! Application layer for the Resource Graph

pub mod service;
