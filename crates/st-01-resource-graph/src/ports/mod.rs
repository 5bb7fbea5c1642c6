//! Ports module for the Resource Graph

pub mod inbound;

pub use inbound::ResourceGraphApi;
