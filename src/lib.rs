//! Protein-DNA binding event mixture models and read responsibility assignment for
//! ChIP-exo pileups

pub mod binding;
pub mod component;
pub mod composite;
pub mod config;
pub mod density;
pub mod error;
pub mod events;
pub mod experiment;
pub mod model;
pub mod simulate;
pub mod types;
