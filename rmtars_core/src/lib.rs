//! Core rust implementation of rMTA.rs, robust Metabolic Transformation Analysis on
//! constraint based metabolic models.
//!
//! The usual entry point is [`analysis::rmta::rmta`], which takes a [`Model`], the
//! desired direction of change for every reaction, and a reference flux distribution,
//! and scores how well knocking out each gene (or reaction) transforms the reference
//! state in the desired direction.
//!
//! [`Model`]: metabolic_model::model::Model
pub mod analysis;
pub mod configuration;
pub mod io;
pub mod metabolic_model;
pub mod optimize;
mod utils;
