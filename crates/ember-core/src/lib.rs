//! # ember-core
//! Core types, chain parameters, and consensus validation for Ember.

pub mod block_validation;
pub mod crypto;
pub mod error;
pub mod genesis;
pub mod merkle;
pub mod params;
pub mod types;
pub mod validation;
