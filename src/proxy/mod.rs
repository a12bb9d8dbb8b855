//! Proxy candidate extraction and validation
//!
//! This module provides functionality for:
//! - Extracting proxy candidates from raw text in many formats
//! - Validating candidate liveness with protocol-routed concurrent probes
//! - Resolving candidate hosts to country codes

pub mod extractor;
pub mod geo;
pub mod models;
pub mod validator;

pub use extractor::extract;
pub use geo::CountryResolver;
pub use models::{ProxyCandidate, ProxyType, ValidationOutcome};
pub use validator::{ProxyValidator, ValidatorConfig};
