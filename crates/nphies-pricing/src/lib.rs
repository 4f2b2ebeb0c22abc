//! Financial Rule Engine (spec §4.5, component C4): pricing tiers, bundle
//! resolution, and markup/cap application.

pub mod engine;
pub mod service;
pub mod types;

pub use service::PricingService;
pub use types::{PricedClaim, PricedLineItem, Totals, Violation, ViolationKind};
