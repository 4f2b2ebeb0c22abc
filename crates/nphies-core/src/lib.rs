//! Shared domain model (spec §3): the `Claim` and its parts, money math,
//! the transaction audit record, catalogue/cache record shapes, and the
//! default tuning constants every other crate in the workspace pulls from.

pub mod catalogue;
pub mod claim;
pub mod constants;
pub mod transaction;
pub mod types;

pub use catalogue::{Bundle, CacheNamespace, CertificateMeta, MappingSource, PricingTier, SbsMapping};
pub use claim::{Claim, ClaimType, Gender, LineItem, Patient, PayerRef};
pub use transaction::{
    GatewayAttemptRecord, GatewayLogWriter, Stage, TransactionHistoryReader, TransactionLogWriter,
    TransactionRecord, TransactionStatus,
};
pub use types::{ClaimId, FacilityId, Money, MoneyHp, PayerId};
