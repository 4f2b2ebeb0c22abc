//! Catalogue Store (spec §4.2, component C1): the system of record for SBS
//! mappings, pricing tiers, bundles, and certificate metadata, behind a
//! pooled Postgres connection with parameterized queries and named indexes.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use nphies_core::catalogue::{Bundle, CertificateMeta, MappingSource, PricingTier, SbsMapping};
use nphies_core::transaction::{Stage, TransactionRecord, TransactionStatus};
use nphies_core::types::{ClaimId, FacilityId, Money, PayerId};
use nphies_envelope::{ClaimError, CorrelationId};

/// Read/write surface the rest of the pipeline depends on through a trait
/// object, so the normalizer/pricing/signer crates never import `sqlx`
/// directly and tests can substitute an in-memory fake.
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    async fn get_sbs_mapping(
        &self,
        facility_id: FacilityId,
        internal_code: &str,
    ) -> Result<Option<SbsMapping>, ClaimError>;

    async fn get_pricing_tier(
        &self,
        facility_id: FacilityId,
        payer_id: PayerId,
    ) -> Result<Option<PricingTier>, ClaimError>;

    /// Every bundle defined for the facility whose full membership is a
    /// subset of `resolved_codes`; the pricing engine picks among these by
    /// the tie-break rule in spec §4.5.
    async fn get_candidate_bundles(
        &self,
        facility_id: FacilityId,
        resolved_codes: &[String],
    ) -> Result<Vec<Bundle>, ClaimError>;

    /// The facility's most recently issued certificate whose validity window
    /// has begun by `at`, whether or not it has since expired — the caller
    /// (the Signer) is responsible for distinguishing "no certificate ever
    /// issued" (`None`) from "issued but expired" (a row that fails
    /// [`CertificateMeta::is_valid_at`]), since those map to different error
    /// codes (spec §4.6).
    async fn get_active_certificate(
        &self,
        facility_id: FacilityId,
        at: DateTime<Utc>,
    ) -> Result<Option<CertificateMeta>, ClaimError>;

    /// Append-only: records an AI-suggested mapping for audit/retraining, but
    /// never overwrites a human/DB-sourced mapping (spec §4.3).
    async fn record_ai_suggestion(&self, mapping: &SbsMapping) -> Result<(), ClaimError>;
}

#[derive(FromRow)]
struct SbsMappingRow {
    facility_id: i64,
    internal_code: String,
    sbs_code: String,
    source: String,
    confidence: Option<f64>,
}

impl TryFrom<SbsMappingRow> for SbsMapping {
    type Error = ClaimError;

    fn try_from(row: SbsMappingRow) -> Result<Self, ClaimError> {
        let source = match row.source.as_str() {
            "database" => MappingSource::Database,
            "ai_suggested" => MappingSource::AiSuggested,
            other => {
                return Err(ClaimError::data_corrupt(
                    "CATALOGUE_UNKNOWN_MAPPING_SOURCE",
                    format!("unrecognized mapping source {other}"),
                ))
            }
        };
        Ok(SbsMapping {
            facility_id: FacilityId(row.facility_id),
            internal_code: row.internal_code,
            sbs_code: row.sbs_code,
            source,
            confidence: row.confidence,
        })
    }
}

#[derive(FromRow)]
struct PricingTierRow {
    facility_id: i64,
    payer_id: i64,
    tier_name: String,
    markup_bps: i64,
    cap_minor_units: Option<i64>,
    max_quantity_per_line: Option<i32>,
}

impl From<PricingTierRow> for PricingTier {
    fn from(row: PricingTierRow) -> Self {
        PricingTier {
            facility_id: FacilityId(row.facility_id),
            payer_id: PayerId(row.payer_id),
            tier_name: row.tier_name,
            markup_bps: row.markup_bps,
            cap: row.cap_minor_units.map(Money::from_minor_units),
            max_quantity_per_line: row.max_quantity_per_line.map(|v| v as u32),
        }
    }
}

#[derive(FromRow)]
struct BundleRow {
    bundle_id: String,
    member_codes: Vec<String>,
    flat_price_minor_units: i64,
}

impl From<BundleRow> for Bundle {
    fn from(row: BundleRow) -> Self {
        Bundle {
            bundle_id: row.bundle_id,
            member_codes: row.member_codes,
            flat_price: Money::from_minor_units(row.flat_price_minor_units),
        }
    }
}

#[derive(FromRow)]
struct CertificateRow {
    facility_id: i64,
    serial: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl From<CertificateRow> for CertificateMeta {
    fn from(row: CertificateRow) -> Self {
        CertificateMeta {
            facility_id: FacilityId(row.facility_id),
            serial: row.serial,
            not_before: row.not_before,
            not_after: row.not_after,
        }
    }
}

fn storage_error(e: sqlx::Error) -> ClaimError {
    ClaimError::upstream_unavailable("CATALOGUE_QUERY_FAILED", e.to_string()).with_stage("catalogue")
}

pub struct PgCatalogueStore {
    pool: PgPool,
}

impl PgCatalogueStore {
    pub fn new(pool: PgPool) -> Self {
        PgCatalogueStore { pool }
    }
}

#[async_trait]
impl CatalogueStore for PgCatalogueStore {
    async fn get_sbs_mapping(
        &self,
        facility_id: FacilityId,
        internal_code: &str,
    ) -> Result<Option<SbsMapping>, ClaimError> {
        let row: Option<SbsMappingRow> = sqlx::query_as(
            "SELECT facility_id, internal_code, sbs_code, source, confidence \
             FROM sbs_mappings \
             WHERE facility_id = $1 AND internal_code = $2",
        )
        .bind(facility_id.0)
        .bind(internal_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(SbsMapping::try_from).transpose()
    }

    async fn get_pricing_tier(
        &self,
        facility_id: FacilityId,
        payer_id: PayerId,
    ) -> Result<Option<PricingTier>, ClaimError> {
        let row: Option<PricingTierRow> = sqlx::query_as(
            "SELECT facility_id, payer_id, tier_name, markup_bps, cap_minor_units, max_quantity_per_line \
             FROM pricing_tiers \
             WHERE facility_id = $1 AND payer_id = $2",
        )
        .bind(facility_id.0)
        .bind(payer_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(PricingTier::from))
    }

    async fn get_candidate_bundles(
        &self,
        facility_id: FacilityId,
        resolved_codes: &[String],
    ) -> Result<Vec<Bundle>, ClaimError> {
        let rows: Vec<BundleRow> = sqlx::query_as(
            "SELECT bundle_id, member_codes, flat_price_minor_units \
             FROM bundles \
             WHERE facility_id = $1 AND member_codes <@ $2",
        )
        .bind(facility_id.0)
        .bind(resolved_codes)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(Bundle::from).collect())
    }

    async fn get_active_certificate(
        &self,
        facility_id: FacilityId,
        at: DateTime<Utc>,
    ) -> Result<Option<CertificateMeta>, ClaimError> {
        // Deliberately does not filter on `not_after`: an expired row must
        // still come back so `sign()` can report `SIGNER_CERT_EXPIRED`
        // rather than treating it the same as no certificate at all.
        let row: Option<CertificateRow> = sqlx::query_as(
            "SELECT facility_id, serial, not_before, not_after \
             FROM certificates \
             WHERE facility_id = $1 AND not_before <= $2 \
             ORDER BY not_after DESC LIMIT 1",
        )
        .bind(facility_id.0)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(CertificateMeta::from))
    }

    async fn record_ai_suggestion(&self, mapping: &SbsMapping) -> Result<(), ClaimError> {
        sqlx::query(
            "INSERT INTO ai_suggestion_log \
             (facility_id, internal_code, sbs_code, confidence, suggested_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(mapping.facility_id.0)
        .bind(&mapping.internal_code)
        .bind(&mapping.sbs_code)
        .bind(mapping.confidence)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[async_trait]
impl nphies_core::TransactionLogWriter for PgCatalogueStore {
    async fn write(&self, record: nphies_core::TransactionRecord) -> Result<(), ClaimError> {
        sqlx::query(
            "INSERT INTO claim_transaction_log \
             (txn_id, claim_id, stage, status, error_code, payload_hash, started_at, ended_at, duration_ms, correlation_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.txn_id)
        .bind(record.claim_id.0)
        .bind(record.stage.as_str())
        .bind(format!("{:?}", record.status).to_lowercase())
        .bind(record.error_code)
        .bind(record.payload_hash)
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.duration_ms)
        .bind(record.correlation_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[async_trait]
impl nphies_core::GatewayLogWriter for PgCatalogueStore {
    async fn record_attempt(&self, record: nphies_core::GatewayAttemptRecord) -> Result<(), ClaimError> {
        sqlx::query(
            "INSERT INTO nphies_transactions \
             (claim_id, kind, attempt, request_hash, upstream_txn_id, http_status, duration_ms, error_code, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
        )
        .bind(record.claim_id.0)
        .bind(record.kind)
        .bind(record.attempt as i32)
        .bind(record.request_hash)
        .bind(record.upstream_txn_id)
        .bind(record.http_status.map(|s| s as i32))
        .bind(record.duration_ms)
        .bind(record.error_code)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[derive(FromRow)]
struct TransactionHistoryRow {
    txn_id: Uuid,
    claim_id: String,
    stage: String,
    status: String,
    error_code: Option<String>,
    payload_hash: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    correlation_id: Uuid,
}

impl TryFrom<TransactionHistoryRow> for TransactionRecord {
    type Error = ClaimError;

    fn try_from(row: TransactionHistoryRow) -> Result<Self, ClaimError> {
        Ok(TransactionRecord {
            txn_id: row.txn_id,
            claim_id: ClaimId(row.claim_id),
            stage: Stage::from_str(&row.stage)?,
            status: TransactionStatus::from_str(&row.status)?,
            error_code: row.error_code,
            payload_hash: row.payload_hash,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_ms: row.duration_ms,
            correlation_id: CorrelationId::from_uuid(row.correlation_id),
        })
    }
}

#[async_trait]
impl nphies_core::TransactionHistoryReader for PgCatalogueStore {
    async fn history(&self, claim_id: &ClaimId) -> Result<Vec<TransactionRecord>, ClaimError> {
        let rows: Vec<TransactionHistoryRow> = sqlx::query_as(
            "SELECT txn_id, claim_id, stage, status, error_code, payload_hash, started_at, ended_at, duration_ms, correlation_id \
             FROM claim_transaction_log \
             WHERE claim_id = $1 \
             ORDER BY started_at ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}

// Named indexes assumed by the queries above (kept here as documentation of
// the schema this store depends on; actual migrations live with deployment
// tooling, not in this crate):
//   CREATE UNIQUE INDEX idx_sbs_mappings_facility_code ON sbs_mappings (facility_id, internal_code);
//   CREATE UNIQUE INDEX idx_pricing_tiers_facility_payer ON pricing_tiers (facility_id, payer_id);
//   CREATE INDEX idx_bundles_facility ON bundles (facility_id);
//   CREATE INDEX idx_certificates_facility_validity ON certificates (facility_id, not_before, not_after);
//   CREATE INDEX idx_nphies_transactions_claim ON nphies_transactions (claim_id, attempt);
//   CREATE INDEX idx_claim_transaction_log_claim_stage ON claim_transaction_log (claim_id, stage);
