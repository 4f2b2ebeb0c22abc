//! RSA-2048/SHA-256 detached signing over caller-canonicalized bundle bytes
//! (spec §4.6): a struct wrapping key material, a sign/verify pair, and a
//! round-trip test.

use std::num::NonZeroUsize;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use nphies_catalogue::CatalogueStore;
use nphies_core::constants::{CERT_CACHE_MAX_DEFAULT, SIGNER_ALGORITHM, SIGNER_MIN_RSA_BITS};
use nphies_core::types::FacilityId;
use nphies_envelope::ClaimError;

use crate::keysource::KeySourceProvider;

#[derive(Debug, Clone)]
pub struct SignResult {
    pub signature_b64: String,
    pub cert_serial: String,
    pub signed_at: DateTime<Utc>,
    pub algorithm: String,
}

pub struct Signer {
    catalogue: Arc<dyn CatalogueStore>,
    key_source: Arc<dyn KeySourceProvider>,
    key_cache: Mutex<LruCache<FacilityId, RsaPrivateKey>>,
}

impl Signer {
    pub fn new(catalogue: Arc<dyn CatalogueStore>, key_source: Arc<dyn KeySourceProvider>) -> Self {
        Signer {
            catalogue,
            key_source,
            key_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CERT_CACHE_MAX_DEFAULT).unwrap())),
        }
    }

    async fn key_for(&self, facility_id: FacilityId) -> Result<RsaPrivateKey, ClaimError> {
        if let Some(key) = self.key_cache.lock().get(&facility_id) {
            return Ok(key.clone());
        }
        let key = self.key_source.load_private_key(facility_id).await?;
        if key.size() * 8 < SIGNER_MIN_RSA_BITS {
            return Err(ClaimError::data_corrupt(
                "SIGNER_KEY_TOO_SMALL",
                format!("key for facility {facility_id} is smaller than {SIGNER_MIN_RSA_BITS} bits"),
            ));
        }
        self.key_cache.lock().put(facility_id, key.clone());
        Ok(key)
    }

    /// Sign `bundle_bytes` as given: the caller is responsible for
    /// canonicalization (spec §4.6 — "the Signer does not re-canonicalize").
    pub async fn sign(&self, facility_id: FacilityId, bundle_bytes: &[u8]) -> Result<SignResult, ClaimError> {
        let now = Utc::now();
        let cert = self
            .catalogue
            .get_active_certificate(facility_id, now)
            .await?
            .ok_or_else(|| {
                ClaimError::not_found(
                    "SIGNER_CERT_NOT_FOUND",
                    format!("no signing certificate on file for facility {facility_id}"),
                )
            })?;

        if !cert.is_valid_at(now) {
            return Err(ClaimError::conflict(
                "SIGNER_CERT_EXPIRED",
                format!("signing certificate {} for facility {facility_id} is outside its validity window", cert.serial),
            ));
        }

        let key = self.key_for(facility_id).await?;
        let digest = Sha256::digest(bundle_bytes);

        let signature = key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| ClaimError::internal("SIGNER_SIGN_FAILED", e.to_string()))?;

        Ok(SignResult {
            signature_b64: BASE64.encode(signature),
            cert_serial: cert.serial,
            signed_at: now,
            algorithm: SIGNER_ALGORITHM.to_string(),
        })
    }

    pub fn verify(
        public_key: &RsaPublicKey,
        bundle_bytes: &[u8],
        signature_b64: &str,
    ) -> Result<(), ClaimError> {
        let signature = BASE64
            .decode(signature_b64)
            .map_err(|e| ClaimError::invalid_input("SIGNER_SIGNATURE_NOT_BASE64", e.to_string()))?;
        let digest = Sha256::digest(bundle_bytes);
        public_key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .map_err(|_| ClaimError::invalid_input("SIGNER_SIGNATURE_INVALID", "signature verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nphies_core::catalogue::{Bundle, CertificateMeta, MappingSource, PricingTier, SbsMapping};
    use nphies_core::types::PayerId;
    use rand::thread_rng;
    use rsa::RsaPublicKey as PubKey;

    struct FakeCatalogue {
        cert: Option<CertificateMeta>,
    }

    #[async_trait]
    impl CatalogueStore for FakeCatalogue {
        async fn get_sbs_mapping(&self, _f: FacilityId, _c: &str) -> Result<Option<SbsMapping>, ClaimError> {
            Ok(None)
        }
        async fn get_pricing_tier(&self, _f: FacilityId, _p: PayerId) -> Result<Option<PricingTier>, ClaimError> {
            Ok(None)
        }
        async fn get_candidate_bundles(&self, _f: FacilityId, _codes: &[String]) -> Result<Vec<Bundle>, ClaimError> {
            Ok(vec![])
        }
        async fn get_active_certificate(&self, _f: FacilityId, _at: DateTime<Utc>) -> Result<Option<CertificateMeta>, ClaimError> {
            Ok(self.cert.clone())
        }
        async fn record_ai_suggestion(&self, _mapping: &SbsMapping) -> Result<(), ClaimError> {
            Ok(())
        }
    }

    struct FixedKeySource {
        key: RsaPrivateKey,
    }

    #[async_trait]
    impl KeySourceProvider for FixedKeySource {
        async fn load_private_key(&self, _facility_id: FacilityId) -> Result<RsaPrivateKey, ClaimError> {
            Ok(self.key.clone())
        }
    }

    fn active_cert() -> CertificateMeta {
        let now = Utc::now();
        CertificateMeta {
            facility_id: FacilityId(1),
            serial: "CERT-1".into(),
            not_before: now - chrono::Duration::days(1),
            not_after: now + chrono::Duration::days(1),
        }
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = PubKey::from(&key);

        let signer = Signer::new(Arc::new(FakeCatalogue { cert: Some(active_cert()) }), Arc::new(FixedKeySource { key }));

        let result = signer.sign(FacilityId(1), b"canonicalized-bundle").await.unwrap();
        assert_eq!(result.cert_serial, "CERT-1");
        assert_eq!(result.algorithm, SIGNER_ALGORITHM);
        Signer::verify(&public_key, b"canonicalized-bundle", &result.signature_b64).unwrap();
    }

    #[tokio::test]
    async fn tampered_bundle_fails_verification() {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = PubKey::from(&key);
        let signer = Signer::new(Arc::new(FakeCatalogue { cert: Some(active_cert()) }), Arc::new(FixedKeySource { key }));

        let result = signer.sign(FacilityId(1), b"original").await.unwrap();
        let err = Signer::verify(&public_key, b"tampered", &result.signature_b64).unwrap_err();
        assert_eq!(err.code, "SIGNER_SIGNATURE_INVALID");
    }

    #[tokio::test]
    async fn missing_certificate_is_not_found() {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let signer = Signer::new(Arc::new(FakeCatalogue { cert: None }), Arc::new(FixedKeySource { key }));

        let err = signer.sign(FacilityId(1), b"bundle").await.unwrap_err();
        assert_eq!(err.code, "SIGNER_CERT_NOT_FOUND");
    }

    #[tokio::test]
    async fn expired_certificate_is_conflict() {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let now = Utc::now();
        let expired = CertificateMeta {
            facility_id: FacilityId(1),
            serial: "CERT-OLD".into(),
            not_before: now - chrono::Duration::days(30),
            not_after: now - chrono::Duration::days(1),
        };
        let signer = Signer::new(Arc::new(FakeCatalogue { cert: Some(expired) }), Arc::new(FixedKeySource { key }));

        let err = signer.sign(FacilityId(1), b"bundle").await.unwrap_err();
        assert_eq!(err.code, "SIGNER_CERT_EXPIRED");
    }
}
