//! Private key acquisition (spec §4.6), kept behind a trait so a KMS or
//! vault integration can replace [`EnvKeySource`] without touching the
//! signer itself — the same external-collaborator seam the corpus uses for
//! its AI suggestion provider.

use std::collections::HashMap;

use async_trait::async_trait;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use nphies_core::types::FacilityId;
use nphies_envelope::ClaimError;

#[async_trait]
pub trait KeySourceProvider: Send + Sync {
    async fn load_private_key(&self, facility_id: FacilityId) -> Result<RsaPrivateKey, ClaimError>;
}

/// Reads a PEM-encoded PKCS#8 RSA private key from an environment variable
/// named per-facility by `signer.key_source` config (`private_key_ref`).
/// Standing in for a KMS/HSM-backed provider in deployments that have one.
pub struct EnvKeySource {
    env_var_by_facility: HashMap<FacilityId, String>,
}

impl EnvKeySource {
    pub fn new(env_var_by_facility: HashMap<FacilityId, String>) -> Self {
        EnvKeySource { env_var_by_facility }
    }
}

#[async_trait]
impl KeySourceProvider for EnvKeySource {
    async fn load_private_key(&self, facility_id: FacilityId) -> Result<RsaPrivateKey, ClaimError> {
        let var_name = self.env_var_by_facility.get(&facility_id).ok_or_else(|| {
            ClaimError::not_found(
                "SIGNER_KEY_REF_NOT_CONFIGURED",
                format!("no private_key_ref configured for facility {facility_id}"),
            )
        })?;

        let pem = Zeroizing::new(std::env::var(var_name).map_err(|_| {
            ClaimError::not_found(
                "SIGNER_KEY_NOT_FOUND",
                format!("environment variable {var_name} is not set"),
            )
        })?);

        RsaPrivateKey::from_pkcs8_pem(pem.as_str()).map_err(|e| {
            ClaimError::data_corrupt("SIGNER_KEY_PARSE_FAILED", format!("invalid PKCS#8 private key: {e}"))
        })
    }
}
