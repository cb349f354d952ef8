//! Pipeline orchestrator.
//!
//! Runs the seven stages as an explicit ordered list, short-circuiting on
//! the first failure. The order is increasing cost and decreasing safety of
//! the information a failure reveals: cheap network/credential checks
//! first, crypto last.

use crate::adapters::memory::{GovernorRateStore, InMemoryNonceStore};
use crate::domain::config::{ConfigError, GateConfig};
use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{StageId, VerificationResult};
use crate::domain::keys::KeyRing;
use crate::ports::stores::{NonceStore, RateStore};
use crate::stages::{
    ApiKeyStage, DecryptStage, IpGateStage, JwtStage, RateLimitStage, ReplayStage, SignatureStage,
    StageOutcome, VerifyContext, VerifyStage,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// The seven-stage verification pipeline.
pub struct Pipeline {
    stages: Vec<Box<dyn VerifyStage>>,
    keys: Arc<RwLock<KeyRing>>,
    nonce_store: Arc<dyn NonceStore>,
    rate_store: Arc<dyn RateStore>,
    replay_window: Duration,
}

impl Pipeline {
    /// Build a pipeline with in-process stores (single-instance
    /// deployment).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        let nonce_store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new());
        let rate_store: Arc<dyn RateStore> = Arc::new(GovernorRateStore::new(
            config.rate_limit.requests_per_minute,
            config.rate_limit.burst_size,
        ));
        Self::with_stores(config, nonce_store, rate_store)
    }

    /// Build a pipeline over caller-supplied stores (shared external
    /// stores for multi-instance deployments, instrumented stores in
    /// tests).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn with_stores(
        config: &GateConfig,
        nonce_store: Arc<dyn NonceStore>,
        rate_store: Arc<dyn RateStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let allowlist = config.parsed_allowlist()?;
        let keys = Arc::new(RwLock::new(KeyRing::from_config(config)?));

        // The stage order is the contract: cheap and broadly revealable
        // first, expensive and oracle-prone last.
        let stages: Vec<Box<dyn VerifyStage>> = vec![
            Box::new(IpGateStage::new(allowlist)),
            Box::new(ApiKeyStage::new(Arc::clone(&keys))),
            Box::new(JwtStage::new(
                Arc::clone(&keys),
                config.jwt.issuer.clone(),
                config.jwt.audience.clone(),
                config.jwt.leeway_secs,
            )),
            Box::new(SignatureStage::new(Arc::clone(&keys))),
            Box::new(ReplayStage::new(
                Arc::clone(&nonce_store),
                config.replay.window,
                config.replay.max_skew,
            )),
            Box::new(RateLimitStage::new()),
            Box::new(DecryptStage::new(Arc::clone(&keys))),
        ];

        Ok(Self {
            stages,
            keys,
            nonce_store,
            rate_store,
            replay_window: config.replay.window,
        })
    }

    /// Verify one envelope. Returns the single, never-partial decision.
    pub fn verify(&self, envelope: &SecureEnvelope) -> VerificationResult {
        self.verify_at(envelope, unix_now())
    }

    fn verify_at(&self, envelope: &SecureEnvelope, now: u64) -> VerificationResult {
        // Debit the call budget up front: an attempt that fails an early
        // stage still consumes one unit, so early-stage failures cannot
        // be used to probe for free.
        let debit = self.rate_store.try_consume(&envelope.rate_identity());
        let mut ctx = VerifyContext::new(now, debit);

        for stage in &self.stages {
            match stage.verify(envelope, &mut ctx) {
                StageOutcome::Pass => {}
                StageOutcome::Reject(reason) => {
                    warn!(
                        stage = %stage.id(),
                        reason = %reason,
                        api_key_id = %envelope.api_key_id,
                        "Envelope rejected"
                    );
                    return VerificationResult::Rejected {
                        stage: stage.id(),
                        reason,
                    };
                }
            }
        }

        match ctx.payload.take() {
            Some(payload) => {
                debug!(api_key_id = %envelope.api_key_id, "Envelope accepted");
                VerificationResult::Accepted { payload }
            }
            // Unreachable while DecryptStage is terminal; keep the gate
            // closed if the stage list is ever rewired badly.
            None => VerificationResult::Rejected {
                stage: StageId::Decrypt,
                reason: crate::domain::error::RejectReason::DecryptionFailed,
            },
        }
    }

    /// Swap in new key material (rotation without downtime). The rest of
    /// the configuration stays as built.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the new key material fails to decode; the
    /// current ring stays active in that case.
    pub fn reload_keys(&self, config: &GateConfig) -> Result<(), ConfigError> {
        let ring = KeyRing::from_config(config)?;
        *self.keys.write() = ring;
        debug!("Key ring reloaded");
        Ok(())
    }

    /// Evict nonce records older than the replay window and rate buckets
    /// idle past `bucket_max_age`. Call from a periodic sweep; never
    /// blocks verification.
    pub fn sweep_expired(&self, bucket_max_age: Duration) {
        let cutoff = unix_now().saturating_sub(self.replay_window.as_secs());
        self.nonce_store.evict_expired(cutoff);
        self.rate_store.cleanup(bucket_max_age);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
