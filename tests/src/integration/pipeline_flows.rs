//! Full-pipeline decision flows: one coherent sender, one gate, and every
//! class of failure a caller can produce.

#[cfg(test)]
mod tests {
    use crate::support;
    use relay_gate::adapters::memory::{GovernorRateStore, InMemoryNonceStore};
    use relay_gate::ports::stores::{NonceStore, RateStore};
    use relay_gate::{Pipeline, RejectReason, StageId, VerificationResult};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    const PAYLOAD: &[u8] = br#"{"event":"subscription_activated","amount":999}"#;

    fn pipeline() -> Pipeline {
        Pipeline::new(&support::test_config()).expect("pipeline from fixture config")
    }

    fn pipeline_with_nonce_store() -> (Pipeline, Arc<InMemoryNonceStore>) {
        let nonce_store = Arc::new(InMemoryNonceStore::new());
        let config = support::test_config();
        let rate_store = Arc::new(GovernorRateStore::new(
            config.rate_limit.requests_per_minute,
            config.rate_limit.burst_size,
        ));
        let pipeline = Pipeline::with_stores(
            &config,
            Arc::clone(&nonce_store) as Arc<dyn NonceStore>,
            rate_store as Arc<dyn RateStore>,
        )
        .expect("pipeline from fixture config");
        (pipeline, nonce_store)
    }

    fn expect_rejection(result: VerificationResult, stage: StageId, reason: &RejectReason) {
        match result {
            VerificationResult::Rejected {
                stage: got_stage,
                reason: got_reason,
            } => {
                assert_eq!(got_stage, stage);
                assert_eq!(&got_reason, reason);
            }
            VerificationResult::Accepted { .. } => {
                panic!("expected rejection at {stage}, got acceptance")
            }
        }
    }

    #[test]
    fn test_valid_envelope_round_trips_to_plaintext() {
        let pipeline = pipeline();
        let envelope = support::valid_envelope(PAYLOAD);
        match pipeline.verify(&envelope) {
            VerificationResult::Accepted { payload } => assert_eq!(payload, PAYLOAD),
            VerificationResult::Rejected { stage, reason } => {
                panic!("valid envelope rejected at {stage}: {reason}")
            }
        }
    }

    #[test]
    fn test_resubmission_is_a_replay() {
        let pipeline = pipeline();
        let envelope = support::valid_envelope(PAYLOAD);
        assert!(pipeline.verify(&envelope).is_accepted());
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Replay,
            &RejectReason::ReplayedNonce,
        );
    }

    #[test]
    fn test_off_allowlist_caller_stops_at_the_first_gate() {
        let (pipeline, nonce_store) = pipeline_with_nonce_store();
        let envelope = support::builder_from(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 50)))
            .build(PAYLOAD)
            .unwrap();
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::IpGate,
            &RejectReason::IpNotAllowed,
        );
        // Nothing downstream ran: the nonce was never recorded.
        assert_eq!(nonce_store.len(), 0);
    }

    #[test]
    fn test_wrong_api_secret_rejected_as_invalid_credential() {
        let pipeline = pipeline();
        let mut envelope = support::valid_envelope(PAYLOAD);
        envelope.api_key_secret = "wrong-secret".into();
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::ApiKey,
            &RejectReason::InvalidCredential,
        );
    }

    #[test]
    fn test_unknown_key_id_indistinguishable_from_wrong_secret() {
        let pipeline = pipeline();
        let mut unknown_id = support::valid_envelope(PAYLOAD);
        unknown_id.api_key_id = "no-such-key".into();
        let mut wrong_secret = support::valid_envelope(PAYLOAD);
        wrong_secret.api_key_secret = "wrong-secret".into();

        // Same stage, same reason for both probes. The unknown-id case
        // fails the credential check; its later signature mismatch is
        // never reached.
        let a = pipeline.verify(&unknown_id);
        let b = pipeline.verify(&wrong_secret);
        for result in [a, b] {
            expect_rejection(
                result,
                StageId::ApiKey,
                &RejectReason::InvalidCredential,
            );
        }
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let pipeline = pipeline();
        let stale = support::signed_jwt_with("initiator", "core", support::unix_now() - 120);
        let envelope = support::builder_from(support::ALLOWED_IP)
            .build(PAYLOAD)
            .map(|mut e| {
                e.jwt = stale;
                e
            })
            .unwrap();
        match pipeline.verify(&envelope) {
            VerificationResult::Rejected {
                stage: StageId::Jwt,
                reason: RejectReason::InvalidToken(_),
            } => {}
            other => panic!("expected JWT rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_audience_jwt_rejected() {
        let pipeline = pipeline();
        let foreign = support::signed_jwt_with("initiator", "other-service", support::unix_now() + 60);
        let envelope = support::builder_from(support::ALLOWED_IP)
            .build(PAYLOAD)
            .map(|mut e| {
                e.jwt = foreign;
                e
            })
            .unwrap();
        match pipeline.verify(&envelope) {
            VerificationResult::Rejected {
                stage: StageId::Jwt,
                reason: RejectReason::InvalidToken(_),
            } => {}
            other => panic!("expected JWT rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_signed_field_fails_the_signature_stage() {
        let pipeline = pipeline();
        let mut envelope = support::valid_envelope(PAYLOAD);
        // Timestamp is signed; changing it invalidates the HMAC before
        // the replay stage ever sees the new value.
        envelope.timestamp += 1;
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Signature,
            &RejectReason::SignatureMismatch,
        );
    }

    #[test]
    fn test_flipped_signature_bit_rejected() {
        let pipeline = pipeline();
        let mut envelope = support::valid_envelope(PAYLOAD);
        envelope.signature[0] ^= 0x01;
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Signature,
            &RejectReason::SignatureMismatch,
        );
    }

    #[test]
    fn test_tampered_ciphertext_survives_until_decryption() {
        let pipeline = pipeline();
        let envelope = support::valid_envelope(PAYLOAD);

        // Re-sign after tampering so the canonical signature still
        // matches; only the GCM tag can catch it now.
        let mut tampered = envelope.clone();
        tampered.ciphertext[0] ^= 0x01;
        let key = relay_crypto::SigningKey::from_bytes(&support::SIGNING_KEY).unwrap();
        tampered.signature = relay_crypto::sign(&key, &tampered.canonical_bytes());

        expect_rejection(
            pipeline.verify(&tampered),
            StageId::Decrypt,
            &RejectReason::DecryptionFailed,
        );
    }

    #[test]
    fn test_flipped_auth_tag_survives_until_decryption() {
        let pipeline = pipeline();
        let mut envelope = support::valid_envelope(PAYLOAD);
        // The detached tag is not part of the canonical string, so the
        // HMAC stage still passes; only the GCM check can catch this.
        envelope.auth_tag[0] ^= 0x01;
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Decrypt,
            &RejectReason::DecryptionFailed,
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let pipeline = pipeline();
        let envelope = support::builder_from(support::ALLOWED_IP)
            .timestamp(support::unix_now() - 400)
            .build(PAYLOAD)
            .unwrap();
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Replay,
            &RejectReason::StaleOrFutureTimestamp,
        );
    }

    #[test]
    fn test_future_timestamp_beyond_skew_rejected() {
        let pipeline = pipeline();
        let envelope = support::builder_from(support::ALLOWED_IP)
            .timestamp(support::unix_now() + 120)
            .build(PAYLOAD)
            .unwrap();
        expect_rejection(
            pipeline.verify(&envelope),
            StageId::Replay,
            &RejectReason::StaleOrFutureTimestamp,
        );
    }

    #[test]
    fn test_budget_exhaustion_surfaces_at_the_rate_stage() {
        let mut config = support::test_config();
        config.rate_limit.requests_per_minute = 60;
        config.rate_limit.burst_size = 2;
        let pipeline = Pipeline::new(&config).unwrap();

        for _ in 0..2 {
            let envelope = support::valid_envelope(PAYLOAD);
            assert!(pipeline.verify(&envelope).is_accepted());
        }

        let envelope = support::valid_envelope(PAYLOAD);
        match pipeline.verify(&envelope) {
            VerificationResult::Rejected {
                stage: StageId::RateLimit,
                reason: RejectReason::RateLimited { retry_after_ms },
            } => assert!(retry_after_ms > 0),
            other => panic!("expected rate limiting, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_attempts_still_consume_budget() {
        let mut config = support::test_config();
        config.rate_limit.requests_per_minute = 60;
        config.rate_limit.burst_size = 2;
        let pipeline = Pipeline::new(&config).unwrap();

        // Two credential probes burn the whole burst even though they
        // reject well before the rate stage.
        for _ in 0..2 {
            let mut probe = support::valid_envelope(PAYLOAD);
            probe.api_key_secret = "wrong-secret".into();
            expect_rejection(
                pipeline.verify(&probe),
                StageId::ApiKey,
                &RejectReason::InvalidCredential,
            );
        }

        let legitimate = support::valid_envelope(PAYLOAD);
        match pipeline.verify(&legitimate) {
            VerificationResult::Rejected {
                stage: StageId::RateLimit,
                reason: RejectReason::RateLimited { .. },
            } => {}
            other => panic!("expected rate limiting, got {other:?}"),
        }
    }

    #[test]
    fn test_budget_refills_over_time() {
        let mut config = support::test_config();
        // 600/min refills one cell every 100ms.
        config.rate_limit.requests_per_minute = 600;
        config.rate_limit.burst_size = 1;
        let pipeline = Pipeline::new(&config).unwrap();

        assert!(pipeline.verify(&support::valid_envelope(PAYLOAD)).is_accepted());
        assert!(!pipeline.verify(&support::valid_envelope(PAYLOAD)).is_accepted());

        std::thread::sleep(std::time::Duration::from_millis(150));
        assert!(pipeline.verify(&support::valid_envelope(PAYLOAD)).is_accepted());
    }

    #[test]
    fn test_concurrent_identical_envelopes_admit_exactly_one() {
        let mut config = support::test_config();
        // Generous budget so only the replay guard can reject.
        config.rate_limit.requests_per_minute = 6000;
        config.rate_limit.burst_size = 100;
        let pipeline = Arc::new(Pipeline::new(&config).unwrap());
        let envelope = Arc::new(support::valid_envelope(PAYLOAD));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let envelope = Arc::clone(&envelope);
                std::thread::spawn(move || pipeline.verify(&envelope))
            })
            .collect();

        let mut accepted = 0;
        let mut replayed = 0;
        for handle in handles {
            match handle.join().expect("verifier thread") {
                VerificationResult::Accepted { .. } => accepted += 1,
                VerificationResult::Rejected {
                    stage: StageId::Replay,
                    reason: RejectReason::ReplayedNonce,
                } => replayed += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(replayed, 7);
    }

    #[test]
    fn test_sweep_keeps_fresh_nonces() {
        let (pipeline, nonce_store) = pipeline_with_nonce_store();
        assert!(pipeline.verify(&support::valid_envelope(PAYLOAD)).is_accepted());
        assert_eq!(nonce_store.len(), 1);

        // A sweep right after acceptance must not forget the nonce; the
        // replay guard still needs it for the rest of the window.
        pipeline.sweep_expired(std::time::Duration::from_secs(3600));
        assert_eq!(nonce_store.len(), 1);

        // Once the window has passed the entry, eviction clears it.
        nonce_store.evict_expired(support::unix_now() + 1);
        assert_eq!(nonce_store.len(), 0);
    }

    #[test]
    fn test_key_rotation_accepts_old_and_new_material() {
        let mut config = support::test_config();
        let new_signing: [u8; 32] = [0x77; 32];
        config.signing_keys.insert(0, hex::encode(new_signing));
        let pipeline = Pipeline::new(&config).unwrap();

        // Envelope signed with the old (fixture) key still verifies.
        assert!(pipeline.verify(&support::valid_envelope(PAYLOAD)).is_accepted());

        // And one signed with the new key does too.
        let envelope = relay_gate::EnvelopeBuilder::new(
            support::KEY_ID,
            support::KEY_SECRET,
            support::signed_jwt(60),
            relay_crypto::SigningKey::from_bytes(&new_signing).unwrap(),
            relay_crypto::EncryptionKey::from_bytes(&support::ENCRYPTION_KEY).unwrap(),
            support::ALLOWED_IP,
        )
        .build(PAYLOAD)
        .unwrap();
        assert!(pipeline.verify(&envelope).is_accepted());
    }
}
