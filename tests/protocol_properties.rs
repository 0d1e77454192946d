use std::sync::Arc;

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use rollcall::config::ProtocolSettings;
use rollcall::crypto::credential::{generate_nonce, Credential};
use rollcall::crypto::secret::SessionSecret;
use rollcall::error::RejectReason;
use rollcall::models::session::Session;
use rollcall::repositories::memory::MemoryStore;
use rollcall::services::scan::Outcome;
use rollcall::state::Protocol;

const HOUR_MS: i64 = 3_600_000;
const PHONE_A: &str = "phone-a-fingerprint";
const PHONE_B: &str = "phone-b-fingerprint";

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

fn settings() -> ProtocolSettings {
    ProtocolSettings {
        cadence_ms: 5_000,
        tolerance_windows: 1,
    }
}

struct Harness {
    store: MemoryStore,
    protocol: Protocol,
    issuer_id: Uuid,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let protocol = Protocol::in_memory(store.clone(), settings());
        Self {
            store,
            protocol,
            issuer_id: Uuid::new_v4(),
        }
    }

    /// Opens a session valid for the first hour after the epoch.
    async fn open(&self) -> Session {
        self.protocol
            .issuer
            .open_session(self.issuer_id, at(0), at(HOUR_MS), at(0))
            .await
            .unwrap()
    }

    async fn credential(&self, session_id: Uuid, ms: i64) -> String {
        self.protocol
            .issuer
            .issue_credential(session_id, at(ms))
            .await
            .unwrap()
    }

    async fn register(&self, bearer_id: Uuid, fingerprint: &str) {
        self.protocol
            .scanner
            .register_device(bearer_id, fingerprint, Some("phone"), at(0))
            .await
            .unwrap();
    }

    async fn scan(&self, raw: &str, bearer_id: Uuid, fingerprint: &str, ms: i64) -> Outcome {
        self.protocol
            .scanner
            .submit_scan(raw, bearer_id, fingerprint, at(ms))
            .await
            .unwrap()
    }

    async fn verify(&self, raw: &str, ms: i64) -> Result<Uuid, RejectReason> {
        self.protocol
            .scanner
            .verifier()
            .verify(raw, at(ms))
            .await
            .map_err(|e| e.reject_reason().unwrap())
    }

    async fn count(&self, session_id: Uuid) -> i64 {
        self.protocol
            .scanner
            .ledger()
            .count_for_session(session_id)
            .await
            .unwrap()
    }
}

fn rejected(outcome: &Outcome) -> Option<RejectReason> {
    match outcome {
        Outcome::Rejected { reason } => Some(*reason),
        _ => None,
    }
}

#[tokio::test]
async fn test_issued_credential_verifies_in_its_own_window() {
    let h = Harness::new();
    let session = h.open().await;
    let credential = h.credential(session.id, 1_000).await;

    assert_eq!(h.verify(&credential, 1_000).await, Ok(session.id));
    assert_eq!(h.verify(&credential, 4_999).await, Ok(session.id));
}

#[tokio::test]
async fn test_freshness_is_symmetric_within_tolerance() {
    let h = Harness::new();
    let session = h.open().await;
    // Window 2.
    let credential = h.credential(session.id, 10_000).await;

    assert_eq!(h.verify(&credential, 5_000).await, Ok(session.id));
    assert_eq!(h.verify(&credential, 19_999).await, Ok(session.id));
    assert_eq!(h.verify(&credential, 4_999).await, Err(RejectReason::Expired));
    assert_eq!(h.verify(&credential, 20_000).await, Err(RejectReason::Expired));
}

#[tokio::test]
async fn test_scan_accepted_one_window_late_and_expired_two_windows_late() {
    let h = Harness::new();
    let session = h.open().await;
    let early = Uuid::new_v4();
    let late = Uuid::new_v4();
    h.register(early, PHONE_A).await;
    h.register(late, PHONE_B).await;

    let credential = h.credential(session.id, 1_000).await;

    let outcome = h.scan(&credential, early, PHONE_A, 6_000).await;
    assert!(matches!(outcome, Outcome::Recorded { .. }));

    let outcome = h.scan(&credential, late, PHONE_B, 11_500).await;
    assert_eq!(rejected(&outcome), Some(RejectReason::Expired));
    assert_eq!(h.count(session.id).await, 1);
}

#[tokio::test]
async fn test_duplicate_scan_returns_original_record() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;

    let first = h.scan(&h.credential(session.id, 1_000).await, bearer, PHONE_A, 1_000).await;
    let second = h.scan(&h.credential(session.id, 7_000).await, bearer, PHONE_A, 7_000).await;

    let Outcome::Recorded { record: original } = first else {
        panic!("expected Recorded, got {first:?}");
    };
    let Outcome::AlreadyRecorded { record: repeat } = second else {
        panic!("expected AlreadyRecorded, got {second:?}");
    };
    assert_eq!(original, repeat);
    assert_eq!(repeat.scanned_at, at(1_000));
    assert_eq!(h.count(session.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scans_record_once() {
    let h = Arc::new(Harness::new());
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;
    let credential = h.credential(session.id, 1_000).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            let credential = credential.clone();
            tokio::spawn(async move { h.scan(&credential, bearer, PHONE_A, 2_000).await })
        })
        .collect();

    let outcomes: Vec<Outcome> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let recorded = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Recorded { .. }))
        .count();
    let repeated = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::AlreadyRecorded { .. }))
        .count();
    assert_eq!(recorded, 1);
    assert_eq!(repeated, 7);
    assert_eq!(h.count(session.id).await, 1);
}

#[tokio::test]
async fn test_promoting_a_new_device_retires_the_old_one() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();

    h.register(bearer, PHONE_A).await;
    let credential = h.credential(session.id, 1_000).await;

    h.register(bearer, PHONE_B).await;
    let outcome = h.scan(&credential, bearer, PHONE_A, 1_000).await;
    assert_eq!(rejected(&outcome), Some(RejectReason::ForeignOrUnregisteredDevice));
    assert_eq!(h.count(session.id).await, 0);

    let outcome = h.scan(&credential, bearer, PHONE_B, 1_000).await;
    assert!(matches!(outcome, Outcome::Recorded { .. }));

    let devices = h.protocol.scanner.devices().list_devices(bearer).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices.iter().filter(|d| d.active).count(), 1);
}

#[tokio::test]
async fn test_another_bearers_device_is_refused() {
    let h = Harness::new();
    let session = h.open().await;
    let owner = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    h.register(owner, PHONE_A).await;

    let credential = h.credential(session.id, 1_000).await;
    let outcome = h.scan(&credential, borrower, PHONE_A, 1_000).await;

    assert_eq!(rejected(&outcome), Some(RejectReason::ForeignOrUnregisteredDevice));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_promotions_leave_one_active_device() {
    let h = Arc::new(Harness::new());
    let bearer = Uuid::new_v4();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                h.protocol
                    .scanner
                    .register_device(bearer, &format!("fingerprint-{i:02}"), None, at(i))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let devices = h.protocol.scanner.devices().list_devices(bearer).await.unwrap();
    assert_eq!(devices.len(), 16);
    assert_eq!(devices.iter().filter(|d| d.active).count(), 1);
}

#[tokio::test]
async fn test_rejection_writes_nothing() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;

    let mut credential = Credential::parse(&h.credential(session.id, 1_000).await).unwrap();
    credential.window_index += 1;

    let outcome = h.scan(&credential.to_string(), bearer, PHONE_A, 1_000).await;
    assert_eq!(rejected(&outcome), Some(RejectReason::InvalidSignature));
    assert_eq!(h.count(session.id).await, 0);
}

#[tokio::test]
async fn test_closed_session_refuses_issue_and_scan() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;
    let credential = h.credential(session.id, 1_000).await;

    h.protocol
        .issuer
        .close_session(h.issuer_id, session.id)
        .await
        .unwrap();

    let issued = h.protocol.issuer.issue_credential(session.id, at(1_000)).await;
    assert_eq!(
        issued.unwrap_err().reject_reason(),
        Some(RejectReason::SessionInactive)
    );

    let outcome = h.scan(&credential, bearer, PHONE_A, 1_000).await;
    assert_eq!(rejected(&outcome), Some(RejectReason::SessionClosed));
}

#[tokio::test]
async fn test_session_past_its_end_is_closed() {
    let h = Harness::new();
    let session = h.open().await;
    let credential = h.credential(session.id, HOUR_MS - 1_000).await;

    assert_eq!(h.verify(&credential, HOUR_MS + 1).await, Err(RejectReason::SessionClosed));
}

#[tokio::test]
async fn test_unknown_session_is_reported() {
    let h = Harness::new();
    let forged = Credential::sign(&SessionSecret::generate(), Uuid::new_v4(), 0, generate_nonce());

    assert_eq!(
        h.verify(&forged.to_string(), 1_000).await,
        Err(RejectReason::UnknownSession)
    );
}

#[tokio::test]
async fn test_structural_garbage_is_malformed() {
    let h = Harness::new();
    for raw in ["", "   ", "hello", "https://example.edu/attend", "a|b|c:d"] {
        assert_eq!(
            h.verify(raw, 1_000).await,
            Err(RejectReason::MalformedPayload),
            "{raw:?}"
        );
    }
}

#[tokio::test]
async fn test_url_wrapped_and_encoded_scan_is_accepted() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;

    let credential = h.credential(session.id, 1_000).await;
    let encoded = credential.replace('|', "%7C").replace(':', "%3A");
    let raw = format!("\u{200E}  https://example.edu/attend?qr={encoded}&utm=poster \n");

    let outcome = h.scan(&raw, bearer, PHONE_A, 1_000).await;
    assert!(matches!(outcome, Outcome::Recorded { .. }));
}

#[tokio::test]
async fn test_storage_outage_is_not_a_rejection() {
    let h = Harness::new();
    let session = h.open().await;
    let bearer = Uuid::new_v4();
    h.register(bearer, PHONE_A).await;
    let credential = h.credential(session.id, 1_000).await;

    h.store.set_unavailable(true);
    let err = h
        .protocol
        .scanner
        .submit_scan(&credential, bearer, PHONE_A, at(1_000))
        .await
        .unwrap_err();
    assert!(err.is_storage_unavailable());
    assert_eq!(err.reject_reason(), None);

    h.store.set_unavailable(false);
    assert_eq!(h.count(session.id).await, 0);
}

#[tokio::test]
async fn test_sweeper_closes_elapsed_sessions() {
    let h = Harness::new();
    let session = h.open().await;

    let closed = h.protocol.issuer.expire_elapsed(at(HOUR_MS + 1)).await.unwrap();
    assert_eq!(closed, 1);

    let stored = h.protocol.issuer.owned_session(h.issuer_id, session.id).await.unwrap();
    assert!(!stored.active);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_any_signature_flip_is_invalid(
        position in 0usize..64,
        replacement in proptest::char::range(' ', '~'),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            let session = h.open().await;
            let mut credential = Credential::parse(&h.credential(session.id, 1_000).await).unwrap();

            let original = credential.signature.as_bytes()[position] as char;
            prop_assume!(original != replacement);

            credential
                .signature
                .replace_range(position..position + 1, &replacement.to_string());

            prop_assert_eq!(
                h.verify(&credential.to_string(), 1_000).await,
                Err(RejectReason::InvalidSignature)
            );
            Ok(())
        })?;
    }

    #[test]
    fn prop_delimiter_flips_are_invalid(
        position in 0usize..64,
        replacement in prop::sample::select(vec![':', '|', '%']),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            let session = h.open().await;
            let mut credential = Credential::parse(&h.credential(session.id, 1_000).await).unwrap();
            credential
                .signature
                .replace_range(position..position + 1, &replacement.to_string());

            prop_assert_eq!(
                h.verify(&credential.to_string(), 1_000).await,
                Err(RejectReason::InvalidSignature)
            );
            Ok(())
        })?;
    }

    #[test]
    fn prop_window_index_matches_floor_division(ms in -10_000_000i64..10_000_000, cadence in 1i64..60_000) {
        let window = rollcall::clock::window_index(ms, cadence);
        prop_assert!(window * cadence <= ms);
        prop_assert!(ms < (window + 1) * cadence);
    }
}
