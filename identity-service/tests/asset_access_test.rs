//! Integration coverage of permission-gated asset operations and
//! at-rest protection of confidential content.

mod common;

use common::*;

use identity_service::models::{AssetPayload, PermissionSet, ResourceClass};
use identity_service::services::CreateAssetRequest;
use identity_service::stores::{AssetCatalog, BlobStore};
use identity_service::AppError;
use service_core::error::GENERIC_CRYPTO_MESSAGE;
use uuid::Uuid;

fn confidential_request(bytes: &[u8]) -> CreateAssetRequest {
    CreateAssetRequest {
        kind: ResourceClass::Confidential,
        file_name: Some("q3-forecast.pdf".to_string()),
        mime_type: "application/pdf".to_string(),
        description: Some("board only".to_string()),
        bytes: bytes.to_vec(),
    }
}

async fn admin_claims(h: &TestHarness) -> identity_service::services::TokenClaims {
    let (_, admin_role) = seed_default_roles(h).await;
    let principal_id = register_approved(h, "admin@example.com", "s3cure-enough!").await;
    h.state
        .auth
        .assign_role(principal_id, admin_role)
        .await
        .unwrap();
    let session = login_with_mfa(h, "admin@example.com", "s3cure-enough!", TEST_IP).await;
    h.state.verify_token(&session.token).unwrap()
}

#[tokio::test]
async fn guest_gets_authorization_error_for_any_confidential_asset() {
    let h = harness();
    let admin = admin_claims(&h).await;

    // One confidential asset exists.
    let record = h
        .state
        .assets
        .create(&admin, confidential_request(b"the numbers"))
        .await
        .unwrap();

    // A Guest principal, whose role holds no confidential grants.
    let guest_session = {
        register_approved(&h, "guest@example.com", "s3cure-enough!").await;
        login_with_mfa(&h, "guest@example.com", "s3cure-enough!", TEST_IP).await
    };
    let guest = h.state.verify_token(&guest_session.token).unwrap();

    // Existing asset: authorization error, not found never leaks.
    let existing = h
        .state
        .assets
        .get(&guest, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap_err();
    assert!(matches!(existing, AppError::Authorization(_)));

    // Nonexistent asset: the identical class of error.
    let missing = h
        .state
        .assets
        .get(&guest, ResourceClass::Confidential, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::Authorization(_)));
}

#[tokio::test]
async fn confidential_assets_round_trip_and_are_encrypted_at_rest() {
    let h = harness();
    let admin = admin_claims(&h).await;
    let plaintext = b"meeting notes: acquire the competitor".to_vec();

    let record = h
        .state
        .assets
        .create(&admin, confidential_request(&plaintext))
        .await
        .unwrap();

    match &record.payload {
        AssetPayload::Sealed { nonce, tag, key_version } => {
            assert_eq!(nonce.len(), 12);
            assert_eq!(tag.len(), 16);
            assert_eq!(key_version, "v1");
        }
        AssetPayload::Plain { .. } => panic!("confidential asset stored plain"),
    }

    // What sits in blob storage is ciphertext, not the plaintext.
    let at_rest = h.blobs.get(record.asset_id).await.unwrap().unwrap();
    assert_ne!(at_rest, plaintext);
    assert_eq!(at_rest.len(), plaintext.len());

    let content = h
        .state
        .assets
        .get(&admin, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap();
    assert_eq!(content.bytes, plaintext);
}

#[tokio::test]
async fn tampered_ciphertext_fails_with_the_generic_crypto_error() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let record = h
        .state
        .assets
        .create(&admin, confidential_request(b"immutable truth"))
        .await
        .unwrap();

    // Storage-layer compromise: flip one bit of the stored ciphertext.
    let mut at_rest = h.blobs.get(record.asset_id).await.unwrap().unwrap();
    at_rest[0] ^= 0x01;
    h.blobs.put(record.asset_id, at_rest).await.unwrap();

    let err = h
        .state
        .assets
        .get(&admin, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Crypto));
    assert_eq!(err.to_string(), GENERIC_CRYPTO_MESSAGE);
}

#[tokio::test]
async fn plain_assets_bypass_the_engine_and_carry_a_content_hash() {
    let h = harness();
    let admin = admin_claims(&h).await;
    let bytes = b"plain old picture".to_vec();

    let record = h
        .state
        .assets
        .create(
            &admin,
            CreateAssetRequest {
                kind: ResourceClass::Image,
                file_name: Some("cat.png".to_string()),
                mime_type: "image/png".to_string(),
                description: None,
                bytes: bytes.clone(),
            },
        )
        .await
        .unwrap();

    assert!(matches!(record.payload, AssetPayload::Plain { .. }));

    // Stored verbatim.
    let at_rest = h.blobs.get(record.asset_id).await.unwrap().unwrap();
    assert_eq!(at_rest, bytes);

    let content = h
        .state
        .assets
        .get(&admin, ResourceClass::Image, record.asset_id)
        .await
        .unwrap();
    assert_eq!(content.bytes, bytes);

    // Silent corruption of plain content is caught by the hash.
    h.blobs
        .put(record.asset_id, b"swapped content".to_vec())
        .await
        .unwrap();
    let err = h
        .state
        .assets
        .get(&admin, ResourceClass::Image, record.asset_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Crypto));
}

#[tokio::test]
async fn updates_reencrypt_under_the_assets_existing_key_version() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let record = h
        .state
        .assets
        .create(&admin, confidential_request(b"first draft"))
        .await
        .unwrap();

    // The deployment's current key version moves on to v2; the stores stay.
    let rotated_state = state_over(
        "v2",
        h.credentials.clone(),
        h.ledger.clone(),
        h.blobs.clone(),
        h.catalog.clone(),
        h.geo.clone(),
    );

    let updated = rotated_state
        .assets
        .update_content(&admin, ResourceClass::Confidential, record.asset_id, b"second draft")
        .await
        .unwrap();
    match &updated.payload {
        AssetPayload::Sealed { key_version, .. } => {
            assert_eq!(key_version, "v1", "update must reuse the stored version");
        }
        AssetPayload::Plain { .. } => panic!("confidential asset stored plain"),
    }
    assert!(updated.updated_utc.is_some());

    // Still decryptable from either deployment generation.
    let content = rotated_state
        .assets
        .get(&admin, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap();
    assert_eq!(content.bytes, b"second draft");

    // Assets created by the rotated deployment get the new version.
    let fresh = rotated_state
        .assets
        .create(&admin, confidential_request(b"fresh"))
        .await
        .unwrap();
    match &fresh.payload {
        AssetPayload::Sealed { key_version, .. } => assert_eq!(key_version, "v2"),
        AssetPayload::Plain { .. } => panic!("confidential asset stored plain"),
    }
}

#[tokio::test]
async fn soft_delete_hides_the_asset_but_keeps_the_record() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let record = h
        .state
        .assets
        .create(&admin, confidential_request(b"short-lived"))
        .await
        .unwrap();

    h.state
        .assets
        .delete(&admin, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap();

    let err = h
        .state
        .assets
        .get(&admin, ResourceClass::Confidential, record.asset_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // The record survives with its deletion audit fields stamped.
    let stored = h.catalog.fetch(record.asset_id).await.unwrap().unwrap();
    assert!(stored.deleted_utc.is_some());
    assert_eq!(stored.deleted_by, Some(admin.sub));
}

#[tokio::test]
async fn kind_mismatch_is_not_found_even_with_permission() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let record = h
        .state
        .assets
        .create(
            &admin,
            CreateAssetRequest {
                kind: ResourceClass::Document,
                file_name: None,
                mime_type: "text/plain".to_string(),
                description: None,
                bytes: b"a document".to_vec(),
            },
        )
        .await
        .unwrap();

    let err = h
        .state
        .assets
        .get(&admin, ResourceClass::Image, record.asset_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn grants_are_scoped_to_their_resource_class() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let image = h
        .state
        .assets
        .create(
            &admin,
            CreateAssetRequest {
                kind: ResourceClass::Image,
                file_name: None,
                mime_type: "image/png".to_string(),
                description: None,
                bytes: b"pixels".to_vec(),
            },
        )
        .await
        .unwrap();
    let document = h
        .state
        .assets
        .create(
            &admin,
            CreateAssetRequest {
                kind: ResourceClass::Document,
                file_name: None,
                mime_type: "text/plain".to_string(),
                description: None,
                bytes: b"words".to_vec(),
            },
        )
        .await
        .unwrap();

    // A role holding only view_image.
    let viewer_role = seed_role(&h, "ImageViewer", {
        let mut set = PermissionSet::new();
        set.grant("view_image".parse().unwrap());
        set
    })
    .await;
    let principal_id = register_approved(&h, "viewer@example.com", "s3cure-enough!").await;
    h.state
        .auth
        .assign_role(principal_id, viewer_role)
        .await
        .unwrap();
    let session = login_with_mfa(&h, "viewer@example.com", "s3cure-enough!", TEST_IP).await;
    let viewer = h.state.verify_token(&session.token).unwrap();

    assert!(h
        .state
        .assets
        .get(&viewer, ResourceClass::Image, image.asset_id)
        .await
        .is_ok());
    assert!(matches!(
        h.state
            .assets
            .get(&viewer, ResourceClass::Document, document.asset_id)
            .await,
        Err(AppError::Authorization(_))
    ));
    assert!(matches!(
        h.state
            .assets
            .create(
                &viewer,
                CreateAssetRequest {
                    kind: ResourceClass::Image,
                    file_name: None,
                    mime_type: "image/png".to_string(),
                    description: None,
                    bytes: b"more pixels".to_vec(),
                }
            )
            .await,
        Err(AppError::Authorization(_))
    ));
}

#[tokio::test]
async fn metadata_updates_patch_only_the_given_fields() {
    let h = harness();
    let admin = admin_claims(&h).await;

    let record = h
        .state
        .assets
        .create(&admin, confidential_request(b"content"))
        .await
        .unwrap();

    let updated = h
        .state
        .assets
        .update_metadata(
            &admin,
            ResourceClass::Confidential,
            record.asset_id,
            Some("renamed".to_string()),
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.description.as_deref(), Some("renamed"));
    assert_eq!(updated.file_name, record.file_name);
    assert_eq!(updated.updated_by, Some(admin.sub));
}
