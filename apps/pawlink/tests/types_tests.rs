//! Unit tests for API types and error mapping.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use pawlink::api::{
    ErrorResponse, ExportResponse, FollowResponse, HealthResponse, PageQuery, StatusesRequest,
    status_for,
};
use pawlink_core::{GraphError, Mutation, Timestamp, UserId, primitives::MAX_PAGE_LIMIT};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// ERROR MAPPING TESTS
// =============================================================================

#[test]
fn test_status_codes() {
    assert_eq!(
        status_for(&GraphError::Unauthenticated),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_for(&GraphError::SelfFollowRejected),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        status_for(&GraphError::TransientStorageFailure("io".into())),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        status_for(&GraphError::InvariantViolation("drift".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_for(&GraphError::InvalidRequest("x".into())),
        StatusCode::BAD_REQUEST
    );
}

#[test]
fn test_invariant_details_hidden() {
    let body = ErrorResponse::from(&GraphError::InvariantViolation("user 7 drifted".into()));
    assert_eq!(body.code, "internal_error");
    assert!(!body.error.contains("user 7"));
}

#[test]
fn test_transient_error_code() {
    let body = ErrorResponse::from(&GraphError::TransientStorageFailure("lock".into()));
    assert_eq!(body.code, "storage_unavailable");
}

// =============================================================================
// FOLLOW RESPONSE TESTS
// =============================================================================

#[test]
fn test_follow_response_changed() {
    let mutation = Mutation::unfollowed(UserId(1), UserId(9), Timestamp(123));
    let body = FollowResponse::changed(&mutation);
    assert_eq!(body.target, 9);
    assert!(!body.following);
    assert!(body.changed);
    assert_eq!(body.at, Some(123));
}

#[test]
fn test_follow_response_unchanged_only_for_signals() {
    let already = FollowResponse::unchanged(4, &GraphError::AlreadyFollowing).unwrap();
    assert!(already.following);
    assert!(!already.changed);

    let not = FollowResponse::unchanged(4, &GraphError::NotFollowing).unwrap();
    assert!(!not.following);

    assert!(FollowResponse::unchanged(4, &GraphError::SelfFollowRejected).is_none());
}

#[test]
fn test_follow_response_serialization() {
    let body = FollowResponse::unchanged(2, &GraphError::AlreadyFollowing).unwrap();
    let json = serde_json::to_string(&body).unwrap();
    assert!(json.contains("\"changed\":false"));
    assert!(json.contains("\"following\":true"));
    assert!(json.contains("\"signal\":\"already_following\""));
}

// =============================================================================
// REQUEST VALIDATION TESTS
// =============================================================================

#[test]
fn test_page_query_defaults_and_clamps() {
    let page = PageQuery::default().to_page();
    assert_eq!(page.offset, 0);
    assert_eq!(page.limit, 50);

    let page = PageQuery {
        offset: Some(3),
        limit: Some(10_000),
    }
    .to_page();
    assert_eq!(page.offset, 3);
    assert_eq!(page.limit, MAX_PAGE_LIMIT);
}

#[test]
fn test_statuses_request_limit() {
    let ok = StatusesRequest {
        targets: vec![1, 2, 3],
    };
    assert!(ok.validate().is_ok());

    let too_many = StatusesRequest {
        targets: (0..501).collect(),
    };
    assert!(matches!(
        too_many.validate(),
        Err(GraphError::InvalidRequest(_))
    ));
}

// =============================================================================
// EXPORT RESPONSE TESTS
// =============================================================================

#[test]
fn test_export_response_success_encodes_base64() {
    let response = ExportResponse::success(&[1, 2, 3], 42, "ab".repeat(32), 0);
    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some("AQID"));
    assert_eq!(response.checksum, Some(42));
    assert!(response.error.is_none());
}

#[test]
fn test_export_response_error() {
    let response = ExportResponse::error("boom");
    assert!(!response.success);
    assert!(response.data.is_none());
    assert_eq!(response.error.as_deref(), Some("boom"));
}
