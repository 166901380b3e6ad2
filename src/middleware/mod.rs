//! Ambient HTTP middleware (SPEC_FULL §10.4, §10.5)
//!
//! The distilled specification has no opinion on request tracing; the
//! teacher's middleware stack is carried for the thin discovery HTTP
//! surface (§10.6) the same way it would be for any other axum route.

pub mod request_tracking;

pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
