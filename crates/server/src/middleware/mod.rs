//! HTTP middleware for the gateway server.
//!
//! Admission control and caching live in `sluice_core`; this module only handles transport
//! concerns such as request correlation.

pub mod correlation_id;

pub use correlation_id::{
    create_request_id_layers, make_request_span, request_id, UuidRequestIdGenerator,
    X_REQUEST_ID,
};
