//! Fuzz target for request/response envelope decoding
//!
//! # Invariants
//!
//! - Decoding arbitrary bytes never panics
//! - Anything that decodes re-encodes, and the re-encoding decodes to the
//!   same value
//! - A decoded envelope's method byte matches the variant

#![no_main]

use dhkx_proto::{Method, Request, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = Request::decode(data) {
        assert_eq!(Some(request.method()), data.first().copied().and_then(Method::from_u8));
        assert!(request.method().is_request());

        let encoded = request.encode().expect("decoded request must re-encode");
        assert_eq!(Request::decode(&encoded).expect("re-encoded request must decode"), request);
    }

    if let Ok(response) = Response::decode(data) {
        assert_eq!(Some(response.method()), data.first().copied().and_then(Method::from_u8));
        assert!(!response.method().is_request());

        let encoded = response.encode().expect("decoded response must re-encode");
        assert_eq!(Response::decode(&encoded).expect("re-encoded response must decode"), response);
    }
});
