//! Rotating-credential attendance service.
//!
//! A session host renders a credential that rotates every cadence window;
//! attendees scan it from their single active device and the ledger records
//! their presence exactly once per session.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod credential;
    pub mod secret;
}

pub mod models {
    pub mod attendance;
    pub mod device;
    pub mod identity;
    pub mod session;
}

pub mod repositories {
    pub mod attendance;
    pub mod device;
    pub mod memory;
    pub mod session;
    pub mod store;
}

pub mod services {
    pub mod devices;
    pub mod issuer;
    pub mod ledger;
    pub mod scan;
    pub mod signer;
    pub mod verifier;
}

pub mod handlers {
    pub mod devices;
    pub mod scan;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod scan;
}

pub mod router;
