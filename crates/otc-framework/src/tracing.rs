//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging with the `tracing` crate. Output goes to
//! stderr because stdout carries the host RPC protocol.
//!
//! ## What Gets Traced
//!
//! - **Lifecycle operations**: one `info` span per executor call with `resource` and `id`
//! - **SDK requests**: `debug` with method, URL and attempt; retries at `warn`
//! - **Waiter iterations**: `debug` with the observed state
//! - **Tag failures** after create: `warn` (the resource stays created)
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle spans only
//! RUST_LOG=info terraform-provider-opentelekomcloud
//!
//! # Every request and poll
//! RUST_LOG=debug terraform-provider-opentelekomcloud
//!
//! # Only the waiter
//! RUST_LOG=otc_framework::waiter=debug terraform-provider-opentelekomcloud
//! ```
//!
//! Attributes flagged `sensitive` never reach the logs; log [`crate::state::InstanceState::redacted`]
//! instead of the raw state.

pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false) // resource and id fields carry the context
        .compact()
        .try_init();
}
