//! Provider-facing descriptors (data), strategies (behavior), and the Sonos preset.
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`): HTTPS-only authorization,
//! token, refresh, and API endpoints, supported grant flags, client authentication preference,
//! and the scope delimiter. `strategy` defines [`ProviderStrategy`], the hook flows use to
//! decorate token requests and classify provider errors. `sonos` pins the Sonos endpoints.

pub mod descriptor;
pub mod sonos;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
