//! OAuth 2.0 authorization-code dance for the Sonos control API: state-checked logins,
//! refresh-before-use sessions, and pluggable token stores in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::{MapCredentialSource, ProviderConfig},
		flows::{Dance, DanceOptions, RetryPolicy},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{DefaultProviderStrategy, ProviderStrategy},
		store::{MemoryStore, TokenStore},
	};

	/// Dance type alias used by reqwest-backed integration tests.
	pub type ReqwestTestDance = Dance<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(std::time::Duration::from_secs(5))
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Options with millisecond backoff so retry paths stay fast under test.
	pub fn test_dance_options() -> DanceOptions {
		DanceOptions::default().with_retry(RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::milliseconds(5),
			max_delay: Duration::milliseconds(20),
		})
	}

	/// Constructs a [`Dance`] backed by an in-memory store, the default provider strategy, and
	/// the reqwest transport used across integration tests.
	///
	/// Credentials come from `config` itself or from the supplied map; the process environment
	/// is never consulted.
	pub fn build_reqwest_test_dance(
		config: ProviderConfig,
		credentials: MapCredentialSource,
	) -> (ReqwestTestDance, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
		let http_client = test_reqwest_http_client();
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let dance = Dance::with_http_client(store, config, strategy, http_client, mapper)
			.with_credential_source(Arc::new(credentials))
			.with_options(test_dance_options());

		(dance, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
