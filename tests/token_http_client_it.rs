// self
use sonos_dance::{
	_preludet::*,
	auth::{IdentityId, ProviderId, TokenRecord},
	config::ProviderConfig,
	error::TokenEndpointError,
	flows::{CallbackParams, Dance, RefreshRequest, RetryPolicy},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderStrategy,
	},
	store::{MemoryStore, TokenStore},
};

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Copy)]
struct FakeHttpClient {
	retry_after: Duration,
}
impl FakeHttpClient {
	fn throttled(retry_after: Duration) -> Self {
		Self { retry_after }
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHttpHandle { slot, retry_after: self.retry_after }
	}
}

struct FakeHttpHandle {
	slot: ResponseMetadataSlot,
	retry_after: Duration,
}
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let retry_after = self.retry_after;

		Box::pin(async move {
			assert!(
				slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);
			slot.store(ResponseMetadata { status: Some(429), retry_after: Some(retry_after) });

			Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)))
		})
	}
}

#[derive(Clone, Default)]
struct RecordingTransportErrorMapper {
	calls: Arc<Mutex<Vec<(GrantType, Option<ResponseMetadata>)>>>,
}
impl RecordingTransportErrorMapper {
	fn recorded(&self) -> Vec<(GrantType, Option<ResponseMetadata>)> {
		self.calls.lock().clone()
	}
}
impl TransportErrorMapper<FakeTransportError> for RecordingTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<FakeTransportError>,
	) -> TokenEndpointError {
		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		self.calls.lock().push((grant, meta.cloned()));

		match err {
			HttpClientError::Reqwest(inner) => TokenEndpointError::Transient {
				message: format!("Fake transport error: {inner}"),
				status,
				retry_after,
			},
			HttpClientError::Io(inner) => TokenEndpointError::Io(inner),
			other => TokenEndpointError::Transient {
				message: format!("Unhandled HTTP client error variant: {other:?}"),
				status,
				retry_after,
			},
		}
	}
}

type FakeDance = Dance<FakeHttpClient, RecordingTransportErrorMapper>;

fn build_config() -> ProviderConfig {
	let provider_id =
		ProviderId::new("sonos").expect("Failed to build mock provider identifier.");
	let descriptor = ProviderDescriptor::builder(provider_id)
		.authorization_endpoint("https://mock.example.com/login/v3/oauth")
		.token_endpoint("https://mock.example.com/login/v3/oauth/access")
		.api_base("https://mock.example.com/control/api/v1")
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Failed to build mock provider descriptor.");

	ProviderConfig::builder(descriptor)
		.client_id("throttled-client")
		.client_secret("throttled-secret")
		.build()
		.expect("Failed to build mock provider config.")
}

fn build_dance(
	retry_after: Duration,
	retry: RetryPolicy,
) -> (FakeDance, Arc<MemoryStore>, Arc<RecordingTransportErrorMapper>) {
	let store_backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = store_backend.clone();
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let mapper = Arc::new(RecordingTransportErrorMapper::default());
	let dance: FakeDance = Dance::with_http_client(
		store,
		build_config(),
		strategy,
		FakeHttpClient::throttled(retry_after),
		mapper.clone(),
	)
	.with_options(test_dance_options().with_retry(retry));

	(dance, store_backend, mapper)
}

fn identity() -> IdentityId {
	IdentityId::new("fake-household").expect("Failed to build fake identity.")
}

#[tokio::test]
async fn throttled_code_exchange_surfaces_metadata() {
	let (dance, store, mapper) = build_dance(Duration::seconds(5), RetryPolicy::NONE);
	let user = identity();
	let origin = Url::parse("https://app.example.com").expect("Origin should parse.");
	let session = dance.begin_authorization(&user, &origin).expect("Login should start.");
	let params = CallbackParams {
		code: Some("code-throttled".into()),
		state: Some(session.state),
		..Default::default()
	};
	let err = dance
		.handle_callback(&user, params)
		.await
		.expect_err("Exchange should be throttled with HTTP 429.");

	match err {
		Error::TokenExchange(TokenEndpointError::Transient { status, retry_after, .. }) => {
			assert_eq!(status, Some(429));
			assert_eq!(retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	let observed = mapper.recorded();

	assert_eq!(observed.len(), 1, "Mapper must record a single request.");

	let (grant, meta) = observed.into_iter().next().expect("One call should be recorded.");
	let meta = meta.expect("Response metadata should be recorded.");

	assert_eq!(grant, GrantType::AuthorizationCode);
	assert_eq!(meta.status, Some(429));
	assert_eq!(meta.retry_after, Some(Duration::seconds(5)));
	assert!(store.is_empty());
}

#[tokio::test]
async fn throttled_refresh_is_retried_with_a_fresh_slot_each_time() {
	let retry = RetryPolicy {
		max_attempts: 3,
		base_delay: Duration::milliseconds(1),
		max_delay: Duration::milliseconds(5),
	};
	let (dance, store, mapper) = build_dance(Duration::seconds(30), retry);
	let user = identity();
	let record = TokenRecord::builder()
		.access_token("access-stale")
		.refresh_token("refresh-stale")
		.issued_at(OffsetDateTime::now_utc() - Duration::hours(2))
		.expires_in(Duration::hours(1))
		.build()
		.expect("Record fixture should build.");

	store.put(dance.store_key(&user), record).await.expect("Seeding the store should succeed.");

	let err = dance
		.refresh_access_token(RefreshRequest::new(user.clone()))
		.await
		.expect_err("Refresh should be throttled with HTTP 429.");

	assert!(matches!(err, Error::RefreshFailed(TokenEndpointError::Transient { .. })));

	let observed = mapper.recorded();

	assert_eq!(observed.len(), 3, "Every attempt must reach the mapper.");
	assert!(observed.iter().all(|(grant, meta)| {
		*grant == GrantType::RefreshToken
			&& meta.as_ref().and_then(|meta| meta.retry_after) == Some(Duration::seconds(30))
	}));

	let stored = store
		.get(&dance.store_key(&user))
		.await
		.expect("Store lookup should succeed.")
		.expect("Record should survive a transient failure.");

	assert!(!stored.is_revoked());
}
