#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use sonos_dance::{
	_preludet::*,
	auth::{IdentityId, ProviderId, ScopeSet, TokenRecord},
	config::{CredentialField, MapCredentialSource, PostLoginRedirect, ProviderConfig},
	error::TokenEndpointError,
	flows::{AuthorizedAction, CallbackParams, DanceListener, DanceState},
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorKind},
	store::{MemoryStore, TokenStore},
};

const CLIENT_ID: &str = "client-it";
const CLIENT_SECRET: &str = "secret-it";
const TOKEN_PATH: &str = "/login/v3/oauth/access";
const TOKEN_BODY: &str = r#"{"access_token":"access-it","refresh_token":"refresh-it","token_type":"bearer","expires_in":86400,"scope":"playback-control-all"}"#;

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("sonos").expect("Provider identifier should be valid for auth code test.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(server.url("/login/v3/oauth"))
		.token_endpoint(server.url(TOKEN_PATH))
		.api_base(server.url("/control/api/v1"))
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Mock descriptor should build successfully.")
}

fn build_config(server: &MockServer) -> ProviderConfig {
	ProviderConfig::builder(build_descriptor(server))
		.client_id(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.scope(ScopeSet::new(["playback-control-all"]).expect("Scope fixture should be valid."))
		.redirect_to("dashboard")
		.build()
		.expect("Provider config fixture should build.")
}

fn build_dance(server: &MockServer) -> (ReqwestTestDance, Arc<MemoryStore>) {
	build_reqwest_test_dance(build_config(server), MapCredentialSource::default())
}

fn identity(value: &str) -> IdentityId {
	IdentityId::new(value).expect("Identity fixture should be valid.")
}

fn origin() -> Url {
	Url::parse("https://app.example.com").expect("Host origin should parse.")
}

fn callback(code: &str, state: &str) -> CallbackParams {
	CallbackParams {
		code: Some(code.into()),
		state: Some(state.into()),
		..Default::default()
	}
}

async fn mock_token_success<'a>(server: &'a MockServer, code: &str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", code)
				.form_urlencoded_tuple("redirect_uri", "https://app.example.com/sonos/authorized")
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("client_secret", CLIENT_SECRET);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await
}

#[derive(Default)]
struct RecordingListener {
	veto: bool,
	authorized: Mutex<Vec<String>>,
	errors: Mutex<Vec<(String, Option<String>)>>,
}
impl DanceListener for RecordingListener {
	fn on_authorized(
		&self,
		_provider: &ProviderId,
		identity: &IdentityId,
		_record: &TokenRecord,
	) -> AuthorizedAction {
		self.authorized.lock().push(identity.to_string());

		if self.veto { AuthorizedAction::Skip } else { AuthorizedAction::Store }
	}

	fn on_error(
		&self,
		_provider: &ProviderId,
		_identity: &IdentityId,
		error: &str,
		description: Option<&str>,
	) {
		self.errors.lock().push((error.to_owned(), description.map(str::to_owned)));
	}
}

#[tokio::test]
async fn full_dance_stores_tokens_and_returns_redirect() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-1");
	let session = dance
		.begin_authorization(&user, &origin())
		.expect("Authorization should start with explicit credentials.");
	let pairs = session.authorize_url.query_pairs().into_owned().collect::<Vec<_>>();
	let value_of = |key: &str| {
		pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect::<Vec<_>>()
	};

	assert_eq!(session.authorize_url.path(), "/login/v3/oauth");
	assert_eq!(value_of("response_type"), vec!["code"]);
	assert_eq!(value_of("client_id"), vec![CLIENT_ID]);
	assert_eq!(value_of("redirect_uri"), vec!["https://app.example.com/sonos/authorized"]);
	assert_eq!(value_of("scope"), vec!["playback-control-all"]);
	assert_eq!(value_of("state"), vec![session.state.as_str()]);
	assert_eq!(session.state.len(), 43);
	assert_eq!(
		dance.state(&user).await.expect("State lookup should succeed."),
		DanceState::AwaitingCallback
	);

	let mock = mock_token_success(&server, "code-it").await;
	let outcome = dance
		.handle_callback(&user, callback("code-it", &session.state))
		.await
		.expect("Callback with the issued state should succeed.");

	mock.assert_async().await;

	assert!(outcome.stored);
	assert_eq!(outcome.redirect, PostLoginRedirect::Route("dashboard".into()));
	assert_eq!(outcome.record.access_token.expose(), "access-it");
	assert_eq!(
		outcome.record.scope.as_ref().map(|scope| scope.join(' ')).as_deref(),
		Some("playback-control-all")
	);

	let stored = store
		.get(&dance.store_key(&user))
		.await
		.expect("Store lookup should succeed.")
		.expect("Record should be stored after the callback.");

	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-it"));
	assert!(stored.expires_at.is_some());
	assert_eq!(
		dance.state(&user).await.expect("State lookup should succeed."),
		DanceState::Authenticated
	);
	assert!(dance.is_authorized(&user).await.expect("Authorization check should succeed."));
}

#[tokio::test]
async fn each_login_gets_a_fresh_state_and_replaces_the_previous_one() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-2");
	let first = dance.begin_authorization(&user, &origin()).expect("First login should start.");
	let second = dance.begin_authorization(&user, &origin()).expect("Second login should start.");

	assert_ne!(first.state, second.state);

	let mock = mock_token_success(&server, "code-replaced").await;
	let err = dance
		.handle_callback(&user, callback("code-replaced", &first.state))
		.await
		.expect_err("A superseded state must be rejected.");

	assert!(matches!(err, Error::StateMismatch));

	mock.assert_calls_async(0).await;

	assert!(store.is_empty());
}

#[tokio::test]
async fn mismatched_state_leaves_the_store_untouched() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-3");
	let mock = mock_token_success(&server, "code-forged").await;

	dance.begin_authorization(&user, &origin()).expect("Login should start.");

	let err = dance
		.handle_callback(&user, callback("code-forged", "forged-state"))
		.await
		.expect_err("A forged state must be rejected.");

	assert!(matches!(err, Error::StateMismatch));

	mock.assert_calls_async(0).await;

	assert!(store.is_empty());
	assert_eq!(
		dance.state(&user).await.expect("State lookup should succeed."),
		DanceState::Unauthenticated
	);
}

#[tokio::test]
async fn callback_without_a_pending_login_is_rejected() {
	let server = MockServer::start_async().await;
	let (dance, _store) = build_dance(&server);
	let err = dance
		.handle_callback(&identity("never-started"), callback("code", "state"))
		.await
		.expect_err("Callbacks without a pending login must be rejected.");

	assert!(matches!(err, Error::StateMismatch));
}

#[tokio::test]
async fn replayed_callback_is_rejected() {
	let server = MockServer::start_async().await;
	let (dance, _store) = build_dance(&server);
	let user = identity("browser-session-4");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = mock_token_success(&server, "code-once").await;

	dance
		.handle_callback(&user, callback("code-once", &session.state))
		.await
		.expect("First callback should succeed.");

	let err = dance
		.handle_callback(&user, callback("code-once", &session.state))
		.await
		.expect_err("Replaying a consumed state must fail.");

	assert!(matches!(err, Error::StateMismatch));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_state_is_rejected() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let dance = dance.with_options(test_dance_options().with_state_ttl(Duration::ZERO));
	let user = identity("browser-session-5");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = mock_token_success(&server, "code-late").await;

	tokio::time::sleep(std::time::Duration::from_millis(10)).await;

	let err = dance
		.handle_callback(&user, callback("code-late", &session.state))
		.await
		.expect_err("An expired state must be rejected.");

	assert!(matches!(err, Error::StateMismatch));

	mock.assert_calls_async(0).await;

	assert!(store.is_empty());
}

#[tokio::test]
async fn rejected_code_exchange_writes_nothing() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-6");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"code expired"}"#);
		})
		.await;
	let err = dance
		.handle_callback(&user, callback("code-stale", &session.state))
		.await
		.expect_err("A rejected code must fail the callback.");

	match err {
		Error::TokenExchange(TokenEndpointError::Rejected { kind, status, .. }) => {
			assert_eq!(kind, ProviderErrorKind::InvalidGrant);
			assert_eq!(status, Some(400));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	mock.assert_calls_async(1).await;

	assert!(store.is_empty());
	assert_eq!(
		dance.state(&user).await.expect("State lookup should succeed."),
		DanceState::Unauthenticated
	);
}

#[tokio::test]
async fn transient_exchange_failures_are_retried_then_surfaced() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-7");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(503)
				.header("content-type", "application/json")
				.body(r#"{"error":"temporarily_unavailable"}"#);
		})
		.await;
	let err = dance
		.handle_callback(&user, callback("code-busy", &session.state))
		.await
		.expect_err("An unavailable token endpoint must fail the callback.");

	assert!(matches!(
		err,
		Error::TokenExchange(TokenEndpointError::Transient { status: Some(503), .. })
	));

	mock.assert_calls_async(3).await;

	assert!(store.is_empty());
}

#[tokio::test]
async fn provider_error_is_reported_to_the_listener() {
	let server = MockServer::start_async().await;
	let listener = Arc::new(RecordingListener::default());
	let (dance, store) = build_dance(&server);
	let dance = dance.with_listener(listener.clone());
	let user = identity("browser-session-8");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let params = CallbackParams {
		state: Some(session.state.clone()),
		error: Some("access_denied".into()),
		error_description: Some("User declined.".into()),
		..Default::default()
	};
	let err = dance.handle_callback(&user, params).await.expect_err("Denied logins must fail.");

	match err {
		Error::AuthorizationDenied { error, description } => {
			assert_eq!(error, "access_denied");
			assert_eq!(description.as_deref(), Some("User declined."));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(
		listener.errors.lock().clone(),
		vec![("access_denied".to_owned(), Some("User declined.".to_owned()))]
	);
	assert!(listener.authorized.lock().is_empty());
	assert!(store.is_empty());
}

#[tokio::test]
async fn listener_can_skip_storing_the_record() {
	let server = MockServer::start_async().await;
	let listener = Arc::new(RecordingListener { veto: true, ..Default::default() });
	let (dance, store) = build_dance(&server);
	let dance = dance.with_listener(listener.clone());
	let user = identity("browser-session-9");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = mock_token_success(&server, "code-vetoed").await;
	let outcome = dance
		.handle_callback(&user, callback("code-vetoed", &session.state))
		.await
		.expect("Vetoed callbacks still succeed.");

	mock.assert_async().await;

	assert!(!outcome.stored);
	assert_eq!(outcome.record.access_token.expose(), "access-it");
	assert_eq!(listener.authorized.lock().clone(), vec!["browser-session-9".to_owned()]);
	assert!(store.is_empty());
}

#[tokio::test]
async fn missing_code_fails_without_calling_the_provider() {
	let server = MockServer::start_async().await;
	let (dance, store) = build_dance(&server);
	let user = identity("browser-session-10");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");
	let mock = mock_token_success(&server, "").await;
	let err = dance
		.handle_callback(&user, callback("", &session.state))
		.await
		.expect_err("An empty code must fail.");

	assert!(matches!(err, Error::TokenExchange(TokenEndpointError::MissingCode)));

	mock.assert_calls_async(0).await;

	assert!(store.is_empty());
}

#[tokio::test]
async fn empty_client_id_fails_before_state_is_issued() {
	let server = MockServer::start_async().await;
	let config = ProviderConfig::builder(build_descriptor(&server))
		.client_id("")
		.client_secret(CLIENT_SECRET)
		.build()
		.expect("Config with an empty client id still builds.");
	let (dance, _store) = build_reqwest_test_dance(config, MapCredentialSource::default());
	let user = identity("browser-session-11");
	let err = dance
		.begin_authorization(&user, &origin())
		.expect_err("Empty client ids must be reported as missing.");

	assert!(matches!(err, Error::MissingCredentials { field: CredentialField::ClientId, .. }));
	assert_eq!(
		dance.state(&user).await.expect("State lookup should succeed."),
		DanceState::Unauthenticated
	);
}

#[tokio::test]
async fn credentials_resolve_from_configuration_keys() {
	let server = MockServer::start_async().await;
	let config = ProviderConfig::builder(build_descriptor(&server))
		.client_id_key("SONOS_IT_CLIENT_ID")
		.client_secret_key("SONOS_IT_CLIENT_SECRET")
		.build()
		.expect("Config with credential keys should build.");
	let credentials = [("SONOS_IT_CLIENT_ID", CLIENT_ID), ("SONOS_IT_CLIENT_SECRET", CLIENT_SECRET)]
		.into_iter()
		.collect::<MapCredentialSource>();
	let (dance, store) = build_reqwest_test_dance(config, credentials);
	let user = identity("browser-session-12");
	let session = dance.begin_authorization(&user, &origin()).expect("Login should start.");

	assert!(session.authorize_url.query_pairs().any(|(k, v)| k == "client_id" && v == CLIENT_ID));
	assert!(!session.authorize_url.query_pairs().any(|(k, _)| k == "scope"));

	let mock = mock_token_success(&server, "code-keys").await;
	let outcome = dance
		.handle_callback(&user, callback("code-keys", &session.state))
		.await
		.expect("Callback should succeed with key-resolved credentials.");

	mock.assert_async().await;

	assert_eq!(outcome.redirect, PostLoginRedirect::Root);
	assert_eq!(store.len(), 1);
}
