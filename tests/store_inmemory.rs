// crates.io
use time::macros;
// self
use sonos_dance::{
	_preludet::*,
	auth::{IdentityId, ProviderId, ScopeSet, TokenRecord, TokenStatus},
	store::{CompareAndSwapOutcome, MemoryStore, StoreKey, TokenStore},
};

fn make_key(identity: &str) -> StoreKey {
	let provider =
		ProviderId::new("sonos").expect("Failed to build provider identifier for store tests.");
	let identity =
		IdentityId::new(identity).expect("Failed to build identity identifier for store tests.");

	StoreKey::new(&provider, &identity)
}

fn build_record(access: &str, refresh: Option<&str>) -> TokenRecord {
	let issued = macros::datetime!(2025-11-10 12:00 UTC);
	let mut builder = TokenRecord::builder()
		.access_token(access)
		.scope(ScopeSet::new(["playback-control-all"]).expect("Scope fixture should be valid."))
		.issued_at(issued)
		.expires_at(issued + Duration::hours(24));

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	builder.build().expect("Token record fixture should build successfully.")
}

#[tokio::test]
async fn put_get_and_delete_round_trip() {
	let store = MemoryStore::default();
	let key = make_key("household-1");
	let record = build_record("access-1", Some("refresh-1"));

	store.put(key.clone(), record.clone()).await.expect("Storing the fixture should succeed.");

	let fetched = store
		.get(&key)
		.await
		.expect("Fetching from the memory store should succeed.")
		.expect("Stored record should remain present.");

	assert_eq!(fetched.access_token.expose(), "access-1");
	assert_eq!(fetched.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-1"));
	assert_eq!(store.len(), 1);

	let removed = store
		.delete(&key)
		.await
		.expect("Deleting from the memory store should succeed.")
		.expect("Delete should return the removed record.");

	assert_eq!(removed.access_token.expose(), "access-1");
	assert!(store.get(&key).await.expect("Fetching should succeed.").is_none());
	assert!(store.delete(&key).await.expect("Deleting twice should succeed.").is_none());
	assert!(store.is_empty());
}

#[tokio::test]
async fn identities_do_not_share_records() {
	let store = MemoryStore::default();
	let first = make_key("household-a");
	let second = make_key("household-b");

	store.put(first.clone(), build_record("access-a", None)).await.expect("Put should succeed.");
	store.put(second.clone(), build_record("access-b", None)).await.expect("Put should succeed.");
	store.put(first.clone(), build_record("access-a2", None)).await.expect("Put should succeed.");

	let a = store.get(&first).await.expect("Get should succeed.").expect("Record A should exist.");
	let b = store.get(&second).await.expect("Get should succeed.").expect("Record B should exist.");

	assert_eq!(a.access_token.expose(), "access-a2");
	assert_eq!(b.access_token.expose(), "access-b");
	assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn cas_success_mismatch_and_missing() {
	let store = MemoryStore::default();
	let key = make_key("household-cas");
	let initial = build_record("access-initial", Some("refresh-old"));

	store.put(key.clone(), initial.clone()).await.expect("Storing the fixture should succeed.");

	let replacement = build_record("access-new", Some("refresh-new"));
	let outcome = store
		.compare_and_swap_refresh(&key, Some("refresh-old"), replacement.clone())
		.await
		.expect("CAS should succeed when refresh tokens match.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);

	let fetched = store
		.get(&key)
		.await
		.expect("Fetching the updated record should succeed.")
		.expect("Updated record should remain present.");

	assert_eq!(fetched.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));

	let mismatch = store
		.compare_and_swap_refresh(&key, Some("refresh-old"), replacement)
		.await
		.expect("CAS should report a refresh mismatch when tokens differ.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

	let missing = store
		.compare_and_swap_refresh(&make_key("household-none"), Some("whatever"), initial)
		.await
		.expect("CAS should report a missing record for unknown keys.");

	assert_eq!(missing, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn concurrent_cas_allows_single_winner() {
	let store = MemoryStore::default();
	let key = make_key("household-race");

	store
		.put(key.clone(), build_record("access-base", Some("refresh-base")))
		.await
		.expect("Storing the base record should succeed.");

	let spawn_cas = |label: &'static str| {
		let store = store.clone();
		let key = key.clone();

		tokio::spawn(async move {
			let replacement = build_record(label, Some(label));

			store
				.compare_and_swap_refresh(&key, Some("refresh-base"), replacement)
				.await
				.expect("CAS task should complete successfully.")
		})
	};
	let (outcome_a, outcome_b) = tokio::join!(spawn_cas("refresh-a"), spawn_cas("refresh-b"));
	let outcomes = [
		outcome_a.expect("CAS task A should not panic."),
		outcome_b.expect("CAS task B should not panic."),
	];
	let successes =
		outcomes.iter().filter(|outcome| matches!(outcome, CompareAndSwapOutcome::Updated)).count();

	assert_eq!(successes, 1, "Only one CAS should succeed.");

	let final_record = store
		.get(&key)
		.await
		.expect("Fetching the final record should succeed.")
		.expect("Final record should remain present.");

	assert!(matches!(
		final_record.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-a") | Some("refresh-b")
	));
}

#[tokio::test]
async fn cas_supports_records_without_refresh_tokens() {
	let store = MemoryStore::default();
	let key = make_key("household-bare");

	store
		.put(key.clone(), build_record("access", None))
		.await
		.expect("Storing a record without a refresh token should succeed.");

	let outcome = store
		.compare_and_swap_refresh(&key, None, build_record("access-updated", None))
		.await
		.expect("CAS should succeed when both sides have no refresh token.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);

	let mismatch = store
		.compare_and_swap_refresh(&key, Some("refresh"), build_record("access-other", None))
		.await
		.expect("CAS should complete when the stored record has no refresh token.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);
}

#[tokio::test]
async fn revoke_marks_records_and_ignores_missing_ones() {
	let store = MemoryStore::default();
	let key = make_key("household-revoke");

	store
		.put(key.clone(), build_record("access", Some("refresh")))
		.await
		.expect("Storing a revocable record should succeed.");

	let instant = OffsetDateTime::now_utc();
	let revoked = store
		.revoke(&key, Some("refresh"), instant)
		.await
		.expect("Revocation should succeed.")
		.expect("Revocation should return the affected record.");

	assert_eq!(revoked.revoked_at, Some(instant));
	assert_eq!(revoked.status_at(instant), TokenStatus::Revoked);

	let fetched = store
		.get(&key)
		.await
		.expect("Fetching the revoked record should succeed.")
		.expect("Revoked record should remain present for inspection.");

	assert!(fetched.is_revoked());
	assert!(
		store
			.revoke(&make_key("household-none"), Some("refresh"), instant)
			.await
			.expect("Revoking a missing record should not error.")
			.is_none()
	);
}

#[tokio::test]
async fn revoke_leaves_replaced_records_alone() {
	let store = MemoryStore::default();
	let key = make_key("household-relogin");

	store
		.put(key.clone(), build_record("access-new", Some("refresh-new")))
		.await
		.expect("Storing the newer record should succeed.");

	let instant = OffsetDateTime::now_utc();

	assert!(
		store
			.revoke(&key, Some("refresh-old"), instant)
			.await
			.expect("Revocation should complete.")
			.is_none()
	);
	assert!(
		store
			.revoke(&key, None, instant)
			.await
			.expect("Revocation should complete.")
			.is_none()
	);

	let fetched = store
		.get(&key)
		.await
		.expect("Fetching the record should succeed.")
		.expect("Newer record should remain present.");

	assert!(!fetched.is_revoked());
	assert_eq!(fetched.access_token.expose(), "access-new");
}
