//! Runs the Sonos login from a terminal: prints the authorization URL, reads the callback URL
//! pasted back from the browser, and lists the households of the authenticated account.
//!
//! Credentials come from `SONOS_OAUTH_CLIENT_ID` and `SONOS_OAUTH_CLIENT_SECRET`.

// std
use std::{io::BufRead, sync::Arc};
// crates.io
use color_eyre::{Result, eyre::eyre};
use url::Url;
// self
use sonos_dance::{
	auth::{IdentityId, ScopeSet},
	config::DanceSettings,
	flows::{CallbackParams, ReqwestDance},
	provider::sonos,
	reqwest::Client,
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let settings = DanceSettings {
		scope: Some(ScopeSet::new(["playback-control-all"])?),
		redirect_to: Some("households".into()),
		..Default::default()
	};
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let dance = ReqwestDance::new(store, sonos::config(settings)?)?;
	let identity = IdentityId::new("terminal")?;
	let origin = Url::parse("http://localhost:8080")?;
	let session = dance.begin_authorization(&identity, &origin)?;

	println!("Open {} and approve access.", session.authorize_url);
	println!("Paste the URL the browser was sent to ({}):", session.redirect_uri);

	let mut line = String::new();

	std::io::stdin().lock().read_line(&mut line)?;

	let callback = Url::parse(line.trim())?;
	let outcome = dance.handle_callback(&identity, CallbackParams::from_url(&callback)).await?;

	println!("Signed in; continue at `{}`.", outcome.redirect.as_str());

	let api = dance.get_session(&identity).await?;
	let response = api.get(&Client::new(), "/control/api/v1/households")?.send().await?;

	if !response.status().is_success() {
		return Err(eyre!("Sonos API answered {}.", response.status()));
	}

	println!("{}", response.text().await?);

	Ok(())
}
