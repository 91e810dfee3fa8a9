//! Clan-name resolution through the public userinfo endpoint.
//!
//! Split in two layers: [`ClanApi`] performs exactly one external lookup,
//! [`CachingResolver`] adds the whole-run cache and the alias table on top.
//! The resolver is single-owner; the rate limiter serializes lookups across
//! the run.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{self, Interval, MissedTickBehavior};

pub const DEFAULT_API_URL: &str = "http://gmt.star-conflict.com/pubapi/v1/userinfo.php";
pub const DEFAULT_RATE_LIMIT: u32 = 30;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("clan lookup request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("clan lookup returned status {0}")]
    Status(reqwest::StatusCode),
}

/// One external lookup of a player's clan name. No caching at this layer.
#[allow(async_fn_in_trait)]
pub trait ClanApi {
    /// Returns the clan name, or an empty string for a clanless player.
    async fn fetch_clan_name(&self, nickname: &str) -> Result<String, ResolveError>;
}

/// Cached resolution of a player's clan name by nickname.
#[allow(async_fn_in_trait)]
pub trait ClanResolver {
    /// Cache-first lookup. An empty string is a valid resolved value;
    /// failures are returned and never cached.
    async fn resolve(&mut self, nickname: &str) -> Result<String, ResolveError>;

    /// Make `old_name` resolve to the same clan as `new_name` (a renamed
    /// pilot), resolving `new_name` first if it is not cached yet.
    async fn add_alias(&mut self, old_name: &str, new_name: &str) -> Result<(), ResolveError>;
}

/// `{"data":{"clan":{"name":"...","tag":"..."}}}`; only `name` is consumed.
#[derive(Debug, Deserialize)]
pub(crate) struct UserInfo {
    #[serde(default)]
    pub(crate) data: UserData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserData {
    #[serde(default)]
    pub(crate) clan: Option<ClanInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClanInfo {
    #[serde(default)]
    pub(crate) name: String,
}

/// Rate-limited HTTP lookup against the public endpoint.
pub struct HttpClanApi {
    client: reqwest::Client,
    url: String,
    /// Ticked before every request; queues callers beyond the limit.
    ticker: Mutex<Interval>,
}

impl HttpClanApi {
    pub fn new(rate_per_sec: u32) -> Self {
        Self::with_url(DEFAULT_API_URL, rate_per_sec)
    }

    pub fn with_url(url: impl Into<String>, rate_per_sec: u32) -> Self {
        let period = Duration::from_secs(1) / rate_per_sec.max(1);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            ticker: Mutex::new(ticker),
        }
    }
}

impl ClanApi for HttpClanApi {
    async fn fetch_clan_name(&self, nickname: &str) -> Result<String, ResolveError> {
        self.ticker.lock().await.tick().await;

        let response = self
            .client
            .get(&self.url)
            .query(&[("nickname", nickname)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status()));
        }

        let info: UserInfo = response.json().await?;
        Ok(info.data.clan.map(|c| c.name).unwrap_or_default())
    }
}

/// Whole-run nickname -> clan-name cache over a [`ClanApi`].
pub struct CachingResolver<A> {
    api: A,
    cache: HashMap<String, String>,
}

impl<A: ClanApi> CachingResolver<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }
}

impl<A: ClanApi> ClanResolver for CachingResolver<A> {
    async fn resolve(&mut self, nickname: &str) -> Result<String, ResolveError> {
        if let Some(cached) = self.cache.get(nickname) {
            return Ok(cached.clone());
        }
        let clan = self.api.fetch_clan_name(nickname).await?;
        self.cache.insert(nickname.to_string(), clan.clone());
        Ok(clan)
    }

    async fn add_alias(&mut self, old_name: &str, new_name: &str) -> Result<(), ResolveError> {
        let clan = self.resolve(new_name).await?;
        self.cache.insert(old_name.to_string(), clan);
        Ok(())
    }
}
