//! Browser cookies holding the session carrier and the login transaction.
//!
//! A carrier larger than [`CHUNK_SIZE`] is split over `{name}.0`,
//! `{name}.1`, ... so no single cookie exceeds browser limits.

use std::time::Duration;

use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

use crate::config::SessionConfig;
use crate::session::SignedToken;

/// Largest cookie value written before the carrier is chunked.
pub const CHUNK_SIZE: usize = 3800;

/// Reads and writes session cookies for one configuration.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    name: String,
    login_name: String,
    secure: bool,
    max_age: Duration,
    login_max_age: Duration,
}

impl SessionCookies {
    /// Creates the cookie settings from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            login_name: format!("{}.login", config.cookie_name),
            secure: config.secure_cookies,
            max_age: config.max_age,
            login_max_age: config.login_timeout,
        }
    }

    /// Returns the carrier from the request cookies, reassembling chunks.
    #[must_use]
    pub fn read(&self, jar: &CookieJar) -> Option<String> {
        if let Some(cookie) = jar.get(&self.name) {
            return Some(cookie.value().to_string());
        }

        let mut carrier = String::new();
        for index in 0.. {
            match jar.get(&self.chunk_name(index)) {
                Some(chunk) => carrier.push_str(chunk.value()),
                None => break,
            }
        }

        (!carrier.is_empty()).then_some(carrier)
    }

    /// Stores a carrier, replacing any previous one.
    #[must_use]
    pub fn write(&self, jar: CookieJar, token: &SignedToken) -> CookieJar {
        let mut jar = self.clear(jar);
        let value = token.as_str();

        if value.len() <= CHUNK_SIZE {
            return jar.add(self.build(self.name.clone(), value.to_string(), self.max_age));
        }

        // Carriers are ASCII (base64url and dots), so byte chunks are valid UTF-8.
        for (index, chunk) in value.as_bytes().chunks(CHUNK_SIZE).enumerate() {
            let chunk = String::from_utf8_lossy(chunk).into_owned();
            jar = jar.add(self.build(self.chunk_name(index), chunk, self.max_age));
        }
        jar
    }

    /// Removes the carrier and all of its chunks.
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let stale: Vec<String> = jar
            .iter()
            .map(|c| c.name().to_string())
            .filter(|name| name == &self.name || self.is_chunk_name(name))
            .collect();

        stale
            .into_iter()
            .fold(jar, |jar, name| jar.remove(self.removal(name)))
    }

    /// Returns the sealed login transaction, if present.
    #[must_use]
    pub fn read_login(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.login_name).map(|c| c.value().to_string())
    }

    /// Stores a sealed login transaction.
    #[must_use]
    pub fn write_login(&self, jar: CookieJar, token: &SignedToken) -> CookieJar {
        jar.add(self.build(
            self.login_name.clone(),
            token.as_str().to_string(),
            self.login_max_age,
        ))
    }

    /// Removes the login transaction cookie.
    #[must_use]
    pub fn clear_login(&self, jar: CookieJar) -> CookieJar {
        jar.remove(self.removal(self.login_name.clone()))
    }

    fn build(&self, name: String, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age.as_secs() as i64))
            .build()
    }

    fn removal(&self, name: String) -> Cookie<'static> {
        Cookie::build((name, "")).path("/").build()
    }

    fn chunk_name(&self, index: usize) -> String {
        format!("{}.{index}", self.name)
    }

    fn is_chunk_name(&self, name: &str) -> bool {
        name.strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
    }
}
