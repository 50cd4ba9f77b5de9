//! Session cookie jar and the host/path/secure matching shared with the push bridge.

use chrono::{DateTime, Duration, Utc};
use log::trace;
use lognit::Cookie;
use parking_lot::RwLock;
use reqwest::Url;
use reqwest::header::HeaderValue;

/// Cookie jar owned by one HTTP session.
///
/// Plugged into reqwest as its cookie provider, so every response's
/// `Set-Cookie` headers land here and every request carries the matching
/// cookies. The same contents are exported and restored through
/// [`lognit::SessionState`].
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Cookie> {
        self.cookies.read().clone()
    }

    pub fn clear(&self) {
        self.cookies.write().clear();
    }

    pub fn add_all(&self, cookies: &[Cookie]) {
        let mut stored = self.cookies.write();
        stored.extend(cookies.iter().cloned());
    }

    /// Insert or replace the cookie with the same domain, path and name.
    /// An already expired cookie only removes its predecessor.
    pub fn insert(&self, cookie: Cookie) {
        let mut stored = self.cookies.write();
        stored.retain(|c| {
            !(c.name == cookie.name
                && c.path == cookie.path
                && c.domain.eq_ignore_ascii_case(&cookie.domain))
        });
        if !cookie.is_expired(Utc::now()) {
            stored.push(cookie);
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };

        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match parse_set_cookie(raw, host, Utc::now()) {
                Some(cookie) => {
                    trace!("Storing cookie '{}' for {}", cookie.name, cookie.domain);
                    self.insert(cookie);
                }
                None => trace!("Ignoring unparsable Set-Cookie header from {host}"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let stored = self.cookies.read();
        let header = stored
            .iter()
            .filter(|c| matches(c, host, url.path(), url.scheme() == "https", Utc::now()))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}

/// Parse one `Set-Cookie` value received from `host`.
///
/// A cookie carrying a Domain attribute is stored with a leading dot so it
/// also matches subdomains; without one it is bound to `host` only.
pub fn parse_set_cookie(raw: &str, host: &str, now: DateTime<Utc>) -> Option<Cookie> {
    let parsed = cookie::Cookie::parse(raw.to_string()).ok()?;

    let domain = match parsed.domain() {
        Some(domain) if !domain.is_empty() => format!(".{}", domain.trim_start_matches('.')),
        _ => host.to_string(),
    };
    let path = parsed
        .path()
        .filter(|p| p.starts_with('/'))
        .unwrap_or("/")
        .to_string();

    let expiry = match parsed.max_age() {
        Some(max_age) => Some(now + Duration::seconds(max_age.whole_seconds())),
        None => parsed
            .expires_datetime()
            .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
    };

    Some(Cookie::new(
        domain,
        parsed.name(),
        parsed.value(),
        path,
        expiry,
        parsed.secure().unwrap_or(false),
    ))
}

/// Whether `cookie` may be sent to `host` for a request on `path`.
pub fn matches(cookie: &Cookie, host: &str, path: &str, secure: bool, now: DateTime<Utc>) -> bool {
    domain_matches(&cookie.domain, host)
        && path_matches(&cookie.path, path)
        && (!cookie.secure || secure)
        && !cookie.is_expired(now)
}

fn domain_matches(domain: &str, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();

    match domain.strip_prefix('.') {
        Some(parent) => host == parent || host.ends_with(&domain),
        None => host == domain,
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    let cookie_path = if cookie_path.is_empty() { "/" } else { cookie_path };
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => cookie_path.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Pick the session cookies to copy onto a push connection at `push_url`.
///
/// Only host, path and the secure flag are considered; the push channel is
/// matched as if requesting the root path.
pub fn select_for_push<'a>(cookies: &'a [Cookie], push_url: &Url) -> Vec<&'a Cookie> {
    let Some(host) = push_url.host_str() else {
        return Vec::new();
    };
    let secure = push_url.scheme() == "https";
    let now = Utc::now();

    cookies
        .iter()
        .filter(|c| matches(c, host, "/", secure, now))
        .collect()
}
