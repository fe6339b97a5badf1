//! Cookie service: build and clear the httpOnly auth cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use glossa_core::refresh::IssuedCredentials;
use time::Duration;

/// Cookie holding the opaque session token.
pub const SESSION_COOKIE: &str = "session-token";
/// Cookie holding the signed refresh token.
pub const REFRESH_COOKIE: &str = "refresh-token";

fn auth_cookie(name: &str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

fn max_age_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    Duration::seconds((expires_at - now).num_seconds().max(0))
}

/// Session cookie living until `expires_at` (24 h, or 7 d with remember-me).
pub fn session_cookie(
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    auth_cookie(
        SESSION_COOKIE,
        token.to_string(),
        max_age_until(expires_at, now),
        secure,
    )
}

/// Refresh cookie living until `expires_at` (30 d, or 90 d with remember-me).
pub fn refresh_cookie(
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        max_age_until(expires_at, now),
        secure,
    )
}

/// Add both cookies for freshly issued credentials.
pub fn set_credentials(
    jar: CookieJar,
    credentials: &IssuedCredentials,
    now: DateTime<Utc>,
    secure: bool,
) -> CookieJar {
    jar.add(session_cookie(
        &credentials.session.token,
        credentials.session.session.expires_at,
        now,
        secure,
    ))
    .add(refresh_cookie(
        &credentials.refresh_token,
        credentials.refresh_record.expires_at,
        now,
        secure,
    ))
}

/// Expire both auth cookies.
pub fn clear_credentials(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(auth_cookie(SESSION_COOKIE, String::new(), Duration::ZERO, secure))
        .add(auth_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

/// Non-empty value of a cookie.
pub fn cookie_value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(|c| c.value()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_are_http_only_lax_and_root_scoped() {
        let now = Utc::now();
        let cookie = session_cookie("abc", now + chrono::Duration::hours(24), now, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::hours(24)));
    }

    #[test]
    fn refresh_cookie_max_age_tracks_expiry() {
        let now = Utc::now();
        let cookie = refresh_cookie("r", now + chrono::Duration::days(90), now, false);
        assert_eq!(cookie.max_age(), Some(Duration::days(90)));
        assert_eq!(cookie.secure(), Some(false));
    }
}
