//! Lifetimes and policies for the credential lifecycle.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What a successful refresh does to the user's existing sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEviction {
    /// Delete every unexpired session of the user, on any device.
    #[default]
    AllUserSessions,
    /// Delete only the session presented by the refreshing client.
    RefreshingSessionOnly,
}

impl SessionEviction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all_user_sessions" | "all" => Some(SessionEviction::AllUserSessions),
            "refreshing_session_only" | "current" => Some(SessionEviction::RefreshingSessionOnly),
            _ => None,
        }
    }
}

/// Token, session and verification lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub access_ttl_remember: Duration,
    pub refresh_ttl: Duration,
    pub refresh_ttl_remember: Duration,
    pub session_ttl: Duration,
    pub session_ttl_remember: Duration,
    /// A refresh token issued for longer than this was a remember-me login.
    pub remember_me_threshold: Duration,
    pub email_verification_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub session_eviction: SessionEviction,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            access_ttl_remember: Duration::hours(1),
            refresh_ttl: Duration::days(30),
            refresh_ttl_remember: Duration::days(90),
            session_ttl: Duration::hours(24),
            session_ttl_remember: Duration::days(7),
            remember_me_threshold: Duration::days(30),
            email_verification_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            session_eviction: SessionEviction::default(),
        }
    }
}

impl AuthSettings {
    pub fn access_ttl(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.access_ttl_remember
        } else {
            self.access_ttl
        }
    }

    pub fn refresh_ttl(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.refresh_ttl_remember
        } else {
            self.refresh_ttl
        }
    }

    pub fn session_ttl(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.session_ttl_remember
        } else {
            self.session_ttl
        }
    }

    /// Recover the remember-me choice from a stored refresh token lifetime.
    pub fn is_remember_me(&self, refresh_lifetime: Duration) -> bool {
        refresh_lifetime > self.remember_me_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_me_is_derived_from_refresh_lifetime() {
        let settings = AuthSettings::default();
        assert!(!settings.is_remember_me(settings.refresh_ttl(false)));
        assert!(settings.is_remember_me(settings.refresh_ttl(true)));
    }

    #[test]
    fn eviction_policy_parses_aliases() {
        assert_eq!(
            SessionEviction::parse("current"),
            Some(SessionEviction::RefreshingSessionOnly)
        );
        assert_eq!(
            SessionEviction::parse("all_user_sessions"),
            Some(SessionEviction::AllUserSessions)
        );
        assert_eq!(SessionEviction::parse("sometimes"), None);
    }
}
