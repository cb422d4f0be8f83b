//! Single-user session lifecycle.
//!
//! Pure state machine; callers pass the wall clock in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("user '{0}' is already connected, disconnect first")]
    AlreadyActive(String),

    #[error("no active session, establish a connection first")]
    NoSession,

    #[error("session is inactive, establish a new connection")]
    Inactive,

    #[error("username mismatch, current session belongs to '{0}'")]
    UserMismatch(String),

    #[error("token does not match the active session")]
    TokenMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: String,
    #[serde(skip)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Absent,
    Active(Session),
    Inactive(Session),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Absent => "absent",
            SessionState::Active(_) => "active",
            SessionState::Inactive(_) => "inactive",
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Absent => None,
            SessionState::Active(s) | SessionState::Inactive(s) => Some(s),
        }
    }

    /// Open a session for `user`. Fails while another session is active.
    pub fn establish(
        &mut self,
        user: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<&Session, SessionError> {
        if let SessionState::Active(s) = self {
            return Err(SessionError::AlreadyActive(s.user.clone()));
        }
        *self = SessionState::Active(Session {
            user: user.to_string(),
            token: token.to_string(),
            created_at: now,
            last_activity: now,
        });
        match self {
            SessionState::Active(s) => Ok(s),
            _ => Err(SessionError::NoSession),
        }
    }

    /// Deactivate the session owned by `user`.
    pub fn end(&mut self, user: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let session = match self {
            SessionState::Absent => return Err(SessionError::NoSession),
            SessionState::Inactive(_) => return Err(SessionError::Inactive),
            SessionState::Active(s) if s.user != user => {
                return Err(SessionError::UserMismatch(s.user.clone()));
            }
            SessionState::Active(s) => {
                s.last_activity = now;
                s.clone()
            }
        };
        *self = SessionState::Inactive(session.clone());
        Ok(session)
    }

    /// Validate an active session for `token` and record activity.
    pub fn touch(&mut self, token: &str, now: DateTime<Utc>) -> Result<&Session, SessionError> {
        match self {
            SessionState::Absent => Err(SessionError::NoSession),
            SessionState::Inactive(_) => Err(SessionError::Inactive),
            SessionState::Active(s) if s.token != token => Err(SessionError::TokenMismatch),
            SessionState::Active(s) => {
                s.last_activity = now;
                Ok(s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn establish_then_conflict() {
        let mut st = SessionState::default();
        assert_eq!(st.establish("alice", "tok", t(0)).unwrap().user, "alice");
        assert_eq!(
            st.establish("bob", "tok", t(1)).unwrap_err(),
            SessionError::AlreadyActive("alice".into())
        );
        assert_eq!(st.as_str(), "active");
    }

    #[test]
    fn end_requires_matching_user() {
        let mut st = SessionState::default();
        assert_eq!(st.end("alice", t(0)).unwrap_err(), SessionError::NoSession);

        st.establish("alice", "tok", t(0)).unwrap();
        assert_eq!(
            st.end("bob", t(1)).unwrap_err(),
            SessionError::UserMismatch("alice".into())
        );
        let ended = st.end("alice", t(2)).unwrap();
        assert_eq!(ended.last_activity, t(2));
        assert_eq!(st.as_str(), "inactive");
        assert_eq!(st.end("alice", t(3)).unwrap_err(), SessionError::Inactive);
    }

    #[test]
    fn inactive_session_can_be_replaced() {
        let mut st = SessionState::default();
        st.establish("alice", "tok", t(0)).unwrap();
        st.end("alice", t(1)).unwrap();
        assert_eq!(st.establish("bob", "tok", t(2)).unwrap().user, "bob");
    }

    #[test]
    fn touch_validates_and_refreshes() {
        let mut st = SessionState::default();
        assert_eq!(st.touch("tok", t(0)).unwrap_err(), SessionError::NoSession);
        st.establish("alice", "tok", t(0)).unwrap();
        assert_eq!(st.touch("other", t(1)).unwrap_err(), SessionError::TokenMismatch);
        assert_eq!(st.touch("tok", t(5)).unwrap().last_activity, t(5));
        assert_eq!(st.session().unwrap().created_at, t(0));
    }
}
