//! Session context shared by every command and view.
//!
//! There is exactly one [`SessionHandle`] per process. It exposes read
//! access and a small set of explicit mutations (`login`, `logout`,
//! `set_me`, `apply`). Authorization failures seen by the API gateway are
//! turned into [`Transition`]s through the declared [`POLICY`] table rather
//! than handled at each call site.
//!
//! When a store path is configured the token and the password-change flag
//! are written to a small TOML file after every mutation, so consecutive
//! `kbd` runs share one session.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::schema::{Me, TokenResponse};

/// Session change triggered by an authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Token rejected: forget it.
    ForceLogout,
    /// Account blocked: forget the token and remember the block.
    Blocked,
    /// Password must be changed before anything else is allowed.
    RequirePasswordChange,
}

/// Structured codes carried in `{error_code}` bodies.
pub const ACCOUNT_BLOCKED: &str = "ACCOUNT_BLOCKED";
pub const MUST_CHANGE_PASSWORD: &str = "MUST_CHANGE_PASSWORD";

/// Status, optional error code (`None` matches any), resulting transition.
pub const POLICY: &[(u16, Option<&str>, Transition)] = &[
    (401, None, Transition::ForceLogout),
    (403, Some(ACCOUNT_BLOCKED), Transition::Blocked),
    (403, Some(MUST_CHANGE_PASSWORD), Transition::RequirePasswordChange),
];

/// Look up the session transition for a failed response.
pub fn policy_for(status: u16, error_code: Option<&str>) -> Option<Transition> {
    POLICY
        .iter()
        .find(|(s, code, _)| *s == status && (code.is_none() || *code == error_code))
        .map(|(_, _, transition)| *transition)
}

/// Whether a view may fetch data right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    NeedsLogin,
    Blocked,
    NeedsPasswordChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub must_change_password: bool,
    pub blocked: bool,
    pub me: Option<Me>,
}

impl Session {
    pub fn access(&self, allow_must_change: bool) -> Access {
        if self.token.is_none() {
            return if self.blocked {
                Access::Blocked
            } else {
                Access::NeedsLogin
            };
        }
        if self.blocked || self.me.as_ref().is_some_and(|me| me.is_blocked) {
            return Access::Blocked;
        }
        let must_change =
            self.must_change_password || self.me.as_ref().is_some_and(|me| me.must_change_password);
        if must_change && !allow_must_change {
            return Access::NeedsPasswordChange;
        }
        Access::Granted
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::ForceLogout => {
                self.token = None;
                self.must_change_password = false;
                self.me = None;
            }
            Transition::Blocked => {
                self.token = None;
                self.me = None;
                self.blocked = true;
            }
            Transition::RequirePasswordChange => {
                self.must_change_password = true;
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    must_change_password: bool,
}

/// Cloneable handle to the process-wide session.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
    store: Option<Arc<PathBuf>>,
}

impl SessionHandle {
    /// In-memory session that is never persisted.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Session backed by the token file at `path` (created on first save).
    pub fn open(path: &Path) -> Result<Self> {
        let session = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session file: {}", path.display()))?;
            let stored: StoredSession =
                toml::from_str(&content).with_context(|| "Failed to parse session file")?;
            Session {
                token: stored.token,
                must_change_password: stored.must_change_password,
                ..Session::default()
            }
        } else {
            Session::default()
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(session)),
            store: Some(Arc::new(path.to_path_buf())),
        })
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn access(&self, allow_must_change: bool) -> Access {
        self.read().access(allow_must_change)
    }

    pub fn login(&self, token: &TokenResponse) {
        {
            let mut session = self.write();
            session.token = Some(token.access_token.clone());
            session.must_change_password = token.must_change_password;
            session.blocked = false;
            session.me = None;
        }
        self.persist();
    }

    pub fn logout(&self) {
        *self.write() = Session::default();
        self.persist();
    }

    pub fn set_me(&self, me: Me) {
        {
            let mut session = self.write();
            session.must_change_password = me.must_change_password;
            session.blocked = me.is_blocked;
            session.me = Some(me);
        }
        self.persist();
    }

    pub fn apply(&self, transition: Transition) {
        tracing::info!(?transition, "session transition");
        self.write().apply(transition);
        self.persist();
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self) {
        let Some(path) = self.store.as_deref() else {
            return;
        };
        if let Err(e) = self.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not save session");
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        let stored = {
            let session = self.read();
            StoredSession {
                token: session.token.clone(),
                must_change_password: session.must_change_password,
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        // `mode` only applies on creation; tighten files left by older runs.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(toml::to_string(&stored)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token(value: &str, must_change: bool) -> TokenResponse {
        TokenResponse {
            access_token: value.to_string(),
            token_type: "bearer".to_string(),
            must_change_password: must_change,
        }
    }

    fn me(blocked: bool, must_change: bool) -> Me {
        Me {
            id: 1,
            email: "a@b.c".to_string(),
            display_name: "A".to_string(),
            is_admin: false,
            is_blocked: blocked,
            must_change_password: must_change,
        }
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(policy_for(401, None), Some(Transition::ForceLogout));
        assert_eq!(policy_for(401, Some("ANY")), Some(Transition::ForceLogout));
        assert_eq!(policy_for(403, Some(ACCOUNT_BLOCKED)), Some(Transition::Blocked));
        assert_eq!(
            policy_for(403, Some(MUST_CHANGE_PASSWORD)),
            Some(Transition::RequirePasswordChange)
        );
        assert_eq!(policy_for(403, None), None);
        assert_eq!(policy_for(404, None), None);
    }

    #[test]
    fn test_access_states() {
        let session = SessionHandle::ephemeral();
        assert_eq!(session.access(false), Access::NeedsLogin);

        session.login(&token("t", false));
        assert_eq!(session.access(false), Access::Granted);

        session.apply(Transition::RequirePasswordChange);
        assert_eq!(session.access(false), Access::NeedsPasswordChange);
        assert_eq!(session.access(true), Access::Granted);

        session.apply(Transition::Blocked);
        assert_eq!(session.access(true), Access::Blocked);
        assert!(session.token().is_none());
    }

    #[test]
    fn test_me_flags_gate_access() {
        let session = SessionHandle::ephemeral();
        session.login(&token("t", false));
        session.set_me(me(false, true));
        assert_eq!(session.access(false), Access::NeedsPasswordChange);
        session.set_me(me(true, false));
        assert_eq!(session.access(false), Access::Blocked);
    }

    #[test]
    fn test_force_logout_clears_flags() {
        let session = SessionHandle::ephemeral();
        session.login(&token("t", true));
        session.apply(Transition::ForceLogout);
        let snap = session.snapshot();
        assert!(snap.token.is_none());
        assert!(!snap.must_change_password);
    }

    #[test]
    fn test_persisted_between_handles() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("session.toml");

        let first = SessionHandle::open(&path).unwrap();
        first.login(&token("secret", true));

        let second = SessionHandle::open(&path).unwrap();
        assert_eq!(second.token().as_deref(), Some("secret"));
        assert!(second.snapshot().must_change_password);

        second.logout();
        let third = SessionHandle::open(&path).unwrap();
        assert!(third.token().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.toml");
        let session = SessionHandle::open(&path).unwrap();
        session.login(&token("secret", false));
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // An existing world-readable file is tightened on the next save.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        session.logout();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
