//! Credentials gathered or generated during a run.

use crate::utils::Secret;

/// A database account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbLogin {
    /// Account name.
    pub user: String,
    /// Password.
    pub password: Secret,
}

impl DbLogin {
    /// Creates a login.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// The WordPress administrator account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpAdmin {
    /// Login name.
    pub user: String,
    /// E-mail address.
    pub email: String,
    /// Password.
    pub password: Secret,
}

/// Credentials known to the run so far.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Administrative database account, verified against the server.
    pub db_admin: Option<DbLogin>,
    /// The site's own database account.
    pub db_site: Option<DbLogin>,
    /// The WordPress administrator.
    pub wp_admin: Option<WpAdmin>,
}
