use crate::error::SqlBridgeError;
use crate::session::Session;

/// Everything needed to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub driver_id: String,
    pub url: String,
    pub login: String,
    pub password: String,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(driver_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            url: url.into(),
            login: String::new(),
            password: String::new(),
        }
    }

    /// Check that the options name a driver and a URL.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::ConfigError` if either is empty.
    pub fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.driver_id.trim().is_empty() {
            return Err(SqlBridgeError::ConfigError("driver id is empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(SqlBridgeError::ConfigError("connection url is empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn builder(driver_id: impl Into<String>, url: impl Into<String>) -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new(driver_id, url)
    }
}

// Keeps the password out of logs and panics.
impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("driver_id", &self.driver_id)
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fluent builder for [`ConnectOptions`].
#[derive(Debug, Clone)]
pub struct ConnectOptionsBuilder {
    opts: ConnectOptions,
}

impl ConnectOptionsBuilder {
    #[must_use]
    pub fn new(driver_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            opts: ConnectOptions::new(driver_id, url),
        }
    }

    #[must_use]
    pub fn login(mut self, login: impl Into<String>) -> Self {
        self.opts.login = login.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.opts.password = password.into();
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectOptions {
        self.opts
    }

    /// Open a session with these options.
    ///
    /// # Errors
    ///
    /// Returns `SqlBridgeError::ConnectionError` if the driver is unknown or the
    /// connection cannot be opened.
    pub fn connect(self) -> Result<Session, SqlBridgeError> {
        let mut session = Session::new();
        session.connect_with(&self.finish())?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_password() {
        let opts = ConnectOptions::builder("sqlite", "sqlite::memory:")
            .login("scott")
            .password("tiger")
            .finish();
        let rendered = format!("{opts:?}");
        assert!(rendered.contains("scott"));
        assert!(!rendered.contains("tiger"));
    }

    #[test]
    fn empty_url_is_a_config_error() {
        let err = ConnectOptions::new("sqlite", "  ").validate().unwrap_err();
        assert!(matches!(err, SqlBridgeError::ConfigError(_)));
        assert!(ConnectOptions::new("sqlite", "sqlite::memory:").validate().is_ok());
    }
}
