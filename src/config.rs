//! Engine configuration.
//!
//! A plain struct with a `Default` impl plus an `from_env` convenience
//! constructor, rather than a builder macro.

use std::env;

/// Options recognised by [`crate::Engine::connect`]/[`crate::Engine::connect_with`].
///
/// This crate only ships a JSON value codec, so there is no
/// `serializer` field here (see DESIGN.md Open Questions) — no
/// `Box<dyn ValueCodec>` slot exists yet for anyone to swap out.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// sqlx SQLite URL, e.g. `sqlite://flows.db?mode=rwc` or `sqlite::memory:`.
    pub connection_string: String,

    /// Whether [`crate::Engine::connect_with`] invokes
    /// [`crate::Engine::recover_incomplete_flows`] once its registration
    /// callback returns. Defaults to `true`. Has no effect on plain
    /// [`crate::Engine::connect`], which never registers flows on the
    /// caller's behalf and so never recovers automatically either — see
    /// that method's doc comment.
    pub recover_on_startup: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_string: "sqlite::memory:".to_string(),
            recover_on_startup: true,
        }
    }
}

impl EngineConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    pub fn with_recover_on_startup(mut self, recover: bool) -> Self {
        self.recover_on_startup = recover;
        self
    }

    /// Reads `DURABLE_DATABASE_URL` (falling back to the in-memory
    /// default) and `DURABLE_RECOVER_ON_STARTUP` (`"false"`/`"0"`
    /// disables it). Does not itself load a `.env` file; call
    /// `dotenvy::dotenv().ok()` before this in a binary's `main` if
    /// you want one picked up — `dotenvy` invocation is left to the
    /// binary, not the library.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = env::var("DURABLE_DATABASE_URL") {
            cfg.connection_string = url;
        }
        if let Ok(flag) = env::var("DURABLE_RECOVER_ON_STARTUP") {
            cfg.recover_on_startup = !matches!(flag.as_str(), "false" | "0");
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_in_memory_with_recovery_on() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.connection_string, "sqlite::memory:");
        assert!(cfg.recover_on_startup);
    }

    #[test]
    fn builder_overrides_recovery_flag() {
        let cfg = EngineConfig::new("sqlite://flows.db?mode=rwc").with_recover_on_startup(false);
        assert_eq!(cfg.connection_string, "sqlite://flows.db?mode=rwc");
        assert!(!cfg.recover_on_startup);
    }
}
