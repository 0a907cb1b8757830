//! Environment and file configuration for stepwise binaries and tests.
//!
//! Two sources feed the process environment, with priority
//! **existing env > project `.env` > XDG `config.toml` `[env]` table**.
//! Other tables of the XDG file (e.g. `[task]`) are returned as raw TOML by
//! [`load_section`] for the caller to deserialize.

mod dotenv;
mod xdg_toml;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default application name: config lives in `$XDG_CONFIG_HOME/stepwise/config.toml`.
pub const DEFAULT_APP_NAME: &str = "stepwise";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Sets every key from `.env` and the XDG `[env]` table that is not already in the
/// process environment.
///
/// * `app_name`: directory under the XDG config home.
/// * `override_dir`: where to look for `.env` instead of the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg = xdg_toml::load_env_map(app_name)?;
    let dotenv = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let keys: HashSet<&String> = xdg.keys().chain(dotenv.keys()).collect();
    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(value) = dotenv.get(key).or_else(|| xdg.get(key)) {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

/// Returns table `section` of the app's XDG `config.toml`, or `None` when the file or the
/// table is missing.
pub fn load_section(app_name: &str, section: &str) -> Result<Option<toml::Value>, LoadError> {
    let Some(mut document) = xdg_toml::load_document(app_name)? else {
        return Ok(None);
    };
    Ok(document.remove(section))
}

/// Location of the app's `config.toml` (may not exist).
pub fn config_path(app_name: &str) -> Result<PathBuf, LoadError> {
    xdg_toml::config_path(app_name)
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, else `default_filter`.
/// A second call is a no-op.
#[cfg(feature = "tracing-init")]
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init();
}

#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore_var(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    fn xdg_with(app: &str, body: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join(app);
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), body).unwrap();
        dir
    }

    #[test]
    fn existing_env_wins() {
        let _guard = env_lock();
        let xdg = xdg_with("stepwise", "[env]\nSTEPWISE_TEST_EXISTING = \"from_xdg\"\n");
        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        env::set_var("STEPWISE_TEST_EXISTING", "from_env");

        let empty = tempfile::tempdir().unwrap();
        load_and_apply("stepwise", Some(empty.path())).unwrap();
        let val = env::var("STEPWISE_TEST_EXISTING").unwrap();
        env::remove_var("STEPWISE_TEST_EXISTING");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_env");
    }

    #[test]
    fn dotenv_overrides_xdg() {
        let _guard = env_lock();
        let xdg = xdg_with("stepwise", "[env]\nSTEPWISE_TEST_PRIORITY = \"from_xdg\"\n");
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "STEPWISE_TEST_PRIORITY=from_dotenv\n",
        )
        .unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        env::remove_var("STEPWISE_TEST_PRIORITY");

        load_and_apply("stepwise", Some(dotenv_dir.path())).unwrap();
        let val = env::var("STEPWISE_TEST_PRIORITY").unwrap();
        env::remove_var("STEPWISE_TEST_PRIORITY");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_dotenv");
    }

    #[test]
    fn load_section_returns_named_table() {
        let _guard = env_lock();
        let xdg = xdg_with(
            "stepwise",
            "[env]\nA = \"1\"\n\n[task]\nquestion = \"2 + 2?\"\nbranch = 4\n",
        );
        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        let task = load_section("stepwise", "task");
        let missing = load_section("stepwise", "engine");
        let no_file = load_section("stepwise-no-such-app", "task");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        let task = task.unwrap().unwrap();
        assert_eq!(task.get("branch").and_then(|v| v.as_integer()), Some(4));
        assert_eq!(task.get("question").and_then(|v| v.as_str()), Some("2 + 2?"));
        assert!(missing.unwrap().is_none());
        assert!(no_file.unwrap().is_none());
    }

    #[test]
    fn invalid_xdg_toml_fails_with_parse_error() {
        let _guard = env_lock();
        let xdg = xdg_with("stepwise", "invalid [[[\n");
        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        let result = load_and_apply("stepwise", None);
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
