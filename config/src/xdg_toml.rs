//! Reads `$XDG_CONFIG_HOME/<app>/config.toml` (falling back to the platform config dir).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::LoadError;

/// Base config directory: `XDG_CONFIG_HOME` if set and non-empty, else the platform default.
fn config_home() -> Result<PathBuf, LoadError> {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => dirs::config_dir()
            .ok_or_else(|| LoadError::XdgPath("no config directory for this platform".into())),
    }
}

/// Path of the app's `config.toml`, whether or not it exists.
pub fn config_path(app_name: &str) -> Result<PathBuf, LoadError> {
    Ok(config_home()?.join(app_name).join("config.toml"))
}

/// Parsed document, or `None` when the file does not exist.
pub fn load_document(app_name: &str) -> Result<Option<toml::Table>, LoadError> {
    let path = config_path(app_name)?;
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    let table: toml::Table = toml::from_str(&content)?;
    Ok(Some(table))
}

/// Key-value pairs of the `[env]` table. Numbers and booleans are stringified; arrays and
/// nested tables are skipped.
pub fn load_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(document) = load_document(app_name)? else {
        return Ok(HashMap::new());
    };
    let Some(toml::Value::Table(env)) = document.get("env") else {
        return Ok(HashMap::new());
    };
    let map = env
        .iter()
        .filter_map(|(k, v)| {
            let value = match v {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), value))
        })
        .collect();
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_xdg<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
        let _guard = crate::env_lock();
        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir);
        let out = f();
        match prev {
            Some(p) => env::set_var("XDG_CONFIG_HOME", p),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
        out
    }

    fn write_config(root: &std::path::Path, app: &str, body: &str) {
        let app_dir = root.join(app);
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), body).unwrap();
    }

    #[test]
    fn missing_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = with_xdg(dir.path(), || load_env_map("stepwise-missing")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn env_table_values_are_stringified() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "stepwise-env",
            "[env]\nOPENAI_MODEL = \"gpt-4o-mini\"\nRETRIES = 3\nVERBOSE = true\nLIST = [1, 2]\n",
        );
        let map = with_xdg(dir.path(), || load_env_map("stepwise-env")).unwrap();
        assert_eq!(map.get("OPENAI_MODEL").map(String::as_str), Some("gpt-4o-mini"));
        assert_eq!(map.get("RETRIES").map(String::as_str), Some("3"));
        assert_eq!(map.get("VERBOSE").map(String::as_str), Some("true"));
        assert!(!map.contains_key("LIST"));
    }

    #[test]
    fn document_without_env_table_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "stepwise-task-only", "[task]\nbranch = 4\n");
        let map = with_xdg(dir.path(), || load_env_map("stepwise-task-only")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "stepwise-bad", "branch = [[[\n");
        let result = with_xdg(dir.path(), || load_document("stepwise-bad"));
        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }

    #[test]
    fn config_path_joins_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = with_xdg(dir.path(), || config_path("stepwise")).unwrap();
        assert_eq!(path, dir.path().join("stepwise").join("config.toml"));
    }
}
