use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        let mut map = default_map();

        // Read .hmsrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(config_path) {
                debug!(path = %config_path.display(), "reading config file");
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        // Docker images of the server export the admin password under this name
        if !map.contains_key("SMARTHOME_PASSWORD") {
            if let Ok(v) = env::var("SMARTHOME_ADMIN_PASSWORD") {
                map.insert("SMARTHOME_PASSWORD".into(), v);
            }
        }

        Self { inner: map, config_path: config_path.to_path_buf() }
    }

    /// Applies a value coming from a command-line flag; `None` keeps the loaded value.
    pub fn set_override(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.inner.insert(key.to_string(), v.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn server_url(&self) -> String {
        self.get("SMARTHOME_URL")
            .unwrap_or_else(|| "http://localhost".into())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn username(&self) -> String {
        self.get("SMARTHOME_USERNAME").unwrap_or_default()
    }

    pub fn password(&self) -> String {
        self.get("SMARTHOME_PASSWORD").unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("REQUEST_TIMEOUT").unwrap_or(60))
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("EXECUTE_TIMEOUT").unwrap_or(120))
    }

    pub fn lint_on_push(&self) -> bool {
        self.get_bool("LINT_ON_PUSH")
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "SMARTHOME_URL",
        "SMARTHOME_USERNAME",
        "SMARTHOME_PASSWORD",
        "REQUEST_TIMEOUT",
        "EXECUTE_TIMEOUT",
        "LINT_ON_PUSH",
    ];

    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("homescript").join(".hmsrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("SMARTHOME_URL".into(), "http://localhost".into());
    m.insert("SMARTHOME_USERNAME".into(), "admin".into());

    // Seconds
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("EXECUTE_TIMEOUT".into(), "120".into());

    m.insert("LINT_ON_PUSH".into(), "true".into());

    m
}
