//! Layering behaviour of `Config::load_from_iter`.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use xmnr_config::{Config, LogFormat, default_xmnr_directory};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let previous = std::env::var_os(key);
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

struct ConfigFile {
    _dir: TempDir,
    path: std::path::PathBuf,
}

#[fixture]
fn config_file() -> ConfigFile {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("xmnr.toml");
    fs::write(
        &path,
        "poll_interval_ms = 250\nlog_format = \"compact\"\ndriver_command = \"/opt/drned/bin/driver\"\n",
    )
    .expect("write configuration");
    ConfigFile { _dir: dir, path }
}

fn args_with_file(file: &ConfigFile) -> Vec<OsString> {
    vec![
        OsString::from("xmnr"),
        OsString::from("--config-path"),
        file.path.clone().into_os_string(),
    ]
}

#[rstest]
fn file_values_override_defaults(config_file: ConfigFile) {
    let config = Config::load_from_iter(args_with_file(&config_file)).expect("load");
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.driver_command(), "/opt/drned/bin/driver");
    assert_eq!(config.xmnr_directory(), default_xmnr_directory());
}

#[rstest]
fn environment_overrides_file(config_file: ConfigFile) {
    let _env = EnvOverride::set_var("XMNR_POLL_INTERVAL_MS", OsStr::new("300"));
    let config = Config::load_from_iter(args_with_file(&config_file)).expect("load");
    assert_eq!(config.poll_interval_ms, 300);
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn command_line_overrides_environment(config_file: ConfigFile) {
    let _env = EnvOverride::set_var("XMNR_POLL_INTERVAL_MS", OsStr::new("300"));
    let mut args = args_with_file(&config_file);
    args.push(OsString::from("--poll-interval-ms"));
    args.push(OsString::from("400"));
    let config = Config::load_from_iter(args).expect("load");
    assert_eq!(config.poll_interval_ms, 400);
}

#[test]
fn malformed_file_is_reported() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("xmnr.toml");
    fs::write(&path, "poll_interval_ms = \"soon\"\n").expect("write configuration");
    let args = vec![
        OsString::from("xmnr"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ];
    assert!(Config::load_from_iter(args).is_err());
}
