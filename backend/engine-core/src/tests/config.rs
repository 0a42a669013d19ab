use crate::SHM_PATH_ENV;
use crate::config::{FramesConfig, HostConfig};
use crate::error::config::ConfigError;

use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

/// **VALUE**: Verifies the built-in defaults.
///
/// **WHY THIS MATTERS**: Most installs never write a host.toml; these numbers are what
/// users actually run with.
///
/// **BUG THIS CATCHES**: Would catch a default drifting, e.g. `max_misses` becoming 1 and
/// restarting the engine on the first slow ping.
#[test]
fn given_no_config_when_default_then_uses_documented_values() {
    let config = HostConfig::default();

    assert_eq!(config.sidecar.program, "entropic-engine");
    assert_eq!(config.sidecar.startup_timeout_ms, 15_000);
    assert_eq!(config.sidecar.max_output_lines, 200);
    assert_eq!(config.health.interval_ms, 1_000);
    assert_eq!(config.health.probe_timeout_ms, 2_000);
    assert_eq!(config.health.max_misses, 3);
    assert_eq!(config.health.render_max_misses, 10);
    assert_eq!(config.relay.command_timeout_ms, 30_000);
    assert_eq!(config.relay.export_poll_interval_ms, 500);
    assert!(config.validate().is_ok());
}

/// **VALUE**: Verifies a partial host.toml keeps defaults for everything it omits.
///
/// **BUG THIS CATCHES**: Would catch missing `#[serde(default)]`, which turns a one-line
/// override into a parse error.
#[test]
fn given_partial_file_when_loaded_then_missing_fields_use_defaults() {
    // GIVEN: A host.toml overriding one health value
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("host.toml"),
        "[health]\nrender_max_misses = 20\n",
    )
    .unwrap();

    // WHEN: Loading
    let config = HostConfig::load(dir.path()).unwrap();

    // THEN: Override applied, everything else default
    assert_eq!(config.health.render_max_misses, 20);
    assert_eq!(config.health.max_misses, 3);
    assert_eq!(config.sidecar.program, "entropic-engine");
}

/// **VALUE**: Verifies the `config/` subdirectory is searched too.
#[test]
fn given_file_in_config_subdir_when_loaded_then_found() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config").join("host.toml"),
        "[sidecar]\nprogram = \"custom-engine\"\nargs = [\"--gpu\"]\n",
    )
    .unwrap();

    let config = HostConfig::load(dir.path()).unwrap();

    assert_eq!(config.sidecar.program, "custom-engine");
    assert_eq!(config.sidecar.args, vec!["--gpu".to_string()]);
}

/// **VALUE**: Verifies a broken file falls back to defaults instead of blocking startup.
///
/// **WHY THIS MATTERS**: A typo in host.toml must not leave the user with no engine at all.
#[test]
fn given_invalid_toml_when_loaded_then_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("host.toml"), "[health\nmax_misses = ").unwrap();

    let config = HostConfig::load(dir.path()).unwrap();

    assert_eq!(config, HostConfig::default());
}

/// **VALUE**: Verifies `load_from_path` reports parse errors with the path.
#[test]
fn given_invalid_toml_when_loaded_from_path_then_returns_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("host.toml");
    std::fs::write(&path, "max_misses = [").unwrap();

    let result = HostConfig::load_from_path(&path);

    assert!(matches!(result, Err(ConfigError::ParseError { path: p, .. }) if p == path));
}

/// **VALUE**: Verifies the render limit can never be below the normal limit.
///
/// **WHY THIS MATTERS**: The render limit exists to be more tolerant; a smaller value would
/// make renders trigger restarts sooner than idle periods.
///
/// **BUG THIS CATCHES**: Would catch the comparison being dropped or inverted.
#[test]
fn given_render_limit_below_normal_limit_when_validated_then_rejected() {
    let mut config = HostConfig::default();
    config.health.max_misses = 5;
    config.health.render_max_misses = 4;

    let result = config.validate();

    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

/// **VALUE**: Verifies zero durations are rejected.
///
/// **BUG THIS CATCHES**: Would catch a zero interval that turns the ping loop into a busy loop.
#[test]
fn given_zero_interval_when_validated_then_rejected() {
    let mut config = HostConfig::default();
    config.health.interval_ms = 0;

    let err = config.validate().unwrap_err();

    assert!(err.to_string().contains("health.interval_ms"));
}

/// **VALUE**: Verifies an empty program name is rejected.
#[test]
fn given_empty_program_when_validated_then_rejected() {
    let mut config = HostConfig::default();
    config.sidecar.program = "  ".to_string();

    assert!(config.validate().is_err());
}

/// **VALUE**: Verifies the environment variable beats the configured frame path.
///
/// **WHY THIS MATTERS**: Developers point the host at a hand-started engine through
/// `ENTROPIC_SHM_PATH` without editing config files.
///
/// **BUG THIS CATCHES**: Would catch the lookup order being reversed.
#[test]
#[serial]
fn given_env_override_when_resolving_shm_path_then_env_wins() {
    // GIVEN: Both env var and config value set
    let frames = FramesConfig {
        shm_path: Some(PathBuf::from("/from/config")),
    };
    unsafe { std::env::set_var(SHM_PATH_ENV, "/from/env") };

    // WHEN: Resolving
    let resolved = frames.resolve_shm_path();
    unsafe { std::env::remove_var(SHM_PATH_ENV) };

    // THEN: The env var wins
    assert_eq!(resolved, PathBuf::from("/from/env"));
}

/// **VALUE**: Verifies the configured path is used when no env override exists.
#[test]
#[serial]
fn given_config_path_without_env_when_resolving_then_config_wins() {
    unsafe { std::env::remove_var(SHM_PATH_ENV) };
    let frames = FramesConfig {
        shm_path: Some(PathBuf::from("/from/config")),
    };

    assert_eq!(frames.resolve_shm_path(), PathBuf::from("/from/config"));
}

/// **VALUE**: Verifies the fallback lands under an `entropic` directory.
#[test]
#[serial]
fn given_nothing_configured_when_resolving_then_uses_cache_fallback() {
    unsafe { std::env::remove_var(SHM_PATH_ENV) };

    let resolved = FramesConfig::default().resolve_shm_path();

    assert!(resolved.ends_with("entropic/frames"));
}
