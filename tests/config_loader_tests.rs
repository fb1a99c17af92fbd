use datasync::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("DATASYNC_PROFILE");
        env::remove_var("DATASYNC_LOG_LEVEL");
        env::remove_var("DATASYNC_LOG_FORMAT");
        env::remove_var("DATASYNC_SYNC_FETCH_TIMEOUT_SECONDS");
        env::remove_var("DATASYNC_SYNC_STORE_TIMEOUT_SECONDS");
        env::remove_var("DATASYNC_SYNC_ERROR_EXAMPLE_LIMIT");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.log_format, "json");
    assert_eq!(cfg.sync.fetch_timeout_seconds, 60);
    assert_eq!(cfg.sync.store_timeout_seconds, 10);
    assert_eq!(cfg.sync.error_example_limit, 5);
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "DATASYNC_LOG_LEVEL=warn\n");
    write_env_file(
        &temp_dir,
        ".env.local",
        "DATASYNC_PROFILE=test\nDATASYNC_LOG_LEVEL=info\n",
    );
    write_env_file(&temp_dir, ".env.test", "DATASYNC_LOG_LEVEL=debug\n");
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "DATASYNC_LOG_LEVEL=trace\nDATASYNC_SYNC_FETCH_TIMEOUT_SECONDS=120\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.log_level, "trace");
    assert_eq!(cfg.sync.fetch_timeout_seconds, 120);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "DATASYNC_SYNC_ERROR_EXAMPLE_LIMIT=3\n");

    unsafe {
        env::set_var("DATASYNC_SYNC_ERROR_EXAMPLE_LIMIT", "9");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.sync.error_example_limit, 9);

    clear_env();
}

#[test]
fn out_of_bounds_values_fail_validation() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "DATASYNC_SYNC_STORE_TIMEOUT_SECONDS=0\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());
    clear_env();
}
