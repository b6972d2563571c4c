use std::fs;
use std::path::Path;

use msgsearch::error::EngineError;
use msgsearch::lattice::LatticeConfig;
use msgsearch::settings::Settings;

#[test]
fn file_overrides_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        "[lattice]\nbits = 1024\nspan = 16\n\n[storage]\ndirectory = \"/var/lib/msgsearch\"\n",
    )
    .expect("write");
    let settings = Settings::load_from(&path).expect("settings");
    assert_eq!(settings.lattice(), LatticeConfig::new(1024, 16));
    assert_eq!(settings.lattice().gap(), 8, "half a window unless configured");
    assert_eq!(settings.storage.directory, Path::new("/var/lib/msgsearch"));
    assert_eq!(settings.log.filter, "info", "untouched sections keep their defaults");
}

#[test]
fn gap_can_be_tuned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gap.toml");
    fs::write(&path, "[lattice]\ngap = 0\n\n[log]\nfilter = \"msgsearch=debug\"\n").expect("write");
    let settings = Settings::load_from(&path).expect("settings");
    assert_eq!(settings.lattice().bits(), LatticeConfig::DEFAULT_BITS);
    assert_eq!(settings.lattice().span(), LatticeConfig::DEFAULT_SPAN);
    assert_eq!(settings.lattice().gap(), 0);
    assert_eq!(settings.log.filter, "msgsearch=debug");
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        Settings::load_from(dir.path().join("absent.toml")),
        Err(EngineError::Config(_))
    ));
}
