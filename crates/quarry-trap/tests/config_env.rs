use quarry_trap::{
    OutputConfig, TrapError, LAYOUT_FILE_ENV_VAR, SOURCE_ARCHIVE_DIR_ENV_VAR, TRAP_DIR_ENV_VAR,
};
use std::path::Path;

// All environment manipulation lives in this single test so parallel test
// threads never observe each other's variables.
#[test]
fn output_config_resolution_from_env() {
    std::env::remove_var(TRAP_DIR_ENV_VAR);
    std::env::remove_var(SOURCE_ARCHIVE_DIR_ENV_VAR);
    std::env::remove_var(LAYOUT_FILE_ENV_VAR);

    // Nothing set: fatal configuration error.
    assert!(matches!(
        OutputConfig::from_env(),
        Err(TrapError::MissingOutputConfig { .. })
    ));

    // Trap dir without a source archive dir: fatal.
    std::env::set_var(TRAP_DIR_ENV_VAR, "/out/trap");
    assert!(matches!(
        OutputConfig::from_env(),
        Err(TrapError::MissingSourceArchiveDir { .. })
    ));

    // Both roots set: fixed-roots configuration.
    std::env::set_var(SOURCE_ARCHIVE_DIR_ENV_VAR, "/out/src_archive");
    let config = OutputConfig::from_env().unwrap();
    let entry = config.entry_for(Path::new("/anything/Main.java")).unwrap();
    assert_eq!(entry.trap_dir, Path::new("/out/trap"));
    assert_eq!(entry.source_archive_dir, Path::new("/out/src_archive"));

    // Layout file applies only when the fixed roots are absent.
    std::env::remove_var(TRAP_DIR_ENV_VAR);
    std::env::remove_var(SOURCE_ARCHIVE_DIR_ENV_VAR);
    let tmp = tempfile::tempdir().unwrap();
    let layout_path = tmp.path().join("layout.toml");
    std::fs::write(
        &layout_path,
        "[[entry]]\ntrap-dir = \"/out/trap\"\nsource-archive-dir = \"/out/src\"\ninclude = [\"/work\"]\n",
    )
    .unwrap();
    std::env::set_var(LAYOUT_FILE_ENV_VAR, &layout_path);
    let config = OutputConfig::from_env().unwrap();
    assert!(config.entry_for(Path::new("/work/Main.java")).is_some());
    assert!(config.entry_for(Path::new("/elsewhere/Main.java")).is_none());

    std::env::remove_var(LAYOUT_FILE_ENV_VAR);
}
