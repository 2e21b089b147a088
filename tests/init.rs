use std::process::Command;

fn gs(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gs"));
    cmd.arg("--repo").arg(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = gs(dir.path()).args(["init", "--base", "develop"]).output().unwrap();
    assert!(
        output.status.success(),
        "gs init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".ghoststack/config.toml");
    assert!(config_path.exists(), ".ghoststack/config.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[brain]"));
    assert!(content.contains("[embedding]"));

    let config = ghoststack_core::GhostConfig::from_toml(&content).unwrap();
    assert_eq!(config.review.base_branch, "develop");
    assert_eq!(config.brain.chunk_size, 2000);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".ghoststack")).unwrap();
    std::fs::write(dir.path().join(".ghoststack/config.toml"), "# existing").unwrap();

    let output = gs(dir.path()).arg("init").output().unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".ghoststack/config.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn init_adds_state_dir_to_gitignore_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "target/").unwrap();

    let output = gs(dir.path()).arg("init").output().unwrap();
    assert!(output.status.success());

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.starts_with("target/\n"));
    assert_eq!(gitignore.lines().filter(|l| *l == ".ghoststack/").count(), 1);

    // A second init fails on the config, and must not touch .gitignore again.
    let _ = gs(dir.path()).arg("init").output().unwrap();
    let again = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(again, gitignore);
}
