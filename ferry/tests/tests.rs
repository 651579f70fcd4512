use predicates::prelude::*;

fn ferry() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("ferry").unwrap()
}

fn setup_test_env() -> (tempfile::TempDir, tempfile::TempDir) {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    (src_dir, dst_dir)
}

fn get_file_content(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_cp_local_file() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("test.txt");
    let dst_file = dst_dir.path().join("test.txt");
    std::fs::write(&src_file, "test content").unwrap();

    ferry()
        .args(["cp", src_file.to_str().unwrap(), dst_file.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(get_file_content(&dst_file), "test content");
    assert!(src_file.exists());
}

#[test]
fn test_cp_local_tree() {
    let (src_dir, dst_dir) = setup_test_env();
    std::fs::create_dir_all(src_dir.path().join("tree/nested")).unwrap();
    std::fs::write(src_dir.path().join("tree/a.txt"), "a").unwrap();
    std::fs::write(src_dir.path().join("tree/nested/b.txt"), "b").unwrap();
    let dst = dst_dir.path().join("tree");

    ferry()
        .args([
            "cp",
            src_dir.path().join("tree").to_str().unwrap(),
            dst.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert_eq!(get_file_content(&dst.join("a.txt")), "a");
    assert_eq!(get_file_content(&dst.join("nested/b.txt")), "b");
}

#[test]
fn test_cp_refuses_existing_destination() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("test.txt");
    let dst_file = dst_dir.path().join("test.txt");
    std::fs::write(&src_file, "new").unwrap();
    std::fs::write(&dst_file, "old").unwrap();

    ferry()
        .args(["cp", src_file.to_str().unwrap(), dst_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    // destination untouched without --overwrite
    assert_eq!(get_file_content(&dst_file), "old");

    ferry()
        .args([
            "cp",
            "--overwrite",
            src_file.to_str().unwrap(),
            dst_file.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert_eq!(get_file_content(&dst_file), "new");
}

#[test]
fn test_mv_local_file() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("test.txt");
    let dst_file = dst_dir.path().join("moved.txt");
    std::fs::write(&src_file, "move me").unwrap();

    ferry()
        .args(["mv", src_file.to_str().unwrap(), dst_file.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(get_file_content(&dst_file), "move me");
    assert!(!src_file.exists());
}

#[test]
fn test_rm_soft_delete_and_purge() {
    let dir = tempfile::tempdir().unwrap();
    let doomed = dir.path().join("doomed.txt");
    std::fs::write(&doomed, "bye").unwrap();

    ferry()
        .args(["rm", doomed.to_str().unwrap()])
        .assert()
        .success();
    assert!(!doomed.exists());
    // the entry was parked in the trash folder, not destroyed
    let trash = dir.path().join(".ferry-trash");
    assert!(trash.is_dir());
    assert_eq!(std::fs::read_dir(&trash).unwrap().count(), 1);

    ferry()
        .args(["purge", dir.path().to_str().unwrap()])
        .assert()
        .success();
    assert!(!trash.exists());
}

#[test]
fn test_rm_permanent_skips_trash() {
    let dir = tempfile::tempdir().unwrap();
    let doomed = dir.path().join("doomed.txt");
    std::fs::write(&doomed, "bye").unwrap();

    ferry()
        .args(["rm", "--permanent", doomed.to_str().unwrap()])
        .assert()
        .success();
    assert!(!doomed.exists());
    assert!(!dir.path().join(".ferry-trash").exists());
}

#[test]
fn test_mkdir_creates_parents() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b/c");

    ferry()
        .args(["mkdir", nested.to_str().unwrap()])
        .assert()
        .success();
    assert!(nested.is_dir());
}

#[test]
fn test_stat_and_exists() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("entry.bin");
    std::fs::write(&file, vec![0u8; 2048]).unwrap();

    ferry()
        .args(["stat", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("file"));
    ferry()
        .args(["exists", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
    ferry()
        .args(["exists", dir.path().join("missing").to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("false"));
}

#[test]
fn test_stat_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("entry.bin");
    std::fs::write(&file, vec![0u8; 5]).unwrap();

    let output = ferry()
        .args(["--json", "stat", file.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["kind"], "file");
    assert_eq!(value["size"], 5);
}

#[test]
fn test_summary_output() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("test.txt");
    std::fs::write(&src_file, "counted").unwrap();

    ferry()
        .args([
            "cp",
            "--summary",
            src_file.to_str().unwrap(),
            dst_dir.path().join("test.txt").to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("files copied")
                .and(predicate::str::contains("bytes copied")),
        );
}

#[test]
fn test_json_summary_output() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("test.txt");
    std::fs::write(&src_file, "counted").unwrap();

    let output = ferry()
        .args([
            "cp",
            "--json",
            src_file.to_str().unwrap(),
            dst_dir.path().join("test.txt").to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["files_copied"], 1);
    assert_eq!(value["bytes_copied"], 7);
}

#[test]
fn test_remote_paths_fail_without_transport() {
    let dir = tempfile::tempdir().unwrap();

    ferry()
        .args([
            "cp",
            "sftp://files/srv/data.bin",
            dir.path().join("data.bin").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("transport"));
}

#[test]
fn test_unsupported_scheme_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    ferry()
        .args([
            "cp",
            "http://example.com/file",
            dir.path().join("file").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("http"));
}
