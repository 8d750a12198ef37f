//! CLI smoke tests for samctr.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn samctr_cmd() -> Command {
    let mut cmd = cargo_bin_cmd!("samctr");
    cmd.env("USER", "tester")
        .env_remove("SAMCTR_CONFIG")
        .env_remove("SAMCTR_IMAGE")
        .env_remove("SAMCTR_NVIDIA");
    cmd
}

const CONFIG: &str = r"
image: docker://ghcr.io/org/build-node:1.0
nvidia: none
bind_paths:
  - /etc/hosts:/etc/hosts:ro
fusemounts:
  - type: container
    fuse_cmd: cvmfs2
    fuse_arg: software.eessi.io
    ctr_mountpoint: /cvmfs/software.eessi.io
  - type: container
    fuse_cmd: cvmfs2
    fuse_arg: software.asc.ac.at
    ctr_mountpoint: /cvmfs_ro/software.asc.ac.at
";

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), CONFIG).unwrap();
        std::fs::create_dir_all(tmp.path().join("host_injections")).unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        // Pre-pulled image so no apptainer is needed.
        std::fs::write(root.join("ghcr.io-org-build_node_1.0.sif"), b"SIF").unwrap();
        Self { tmp }
    }

    fn arg(&self, name: &str) -> String {
        self.tmp.path().join(name).to_string_lossy().into_owned()
    }

    fn cmd(&self) -> Command {
        let mut cmd = samctr_cmd();
        cmd.args(["-f", &self.arg("config.yaml")])
            .args(["-r", &self.arg("root")])
            .args(["-i", &self.arg("host_injections")]);
        cmd
    }
}

#[test]
fn version_flag() {
    samctr_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("samctr "));
}

#[test]
fn help_lists_commands() {
    samctr_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("pull"));
}

#[test]
fn missing_explicit_config_fails() {
    samctr_cmd()
        .args(["-f", "/nonexistent/samctr.yaml", "shell"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn invalid_bind_flag_fails_before_setup() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["-b", "/a:/b:rx", "shell"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rx"));
    assert!(!fx.tmp.path().join("root/home").exists());
}

#[test]
fn shell_to_stdout() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["--to-stdout", "-w", "software.asc.ac.at", "shell"])
        .assert()
        .success()
        .stdout(predicate::str::contains("APPTAINER_HOME="))
        .stdout(predicate::str::contains("apptainer shell --fusemount"))
        .stdout(predicate::str::contains(
            "'container:fuse-overlayfs -o lowerdir=/cvmfs_ro/software.asc.ac.at",
        ))
        .stdout(predicate::str::contains("-B /etc/hosts:/etc/hosts:ro"))
        .stdout(predicate::str::contains("/opt/eessi:rw"))
        .stdout(predicate::str::ends_with("ghcr.io-org-build_node_1.0.sif\n"));

    let root = fx.tmp.path().join("root");
    assert!(root.join("software.asc.ac.at/overlay-upper").is_dir());
    assert!(root.join("software.asc.ac.at/overlay-work").is_dir());
    assert!(root.join("home").is_dir());
    assert!(root.join("var-lib-cvmfs").is_dir());
}

#[test]
fn exec_to_stdout_appends_program() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["--to-stdout", "exec", "--", "ls", "/cvmfs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apptainer exec "))
        .stdout(predicate::str::ends_with("ghcr.io-org-build_node_1.0.sif ls /cvmfs\n"));
}

#[test]
fn pull_prints_existing_sif() {
    let fx = Fixture::new();
    fx.cmd()
        .arg("pull")
        .assert()
        .success()
        .stdout(predicate::str::contains("ghcr.io-org-build_node_1.0.sif"));
}
