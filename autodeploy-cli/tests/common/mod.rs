#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Environment variables that would leak the developer's own setup into a run.
const AGENT_ENV: &[&str] = &[
    "AUTODEPLOY_CONFIG",
    "AUTODEPLOY_WORK_DIR",
    "AUTODEPLOY_BRANCH",
    "AUTODEPLOY_REMOTE",
    "AUTODEPLOY_PROCESS_NAME",
    "AUTODEPLOY_LOG_FILE",
    "RUST_LOG",
];

/// Build-and-restart commands that need neither npm nor pm2.
pub const FAKE_TOOLCHAIN_CONFIG: &str = r#"
install_command: ["sh", "-c", "echo installed > installed.marker"]
build_command: ["sh", "-c", "mkdir -p dist && echo built > dist/server.js"]
supervisor: "true"
"#;

/// Run git in `dir`, panicking with both streams on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        output.status.success(),
        "git {} failed\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure_identity(repo: &Path) {
    git(repo, &["config", "user.email", "deploy@example.com"]);
    git(repo, &["config", "user.name", "Deploy Test"]);
    git(repo, &["config", "commit.gpgsign", "false"]);
    git(repo, &["config", "pull.rebase", "false"]);
}

/// A bare remote, a seed clone that publishes commits, and the deployed
/// working copy (`work`). Logs and build output are git-ignored, as they
/// would be in a real deployment.
pub struct Site {
    pub tmp: TempDir,
    pub home: PathBuf,
    pub seed: PathBuf,
    pub work: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        let remote = tmp.path().join("remote.git");
        let seed = tmp.path().join("seed");
        let work = tmp.path().join("work");
        fs::create_dir_all(&home).unwrap();

        git(tmp.path(), &["init", "--bare", "-b", "main", remote.to_str().unwrap()]);

        fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "-b", "main"]);
        configure_identity(&seed);
        fs::write(seed.join(".gitignore"), "logs/\ndist/\nnode_modules/\n*.marker\n").unwrap();
        fs::write(seed.join("package.json"), "{\"name\":\"chat\"}\n").unwrap();
        fs::write(seed.join("server.ts"), "console.log('v1');\n").unwrap();
        git(&seed, &["add", "."]);
        git(&seed, &["commit", "-m", "initial"]);
        git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git(&seed, &["push", "-u", "origin", "main"]);

        git(tmp.path(), &["clone", remote.to_str().unwrap(), work.to_str().unwrap()]);
        configure_identity(&work);

        Self {
            tmp,
            home,
            seed,
            work,
        }
    }

    /// Commit `contents` to `file` in the seed clone and push it.
    pub fn publish(&self, file: &str, contents: &str) {
        fs::write(self.seed.join(file), contents).unwrap();
        git(&self.seed, &["add", file]);
        git(&self.seed, &["commit", "-m", &format!("update {file}")]);
        git(&self.seed, &["push", "origin", "main"]);
    }

    pub fn head(&self) -> String {
        git(&self.work, &["rev-parse", "HEAD"])
    }

    /// Write a config file outside the working copy and return its path.
    pub fn config_file(&self, yaml: &str) -> PathBuf {
        let path = self.tmp.path().join("autodeploy.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    /// `autodeploy` with an isolated home and environment, pointed at `work`.
    pub fn autodeploy(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("autodeploy").unwrap();
        cmd.env("HOME", &self.home).env("USERPROFILE", &self.home);
        for key in AGENT_ENV {
            cmd.env_remove(key);
        }
        cmd.arg("--work-dir").arg(&self.work);
        cmd
    }
}

/// Parse the whole of stdout as the JSON deployment report.
pub fn report(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not a JSON report ({e}):\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// `autodeploy` with an isolated environment and no working copy configured.
pub fn bare_autodeploy(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("autodeploy").unwrap();
    cmd.env("HOME", home).env("USERPROFILE", home);
    for key in AGENT_ENV {
        cmd.env_remove(key);
    }
    cmd
}
