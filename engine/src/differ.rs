use async_trait::async_trait;
use gate_defs::DiffStrategy;
use log::debug;

use crate::cmd::run_command;

/// Unified line diff with `base_label`/`head_label` as file headers. Empty when equal.
pub fn unified_diff(base_label: &str, head_label: &str, base: &[u8], head: &[u8]) -> String {
    let base = String::from_utf8_lossy(base);
    let head = String::from_utf8_lossy(head);
    let patch = diffy::create_patch(&base, &head);
    if patch.hunks().is_empty() {
        return String::new();
    }

    let rendered = patch.to_string();
    let body: Vec<&str> = rendered
        .lines()
        .skip_while(|line| line.starts_with("--- ") || line.starts_with("+++ "))
        .collect();
    format!(
        "--- {}\n+++ {}\n{}",
        base_label,
        head_label,
        body.join("\n")
    )
    .trim()
    .to_string()
}

/// In-process line differ.
#[derive(Default)]
pub struct LineDiffer;

#[async_trait]
impl DiffStrategy for LineDiffer {
    async fn compute_diff(
        &self,
        base_label: &str,
        head_label: &str,
        base: &[u8],
        head: &[u8],
    ) -> String {
        unified_diff(base_label, head_label, base, head)
    }
}

/// Semantic YAML diff through the `dyff` CLI. Any failure yields an empty diff.
pub struct DyffDiffer {
    dyff_binary: String,
}

impl DyffDiffer {
    pub fn new(dyff_binary: &str) -> Self {
        DyffDiffer {
            dyff_binary: dyff_binary.to_string(),
        }
    }

    async fn run(
        &self,
        base_label: &str,
        head_label: &str,
        base: &[u8],
        head: &[u8],
    ) -> Result<String, anyhow::Error> {
        let tmp = tempfile::Builder::new().prefix("chartgate-dyff-").tempdir()?;
        let base_file = tmp.path().join("base.yaml");
        let head_file = tmp.path().join("head.yaml");
        tokio::fs::write(&base_file, base).await?;
        tokio::fs::write(&head_file, head).await?;

        let mut exec = tokio::process::Command::new(&self.dyff_binary);
        exec.args(["between", "--color=off", "--set-exit-code"])
            .arg(&base_file)
            .arg(&head_file);
        let result = run_command(&mut exec).await?;

        // 0: no differences, 1: differences, anything else: dyff failed
        match result.exit_code {
            Some(1) => {}
            Some(0) => return Ok(String::new()),
            other => {
                debug!("dyff exited with {:?}: {}", other, result.stderr);
                return Ok(String::new());
            }
        }

        let tmp_dir = tmp.path().to_string_lossy().to_string();
        let output = clean_dyff_output(&String::from_utf8_lossy(&result.stdout), &tmp_dir);
        Ok(format!("--- {}\n+++ {}\n\n{}", base_label, head_label, output)
            .trim()
            .to_string())
    }
}

impl Default for DyffDiffer {
    fn default() -> Self {
        DyffDiffer::new("dyff")
    }
}

#[async_trait]
impl DiffStrategy for DyffDiffer {
    async fn compute_diff(
        &self,
        base_label: &str,
        head_label: &str,
        base: &[u8],
        head: &[u8],
    ) -> String {
        match self.run(base_label, head_label, base, head).await {
            Ok(diff) => diff,
            Err(e) => {
                debug!("dyff unavailable, falling back: {:#}", e);
                String::new()
            }
        }
    }
}

const DYFF_BANNER_FRAGMENTS: [&str; 6] = [
    "_        __  __",
    "_| |_   _ / _|/ _|",
    "/ _' | | | | |_| |_",
    "| (_| | |_| |  _|  _|",
    "\\__,_|\\__, |_| |_|",
    "|___/",
];

/// Drops the ASCII banner, the "returned N differences" line and lines naming temp files.
fn clean_dyff_output(output: &str, tmp_dir: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    for line in output.lines() {
        if line.contains(tmp_dir) {
            continue;
        }
        if DYFF_BANNER_FRAGMENTS.iter().any(|f| line.contains(f)) {
            continue;
        }
        if line.contains("returned") && line.contains("difference") {
            continue;
        }
        if cleaned.is_empty() && line.trim().is_empty() {
            continue;
        }
        cleaned.push(line);
    }
    cleaned.join("\n")
}
