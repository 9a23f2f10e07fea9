use std::path::Path;

use async_trait::async_trait;
use gate_defs::Renderer;
use log::debug;

use crate::cmd::run_checked;

const RELEASE_NAME: &str = "chartgate-render";

/// Renders charts with `helm template`.
pub struct HelmRenderer {
    helm_binary: String,
}

impl HelmRenderer {
    pub fn new(helm_binary: &str) -> Self {
        HelmRenderer {
            helm_binary: helm_binary.to_string(),
        }
    }

    fn args(chart_dir: &Path, value_files: &[String]) -> Vec<String> {
        let mut args = vec![
            "template".to_string(),
            RELEASE_NAME.to_string(),
            chart_dir.to_string_lossy().to_string(),
        ];
        for value_file in value_files {
            args.push("-f".to_string());
            args.push(chart_dir.join(value_file).to_string_lossy().to_string());
        }
        args
    }
}

impl Default for HelmRenderer {
    fn default() -> Self {
        HelmRenderer::new("helm")
    }
}

#[async_trait]
impl Renderer for HelmRenderer {
    async fn render(
        &self,
        chart_dir: &Path,
        value_files: &[String],
    ) -> Result<Vec<u8>, anyhow::Error> {
        let args = HelmRenderer::args(chart_dir, value_files);
        debug!("Running {} {}", self.helm_binary, args.join(" "));
        let mut exec = tokio::process::Command::new(&self.helm_binary);
        exec.args(&args);
        let output = run_checked(&mut exec).await?;
        debug!(
            "Rendered {} ({} bytes)",
            chart_dir.display(),
            output.len()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_resolve_value_files_inside_chart() {
        let args = HelmRenderer::args(
            Path::new("/tmp/checkout/charts/my-app"),
            &["values.yaml".to_string(), "env/prod-values.yaml".to_string()],
        );
        assert_eq!(
            args,
            vec![
                "template",
                "chartgate-render",
                "/tmp/checkout/charts/my-app",
                "-f",
                "/tmp/checkout/charts/my-app/values.yaml",
                "-f",
                "/tmp/checkout/charts/my-app/env/prod-values.yaml",
            ]
        );
    }

    #[tokio::test]
    async fn test_render_error_carries_stderr() {
        // `false` stands in for a helm binary that always fails
        let renderer = HelmRenderer::new("false");
        let result = renderer.render(Path::new("/nonexistent"), &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires helm on PATH"]
    async fn test_render_real_chart() {
        let tmp = tempfile::tempdir().unwrap();
        let chart = tmp.path().join("demo");
        std::fs::create_dir_all(chart.join("templates")).unwrap();
        std::fs::write(chart.join("Chart.yaml"), "apiVersion: v2\nname: demo\nversion: 0.1.0\n").unwrap();
        std::fs::write(chart.join("values.yaml"), "replicas: 1\n").unwrap();
        std::fs::write(
            chart.join("templates/cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  replicas: \"{{ .Values.replicas }}\"\n",
        )
        .unwrap();

        let output = HelmRenderer::default().render(&chart, &[]).await.unwrap();
        assert!(String::from_utf8_lossy(&output).contains("replicas: \"1\""));
    }
}
