use serde::{Deserialize, Serialize};
use thiserror::Error;

const APPLICATION_KIND: &str = "Application";

#[derive(Error, Debug)]
pub enum ManifestError {
    /// Valid YAML that describes some other resource. Not worth a warning.
    #[error("Not an Application (kind: {0})")]
    NotAnApplication(String),

    #[error("Invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ApplicationManifest {
    #[serde(default)]
    spec: ApplicationSpec,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ApplicationSpec {
    #[serde(default)]
    source: ApplicationSource,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ApplicationSource {
    #[serde(default, rename = "repoURL")]
    repo_url: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    chart: Option<String>,
    #[serde(default)]
    helm: Option<HelmSource>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct HelmSource {
    #[serde(default)]
    value_files: Vec<String>,
}

/// The parts of an Argo CD Application we index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSummary {
    /// `spec.source.chart` for chart-repository sources, otherwise `spec.source.path`.
    pub chart_identifier: String,
    pub value_files: Vec<String>,
    pub repo_url: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn summarize(value: serde_yaml::Value) -> Result<ApplicationSummary, ManifestError> {
    // Kind is checked before the typed parse so unrelated resources never count as malformed
    let kind = value
        .get("kind")
        .and_then(|k| k.as_str())
        .unwrap_or_default()
        .to_string();
    if kind != APPLICATION_KIND {
        return Err(ManifestError::NotAnApplication(kind));
    }
    let manifest: ApplicationManifest = serde_yaml::from_value(value)?;

    let source = manifest.spec.source;
    let repo_url =
        non_empty(source.repo_url).ok_or(ManifestError::MissingField("spec.source.repoURL"))?;
    let chart_identifier = non_empty(source.chart)
        .or_else(|| non_empty(source.path))
        .ok_or(ManifestError::MissingField(
            "spec.source.chart or spec.source.path",
        ))?;

    Ok(ApplicationSummary {
        chart_identifier,
        value_files: source.helm.map(|h| h.value_files).unwrap_or_default(),
        repo_url,
    })
}

/// Parses every document in `content`. Each element is one document's result,
/// so one bad document does not hide the others. Empty documents are dropped.
pub fn parse_applications(content: &str) -> Vec<Result<ApplicationSummary, ManifestError>> {
    let mut results = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = match serde_yaml::Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                results.push(Err(ManifestError::InvalidYaml(e)));
                // A syntax error poisons the rest of the stream
                break;
            }
        };
        if value.is_null() {
            continue;
        }
        results.push(summarize(value));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GIT_APP: &str = r#"
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: my-app-prod
spec:
  project: default
  source:
    repoURL: https://github.com/acme/platform.git
    path: charts/my-app
    targetRevision: main
    helm:
      valueFiles:
        - values.yaml
        - env/prod-values.yaml
  destination:
    namespace: my-app
"#;

    #[test]
    fn test_parse_git_application() {
        let results = parse_applications(GIT_APP);
        assert_eq!(results.len(), 1);
        let app = results.into_iter().next().unwrap().unwrap();
        assert_eq!(
            app,
            ApplicationSummary {
                chart_identifier: "charts/my-app".to_string(),
                value_files: vec![
                    "values.yaml".to_string(),
                    "env/prod-values.yaml".to_string()
                ],
                repo_url: "https://github.com/acme/platform.git".to_string(),
            }
        );
    }

    #[test]
    fn test_chart_preferred_over_path() {
        let content = r#"
kind: Application
spec:
  source:
    repoURL: oci://registry.acme.io/charts
    chart: my-app
    path: ignored
"#;
        let app = parse_applications(content).remove(0).unwrap();
        assert_eq!(app.chart_identifier, "my-app");
        assert_eq!(app.value_files, Vec::<String>::new());
    }

    #[test]
    fn test_other_kinds_are_not_applications() {
        let content = "kind: ConfigMap\nmetadata:\n  name: x\n";
        let result = parse_applications(content).remove(0);
        assert!(matches!(result, Err(ManifestError::NotAnApplication(k)) if k == "ConfigMap"));
    }

    #[test]
    fn test_missing_repo_url() {
        let content = "kind: Application\nspec:\n  source:\n    path: charts/x\n";
        let result = parse_applications(content).remove(0);
        assert!(matches!(
            result,
            Err(ManifestError::MissingField("spec.source.repoURL"))
        ));
    }

    #[test]
    fn test_missing_chart_and_path() {
        let content = "kind: Application\nspec:\n  source:\n    repoURL: https://x\n";
        let result = parse_applications(content).remove(0);
        assert!(matches!(result, Err(ManifestError::MissingField(_))));
    }

    #[test]
    fn test_multi_document_file() {
        let content = format!(
            "{}\n---\nkind: Service\nmetadata:\n  name: svc\n---\n",
            GIT_APP
        );
        let results = parse_applications(&content);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ManifestError::NotAnApplication(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let results = parse_applications("kind: [unclosed");
        assert!(results.iter().all(|r| matches!(r, Err(ManifestError::InvalidYaml(_)))));
    }
}
