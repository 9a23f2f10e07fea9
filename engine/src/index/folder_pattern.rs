use std::path::{Component, Path};

use thiserror::Error;

pub const DEFAULT_FOLDER_PATTERN: &str = "{chartName}/{envName}";

const CHART_PLACEHOLDER: &str = "{chartName}";
const ENV_PLACEHOLDER: &str = "{envName}";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FolderPatternError {
    #[error("Folder pattern '{0}' must contain both {{chartName}} and {{envName}}")]
    MissingPlaceholder(String),

    #[error("Path '{path}' has {found} directory components, pattern needs {needed}")]
    TooFewComponents {
        path: String,
        found: usize,
        needed: usize,
    },

    #[error("Could not extract {slot} from path '{path}'")]
    EmptySlot { slot: &'static str, path: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Chart,
    Env,
    Literal(String),
}

/// Maps the trailing directory components of a manifest path onto chart and environment names.
///
/// The pattern is matched against the *last* N directory components, where N is the number
/// of pattern segments. Literal segments are positional placeholders and are not compared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl FolderPattern {
    pub fn parse(pattern: &str) -> Result<Self, FolderPatternError> {
        let segments: Vec<Segment> = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                CHART_PLACEHOLDER => Segment::Chart,
                ENV_PLACEHOLDER => Segment::Env,
                other => Segment::Literal(other.to_string()),
            })
            .collect();

        let has_chart = segments.contains(&Segment::Chart);
        let has_env = segments.contains(&Segment::Env);
        if !has_chart || !has_env {
            return Err(FolderPatternError::MissingPlaceholder(pattern.to_string()));
        }

        Ok(FolderPattern {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `dir` is the manifest's directory relative to the repository root.
    pub fn extract(&self, dir: &Path) -> Result<(String, String), FolderPatternError> {
        let parts: Vec<String> = dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        let needed = self.segments.len();
        if parts.len() < needed {
            return Err(FolderPatternError::TooFewComponents {
                path: dir.display().to_string(),
                found: parts.len(),
                needed,
            });
        }

        let relevant = &parts[parts.len() - needed..];
        let mut chart = String::new();
        let mut env = String::new();
        for (segment, part) in self.segments.iter().zip(relevant) {
            match segment {
                Segment::Chart => chart = part.clone(),
                Segment::Env => env = part.clone(),
                Segment::Literal(_) => {}
            }
        }

        if chart.is_empty() {
            return Err(FolderPatternError::EmptySlot {
                slot: "chartName",
                path: dir.display().to_string(),
            });
        }
        if env.is_empty() {
            return Err(FolderPatternError::EmptySlot {
                slot: "envName",
                path: dir.display().to_string(),
            });
        }
        Ok((chart, env))
    }
}

impl Default for FolderPattern {
    fn default() -> Self {
        FolderPattern {
            raw: DEFAULT_FOLDER_PATTERN.to_string(),
            segments: vec![Segment::Chart, Segment::Env],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_pattern() {
        let pattern = FolderPattern::default();
        assert_eq!(pattern, FolderPattern::parse(DEFAULT_FOLDER_PATTERN).unwrap());
        assert_eq!(
            pattern.extract(Path::new("my-app/prod")).unwrap(),
            ("my-app".to_string(), "prod".to_string())
        );
    }

    #[test]
    fn test_uses_last_components() {
        let pattern = FolderPattern::default();
        assert_eq!(
            pattern.extract(Path::new("clusters/eu-1/my-app/prod")).unwrap(),
            ("my-app".to_string(), "prod".to_string())
        );
    }

    #[test]
    fn test_too_few_components() {
        let pattern = FolderPattern::default();
        assert_eq!(
            pattern.extract(Path::new("my-app")),
            Err(FolderPatternError::TooFewComponents {
                path: "my-app".to_string(),
                found: 1,
                needed: 2
            })
        );
        assert!(pattern.extract(Path::new("")).is_err());
    }

    #[test]
    fn test_literal_segments_and_reversed_order() {
        let pattern = FolderPattern::parse("{envName}/apps/{chartName}").unwrap();
        assert_eq!(
            pattern.extract(Path::new("staging/whatever/billing")).unwrap(),
            ("billing".to_string(), "staging".to_string())
        );
    }

    #[test]
    fn test_pattern_requires_both_placeholders() {
        assert_eq!(
            FolderPattern::parse("{chartName}/envs"),
            Err(FolderPatternError::MissingPlaceholder(
                "{chartName}/envs".to_string()
            ))
        );
    }
}
