use serde::{Deserialize, Serialize};

pub const BASE_ENVIRONMENT: &str = "base";

pub const NOT_DEPLOYED_MESSAGE: &str = "No environments configured for this chart; it does not appear to be deployed. Only the base chart was checked.";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub name: String,
    /// Applied left to right, later files override earlier ones.
    pub value_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, value_files: Vec<String>) -> Self {
        EnvironmentDescriptor {
            name: name.into(),
            value_files,
            message: None,
        }
    }

    pub fn message_only(name: impl Into<String>, message: impl Into<String>) -> Self {
        EnvironmentDescriptor {
            name: name.into(),
            value_files: vec![],
            message: Some(message.into()),
        }
    }

    /// Entries that only carry an advisory message are reported, never rendered.
    pub fn is_renderable(&self) -> bool {
        !(self.value_files.is_empty() && self.message.is_some())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChartConfiguration {
    pub chart_path: String,
    pub environments: Vec<EnvironmentDescriptor>,
}

impl ChartConfiguration {
    pub fn not_deployed(chart_path: impl Into<String>) -> Self {
        ChartConfiguration {
            chart_path: chart_path.into(),
            environments: vec![EnvironmentDescriptor::message_only(
                BASE_ENVIRONMENT,
                NOT_DEPLOYED_MESSAGE,
            )],
        }
    }
}
