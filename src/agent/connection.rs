//! Project connection strings.
//!
//! An AI project is addressed either by a connection string of the form
//! `<host>;<subscription_id>;<resource_group>;<project_name>` or directly by
//! its `https://` endpoint.

use url::Url;

use crate::error::RelayError;

/// Resolved base URL of an agents project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEndpoint {
    base: Url,
}

impl ProjectEndpoint {
    /// Parse a connection string or a literal endpoint URL.
    pub fn parse(value: &str) -> Result<Self, RelayError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RelayError::Config(
                "agent connection string cannot be empty".to_string(),
            ));
        }

        if value.starts_with("https://") || value.starts_with("http://") {
            return Self::from_url(value);
        }

        let parts: Vec<&str> = value.split(';').map(str::trim).collect();
        let [host, subscription_id, resource_group, project_name] = parts.as_slice() else {
            return Err(RelayError::Config(format!(
                "connection string must have 4 ';'-separated parts \
                 (host;subscription_id;resource_group;project_name), got {}",
                parts.len()
            )));
        };
        if [host, subscription_id, resource_group, project_name]
            .iter()
            .any(|p| p.is_empty())
        {
            return Err(RelayError::Config(
                "connection string contains an empty part".to_string(),
            ));
        }

        let host = host
            .trim_start_matches("https://")
            .trim_end_matches('/');
        Self::from_url(&format!(
            "https://{host}/agents/v1.0/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.MachineLearningServices/workspaces/{project_name}"
        ))
    }

    fn from_url(raw: &str) -> Result<Self, RelayError> {
        let trimmed = raw.trim_end_matches('/');
        // A trailing slash keeps `Url::join` from dropping the last segment.
        let base = Url::parse(&format!("{trimmed}/"))
            .map_err(|e| RelayError::Config(format!("invalid agent endpoint '{raw}': {e}")))?;
        Ok(Self { base })
    }

    /// The project base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join a relative API path onto the project base.
    pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for ProjectEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_string() {
        let endpoint =
            ProjectEndpoint::parse("eastus.api.azureml.ms;sub-1;rg-demo;proj-a").unwrap();
        assert_eq!(
            endpoint.to_string(),
            "https://eastus.api.azureml.ms/agents/v1.0/subscriptions/sub-1/resourceGroups/rg-demo/providers/Microsoft.MachineLearningServices/workspaces/proj-a"
        );
        assert_eq!(
            endpoint.join("threads").unwrap().path(),
            "/agents/v1.0/subscriptions/sub-1/resourceGroups/rg-demo/providers/Microsoft.MachineLearningServices/workspaces/proj-a/threads"
        );
    }

    #[test]
    fn accepts_literal_endpoint() {
        let endpoint = ProjectEndpoint::parse("http://127.0.0.1:9000/agents").unwrap();
        assert_eq!(
            endpoint.join("/threads").unwrap().as_str(),
            "http://127.0.0.1:9000/agents/threads"
        );
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(matches!(
            ProjectEndpoint::parse(""),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            ProjectEndpoint::parse("host;sub;rg"),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            ProjectEndpoint::parse("host;;rg;proj"),
            Err(RelayError::Config(_))
        ));
    }
}
