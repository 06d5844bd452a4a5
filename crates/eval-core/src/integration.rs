//! Integration Glue (C9, spec §4.9): URI-scheme prompt resolvers. Only
//! `file://` gets a real implementation; it needs no network client, just
//! template substitution, matching how the teacher keeps `file://`-backed
//! loading local while treating hub/vendor fetches as adapter-owned. The
//! other three schemes are recognized and validated but return
//! [`IntegrationError::ExternalCollaborator`], documenting the boundary
//! rather than faking network behavior.

use crate::metric::render_metric;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriScheme {
    File(String),
    HuggingFace(String),
    Langfuse(String),
    Bedrock(String),
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("unrecognized prompt URI `{0}`")]
    UnrecognizedUri(String),
    #[error("`{scheme}` prompt resolution requires an external collaborator (not implemented in-core): {detail}")]
    ExternalCollaborator { scheme: &'static str, detail: String },
    #[error("failed to read prompt file `{path}`: {detail}")]
    FileRead { path: String, detail: String },
}

pub fn parse_uri(uri: &str) -> Result<UriScheme, IntegrationError> {
    if let Some(rest) = uri.strip_prefix("file://") {
        Ok(UriScheme::File(rest.to_string()))
    } else if let Some(rest) = uri.strip_prefix("huggingface://") {
        Ok(UriScheme::HuggingFace(rest.to_string()))
    } else if let Some(rest) = uri.strip_prefix("langfuse://") {
        Ok(UriScheme::Langfuse(rest.to_string()))
    } else if let Some(rest) = uri.strip_prefix("bedrock://") {
        Ok(UriScheme::Bedrock(rest.to_string()))
    } else {
        Err(IntegrationError::UnrecognizedUri(uri.to_string()))
    }
}

/// A pure function `(uri, vars) -> rendered prompt`. The core consumes only
/// the string/JSON return value; implementations beyond `file://` live
/// outside this crate (spec §4.9, last paragraph).
#[async_trait::async_trait]
pub trait PromptResolver: Send + Sync {
    async fn resolve(&self, uri: &str, vars: &HashMap<String, Value>) -> Result<String, IntegrationError>;
}

/// Default resolver: handles `file://` locally, reports the other three
/// schemes as requiring an external collaborator.
#[derive(Debug, Default)]
pub struct DefaultPromptResolver;

#[async_trait::async_trait]
impl PromptResolver for DefaultPromptResolver {
    async fn resolve(&self, uri: &str, vars: &HashMap<String, Value>) -> Result<String, IntegrationError> {
        match parse_uri(uri)? {
            UriScheme::File(path) => {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| IntegrationError::FileRead {
                        path: path.clone(),
                        detail: e.to_string(),
                    })?;
                Ok(render_metric(&contents, vars))
            }
            UriScheme::HuggingFace(rest) => Err(IntegrationError::ExternalCollaborator {
                scheme: "huggingface",
                detail: format!("datasets-server fetch for `{rest}` requires network access"),
            }),
            UriScheme::Langfuse(rest) => Err(IntegrationError::ExternalCollaborator {
                scheme: "langfuse",
                detail: format!("prompt fetch for `{rest}` requires the Langfuse API"),
            }),
            UriScheme::Bedrock(rest) => Err(IntegrationError::ExternalCollaborator {
                scheme: "bedrock",
                detail: format!("prompt fetch for `{rest}` requires the AWS Bedrock API"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_schemes() {
        assert_eq!(parse_uri("file://a.txt").unwrap(), UriScheme::File("a.txt".to_string()));
        assert!(matches!(parse_uri("huggingface://datasets/x/y").unwrap(), UriScheme::HuggingFace(_)));
        assert!(matches!(parse_uri("langfuse://my-prompt").unwrap(), UriScheme::Langfuse(_)));
        assert!(matches!(parse_uri("bedrock://prompt-1:2").unwrap(), UriScheme::Bedrock(_)));
    }

    #[test]
    fn unrecognized_scheme_is_an_error() {
        assert!(parse_uri("s3://bucket/key").is_err());
    }

    #[tokio::test]
    async fn huggingface_reports_external_collaborator() {
        let resolver = DefaultPromptResolver;
        let err = resolver
            .resolve("huggingface://datasets/owner/repo", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::ExternalCollaborator { scheme: "huggingface", .. }));
    }

    #[tokio::test]
    async fn file_scheme_renders_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        tokio::fs::write(&path, "Hello {{name}}").await.unwrap();

        let resolver = DefaultPromptResolver;
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), Value::String("world".to_string()));
        let uri = format!("file://{}", path.display());
        let rendered = resolver.resolve(&uri, &vars).await.unwrap();
        assert_eq!(rendered, "Hello world");
    }
}
