//! Registry coordinates of a locally cached model name.

use std::fmt;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct RefDefaults {
    pub namespace: String,
    pub tag: String,
}

impl Default for RefDefaults {
    fn default() -> Self { Self { namespace: "library".into(), tag: "latest".into() } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    /// Registry host when the name carries one (`host/ns/repo:tag`).
    pub host: Option<String>,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
}

impl ModelRef {
    /// Parse `[host/][namespace/]repo[:tag]`.
    ///
    /// The tag separator is the last `:` after the last `/`, so a host port
    /// (`localhost:5000/ns/repo`) is not mistaken for a tag.
    pub fn parse(name: &str, defaults: &RefDefaults) -> Result<Self> {
        let invalid = |reason| CoreError::InvalidModelName { name: name.to_string(), reason };
        let name_trimmed = name.trim();
        if name_trimmed.is_empty() { return Err(invalid("empty name")); }

        let path_start = name_trimmed.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match name_trimmed[path_start..].rfind(':') {
            Some(i) => {
                let split = path_start + i;
                let tag = &name_trimmed[split + 1..];
                if tag.is_empty() { return Err(invalid("empty tag")); }
                (&name_trimmed[..split], tag.to_string())
            }
            None => (name_trimmed, defaults.tag.clone()),
        };

        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) { return Err(invalid("empty path segment")); }

        let (host, rest) = if segments.len() >= 3 && looks_like_host(segments[0]) {
            (Some(segments[0].to_string()), &segments[1..])
        } else {
            (None, &segments[..])
        };

        let (namespace, repository) = match rest {
            [repo] => (defaults.namespace.clone(), repo.to_string()),
            [ns @ .., repo] => (ns.join("/"), repo.to_string()),
            [] => return Err(invalid("missing repository")),
        };

        Ok(Self { host, namespace, repository, tag })
    }

    /// Manifest path below the registry root.
    pub fn manifest_path(&self) -> String {
        format!("v2/{}/{}/manifests/{}", self.namespace, self.repository, self.tag)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(h) = &self.host { write!(f, "{h}/")?; }
        write!(f, "{}/{}:{}", self.namespace, self.repository, self.tag)
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> Result<ModelRef> { ModelRef::parse(name, &RefDefaults::default()) }

    #[test]
    fn default_namespace_applied() {
        let r = parse("llama2:7b").unwrap();
        assert_eq!((r.namespace.as_str(), r.repository.as_str(), r.tag.as_str()), ("library", "llama2", "7b"));
        assert_eq!(r.host, None);
        assert_eq!(r.manifest_path(), "v2/library/llama2/manifests/7b");
    }

    #[test]
    fn explicit_namespace_kept() {
        let r = parse("jmorgan/mixtral:8x7b-q4").unwrap();
        assert_eq!(r.namespace, "jmorgan");
        assert_eq!(r.repository, "mixtral");
        assert_eq!(r.tag, "8x7b-q4");
    }

    #[test]
    fn missing_tag_defaults_to_latest() {
        let r = parse("mistral").unwrap();
        assert_eq!(r.tag, "latest");
        assert_eq!(r.to_string(), "library/mistral:latest");
    }

    #[test]
    fn host_prefix_recognized() {
        let r = parse("registry.example.com/team/phi:2").unwrap();
        assert_eq!(r.host.as_deref(), Some("registry.example.com"));
        assert_eq!(r.namespace, "team");
        let r = parse("localhost:5000/team/phi").unwrap();
        assert_eq!(r.host.as_deref(), Some("localhost:5000"));
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(matches!(parse(""), Err(CoreError::InvalidModelName { .. })));
        assert!(matches!(parse("llama2:"), Err(CoreError::InvalidModelName { reason: "empty tag", .. })));
        assert!(parse("/llama2:7b").is_err());
        assert!(parse(":7b").is_err());
        assert!(parse("ns//repo").is_err());
    }
}
