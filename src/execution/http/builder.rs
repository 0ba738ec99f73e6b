//! Request assembly
//!
//! Turns a [`RequestDescriptor`] into a concrete [`HttpRequest`]: the domain
//! key is resolved to a base URL, common and per-request query parameters
//! and headers are merged (per-request values win), and the body is attached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::domain::AddressResolver;
use crate::error::NetworkError;
use crate::types::{HttpRequest, RequestDescriptor};

/// Supplies key/value pairs added to every request (headers or query).
pub type ParamProvider = Arc<dyn Fn() -> HashMap<String, String> + Send + Sync>;

/// Builds outgoing requests from descriptors.
#[derive(Clone, Default)]
pub struct RequestAssembler {
    common_headers: Option<ParamProvider>,
    common_query: Option<ParamProvider>,
}

impl std::fmt::Debug for RequestAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAssembler")
            .field("common_headers", &self.common_headers.is_some())
            .field("common_query", &self.common_query.is_some())
            .finish()
    }
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_common_headers(mut self, provider: ParamProvider) -> Self {
        self.common_headers = Some(provider);
        self
    }

    pub fn with_common_query(mut self, provider: ParamProvider) -> Self {
        self.common_query = Some(provider);
        self
    }

    /// Resolve and assemble `descriptor`.
    pub fn assemble(
        &self,
        resolver: &dyn AddressResolver,
        descriptor: &RequestDescriptor,
    ) -> Result<HttpRequest, NetworkError> {
        let base = resolver.resolve(&descriptor.domain_key).ok_or_else(|| {
            NetworkError::InvalidTarget(format!(
                "no base address registered for domain '{}'",
                descriptor.domain_key
            ))
        })?;
        let raw = format!("{}{}", base, descriptor.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| NetworkError::InvalidTarget(format!("invalid url '{raw}': {e}")))?;

        let mut query: BTreeMap<String, String> = self
            .common_query
            .as_ref()
            .map(|p| p().into_iter().collect())
            .unwrap_or_default();
        query.extend(descriptor.query.clone());
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        let mut headers = HeaderMap::new();
        if let Some(provider) = &self.common_headers {
            insert_headers(&mut headers, provider())?;
        }
        insert_headers(&mut headers, descriptor.headers.clone())?;

        Ok(HttpRequest {
            method: descriptor.method.clone(),
            url,
            headers,
            body: descriptor.body.clone().unwrap_or_default(),
            multipart: descriptor.multipart.clone(),
        })
    }
}

/// Insert `pairs`, replacing existing values with the same name.
pub fn insert_headers(
    headers: &mut HeaderMap,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<(), NetworkError> {
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NetworkError::Configuration(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(&value).map_err(|e| {
            NetworkError::Configuration(format!("invalid value for header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainRegistry, Environment};

    fn registry() -> DomainRegistry {
        DomainRegistry::new(Environment::Production)
            .with_domain("user", [(Environment::Production, "https://api.example.com/v1")])
    }

    #[test]
    fn merges_common_and_request_values() {
        let assembler = RequestAssembler::new()
            .with_common_headers(Arc::new(|| {
                HashMap::from([
                    ("x-app".to_string(), "demo".to_string()),
                    ("x-lang".to_string(), "en".to_string()),
                ])
            }))
            .with_common_query(Arc::new(|| {
                HashMap::from([
                    ("v".to_string(), "1".to_string()),
                    ("lang".to_string(), "en".to_string()),
                ])
            }));
        let desc = RequestDescriptor::post("user", "/users")
            .with_header("x-lang", "zh")
            .with_query("lang", "zh")
            .with_body("{}");

        let req = assembler.assemble(&registry(), &desc).unwrap();
        assert_eq!(req.method, reqwest::Method::POST);
        assert_eq!(
            req.url.as_str(),
            "https://api.example.com/v1/users?lang=zh&v=1"
        );
        assert_eq!(req.header("x-app"), Some("demo"));
        assert_eq!(req.header("x-lang"), Some("zh"));
        assert_eq!(&req.body[..], b"{}");
    }

    #[test]
    fn unknown_domain_is_invalid_target() {
        let desc = RequestDescriptor::get("order", "/orders");
        let err = RequestAssembler::new()
            .assemble(&registry(), &desc)
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTarget(_)));
    }

    #[test]
    fn malformed_url_is_invalid_target() {
        let resolver = |_: &str| Some("not a url".to_string());
        let desc = RequestDescriptor::get("any", "/x");
        let err = RequestAssembler::new().assemble(&resolver, &desc).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTarget(_)));
    }

    #[test]
    fn no_query_string_without_parameters() {
        let desc = RequestDescriptor::get("user", "/users/1");
        let req = RequestAssembler::new().assemble(&registry(), &desc).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v1/users/1");
    }
}
