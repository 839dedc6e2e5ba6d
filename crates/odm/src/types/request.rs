//! Serving-layer request context.

use serde_json::{Map, Value as Json};

use crate::error::RequestError;

use super::params::as_bool;

/// Request-scoped information supplied by a serving layer.
///
/// Its presence switches [`Document::to_dict`](crate::document::Document::to_dict) into
/// client-serving mode. The parameters double as generic collection filters and carry
/// control flags such as `_refresh_index`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    params: Map<String, Json>,
}

impl RequestContext {
    /// Creates a context without parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from request parameters.
    pub fn with_params(params: Map<String, Json>) -> Self {
        Self { params }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Returns all request parameters.
    pub fn params(&self) -> &Map<String, Json> {
        &self.params
    }

    /// Returns a single parameter.
    pub fn param(&self, name: &str) -> Option<&Json> {
        self.params.get(name)
    }

    /// Reads a boolean parameter, if present.
    pub fn bool_param(&self, name: &str) -> Result<Option<bool>, RequestError> {
        self.params
            .get(name)
            .map(|value| as_bool(name, value))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_param() {
        let request = RequestContext::new().with_param("_refresh_index", "true");
        assert_eq!(request.bool_param("_refresh_index").unwrap(), Some(true));
        assert_eq!(request.bool_param("missing").unwrap(), None);

        let request = RequestContext::new().with_param("_refresh_index", "sometimes");
        assert!(request.bool_param("_refresh_index").is_err());
    }
}
