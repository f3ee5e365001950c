//! Operation descriptors produced by generated client methods.
//!
//! A descriptor names the operation, its HTTP method and path template,
//! the values for `{name}` placeholders, query parameters, per-call headers
//! and an optional body. The executor turns it into a transport request.

use std::collections::{BTreeMap, HashMap};

use http::Method;

use crate::{
    config::header_key,
    error::{RequestBuildSnafu, Result},
};

/// Description of one remote operation invocation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor<B = ()> {
    name: String,
    method: Method,
    path: String,
    path_params: HashMap<String, String>,
    query: BTreeMap<String, String>,
    headers: HashMap<String, String>,
    body: Option<B>,
}

impl OperationDescriptor<()> {
    /// Creates a descriptor with the given method and path template.
    #[must_use]
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            path_params: HashMap::new(),
            query: BTreeMap::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` descriptor.
    #[must_use]
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::GET, path)
    }

    /// Creates a `POST` descriptor.
    #[must_use]
    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::POST, path)
    }

    /// Creates a `PUT` descriptor.
    #[must_use]
    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::PUT, path)
    }

    /// Creates a `DELETE` descriptor.
    #[must_use]
    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::DELETE, path)
    }

    /// Creates a descriptor for a unary RPC; `path` is the full method path
    /// (`/package.Service/Method`).
    #[must_use]
    pub fn rpc(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or_default().to_owned();
        Self::new(name, Method::POST, path)
    }
}

impl<B> OperationDescriptor<B> {
    /// Attaches a body, changing the body type.
    #[must_use]
    pub fn with_body<B2>(self, body: B2) -> OperationDescriptor<B2> {
        OperationDescriptor {
            name: self.name,
            method: self.method,
            path: self.path,
            path_params: self.path_params,
            query: self.query,
            headers: self.headers,
            body: Some(body),
        }
    }

    /// Sets the value for a `{name}` placeholder in the path.
    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(name.into(), value.to_string());
        self
    }

    /// Adds a query parameter only when a value is present.
    #[must_use]
    pub fn with_optional_query<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query(name, value),
            None => self,
        }
    }

    /// Adds a per-call header; it overrides a default header of the same name
    /// regardless of case.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(header_key(name), value.into());
        self
    }

    /// Returns the operation name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the unexpanded path template.
    #[must_use]
    pub fn path_template(&self) -> &str {
        &self.path
    }

    /// Returns the query parameters, ordered by name.
    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Returns the per-call headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Expands `{name}` placeholders with percent-encoded values.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if a
    /// placeholder has no value or a brace is left unclosed.
    pub fn expand_path(&self) -> Result<String> {
        let mut expanded = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();

        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return RequestBuildSnafu {
                    message: format!("unclosed placeholder in path {:?}", self.path),
                }
                .fail();
            };
            let name = &after[..close];
            let Some(value) = self.path_params.get(name) else {
                return RequestBuildSnafu {
                    message: format!("missing path parameter {name:?} for {}", self.name),
                }
                .fail();
            };
            expanded.push_str(&urlencoding::encode(value));
            rest = &after[close + 1..];
        }
        expanded.push_str(rest);

        Ok(expanded)
    }
}
