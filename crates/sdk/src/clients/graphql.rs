//! GraphQL client.
//!
//! Documents are POSTed as `{query, variables, operationName}` to the
//! configured endpoint. Before anything is sent, the document is checked
//! against the configured nesting limit and introspection switch. A response
//! carrying a non-empty `errors` list fails with
//! [`RemoteStatus::GraphQl`](crate::RemoteStatus::GraphQl), which is retried
//! only when an error reports a transient `extensions.code`.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    client::ApiClient,
    config::ClientConfig,
    context::CallContext,
    descriptor::OperationDescriptor,
    dispatch::AsyncHandle,
    error::{DecodeSnafu, RemoteSnafu, RemoteStatus, RequestBuildSnafu, Result},
    transport::{HttpBinding, RawResponse, Transport},
};

/// Request envelope sent to a GraphQL endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest<V = Value> {
    /// GraphQL document.
    pub query: String,
    /// Variables referenced by the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<V>,
    /// Operation to run when the document defines several.
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl<V> GraphQlRequest<V> {
    /// Creates a request for `query` with no variables.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), variables: None, operation_name: None }
    }

    /// Sets the variables.
    #[must_use]
    pub fn with_variables(mut self, variables: V) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Response envelope returned by a GraphQL endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    /// Result data, absent when execution failed before producing any.
    pub data: Option<T>,
    /// Errors raised while parsing, validating or executing the document.
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Human-readable description.
    pub message: String,
    /// Document positions the error refers to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQlLocation>,
    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    /// Server-specific details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQlError {
    /// Returns `extensions.code`, if the server supplied one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

impl fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(location) = self.locations.first() {
            write!(f, " at {}:{}", location.line, location.column)?;
        }
        Ok(())
    }
}

/// Line and column of a GraphQL error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlLocation {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// Shape of a document after a lexical scan.
#[derive(Debug, Default, PartialEq, Eq)]
struct DocumentShape {
    depth: usize,
    introspection: bool,
}

/// Scans a document for brace nesting and introspection fields.
///
/// String literals (including block strings) and `#` comments are skipped.
fn scan_document(document: &str) -> Result<DocumentShape> {
    let bytes = document.as_bytes();
    let mut shape = DocumentShape::default();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            },
            b'"' if bytes[i..].starts_with(b"\"\"\"") => {
                i += 3;
                while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                    i += if bytes[i..].starts_with(b"\\\"\"\"") { 4 } else { 1 };
                }
                i += 2;
            },
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            },
            b'{' => {
                depth += 1;
                shape.depth = shape.depth.max(depth);
            },
            b'}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    RequestBuildSnafu { message: "unbalanced '}' in GraphQL document" }.build()
                })?;
            },
            b'_' if bytes[i..].starts_with(b"__") && (i == 0 || !is_name_byte(bytes[i - 1])) => {
                let start = i;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                let name = &document[start..i];
                if name == "__schema" || name == "__type" {
                    shape.introspection = true;
                }
                continue;
            },
            _ => {},
        }
        i += 1;
    }

    if depth != 0 {
        return RequestBuildSnafu { message: "unbalanced '{' in GraphQL document" }.fail();
    }
    Ok(shape)
}

fn is_name_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// Client for a GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    api: ApiClient,
}

impl GraphQlClient {
    /// Binds an HTTP transport to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// endpoint cannot be bound.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let binding = HttpBinding::bind_graphql(&config).map(Arc::new);
        Ok(Self { api: ApiClient::from_binding(config, binding)? })
    }

    /// Creates a client over an existing transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { api: ApiClient::with_transport(config, transport) }
    }

    /// Returns the underlying call surface.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Runs a query document and decodes its `data`.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn query<V, T>(&self, ctx: &CallContext, query: &str, variables: Option<V>) -> Result<T>
    where
        V: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = GraphQlRequest { query: query.to_owned(), variables, operation_name: None };
        self.run(ctx, "graphql.query", &request).await
    }

    /// Runs a mutation document and decodes its `data`.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn mutation<V, T>(
        &self,
        ctx: &CallContext,
        mutation: &str,
        variables: Option<V>,
    ) -> Result<T>
    where
        V: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = GraphQlRequest { query: mutation.to_owned(), variables, operation_name: None };
        self.run(ctx, "graphql.mutation", &request).await
    }

    /// Sends a prepared request envelope and decodes its `data`.
    ///
    /// # Errors
    ///
    /// - [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if the
    ///   document is nested deeper than allowed, uses introspection while it
    ///   is disabled, or has unbalanced braces.
    /// - [`SdkError::Remote`](crate::SdkError::Remote) with
    ///   [`RemoteStatus::GraphQl`] when the response lists errors.
    /// - Any error of [`ApiClient::call`].
    pub async fn execute<V, T>(&self, ctx: &CallContext, request: &GraphQlRequest<V>) -> Result<T>
    where
        V: Serialize + Sync,
        T: DeserializeOwned,
    {
        let name = request.operation_name.clone().unwrap_or_else(|| "graphql.execute".to_owned());
        self.run(ctx, &name, request).await
    }

    /// Runs a query on a background task.
    pub fn query_async<V, T>(
        &self,
        ctx: CallContext,
        query: impl Into<String>,
        variables: Option<V>,
    ) -> AsyncHandle<T>
    where
        V: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let task_ctx = ctx.clone();
        let request = GraphQlRequest { query: query.into(), variables, operation_name: None };
        self.api.dispatch(ctx, async move { client.run(&task_ctx, "graphql.query", &request).await })
    }

    /// Releases the transport.
    pub fn close(&self) {
        self.api.close();
    }

    async fn run<V, T>(&self, ctx: &CallContext, name: &str, request: &GraphQlRequest<V>) -> Result<T>
    where
        V: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.validate(&request.query)?;
        let descriptor = OperationDescriptor::post(name, "").with_body(request);
        self.api.call_with(ctx, &descriptor, data_or_errors).await
    }

    fn validate(&self, document: &str) -> Result<()> {
        let options = self.api.config().graphql();
        let shape = scan_document(document)?;

        if options.max_query_depth > 0 && shape.depth > options.max_query_depth {
            return RequestBuildSnafu {
                message: format!(
                    "query depth {} exceeds the limit of {}",
                    shape.depth, options.max_query_depth
                ),
            }
            .fail();
        }
        if shape.introspection && !options.introspection {
            return RequestBuildSnafu { message: "introspection queries are disabled" }.fail();
        }
        Ok(())
    }
}

/// Maps a GraphQL response to its data, or to a remote error when it lists errors.
fn data_or_errors<T: DeserializeOwned>(raw: RawResponse) -> Result<T> {
    let response: GraphQlResponse<Value> = raw.decode()?;
    if !response.errors.is_empty() {
        return RemoteSnafu { status: RemoteStatus::GraphQl(response.errors), body: raw.text() }
            .fail();
    }
    let data = response.data.unwrap_or(Value::Null);
    serde_json::from_value(data)
        .map_err(|e| DecodeSnafu { message: format!("failed to decode GraphQL data: {e}") }.build())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{SdkError, mock::MockTransport, transport::TransportKind};

    fn client(config: ClientConfig) -> (GraphQlClient, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::with_kind(TransportKind::GraphQl));
        (GraphQlClient::with_transport(config, mock.clone()), mock)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("http://mock.local/graphql").with_retry(2, std::time::Duration::ZERO)
    }

    #[test]
    fn test_scan_counts_nesting() {
        assert_eq!(scan_document("{ a }").unwrap().depth, 1);
        assert_eq!(scan_document("query { a { b { c } } }").unwrap().depth, 3);
        assert_eq!(scan_document("query { a } query { b { c } }").unwrap().depth, 2);
    }

    #[test]
    fn test_scan_ignores_strings_and_comments() {
        let doc = r#"
            # { { { comment braces
            query { a(arg: "{{{") { b(text: """ {{ "quoted" }} """) } }
        "#;
        let shape = scan_document(doc).unwrap();
        assert_eq!(shape.depth, 2);
        assert!(!shape.introspection);
    }

    #[test]
    fn test_scan_detects_introspection() {
        assert!(scan_document("{ __schema { types { name } } }").unwrap().introspection);
        assert!(scan_document("{ __type(name: \"Pet\") { name } }").unwrap().introspection);
        assert!(!scan_document("{ pets { __typename } }").unwrap().introspection);
        assert!(!scan_document("{ a(s: \"__schema\") }").unwrap().introspection);
    }

    #[test]
    fn test_scan_rejects_unbalanced() {
        assert!(scan_document("{ a { b }").is_err());
        assert!(scan_document("{ a } }").is_err());
    }

    #[test]
    fn test_request_envelope_shape() {
        let request = GraphQlRequest::new("query Q { a }")
            .with_variables(json!({"id": 1}))
            .with_operation_name("Q");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"query": "query Q { a }", "variables": {"id": 1}, "operationName": "Q"})
        );

        let bare = GraphQlRequest::<Value>::new("{ a }");
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"query": "{ a }"}));
    }

    #[test]
    fn test_error_code_and_display() {
        let error: GraphQlError = serde_json::from_value(json!({
            "message": "Pet not found",
            "locations": [{"line": 2, "column": 3}],
            "path": ["pet", 0],
            "extensions": {"code": "NOT_FOUND"}
        }))
        .unwrap();

        assert_eq!(error.code(), Some("NOT_FOUND"));
        assert_eq!(error.to_string(), "Pet not found at 2:3");
        assert_eq!(error.path, vec![json!("pet"), json!(0)]);
    }

    #[tokio::test]
    async fn test_query_decodes_data() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({"data": {"pet": {"id": 1, "name": "Rex"}}}));

        let data: Value = client
            .query(&CallContext::new(), "query($id: ID!) { pet(id: $id) { id name } }", Some(json!({"id": 1})))
            .await
            .unwrap();

        assert_eq!(data["pet"]["name"], "Rex");
        let request = mock.last_request().unwrap();
        assert_eq!(request.target, "http://mock.local/");
        assert_eq!(request.method, ::http::Method::POST);
        let body: Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
        assert_eq!(body["variables"]["id"], 1);
    }

    #[tokio::test]
    async fn test_errors_list_is_remote_error() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({"data": null, "errors": [{"message": "Pet not found"}]}));

        let err = client
            .query::<Value, Value>(&CallContext::new(), "{ pet(id: 9) { id } }", None)
            .await
            .unwrap_err();

        match err.status() {
            Some(RemoteStatus::GraphQl(errors)) => assert_eq!(errors[0].message, "Pet not found"),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_graphql_error_is_retried() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({"errors": [{"message": "busy", "extensions": {"code": "UNAVAILABLE"}}]}));
        mock.respond_json(200, &json!({"data": {"ok": true}}));

        let data: Value = client.query::<Value, _>(&CallContext::new(), "{ ok }", None).await.unwrap();

        assert_eq!(data["ok"], true);
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_depth_limit_enforced_before_io() {
        let (client, mock) = client(config().with_max_query_depth(2));

        let err = client
            .query::<Value, Value>(&CallContext::new(), "{ a { b { c } } }", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::RequestBuild { .. }));
        assert!(err.to_string().contains("depth 3"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_depth_disables_limit() {
        let (client, _mock) = client(config().with_max_query_depth(0));
        let deep = format!("{}{}", "{ a ".repeat(40), "}".repeat(40));

        client.query::<Value, Value>(&CallContext::new(), &deep, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_introspection_switch() {
        let (closed, mock) = client(config());
        let err = closed
            .query::<Value, Value>(&CallContext::new(), "{ __schema { types { name } } }", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("introspection"));
        assert_eq!(mock.request_count(), 0);

        let (open, mock) = client(config().with_introspection(true));
        open.query::<Value, Value>(&CallContext::new(), "{ __schema { types { name } } }", None)
            .await
            .unwrap();
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_uses_operation_name() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({"data": {"created": 1}}));
        let request = GraphQlRequest::new("mutation Add { created }").with_operation_name("Add");

        let data: Value = client.execute::<Value, _>(&CallContext::new(), &request).await.unwrap();

        assert_eq!(data["created"], 1);
        assert_eq!(mock.last_request().unwrap().operation, "Add");
    }

    #[tokio::test]
    async fn test_mutation_and_missing_data() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({}));

        let data: Option<Value> =
            client.mutation::<Value, _>(&CallContext::new(), "mutation { reset }", None).await.unwrap();

        assert!(data.is_none());
        assert_eq!(mock.last_request().unwrap().operation, "graphql.mutation");
    }

    #[tokio::test]
    async fn test_query_async_delivers() {
        let (client, mock) = client(config());
        mock.respond_json(200, &json!({"data": {"n": 3}}));

        let handle = client.query_async::<Value, Value>(CallContext::new(), "{ n }", None);

        assert_eq!(handle.await.unwrap()["n"], 3);
    }
}
