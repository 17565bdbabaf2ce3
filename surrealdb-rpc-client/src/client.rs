//! High-level client API.

use crate::config::{ConnectionConfig, Credentials};
use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::{Transport, WsTransport};
use std::sync::Arc;
use surrealdb_rpc_protocol::{Method, Notification, Object, Thing, Uuid, Value};
use tokio::sync::broadcast;

/// What a record operation acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Every record in a table.
    Table(String),
    Record(Thing),
    Records(Vec<Thing>),
}

impl Resource {
    pub fn table(name: impl Into<String>) -> Self {
        Resource::Table(name.into())
    }

    fn into_value(self) -> Value {
        match self {
            Resource::Table(name) => Value::String(name),
            Resource::Record(thing) => Value::Thing(thing),
            Resource::Records(things) => {
                Value::Array(things.into_iter().map(Value::Thing).collect())
            }
        }
    }
}

/// Conversion into a [`Resource`].
///
/// Text containing `:` is parsed as a record id, anything else names a table.
pub trait IntoResource {
    fn into_resource(self) -> Result<Resource, ClientError>;
}

impl IntoResource for Resource {
    fn into_resource(self) -> Result<Resource, ClientError> {
        Ok(self)
    }
}

impl IntoResource for Thing {
    fn into_resource(self) -> Result<Resource, ClientError> {
        Ok(Resource::Record(self))
    }
}

impl IntoResource for Vec<Thing> {
    fn into_resource(self) -> Result<Resource, ClientError> {
        Ok(Resource::Records(self))
    }
}

impl IntoResource for &str {
    fn into_resource(self) -> Result<Resource, ClientError> {
        if self.contains(':') {
            Ok(Resource::Record(Thing::parse(self)?))
        } else {
            Ok(Resource::Table(self.to_string()))
        }
    }
}

impl IntoResource for String {
    fn into_resource(self) -> Result<Resource, ClientError> {
        if self.contains(':') {
            Ok(Resource::Record(Thing::parse(&self)?))
        } else {
            Ok(Resource::Table(self))
        }
    }
}

/// Outcome of one statement in a `query` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub ok: bool,
    /// Server-reported execution time, e.g. `"1.2ms"`.
    pub time: Option<String>,
    /// The statement's output, or the error message when `ok` is false.
    pub result: Value,
}

impl QueryResult {
    fn from_value(value: Value) -> Result<Self, ClientError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(ClientError::UnexpectedResponse(format!(
                    "query result must be an object, got {}",
                    other.kind()
                )))
            }
        };

        let ok = match fields.get("status").and_then(Value::as_str) {
            Some("OK") => true,
            Some("ERR") => false,
            other => {
                return Err(ClientError::UnexpectedResponse(format!(
                    "unknown query status {:?}",
                    other
                )))
            }
        };
        let time = fields
            .get("time")
            .and_then(Value::as_str)
            .map(str::to_string);
        let result = fields.remove("result").unwrap_or(Value::None);

        Ok(Self { ok, time, result })
    }

    /// Returns the statement output, or [`ClientError::Query`] for `ERR`.
    pub fn into_result(self) -> Result<Value, ClientError> {
        if self.ok {
            return Ok(self.result);
        }
        let message = match self.result {
            Value::String(message) => message,
            other => other.to_string(),
        };
        Err(ClientError::Query(message))
    }
}

/// High-level client for SurrealDB.
pub struct Client<T: Transport = WsTransport> {
    conn: Arc<Connection<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl Client {
    /// Connects, signs in and selects the configured namespace/database.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self::from_connection(Connection::open(config).await?))
    }
}

impl<T: Transport> Client<T> {
    /// Runs connection setup over an existing transport.
    pub async fn establish(transport: T, config: &ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self::from_connection(
            Connection::establish(transport, config).await?,
        ))
    }

    pub fn from_connection(conn: Connection<T>) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    /// Returns whether the client can issue calls.
    pub fn is_ready(&self) -> bool {
        self.conn.is_ready()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Subscribes to live query updates and other server pushes.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.conn.subscribe_notifications()
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    async fn request(&self, method: Method, params: Vec<Value>) -> Result<Value, ClientError> {
        self.conn.call(method, params).await
    }

    async fn on_resource(
        &self,
        method: Method,
        resource: impl IntoResource,
        data: Option<Value>,
    ) -> Result<Value, ClientError> {
        let mut params = vec![resource.into_resource()?.into_value()];
        params.extend(data);
        self.request(method, params).await
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Selects the namespace and/or database for subsequent calls.
    pub async fn use_ns(
        &self,
        namespace: Option<&str>,
        database: Option<&str>,
    ) -> Result<(), ClientError> {
        self.request(
            Method::Use,
            vec![Value::from(namespace), Value::from(database)],
        )
        .await?;
        Ok(())
    }

    /// Signs in and returns the session token.
    pub async fn signin(&self, credentials: &Credentials) -> Result<Value, ClientError> {
        self.request(Method::Signin, vec![credentials.to_value()])
            .await
    }

    /// Signs up a record user and returns the session token.
    pub async fn signup(&self, credentials: &Credentials) -> Result<Value, ClientError> {
        self.request(Method::Signup, vec![credentials.to_value()])
            .await
    }

    /// Authenticates the session with a token from an earlier sign-in.
    pub async fn authenticate(&self, token: &str) -> Result<(), ClientError> {
        self.request(Method::Authenticate, vec![Value::from(token)])
            .await?;
        Ok(())
    }

    /// Drops the session's authentication.
    pub async fn invalidate(&self) -> Result<(), ClientError> {
        self.request(Method::Invalidate, vec![]).await?;
        Ok(())
    }

    /// Returns the record of the authenticated user.
    pub async fn info(&self) -> Result<Value, ClientError> {
        self.request(Method::Info, vec![]).await
    }

    /// Returns the server version string.
    pub async fn version(&self) -> Result<String, ClientError> {
        match self.request(Method::Version, vec![]).await? {
            Value::String(version) => Ok(version),
            other => Err(ClientError::UnexpectedResponse(format!(
                "version must be a string, got {}",
                other.kind()
            ))),
        }
    }

    /// Pings the server.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(Method::Ping, vec![]).await?;
        Ok(())
    }

    /// Defines a connection-scoped variable (`let`).
    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ClientError> {
        self.request(Method::Let, vec![Value::from(name), value.into()])
            .await?;
        Ok(())
    }

    /// Removes a connection-scoped variable.
    pub async fn unset(&self, name: &str) -> Result<(), ClientError> {
        self.request(Method::Unset, vec![Value::from(name)]).await?;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Runs a query and returns one output per statement. Fails with
    /// [`ClientError::Query`] on the first statement that reported `ERR`.
    pub async fn query(&self, sql: &str, vars: Object) -> Result<Vec<Value>, ClientError> {
        self.query_raw(sql, vars)
            .await?
            .into_iter()
            .map(QueryResult::into_result)
            .collect()
    }

    /// Runs a query and returns every statement's status and output.
    pub async fn query_raw(
        &self,
        sql: &str,
        vars: Object,
    ) -> Result<Vec<QueryResult>, ClientError> {
        let mut params = vec![Value::from(sql)];
        if !vars.is_empty() {
            params.push(Value::Object(vars));
        }

        match self.request(Method::Query, params).await? {
            Value::Array(results) => results.into_iter().map(QueryResult::from_value).collect(),
            other => Err(ClientError::UnexpectedResponse(format!(
                "query must return an array, got {}",
                other.kind()
            ))),
        }
    }

    /// Calls a function, optionally pinned to a version.
    pub async fn run(
        &self,
        function: &str,
        version: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Value, ClientError> {
        self.request(
            Method::Run,
            vec![Value::from(function), Value::from(version), Value::Array(args)],
        )
        .await
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Selects every record in a table, or specific records.
    pub async fn select(&self, resource: impl IntoResource) -> Result<Value, ClientError> {
        self.on_resource(Method::Select, resource, None).await
    }

    /// Creates a record with a random id in a table, or with the given id.
    pub async fn create(
        &self,
        resource: impl IntoResource,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        self.on_resource(Method::Create, resource, Some(data.into()))
            .await
    }

    /// Inserts one record (object) or many (array of objects) into a table.
    pub async fn insert(&self, table: &str, data: impl Into<Value>) -> Result<Value, ClientError> {
        self.request(Method::Insert, vec![Value::from(table), data.into()])
            .await
    }

    /// Inserts a relation record. Without a table, the server takes it
    /// from the data's `id`.
    pub async fn insert_relation(
        &self,
        table: Option<&str>,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        self.request(
            Method::InsertRelation,
            vec![Value::from(table), data.into()],
        )
        .await
    }

    /// Replaces the content of existing records.
    pub async fn update(
        &self,
        resource: impl IntoResource,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        self.on_resource(Method::Update, resource, Some(data.into()))
            .await
    }

    /// Replaces the content of records, creating them if missing.
    pub async fn upsert(
        &self,
        resource: impl IntoResource,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        self.on_resource(Method::Upsert, resource, Some(data.into()))
            .await
    }

    /// Merges data into existing records.
    pub async fn merge(
        &self,
        resource: impl IntoResource,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        self.on_resource(Method::Merge, resource, Some(data.into()))
            .await
    }

    /// Applies JSON Patch operations. With `diff` the server returns the
    /// applied patches instead of the records.
    pub async fn patch(
        &self,
        resource: impl IntoResource,
        patches: Vec<Value>,
        diff: bool,
    ) -> Result<Value, ClientError> {
        let params = vec![
            resource.into_resource()?.into_value(),
            Value::Array(patches),
            Value::Bool(diff),
        ];
        self.request(Method::Patch, params).await
    }

    /// Deletes every record in a table, or specific records.
    pub async fn delete(&self, resource: impl IntoResource) -> Result<Value, ClientError> {
        self.on_resource(Method::Delete, resource, None).await
    }

    /// Creates graph edges `from -> relation -> to`.
    pub async fn relate(
        &self,
        from: impl IntoResource,
        relation: &str,
        to: impl IntoResource,
        data: impl Into<Value>,
    ) -> Result<Value, ClientError> {
        let params = vec![
            from.into_resource()?.into_value(),
            Value::from(relation),
            to.into_resource()?.into_value(),
            data.into(),
        ];
        self.request(Method::Relate, params).await
    }

    // =========================================================================
    // Live queries
    // =========================================================================

    /// Starts a live query on a table and returns its id. Updates arrive on
    /// [`Client::notifications`].
    pub async fn live(&self, table: &str, diff: bool) -> Result<Uuid, ClientError> {
        let id = self
            .request(Method::Live, vec![Value::from(table), Value::Bool(diff)])
            .await?;
        match id {
            Value::Uuid(uuid) => Ok(uuid),
            Value::String(text) => Ok(text.parse()?),
            other => Err(ClientError::UnexpectedResponse(format!(
                "live query id must be a uuid, got {}",
                other.kind()
            ))),
        }
    }

    /// Stops a live query.
    pub async fn kill(&self, query_id: Uuid) -> Result<(), ClientError> {
        self.request(Method::Kill, vec![Value::Uuid(query_id)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surrealdb_rpc_protocol::Id;

    #[test]
    fn test_resource_from_text() {
        assert_eq!(
            "person".into_resource().unwrap(),
            Resource::table("person")
        );
        assert_eq!(
            "person:tobie".into_resource().unwrap(),
            Resource::Record(Thing::new("person", "tobie"))
        );
        assert_eq!(
            String::from("person:42").into_resource().unwrap(),
            Resource::Record(Thing::new("person", 42i64))
        );

        let err = ":tobie".into_resource().unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[test]
    fn test_resource_values() {
        let things = vec![Thing::new("a", 1i64), Thing::new("b", Id::from("x"))];
        let value = things.clone().into_resource().unwrap().into_value();
        assert_eq!(
            value,
            Value::Array(things.into_iter().map(Value::Thing).collect())
        );
        assert_eq!(
            Resource::table("person").into_value(),
            Value::from("person")
        );
    }

    #[test]
    fn test_query_result_parsing() {
        let ok = QueryResult::from_value(Value::Object(Object::from([
            ("status", Value::from("OK")),
            ("time", Value::from("12.5µs")),
            ("result", Value::Array(vec![Value::Int(1)])),
        ])))
        .unwrap();
        assert!(ok.ok);
        assert_eq!(ok.time.as_deref(), Some("12.5µs"));
        assert_eq!(ok.into_result().unwrap(), Value::Array(vec![Value::Int(1)]));

        let err = QueryResult::from_value(Value::Object(Object::from([
            ("status", Value::from("ERR")),
            ("result", Value::from("There was a problem with the database")),
        ])))
        .unwrap();
        assert!(!err.ok);
        match err.into_result() {
            Err(ClientError::Query(msg)) => assert!(msg.contains("problem")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_result_shape_errors() {
        let err = QueryResult::from_value(Value::Int(1)).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse(_)));

        let err = QueryResult::from_value(Value::Object(Object::from([(
            "status",
            Value::from("MAYBE"),
        )])))
        .unwrap_err();
        assert!(err.to_string().contains("MAYBE"));
    }
}
