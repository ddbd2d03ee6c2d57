pub mod client;
pub mod data;
pub mod gql;

pub use client::{Client, FetchPolicy, FnLink, Link, Operation, QueryWatch};
pub use data::{
    ArcString, Cache, CacheConfig, Entity, EntityKey, EntityStore, Fields, FieldSelection,
    Argument, QueryDescriptor, Resolution, Selection, Snapshot, SubscriptionHandle, Value,
    Variables, WatchId, ROOT_MUTATION, ROOT_QUERY,
};
pub use gql::{Document, OperationKind, TypeRef, VariableDefinition};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Data handed to a write does not fit the selection it was written with
    ShapeMismatch { path: String, reason: String },
    /// A non-null variable was declared but no value was supplied
    MissingVariable(String),
    /// A write was issued from a callback nested deeper than the configured bound
    DispatchDepthExceeded(usize),
    /// A subscriber callback reported a failure
    Subscriber(String),
    Parse { line: usize, column: usize, message: String },
    Link(String),
    Serialization(String),
    InvalidOperation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ShapeMismatch { path, reason } => {
                if path.is_empty() {
                    write!(f, "Shape mismatch at root: {}", reason)
                } else {
                    write!(f, "Shape mismatch at '{}': {}", path, reason)
                }
            }
            Error::MissingVariable(name) => write!(f, "Missing value for variable ${}", name),
            Error::DispatchDepthExceeded(depth) => {
                write!(f, "Nested write exceeded dispatch depth of {}", depth)
            }
            Error::Subscriber(msg) => write!(f, "Subscriber error: {}", msg),
            Error::Parse { line, column, message } => {
                write!(f, "Parse error at {}:{}: {}", line, column, message)
            }
            Error::Link(msg) => write!(f, "Link error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Create a Value::Object from key/value pairs
///
/// # Example
///
/// ```
/// use qcache_rs::{sobj, Value};
///
/// let person = sobj! { "id" => 2, "name" => "Bob" };
/// assert_eq!(person.get("name").and_then(Value::as_str), Some("Bob"));
/// ```
#[macro_export]
macro_rules! sobj {
    {} => {
        $crate::Value::Object($crate::Fields::new())
    };
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            let mut fields = $crate::Fields::new();
            $(
                fields.insert($key.to_string(), $crate::Value::from($value));
            )+
            $crate::Value::Object(fields)
        }
    };
}

/// Create a Value::List from a sequence of values
#[macro_export]
macro_rules! slist {
    [] => {
        $crate::Value::List(Vec::new())
    };
    [$($value:expr),+ $(,)?] => {
        $crate::Value::List(vec![$($crate::Value::from($value)),+])
    };
}

#[cfg(test)]
mod test;
