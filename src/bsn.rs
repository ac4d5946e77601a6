//! Helpers for dynamically type-checking BSON returned by the server.

use std::fmt::Write;
use bson::{ Bson, Document, document::ValueAccessError };
use crate::error::{ Error, Result };

/// Methods for dynamically type-checking BSON.
pub trait BsonExt: Sized {
    /// Ensures that the BSON value is a `Document` and unwraps it.
    fn try_into_doc(self) -> Result<Document>;

    /// Ensures that the BSON value can be interpreted as a boolean,
    /// and performs the conversion.
    fn try_as_bool(&self) -> Option<bool>;

    /// Ensures that the BSON value is an integral number (possibly stored
    /// as a double by older servers) and widens it to `i64`.
    fn try_as_i64(&self) -> Option<i64>;
}

impl BsonExt for Bson {
    #[allow(clippy::float_cmp)]
    fn try_as_bool(&self) -> Option<bool> {
        match *self {
            Bson::Boolean(b) => Some(b),
            Bson::Int32(0) | Bson::Int64(0) => Some(false),
            Bson::Int32(1) | Bson::Int64(1) => Some(true),
            Bson::Double(x) if x == 0.0 => Some(false),
            Bson::Double(x) if x == 1.0 => Some(true),
            _ => None,
        }
    }

    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    fn try_as_i64(&self) -> Option<i64> {
        match *self {
            Bson::Int32(n) => Some(i64::from(n)),
            Bson::Int64(n) => Some(n),
            Bson::Double(x) if x.trunc() == x && x.abs() < 9.0e15 => Some(x as i64),
            _ => None,
        }
    }

    fn try_into_doc(self) -> Result<Document> {
        match self {
            Bson::Document(doc) => Ok(doc),
            value => Err(Error::with_cause(
                format!("expected Document, got {:?}", value.element_type()),
                ValueAccessError::UnexpectedType,
            ))
        }
    }
}

/// Extracts a server-reported error message stored under `key`, with the
/// accompanying `code` appended if there is one.
///
/// Returns `None` if `key` is absent or `null`.
pub fn server_error_message(doc: &Document, key: &str) -> Option<String> {
    let mut message = match doc.get(key) {
        None | Some(Bson::Null) => return None,
        Some(Bson::String(message)) => message.clone(),
        Some(other) => other.to_string(),
    };

    if let Some(code) = doc.get("code").and_then(BsonExt::try_as_i64) {
        write!(message, " (code: {})", code).ok();
    }

    Some(message)
}
