//! Write concerns and the interpretation of write acknowledgments.

use std::fmt;
use std::error;
use tracing::warn;
use bson::{ Bson, Document };
use crate::{
    db::Database,
    failover::{ self, FailoverStrategy },
    wire::Request,
    bsn::BsonExt,
    error::{ Error, ErrorExt, ErrorKind, Result, ResultExt },
};

/// Which members have to acknowledge a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Acknowledgers {
    /// This many replica set members.
    Nodes(i32),
    /// A tag set name, or `"majority"`.
    Tagged(String),
}

impl From<Acknowledgers> for Bson {
    fn from(w: Acknowledgers) -> Self {
        match w {
            Acknowledgers::Nodes(n) => Bson::Int32(n),
            Acknowledgers::Tagged(tag) => Bson::String(tag),
        }
    }
}

/// The durability a checked write waits for before it is acknowledged.
/// The default waits for the primary only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConcern {
    /// Who has to acknowledge the write. `None` means the server default.
    pub w: Option<Acknowledgers>,
    /// Wait for the journal commit.
    pub j: bool,
    /// Wait for the data files to be flushed.
    pub fsync: bool,
    /// Give up waiting for `w` after this many milliseconds.
    pub wtimeout: Option<i32>,
}

impl WriteConcern {
    /// Waits for the majority of the replica set.
    pub fn majority() -> Self {
        WriteConcern {
            w: Some(Acknowledgers::Tagged("majority".into())),
            ..Default::default()
        }
    }

    /// Renders the `getlasterror` command which requests
    /// the acknowledgment of the preceding write.
    /// ```
    /// # #[macro_use] extern crate bson;
    /// # use drupe::write::{ WriteConcern, Acknowledgers };
    /// # fn main() {
    /// let concern = WriteConcern {
    ///     w: Some(Acknowledgers::Nodes(2)),
    ///     j: true,
    ///     ..Default::default()
    /// };
    /// assert_eq!(concern.to_command(), doc!{ "getlasterror": 1, "w": 2, "j": true });
    /// # }
    /// ```
    pub fn to_command(&self) -> Document {
        let mut command = doc!{ "getlasterror": 1 };

        if let Some(w) = self.w.clone() {
            command.insert("w", w);
        }
        if self.j {
            command.insert("j", true);
        }
        if self.fsync {
            command.insert("fsync", true);
        }
        if let Some(wtimeout) = self.wtimeout {
            command.insert("wtimeout", wtimeout);
        }

        command
    }
}

/// The server's acknowledgment of a checked write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastError {
    /// Whether the `getlasterror` command itself succeeded.
    pub ok: bool,
    /// The error of the preceding write, if any.
    pub err: Option<String>,
    /// The error code, if any.
    pub code: Option<i64>,
    /// The number of documents inserted, updated or removed.
    pub n: i64,
    /// Whether an update modified an existing document.
    pub updated_existing: bool,
    /// The `_id` of the document inserted by an upsert.
    pub upserted: Option<Bson>,
    /// Additional information, e.g. that the write concern was not met.
    pub wnote: Option<String>,
    /// Whether waiting for the write concern timed out.
    pub wtimeout: bool,
}

impl LastError {
    /// Interprets a `getlasterror` reply document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let ok = doc
            .get("ok")
            .ok_or_else(|| Error::new(
                ErrorKind::MissingDocumentField,
                "acknowledgment has no `ok` field"
            ))?
            .try_as_bool()
            .ok_or_else(|| Error::new(
                ErrorKind::IllTypedDocumentField,
                format!("acknowledgment has non-boolean `ok`: {}", doc)
            ))?;
        let err = optional_string(doc, "err").or_else(|| optional_string(doc, "errmsg"));
        let code = doc.get("code").and_then(BsonExt::try_as_i64);
        let n = doc.get("n").and_then(BsonExt::try_as_i64).unwrap_or(0);
        let updated_existing = doc
            .get("updatedExisting")
            .and_then(BsonExt::try_as_bool)
            .unwrap_or(false);
        let upserted = doc.get("upserted").cloned();
        let wnote = optional_string(doc, "wnote");
        let wtimeout = doc.get("wtimeout").and_then(BsonExt::try_as_bool).unwrap_or(false);

        Ok(LastError { ok, err, code, n, updated_existing, upserted, wnote, wtimeout })
    }

    /// Whether the server rejected or only partially applied the write,
    /// even though the acknowledgment itself arrived fine.
    pub fn in_error(&self) -> bool {
        !self.ok || self.err.is_some()
    }

    /// Passes through a successful acknowledgment, and turns a failed one
    /// into an error of kind `WriteFailure` which retains `self` as its cause.
    pub fn into_result(self) -> Result<Self> {
        if self.in_error() {
            Err(Error::with_cause("write failed", self))
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.err.as_ref(), self.code) {
            (Some(err), Some(code)) => write!(f, "{} (code: {})", err, code),
            (Some(err), None) => f.write_str(err),
            (None, Some(code)) => write!(f, "write not acknowledged (code: {})", code),
            (None, None) if self.ok => write!(f, "{} document(s) affected", self.n),
            (None, None) => f.write_str("write not acknowledged"),
        }
    }
}

impl error::Error for LastError {}

impl ErrorExt for LastError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::WriteFailure
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

/// Reads a string field which the server may leave out or set to `null`.
fn optional_string(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key)? {
        Bson::Null => None,
        Bson::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Delivers a write through the failover loop and interprets its
/// acknowledgment.
pub(crate) async fn submit_checked(
    db: &Database,
    request: Request,
    strategy: &FailoverStrategy,
) -> Result<LastError> {
    let response = failover::submit(db.connection(), &request, strategy).await?;
    let document = response
        .into_first_document(db.model())
        .chain("can't read write acknowledgment")?;

    LastError::from_document(&document)?.into_result()
}

/// Fire and forget: the outcome of the delivery is only logged.
pub(crate) fn send_unchecked(db: &Database, request: Request) {
    if let Err(error) = db.connection().send(request) {
        warn!(%error, "unchecked write could not be sent");
    }
}
