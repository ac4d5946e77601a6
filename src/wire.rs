//! Request and response value objects of the legacy wire protocol.
//!
//! The exact binary layout of these messages belongs to the transport;
//! this module only describes *what* is sent: the operation header
//! fields, the flag words and the already-serialized document payload.

use std::collections::VecDeque;
use bytes::Bytes;
use bson::Document;
use crate::{
    bsn::server_error_message,
    codec::DocumentModel,
    write::WriteConcern,
    error::{ Error, ErrorKind, Result },
};

bitflags! {
    /// Flags of a query operation.
    pub struct QueryFlags: u32 {
        /// Keep the cursor open after the last document has been returned.
        const TAILABLE          = 0x02;
        /// Allow querying a replica set secondary.
        const SLAVE_OK          = 0x04;
        /// Internal replication use only.
        const OPLOG_REPLAY      = 0x08;
        /// Don't time out idle cursors on the server.
        const NO_CURSOR_TIMEOUT = 0x10;
        /// With `TAILABLE`: block on the server for a while instead of
        /// returning an empty batch right away.
        const AWAIT_DATA        = 0x20;
        /// Stream all data in multiple replies without waiting for requests.
        const EXHAUST           = 0x40;
        /// Return partial results if some shards are down.
        const PARTIAL           = 0x80;
    }
}

bitflags! {
    /// Flags of an insert operation.
    pub struct InsertFlags: u32 {
        /// Keep inserting the rest of a multi-document payload
        /// if one of the documents fails.
        const CONTINUE_ON_ERROR = 0x01;
    }
}

bitflags! {
    /// Flags of an update operation.
    pub struct UpdateFlags: u32 {
        /// Insert the document if nothing matches the selector.
        const UPSERT = 0x01;
        /// Update every matching document, not only the first one.
        const MULTI  = 0x02;
    }
}

bitflags! {
    /// Flags of a delete operation.
    pub struct DeleteFlags: u32 {
        /// Remove only the first matching document.
        const SINGLE_REMOVE = 0x01;
    }
}

bitflags! {
    /// Flags the server sets on a reply.
    pub struct ReplyFlags: u32 {
        /// The cursor id of a get-more request is unknown to the server.
        const CURSOR_NOT_FOUND   = 0x01;
        /// The query failed; the only document holds `$err`.
        const QUERY_FAILURE      = 0x02;
        /// Internal sharding use only.
        const SHARD_CONFIG_STALE = 0x04;
        /// The server supports `AWAIT_DATA`.
        const AWAIT_CAPABLE      = 0x08;
    }
}

impl UpdateFlags {
    /// Composes the flag word from the two update options.
    /// ```
    /// # use drupe::wire::UpdateFlags;
    /// assert_eq!(UpdateFlags::from_options(true, false), UpdateFlags::UPSERT);
    /// assert_eq!(UpdateFlags::from_options(false, true), UpdateFlags::MULTI);
    /// assert!(UpdateFlags::from_options(false, false).is_empty());
    /// ```
    pub fn from_options(upsert: bool, multi: bool) -> Self {
        let mut flags = UpdateFlags::empty();
        flags.set(UpdateFlags::UPSERT, upsert);
        flags.set(UpdateFlags::MULTI, multi);
        flags
    }
}

impl Default for QueryFlags {
    fn default() -> Self {
        QueryFlags::empty()
    }
}

/// The header of a wire operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Opens a cursor. The payload is the query document,
    /// optionally followed by the field projection.
    Query {
        /// Query flags.
        flags: QueryFlags,
        /// `<database>.<collection>`.
        full_collection_name: String,
        /// Number of matching documents to skip.
        number_to_skip: i32,
        /// Batch size; `0` means the server default, negative values
        /// ask the server to close the cursor after the first batch.
        number_to_return: i32,
    },
    /// Fetches the next batch of an open cursor. No payload.
    GetMore {
        /// `<database>.<collection>`.
        full_collection_name: String,
        /// Batch size.
        number_to_return: i32,
        /// The cursor to advance.
        cursor_id: i64,
    },
    /// Inserts every document of the payload.
    Insert {
        /// Insert flags.
        flags: InsertFlags,
        /// `<database>.<collection>`.
        full_collection_name: String,
    },
    /// The payload is the selector followed by the update document.
    Update {
        /// `<database>.<collection>`.
        full_collection_name: String,
        /// Update flags.
        flags: UpdateFlags,
    },
    /// The payload is the selector.
    Delete {
        /// `<database>.<collection>`.
        full_collection_name: String,
        /// Delete flags.
        flags: DeleteFlags,
    },
    /// Releases server-side cursors. No payload.
    KillCursors {
        /// The cursors to release.
        cursor_ids: Vec<i64>,
    },
}

/// A complete request, as handed to a [`Connection`](../conn/trait.Connection.html).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The operation header.
    pub op: Op,
    /// The serialized documents, back to back.
    pub documents: Bytes,
    /// If present, the transport follows the operation with a
    /// `getlasterror` command using this write concern, and the reply to
    /// that command is the response to this request.
    pub acknowledge: Option<WriteConcern>,
}

impl Request {
    /// A request which expects no acknowledgment.
    pub fn new(op: Op, documents: Bytes) -> Self {
        Request { op, documents, acknowledge: None }
    }

    /// A write request which expects an acknowledgment.
    pub fn acknowledged(op: Op, documents: Bytes, concern: WriteConcern) -> Self {
        Request { op, documents, acknowledge: Some(concern) }
    }
}

/// The header of a server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reply {
    /// Reply flags.
    pub flags: ReplyFlags,
    /// The id of the server-side cursor; `0` if it has been closed.
    pub cursor_id: i64,
    /// Position of the first returned document within the cursor.
    pub starting_from: i32,
    /// Number of documents in the payload.
    pub number_returned: i32,
}

/// A complete response to a [`Request`](struct.Request.html).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The reply header.
    pub reply: Reply,
    /// The serialized documents, back to back.
    pub documents: Bytes,
}

impl Response {
    /// Parses the payload, turning a reply flagged as a query failure
    /// or a missing cursor into the corresponding error.
    pub fn into_documents(self, model: &dyn DocumentModel) -> Result<VecDeque<Document>> {
        if self.reply.flags.contains(ReplyFlags::CURSOR_NOT_FOUND) {
            return Err(Error::new(
                ErrorKind::CursorNotFound,
                format!("cursor {} not found", self.reply.cursor_id)
            ));
        }

        let documents = model.read_documents(self.documents)?;

        if self.reply.flags.contains(ReplyFlags::QUERY_FAILURE) {
            let message = documents
                .first()
                .and_then(|doc| server_error_message(doc, "$err"))
                .unwrap_or_else(|| String::from("unspecified query failure"));

            return Err(Error::new(ErrorKind::QueryFailure, message));
        }

        Ok(documents.into())
    }

    /// Parses the payload and returns its first document. Used for
    /// acknowledgments and command replies, which consist of exactly one.
    pub fn into_first_document(self, model: &dyn DocumentModel) -> Result<Document> {
        self.into_documents(model)?.pop_front().ok_or_else(|| Error::new(
            ErrorKind::MissingDocumentField,
            "server reply contains no document"
        ))
    }
}
