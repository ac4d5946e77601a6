//! A named collection inside a database.

use std::fmt;
use bytes::{ Bytes, BytesMut };
use tracing::{ trace, warn };
use crate::{
    db::Database,
    meta::MetaCommands,
    query::QueryBuilder,
    codec::{ self, Writer },
    failover::FailoverStrategy,
    write::{ self, LastError, WriteConcern },
    wire::{ Op, Request, InsertFlags, UpdateFlags, DeleteFlags },
    error::{ Result, ResultExt },
};

/// A collection handle: the database it lives in, its name, and the
/// defaults its operations run with.
///
/// Collections are immutable and cheap to clone. The type of the documents
/// is not fixed: every operation takes the `Writer` or `Reader` it needs,
/// so the same collection can be read and written through several
/// unrelated typed views.
#[derive(Clone)]
pub struct Collection {
    /// The database containing this collection.
    db: Database,
    /// The name of the collection, relative to the database.
    name: String,
    /// The failover strategy of operations on this collection.
    failover: FailoverStrategy,
    /// The write concern of checked writes.
    write_concern: WriteConcern,
}

impl Collection {
    /// Creates a collection handle with the defaults of `db`.
    pub(crate) fn new(db: Database, name: String) -> Self {
        assert!(!name.is_empty(), "collection name must not be empty");

        let failover = db.config().failover;
        let write_concern = db.config().write_concern.clone();

        Collection { db, name, failover, write_concern }
    }

    /// The database containing this collection.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The name of the collection, relative to the database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<database>.<collection>`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    /// The failover strategy of operations on this collection.
    pub fn failover_strategy(&self) -> &FailoverStrategy {
        &self.failover
    }

    /// The write concern of checked writes.
    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    /// Returns a copy of this handle using a different failover strategy.
    pub fn with_failover_strategy(&self, failover: FailoverStrategy) -> Self {
        Collection { failover, ..self.clone() }
    }

    /// Returns a copy of this handle using a different write concern.
    pub fn with_write_concern(&self, write_concern: WriteConcern) -> Self {
        Collection { write_concern, ..self.clone() }
    }

    /// Returns another collection of the same database, with the same
    /// failover strategy and write concern as this one.
    ///
    /// # Panics
    ///
    /// If `name` is empty.
    pub fn sister<S: Into<String>>(&self, name: S) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "collection name must not be empty");
        Collection { name, ..self.clone() }
    }

    /// Administrative commands concerning this collection.
    pub fn meta(&self) -> MetaCommands<'_> {
        MetaCommands::new(self)
    }

    /// Starts a query matching every document.
    pub fn find_all(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    /// Starts a query matching `filter`.
    pub fn find<S, W>(&self, filter: &S, writer: &W) -> Result<QueryBuilder>
        where S: ?Sized,
              W: Writer<S> + ?Sized,
    {
        self.find_all().query(filter, writer)
    }

    /// Starts a query matching `filter`, returning only the fields
    /// selected by `projection`.
    pub fn find_with_projection<S, P, W>(&self, filter: &S, projection: &P, writer: &W) -> Result<QueryBuilder>
        where S: ?Sized,
              P: ?Sized,
              W: Writer<S> + Writer<P> + ?Sized,
    {
        self.find(filter, writer)?.projection(projection, writer)
    }

    /// Inserts a single document and waits for its acknowledgment.
    pub async fn insert<T, W>(&self, document: &T, writer: &W) -> Result<LastError>
        where T: ?Sized,
              W: Writer<T> + ?Sized,
    {
        let message = || format!("error in {}::insert()", self.full_name());
        let payload = codec::encode(document, writer, self.db.model()).chain(&message)?;

        self.checked(self.insert_op(InsertFlags::empty()), payload).await.chain(&message)
    }

    /// Updates the documents matching `selector` and waits for the
    /// acknowledgment.
    ///
    /// With `upsert`, a document is inserted if nothing matches.
    /// With `multi`, every match is updated, not only the first one.
    pub async fn update<S, U, W>(
        &self,
        selector: &S,
        update: &U,
        writer: &W,
        upsert: bool,
        multi: bool,
    ) -> Result<LastError>
        where S: ?Sized,
              U: ?Sized,
              W: Writer<S> + Writer<U> + ?Sized,
    {
        let message = || format!("error in {}::update()", self.full_name());
        let payload = self.update_payload(selector, update, writer).chain(&message)?;
        let op = self.update_op(upsert, multi);

        self.checked(op, payload).await.chain(&message)
    }

    /// Removes the documents matching `query` and waits for the
    /// acknowledgment. With `first_match_only`, at most one is removed.
    pub async fn remove<T, W>(&self, query: &T, writer: &W, first_match_only: bool) -> Result<LastError>
        where T: ?Sized,
              W: Writer<T> + ?Sized,
    {
        let message = || format!("error in {}::remove()", self.full_name());
        let payload = codec::encode(query, writer, self.db.model()).chain(&message)?;

        self.checked(self.delete_op(first_match_only), payload).await.chain(&message)
    }

    /// Inserts a single document without asking for an acknowledgment.
    ///
    /// The outcome is never reported: encoding and delivery
    /// failures are merely logged.
    pub fn unchecked_insert<T, W>(&self, document: &T, writer: &W)
        where T: ?Sized,
              W: Writer<T> + ?Sized,
    {
        let payload = codec::encode(document, writer, self.db.model());
        self.unchecked(self.insert_op(InsertFlags::empty()), payload);
    }

    /// Updates documents without asking for an acknowledgment.
    /// See [`update`](#method.update) for the meaning of the flags.
    pub fn unchecked_update<S, U, W>(&self, selector: &S, update: &U, writer: &W, upsert: bool, multi: bool)
        where S: ?Sized,
              U: ?Sized,
              W: Writer<S> + Writer<U> + ?Sized,
    {
        let payload = self.update_payload(selector, update, writer);
        self.unchecked(self.update_op(upsert, multi), payload);
    }

    /// Removes documents without asking for an acknowledgment.
    pub fn unchecked_remove<T, W>(&self, query: &T, writer: &W, first_match_only: bool)
        where T: ?Sized,
              W: Writer<T> + ?Sized,
    {
        let payload = codec::encode(query, writer, self.db.model());
        self.unchecked(self.delete_op(first_match_only), payload);
    }

    /// Submits a write requesting acknowledgment with the
    /// collection's write concern.
    pub(crate) async fn checked(&self, op: Op, payload: Bytes) -> Result<LastError> {
        let request = Request::acknowledged(op, payload, self.write_concern.clone());
        trace!(op = ?request.op, "checked write");
        write::submit_checked(&self.db, request, &self.failover).await
    }

    /// Sends a write if it could be encoded, and forgets about it.
    fn unchecked(&self, op: Op, payload: Result<Bytes>) {
        match payload {
            Ok(payload) => write::send_unchecked(&self.db, Request::new(op, payload)),
            Err(error) => warn!(
                collection = %self.full_name(),
                %error,
                "unchecked write could not be encoded"
            ),
        }
    }

    /// The header of an insert into this collection.
    pub(crate) fn insert_op(&self, flags: InsertFlags) -> Op {
        Op::Insert {
            flags,
            full_collection_name: self.full_name(),
        }
    }

    /// The header of an update of this collection.
    fn update_op(&self, upsert: bool, multi: bool) -> Op {
        Op::Update {
            full_collection_name: self.full_name(),
            flags: UpdateFlags::from_options(upsert, multi),
        }
    }

    /// The header of a removal from this collection.
    fn delete_op(&self, first_match_only: bool) -> Op {
        let flags = if first_match_only {
            DeleteFlags::SINGLE_REMOVE
        } else {
            DeleteFlags::empty()
        };

        Op::Delete { full_collection_name: self.full_name(), flags }
    }

    /// The selector immediately followed by the update document.
    fn update_payload<S, U, W>(&self, selector: &S, update: &U, writer: &W) -> Result<Bytes>
        where S: ?Sized,
              U: ?Sized,
              W: Writer<S> + Writer<U> + ?Sized,
    {
        let model = self.db.model();
        let mut buf = BytesMut::new();

        codec::encode_into(selector, writer, model, &mut buf).chain("can't encode selector")?;
        codec::encode_into(update, writer, model, &mut buf).chain("can't encode update")?;

        Ok(buf.freeze())
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Collection({})", self.full_name())
    }
}
