//! Building queries and opening cursors.

use std::convert::TryFrom;
use bytes::BytesMut;
use bson::Document;
use tracing::debug;
use crate::{
    coll::Collection,
    cursor::Cursor,
    codec::{ Reader, Writer },
    failover::{ self, FailoverStrategy },
    wire::{ Op, QueryFlags, Request },
    error::{ Result, ResultExt },
};

/// Paging and flags of a query.
///
/// Every flag has a toggle method which flips the corresponding bit,
/// so calling it twice restores the original value.
/// ```
/// # use drupe::query::QueryOptions;
/// # use drupe::wire::QueryFlags;
/// let opts = QueryOptions::default().tailable().await_data();
/// assert_eq!(opts.flags(), QueryFlags::TAILABLE | QueryFlags::AWAIT_DATA);
/// assert_eq!(opts.tailable().tailable(), opts);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QueryOptions {
    /// Number of matching documents to skip.
    skip: u32,
    /// Number of documents per batch; `0` is the server default.
    batch_size: u32,
    /// Query flags.
    flags: QueryFlags,
}

/// Generates the flag toggle methods of `QueryOptions`.
macro_rules! flag_toggles {
    ($($(#[$attr:meta])* fn $name:ident => $flag:ident;)*) => {$(
        $(#[$attr])*
        pub fn $name(mut self) -> Self {
            self.flags.toggle(QueryFlags::$flag);
            self
        }
    )*}
}

impl QueryOptions {
    /// Skips the first `n` matching documents.
    pub fn skip(mut self, n: u32) -> Self {
        self.skip = n;
        self
    }

    /// Asks for `n` documents per batch. `0` leaves it to the server.
    pub fn batch_size(mut self, n: u32) -> Self {
        self.batch_size = n;
        self
    }

    /// Number of matching documents to skip.
    pub fn skip_count(&self) -> u32 {
        self.skip
    }

    /// Number of documents per batch.
    pub fn batch_size_value(&self) -> u32 {
        self.batch_size
    }

    /// The flag word.
    pub fn flags(&self) -> QueryFlags {
        self.flags
    }

    flag_toggles! {
        /// Toggles `TAILABLE`.
        fn tailable => TAILABLE;
        /// Toggles `SLAVE_OK`.
        fn slave_ok => SLAVE_OK;
        /// Toggles `OPLOG_REPLAY`.
        fn oplog_replay => OPLOG_REPLAY;
        /// Toggles `NO_CURSOR_TIMEOUT`.
        fn no_cursor_timeout => NO_CURSOR_TIMEOUT;
        /// Toggles `AWAIT_DATA`.
        fn await_data => AWAIT_DATA;
        /// Toggles `EXHAUST`.
        fn exhaust => EXHAUST;
        /// Toggles `PARTIAL`.
        fn partial => PARTIAL;
    }
}

/// An immutable description of a query.
///
/// Every setter leaves `self` alone and returns a modified copy, so a
/// builder can be shared and specialized freely. The filter, projection,
/// sort and hint are stored as opaque documents; the builder never looks
/// inside them.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    /// The queried collection.
    collection: Collection,
    /// Selects the matching documents.
    filter: Option<Document>,
    /// Ordering of the results.
    sort: Option<Document>,
    /// Fields to return.
    projection: Option<Document>,
    /// Index to use.
    hint: Option<Document>,
    /// Return the query plan instead of the results.
    explain: bool,
    /// Use snapshot mode.
    snapshot: bool,
    /// Annotation visible in the server's logs and profiler.
    comment: Option<String>,
    /// Paging and flags.
    options: QueryOptions,
    /// Failover strategy of the initial request and of every refetch.
    failover: FailoverStrategy,
}

impl QueryBuilder {
    /// An empty query against `collection`, using its failover strategy.
    pub fn new(collection: Collection) -> Self {
        let failover = *collection.failover_strategy();

        QueryBuilder {
            collection,
            filter: None,
            sort: None,
            projection: None,
            hint: None,
            explain: false,
            snapshot: false,
            comment: None,
            options: QueryOptions::default(),
            failover,
        }
    }

    /// The queried collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The filter, if set.
    pub fn filter(&self) -> Option<&Document> {
        self.filter.as_ref()
    }

    /// The projection, if set.
    pub fn projection_document(&self) -> Option<&Document> {
        self.projection.as_ref()
    }

    /// Paging and flags.
    pub fn query_options(&self) -> QueryOptions {
        self.options
    }

    /// Failover strategy of this query.
    pub fn failover_strategy(&self) -> &FailoverStrategy {
        &self.failover
    }

    /// Replaces the filter.
    pub fn query<S, W>(&self, filter: &S, writer: &W) -> Result<Self>
        where S: ?Sized,
              W: Writer<S> + ?Sized,
    {
        let filter = writer.write(filter).chain("can't encode query filter")?;
        Ok(QueryBuilder { filter: Some(filter), ..self.clone() })
    }

    /// Replaces the projection.
    pub fn projection<P, W>(&self, projection: &P, writer: &W) -> Result<Self>
        where P: ?Sized,
              W: Writer<P> + ?Sized,
    {
        let projection = writer.write(projection).chain("can't encode projection")?;
        Ok(QueryBuilder { projection: Some(projection), ..self.clone() })
    }

    /// Replaces the sort specification, e.g. `{ "age": -1 }`.
    pub fn sort(&self, sort: Document) -> Self {
        QueryBuilder { sort: Some(sort), ..self.clone() }
    }

    /// Replaces the index hint.
    pub fn hint(&self, hint: Document) -> Self {
        QueryBuilder { hint: Some(hint), ..self.clone() }
    }

    /// Sets or clears snapshot mode.
    pub fn snapshot(&self, snapshot: bool) -> Self {
        QueryBuilder { snapshot, ..self.clone() }
    }

    /// Sets or clears explain mode.
    pub fn explain(&self, explain: bool) -> Self {
        QueryBuilder { explain, ..self.clone() }
    }

    /// Replaces the comment.
    pub fn comment<S: Into<String>>(&self, comment: S) -> Self {
        QueryBuilder { comment: Some(comment.into()), ..self.clone() }
    }

    /// Replaces the paging and flags.
    pub fn options(&self, options: QueryOptions) -> Self {
        QueryBuilder { options, ..self.clone() }
    }

    /// Replaces the failover strategy.
    pub fn failover(&self, failover: FailoverStrategy) -> Self {
        QueryBuilder { failover, ..self.clone() }
    }

    /// The query document actually sent: the filter alone if no metadata is
    /// set, otherwise the filter wrapped in `$query` alongside the metadata.
    /// ```
    /// # #[macro_use] extern crate bson;
    /// # use std::sync::Arc;
    /// # use drupe::prelude::*;
    /// # use drupe::error::Result;
    /// # #[derive(Debug)] struct Offline;
    /// # #[async_trait::async_trait]
    /// # impl Connection for Offline {
    /// #     async fn submit(&self, _: Request) -> Result<Response> { unimplemented!() }
    /// #     fn send(&self, _: Request) -> Result<()> { Ok(()) }
    /// # }
    /// # fn main() -> Result<()> {
    /// # let coll = Database::new("shop", Arc::new(Offline)).collection("orders");
    /// let plain = coll.find(&doc!{ "paid": true }, &SerdeCodec)?;
    /// assert_eq!(plain.merge(), doc!{ "paid": true });
    ///
    /// let sorted = plain.sort(doc!{ "total": -1 }).comment("report");
    /// assert_eq!(sorted.merge(), doc!{
    ///     "$query": { "paid": true },
    ///     "$orderby": { "total": -1 },
    ///     "$comment": "report",
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn merge(&self) -> Document {
        let filter = self.filter.clone().unwrap_or_default();

        if self.sort.is_none()
            && self.hint.is_none()
            && !self.snapshot
            && self.comment.is_none()
            && !self.explain
        {
            return filter;
        }

        let mut merged = doc!{ "$query": filter };

        if let Some(sort) = self.sort.clone() {
            merged.insert("$orderby", sort);
        }
        if let Some(hint) = self.hint.clone() {
            merged.insert("$hint", hint);
        }
        if self.snapshot {
            merged.insert("$snapshot", true);
        }
        if let Some(comment) = self.comment.clone() {
            merged.insert("$comment", comment);
        }
        if self.explain {
            merged.insert("$explain", true);
        }

        merged
    }

    /// Builds the request opening this query's cursor.
    pub fn to_request(&self) -> Result<Request> {
        let model = self.collection.db().model();
        let mut payload = BytesMut::new();

        model.write_document(&self.merge(), &mut payload)?;

        if let Some(projection) = self.projection.as_ref() {
            model.write_document(projection, &mut payload)?;
        }

        let op = Op::Query {
            flags: self.options.flags,
            full_collection_name: self.collection.full_name(),
            number_to_skip: i32::try_from(self.options.skip).unwrap_or(i32::MAX),
            number_to_return: i32::try_from(self.options.batch_size).unwrap_or(i32::MAX),
        };

        Ok(Request::new(op, payload.freeze()))
    }

    /// Sends the query and returns a cursor over its results, decoded
    /// with `reader`. The cursor is tailable if the `TAILABLE` flag is set.
    pub async fn cursor<T, R: Reader<T>>(&self, reader: R) -> Result<Cursor<T, R>> {
        let message = || format!("error in {}::find()", self.collection.full_name());
        let request = self.to_request().chain(&message)?;
        let db = self.collection.db();

        debug!(op = ?request.op, "opening cursor");

        let response = failover::submit(db.connection(), &request, &self.failover)
            .await
            .chain(&message)?;
        let tailable = self.options.flags.contains(QueryFlags::TAILABLE);
        let batch_size = i32::try_from(self.options.batch_size).unwrap_or(i32::MAX);

        Cursor::from_response(
            db.clone(),
            self.collection.full_name(),
            batch_size,
            self.failover,
            reader,
            tailable,
            response,
        ).chain(&message)
    }

    /// Returns the first result, if any. The query is sent with a batch
    /// size of 1 and only its first reply is looked at: an empty first
    /// batch means `None`, even if the server kept the cursor open.
    pub async fn one<T, R: Reader<T>>(&self, reader: R) -> Result<Option<T>> {
        self.options(self.options.batch_size(1))
            .cursor(reader)
            .await?
            .take_first()
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOGGLES: &[fn(QueryOptions) -> QueryOptions] = &[
        QueryOptions::tailable,
        QueryOptions::slave_ok,
        QueryOptions::oplog_replay,
        QueryOptions::no_cursor_timeout,
        QueryOptions::await_data,
        QueryOptions::exhaust,
        QueryOptions::partial,
    ];

    #[test]
    fn every_flag_toggle_is_an_involution() {
        let start = QueryOptions::default().skip(3).batch_size(10).slave_ok();

        for toggle in TOGGLES {
            let once = toggle(start);
            assert_ne!(once, start);
            assert_eq!(toggle(once), start);
        }
    }

    #[test]
    fn toggles_touch_distinct_bits() {
        let all = TOGGLES.iter().fold(QueryOptions::default(), |opts, toggle| toggle(opts));

        assert_eq!(all.flags(), QueryFlags::all());
        assert_eq!(all.flags().bits(), 0xfe);
    }

    #[test]
    fn paging_setters() {
        let opts = QueryOptions::default().skip(20).batch_size(5);

        assert_eq!(opts.skip_count(), 20);
        assert_eq!(opts.batch_size_value(), 5);
        assert!(opts.flags().is_empty());
    }
}
