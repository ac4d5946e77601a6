//! Typed, lazily fetched server-side result sets.

use std::fmt;
use std::mem;
use std::time::Duration;
use std::marker::PhantomData;
use std::collections::VecDeque;
use bytes::Bytes;
use bson::Document;
use futures::stream::{ self, Stream };
use tokio::time::sleep;
use tracing::{ debug, trace, warn };
use crate::{
    db::Database,
    codec::Reader,
    failover::{ self, FailoverStrategy },
    wire::{ Op, Request, Response },
    error::{ ErrorExt, ErrorKind, Result },
};

/// A typed cursor over the results of a query.
///
/// Documents are fetched in batches, one round trip at a time, and are
/// decoded with the cursor's `Reader` only when they are requested; a
/// document which fails to decode fails only the corresponding call to
/// `next()`.
///
/// A *default* cursor ends once the server has closed it and the current
/// batch is used up. A *tailable* cursor (opened with
/// `QueryFlags::TAILABLE`) does not end when it runs out of documents:
/// it waits for the configured poll interval and asks again. It only ends
/// if the server forgets about it, e.g. because the capped collection was
/// dropped.
///
/// Dropping a cursor which is still open on the server asks the server to
/// release it, without waiting for the outcome.
pub struct Cursor<T, R> {
    /// The database the query ran in.
    db: Database,
    /// `<database>.<collection>`, repeated in every get-more request.
    full_collection_name: String,
    /// Batch size, repeated in every get-more request.
    batch_size: i32,
    /// Failover strategy of get-more requests.
    failover: FailoverStrategy,
    /// Decodes the documents.
    reader: R,
    /// The documents received but not yet returned.
    batch: VecDeque<Document>,
    /// The server-side cursor; `0` if it's closed.
    cursor_id: i64,
    /// Whether this cursor keeps polling when it runs out of documents.
    tailable: bool,
    /// Whether the last batch came back empty.
    idle: bool,
    /// How long a tailable cursor waits between empty batches.
    poll_interval: Duration,
    /// The decoded type.
    _marker: PhantomData<fn() -> T>,
}

impl<T, R: Reader<T>> Cursor<T, R> {
    /// Wraps the server's response to the initial query.
    pub(crate) fn from_response(
        db: Database,
        full_collection_name: String,
        batch_size: i32,
        failover: FailoverStrategy,
        reader: R,
        tailable: bool,
        response: Response,
    ) -> Result<Self> {
        let poll_interval = db.config().tail_poll_interval;
        let mut cursor = Cursor {
            db,
            full_collection_name,
            batch_size,
            failover,
            reader,
            batch: VecDeque::new(),
            cursor_id: 0,
            tailable,
            idle: false,
            poll_interval,
            _marker: PhantomData,
        };

        match cursor.refill(response) {
            Ok(()) => Ok(cursor),
            Err(ref error) if tailable && error.kind() == ErrorKind::CursorNotFound => Ok(cursor),
            Err(error) => Err(error),
        }
    }

    /// The id of the server-side cursor; `0` if the server has closed it.
    pub fn id(&self) -> i64 {
        self.cursor_id
    }

    /// Whether this cursor keeps polling for new documents.
    pub fn is_tailable(&self) -> bool {
        self.tailable
    }

    /// Number of documents already received but not yet returned.
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    /// Returns the next document, fetching a new batch if necessary,
    /// or `None` at the end of the sequence.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(document) = self.batch.pop_front() {
                return Some(self.reader.read(document));
            }

            if self.cursor_id == 0 {
                return None;
            }

            if self.tailable && self.idle {
                trace!(cursor_id = self.cursor_id, delay = ?self.poll_interval, "tailing");
                sleep(self.poll_interval).await;
            }

            match self.fetch_more().await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::CursorNotFound => {
                    self.cursor_id = 0;

                    if self.tailable {
                        debug!(collection = %self.full_collection_name, "tailable cursor invalidated");
                        return None;
                    }

                    return Some(Err(error));
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }

    /// Issues a get-more request and replaces the batch with its result.
    async fn fetch_more(&mut self) -> Result<()> {
        let op = Op::GetMore {
            full_collection_name: self.full_collection_name.clone(),
            number_to_return: self.batch_size,
            cursor_id: self.cursor_id,
        };
        let request = Request::new(op, Bytes::new());

        debug!(cursor_id = self.cursor_id, collection = %self.full_collection_name, "fetching next batch");

        let response = failover::submit(self.db.connection(), &request, &self.failover).await?;

        self.refill(response)
    }

    /// Takes over the documents and the cursor id of a response.
    fn refill(&mut self, response: Response) -> Result<()> {
        let cursor_id = response.reply.cursor_id;
        let documents = response.into_documents(self.db.model())?;

        self.cursor_id = cursor_id;
        self.idle = documents.is_empty();
        self.batch = documents;

        Ok(())
    }

    /// Decodes the first buffered document without ever asking the server
    /// for more. A live server-side cursor is killed when `self` drops.
    pub(crate) fn take_first(mut self) -> Option<Result<T>> {
        let document = self.batch.pop_front()?;
        Some(self.reader.read(document))
    }

    /// Reads every remaining document.
    ///
    /// This only returns once the server closes the cursor, which a
    /// tailable cursor normally never does; use `collect_up_to` for those.
    pub async fn to_list(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();

        while let Some(value) = self.next().await {
            values.push(value?);
        }

        Ok(values)
    }

    /// Reads at most `n` further documents.
    pub async fn collect_up_to(&mut self, n: usize) -> Result<Vec<T>> {
        let mut values = Vec::with_capacity(n.min(self.batch.len()));

        while values.len() < n {
            match self.next().await {
                Some(value) => values.push(value?),
                None => break,
            }
        }

        Ok(values)
    }

    /// Returns the first document, if any, and closes the cursor.
    pub async fn head_option(mut self) -> Result<Option<T>> {
        self.next().await.transpose()
    }

    /// Adapts this cursor into a `Stream` of documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::unfold(self, |mut cursor| async move {
            let value = cursor.next().await?;
            Some((value, cursor))
        })
    }
}

impl<T, R> Cursor<T, R> {
    /// Releases the server-side cursor right away, reporting whether the
    /// request could be sent. Unread documents are discarded.
    pub fn close(mut self) -> Result<()> {
        match mem::replace(&mut self.cursor_id, 0) {
            0 => Ok(()),
            cursor_id => self.kill(cursor_id),
        }
    }

    /// Sends a fire-and-forget kill-cursors request.
    fn kill(&self, cursor_id: i64) -> Result<()> {
        debug!(cursor_id, collection = %self.full_collection_name, "killing cursor");

        let op = Op::KillCursors { cursor_ids: vec![cursor_id] };
        self.db.connection().send(Request::new(op, Bytes::new()))
    }
}

impl<T, R> Drop for Cursor<T, R> {
    fn drop(&mut self) {
        let cursor_id = mem::replace(&mut self.cursor_id, 0);

        if cursor_id != 0 {
            if let Err(error) = self.kill(cursor_id) {
                warn!(cursor_id, %error, "can't kill cursor");
            }
        }
    }
}

impl<T, R> fmt::Debug for Cursor<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.full_collection_name)
            .field("id", &self.cursor_id)
            .field("buffered", &self.batch.len())
            .field("tailable", &self.tailable)
            .finish()
    }
}
