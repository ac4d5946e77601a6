//! Inserting arbitrarily long sequences of documents in wire-sized batches.

use std::mem;
use bytes::{ Bytes, BytesMut };
use futures::{ Stream, StreamExt };
use tracing::debug;
use crate::{
    coll::Collection,
    codec::{ self, Writer },
    wire::InsertFlags,
    error::{ Result, ResultExt },
};

/// Bounds on the size of a single insert request during bulk insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkLimits {
    /// A batch is sent as soon as it holds this many documents.
    pub bulk_size: usize,
    /// A batch is sent as soon as its documents take up at least
    /// this many bytes.
    pub bulk_byte_size: usize,
    /// Asks the server to keep inserting the rest of a batch after one
    /// of its documents fails, e.g. on a duplicate key. The failure is
    /// still reported and still aborts the bulk insertion.
    pub continue_on_error: bool,
}

impl Default for BulkLimits {
    fn default() -> Self {
        BulkLimits {
            bulk_size: 100,
            bulk_byte_size: 16 * 1024 * 1024,
            continue_on_error: false,
        }
    }
}

/// The batch being accumulated.
#[derive(Debug, Default)]
struct BulkBatch {
    /// Number of documents in the batch.
    count: usize,
    /// The serialized documents, back to back.
    payload: BytesMut,
}

impl BulkBatch {
    /// Whether either limit has been reached.
    fn is_full(&self, limits: &BulkLimits) -> bool {
        self.count >= limits.bulk_size || self.payload.len() >= limits.bulk_byte_size
    }

    /// Empties the batch, returning its count and payload.
    fn take(&mut self) -> (usize, Bytes) {
        let count = mem::replace(&mut self.count, 0);
        let payload = self.payload.split().freeze();
        (count, payload)
    }
}

impl Collection {
    /// Inserts every document of `documents`, batching them according to
    /// the database's configured `BulkLimits`.
    /// See [`bulk_insert_with`](#method.bulk_insert_with).
    pub async fn bulk_insert<S, W>(&self, documents: S, writer: &W) -> Result<usize>
        where S: Stream,
              W: Writer<S::Item> + ?Sized,
    {
        let limits = self.db().config().bulk;
        self.bulk_insert_with(documents, writer, limits).await
    }

    /// Inserts every document of `documents`, sending a checked insert
    /// whenever the accumulated batch reaches either limit, and once more
    /// for the remainder at the end of the stream.
    ///
    /// Every batch is acknowledged before the next document is pulled from
    /// the stream, so at most one batch is ever in flight. The first failure
    /// aborts the whole operation; batches already acknowledged remain
    /// inserted. On success, returns the number of documents sent.
    pub async fn bulk_insert_with<S, W>(&self, documents: S, writer: &W, limits: BulkLimits) -> Result<usize>
        where S: Stream,
              W: Writer<S::Item> + ?Sized,
    {
        let message = || format!("error in {}::bulk_insert()", self.full_name());
        let model = self.db().model();
        let mut batch = BulkBatch::default();
        let mut documents = Box::pin(documents);
        let mut total = 0;
        let flags = if limits.continue_on_error {
            InsertFlags::CONTINUE_ON_ERROR
        } else {
            InsertFlags::empty()
        };

        while let Some(document) = documents.next().await {
            codec::encode_into(&document, writer, model, &mut batch.payload).chain(&message)?;
            batch.count += 1;

            if batch.is_full(&limits) {
                total += self.flush(&mut batch, flags).await.chain(&message)?;
            }
        }

        if batch.count > 0 {
            total += self.flush(&mut batch, flags).await.chain(&message)?;
        }

        Ok(total)
    }

    /// Sends the accumulated batch as one insert and waits for it to be
    /// acknowledged.
    async fn flush(&self, batch: &mut BulkBatch, flags: InsertFlags) -> Result<usize> {
        let (count, payload) = batch.take();

        debug!(collection = %self.full_name(), count, bytes = payload.len(), "flushing bulk batch");

        self.checked(self.insert_op(flags), payload).await?;

        Ok(count)
    }
}
