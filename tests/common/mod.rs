//! A scripted, in-memory `Connection` shared by the integration tests.
//! It answers submitted requests with pre-recorded responses, in order,
//! and remembers everything it was asked to do.

#![allow(dead_code)]

use std::sync::{ Arc, Mutex };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;
use std::collections::VecDeque;
use async_trait::async_trait;
use bytes::BytesMut;
use drupe::prelude::*;
use drupe::error::{ Error, ErrorKind, Result };

/// Replays scripted responses and records requests.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    /// Popped from the front by every `submit()`.
    replies: Mutex<VecDeque<Result<Response>>>,
    /// Every request passed to `submit()`.
    submitted: Mutex<Vec<Request>>,
    /// Every request passed to `send()`.
    sent: Mutex<Vec<Request>>,
    /// Whether `send()` reports a failure.
    failing_sends: AtomicBool,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedConnection::default())
    }

    /// Queues the answer to the next unanswered `submit()`.
    pub fn script(&self, reply: Result<Response>) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn submitted(&self) -> Vec<Request> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.failing_sends.store(true, Ordering::SeqCst);
    }

    /// Number of scripted replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn submit(&self, request: Request) -> Result<Response> {
        self.submitted.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::new(ErrorKind::Transport, "script exhausted")))
    }

    fn send(&self, request: Request) -> Result<()> {
        self.sent.lock().unwrap().push(request);

        if self.failing_sends.load(Ordering::SeqCst) {
            Err(Error::new(ErrorKind::Transport, "connection reset by peer"))
        } else {
            Ok(())
        }
    }
}

/// A database on top of `connection`, with short delays so that
/// retrying and tailing tests run quickly.
pub fn database(connection: &Arc<ScriptedConnection>) -> Database {
    let config = Config {
        failover: FailoverStrategy {
            retries: 2,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
        },
        tail_poll_interval: Duration::from_millis(1),
        ..Config::default()
    };

    Database::new("test", connection.clone()).with_config(config)
}

/// A reply carrying `documents`, with the given cursor id.
pub fn batch(cursor_id: i64, documents: &[Document]) -> Result<Response> {
    batch_with_flags(ReplyFlags::empty(), cursor_id, documents)
}

pub fn batch_with_flags(flags: ReplyFlags, cursor_id: i64, documents: &[Document]) -> Result<Response> {
    let mut buf = BytesMut::new();

    for doc in documents {
        BsonModel.write_document(doc, &mut buf)?;
    }

    Ok(Response {
        reply: Reply {
            flags,
            cursor_id,
            starting_from: 0,
            number_returned: documents.len() as i32,
        },
        documents: buf.freeze(),
    })
}

/// A single-document reply, e.g. an acknowledgment or a command reply.
pub fn ack(document: Document) -> Result<Response> {
    batch(0, &[document])
}

pub fn transport_error() -> Result<Response> {
    Err(Error::new(ErrorKind::Transport, "broken pipe"))
}

/// Parses the payload of a request.
pub fn payload(request: &Request) -> Vec<Document> {
    BsonModel.read_documents(request.documents.clone()).unwrap()
}

/// Whether `request` is a get-more, and if so, of which cursor.
pub fn get_more_id(request: &Request) -> Option<i64> {
    match request.op {
        Op::GetMore { cursor_id, .. } => Some(cursor_id),
        _ => None,
    }
}
