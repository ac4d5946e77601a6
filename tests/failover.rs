//! Integration tests of the retry loop:
//! * [`failover`](failover/index.html)

mod common;

use std::time::{ Duration, Instant };
use bytes::Bytes;
use bson::doc;
use drupe::prelude::*;
use drupe::failover;
use drupe::error::{ ErrorExt, ErrorKind, Result };
use common::*;

fn kill_request() -> Request {
    Request::new(Op::KillCursors { cursor_ids: vec![1] }, Bytes::new())
}

#[tokio::test]
async fn succeeds_without_retrying() -> Result<()> {
    let conn = ScriptedConnection::new();
    conn.script(ack(doc!{ "ok": 1 }));

    let response = failover::submit(&*conn, &kill_request(), &FailoverStrategy::default()).await?;

    assert_eq!(response.reply.number_returned, 1);
    assert_eq!(conn.submitted(), vec![kill_request()]);

    Ok(())
}

#[tokio::test]
async fn retries_with_growing_delays() -> Result<()> {
    let conn = ScriptedConnection::new();
    let strategy = FailoverStrategy {
        retries: 3,
        initial_delay: Duration::from_millis(10),
        backoff_factor: 2.0,
    };

    conn.script(transport_error())
        .script(transport_error())
        .script(transport_error())
        .script(ack(doc!{ "ok": 1 }));

    let start = Instant::now();
    failover::submit(&*conn, &kill_request(), &strategy).await?;

    // 10 + 20 + 40 milliseconds
    assert!(start.elapsed() >= Duration::from_millis(70));
    assert_eq!(conn.submitted().len(), 4);

    Ok(())
}

#[tokio::test]
async fn gives_up_after_the_last_retry() -> Result<()> {
    let conn = ScriptedConnection::new();
    let strategy = FailoverStrategy {
        retries: 1,
        initial_delay: Duration::from_millis(1),
        backoff_factor: 1.0,
    };

    conn.script(transport_error()).script(transport_error());

    let error = failover::submit(&*conn, &kill_request(), &strategy).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(error.message(), "request failed after 1 retries");
    assert!(error.reason().is_some());
    assert_eq!(conn.submitted().len(), 2);

    Ok(())
}

#[tokio::test]
async fn no_retries_means_a_single_attempt() -> Result<()> {
    let conn = ScriptedConnection::new();
    conn.script(transport_error()).script(ack(doc!{ "ok": 1 }));

    let error = failover::submit(&*conn, &kill_request(), &FailoverStrategy::none())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(error.message(), "broken pipe");
    assert_eq!(conn.submitted().len(), 1);

    Ok(())
}

#[tokio::test]
async fn server_side_failures_are_not_retried() -> Result<()> {
    let conn = ScriptedConnection::new();
    let coll = database(&conn).collection("things");

    conn.script(batch_with_flags(ReplyFlags::QUERY_FAILURE, 0, &[doc!{ "$err": "bad query" }]))
        .script(batch(0, &[]));

    let error = coll.find_all().cursor::<Document, _>(SerdeCodec).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::QueryFailure);
    assert_eq!(conn.submitted().len(), 1);

    Ok(())
}

#[test]
fn delays_are_capped() {
    let strategy = FailoverStrategy {
        retries: 100,
        initial_delay: Duration::from_secs(1),
        backoff_factor: 10.0,
    };

    assert_eq!(strategy.delay(1), Duration::from_secs(1));
    assert_eq!(strategy.delay(2), Duration::from_secs(10));
    assert_eq!(strategy.delay(50), Duration::from_secs(3600));

    let constant = FailoverStrategy::default();
    assert_eq!(constant.delay(1), constant.delay(5));
}
