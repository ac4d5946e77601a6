//! Integration tests of the cursor state machine:
//! * [`cursor`](cursor/index.html)

mod common;

use futures::TryStreamExt;
use serde_derive::Deserialize;
use bson::doc;
use drupe::prelude::*;
use drupe::error::{ ErrorExt, ErrorKind, Result };
use common::*;

#[derive(Debug, PartialEq, Deserialize)]
struct Entry {
    n: i32,
}

fn entries(ns: &[i32]) -> Vec<Entry> {
    ns.iter().map(|&n| Entry { n }).collect()
}

#[tokio::test]
async fn draining_preserves_order_and_fetches_lazily() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(7, &[doc!{ "n": 1 }, doc!{ "n": 2 }]))
        .script(batch(7, &[doc!{ "n": 3 }]))
        .script(batch(0, &[]));

    let cursor = log
        .find_all()
        .options(QueryOptions::default().batch_size(2))
        .cursor(SerdeCodec)
        .await?;

    assert_eq!(cursor.id(), 7);
    assert_eq!(cursor.buffered(), 2);
    assert_eq!(conn.submitted().len(), 1);

    let all: Vec<Entry> = cursor.to_list().await?;
    assert_eq!(all, entries(&[1, 2, 3]));

    let submitted = conn.submitted();
    let get_mores: Vec<_> = submitted.iter().filter_map(get_more_id).collect();
    assert_eq!(submitted.len(), 3);
    assert_eq!(get_mores, vec![7, 7]);

    for request in &submitted[1..] {
        assert_eq!(request.op, Op::GetMore {
            full_collection_name: "test.log".into(),
            number_to_return: 2,
            cursor_id: 7,
        });
    }

    // A cursor closed by the server needs no killing.
    assert!(conn.sent().is_empty());

    Ok(())
}

#[tokio::test]
async fn no_fetch_until_the_batch_is_used_up() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(3, &[doc!{ "n": 1 }, doc!{ "n": 2 }]))
        .script(batch(0, &[doc!{ "n": 3 }]));

    let mut cursor = log.find_all().cursor::<Entry, _>(SerdeCodec).await?;

    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 1 }));
    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 2 }));
    assert_eq!(conn.submitted().len(), 1);

    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 3 }));
    assert_eq!(conn.submitted().len(), 2);

    assert!(cursor.next().await.is_none());
    assert!(cursor.next().await.is_none());
    assert_eq!(conn.submitted().len(), 2);

    Ok(())
}

#[tokio::test]
async fn a_bad_document_fails_only_its_own_step() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(0, &[doc!{ "n": 1 }, doc!{ "n": "two" }, doc!{ "n": 3 }]));

    let mut cursor = log.find_all().cursor::<Entry, _>(SerdeCodec).await?;

    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 1 }));

    let error = cursor.next().await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::BsonDecoding);

    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 3 }));
    assert!(cursor.next().await.is_none());

    Ok(())
}

#[tokio::test]
async fn tailable_cursor_polls_through_empty_batches() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("capped");

    conn.script(batch(9, &[doc!{ "n": 1 }]))
        .script(batch(9, &[]))
        .script(batch(9, &[]))
        .script(batch(9, &[doc!{ "n": 2 }]));

    let mut cursor = log
        .find_all()
        .options(QueryOptions::default().tailable().await_data())
        .cursor::<Entry, _>(SerdeCodec)
        .await?;

    assert!(cursor.is_tailable());

    let first_two = cursor.collect_up_to(2).await?;
    assert_eq!(first_two, entries(&[1, 2]));

    let submitted = conn.submitted();
    assert_eq!(submitted.len(), 4);
    assert_eq!(submitted.iter().filter_map(get_more_id).collect::<Vec<_>>(), vec![9, 9, 9]);

    match submitted[0].op {
        Op::Query { flags, .. } => assert_eq!(flags, QueryFlags::TAILABLE | QueryFlags::AWAIT_DATA),
        ref op => panic!("unexpected op: {:?}", op),
    }

    // The cursor is still alive on the server, so dropping it kills it.
    drop(cursor);

    let sent = conn.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].op, Op::KillCursors { cursor_ids: vec![9] });

    Ok(())
}

#[tokio::test]
async fn invalidated_tailable_cursor_just_ends() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("capped");

    conn.script(batch(5, &[doc!{ "n": 1 }]))
        .script(batch_with_flags(ReplyFlags::CURSOR_NOT_FOUND, 0, &[]));

    let all: Vec<Entry> = log
        .find_all()
        .options(QueryOptions::default().tailable())
        .cursor(SerdeCodec)
        .await?
        .to_list()
        .await?;

    assert_eq!(all, entries(&[1]));
    assert_eq!(conn.submitted().len(), 2);
    assert!(conn.sent().is_empty());

    Ok(())
}

#[tokio::test]
async fn lost_default_cursor_is_an_error() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(5, &[doc!{ "n": 1 }]))
        .script(batch_with_flags(ReplyFlags::CURSOR_NOT_FOUND, 0, &[]));

    let mut cursor = log.find_all().cursor::<Entry, _>(SerdeCodec).await?;

    assert_eq!(cursor.next().await.transpose()?, Some(Entry { n: 1 }));

    let error = cursor.next().await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::CursorNotFound);

    // The server forgot about the cursor, so there is nothing left to do.
    assert!(cursor.next().await.is_none());
    assert_eq!(cursor.id(), 0);

    drop(cursor);
    assert!(conn.sent().is_empty());

    Ok(())
}

#[tokio::test]
async fn closing_early_kills_the_server_cursor() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(11, &[doc!{ "n": 1 }, doc!{ "n": 2 }]));

    let mut cursor = log.find_all().cursor::<Entry, _>(SerdeCodec).await?;
    assert_eq!(cursor.collect_up_to(1).await?, entries(&[1]));

    cursor.close()?;

    let sent = conn.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].op, Op::KillCursors { cursor_ids: vec![11] });
    assert_eq!(conn.submitted().len(), 1);

    Ok(())
}

#[tokio::test]
async fn failing_kill_is_not_reported_on_drop() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.fail_sends();
    conn.script(batch(12, &[doc!{ "n": 1 }]));

    let first: Option<Entry> = log.find_all().cursor(SerdeCodec).await?.head_option().await?;
    assert_eq!(first, Some(Entry { n: 1 }));

    assert_eq!(conn.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn cursor_as_a_stream() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(4, &[doc!{ "n": 1 }]))
        .script(batch(4, &[doc!{ "n": 2 }, doc!{ "n": 3 }]))
        .script(batch(0, &[doc!{ "n": 4 }]));

    let all: Vec<Entry> = log
        .find_all()
        .cursor(SerdeCodec)
        .await?
        .into_stream()
        .try_collect()
        .await?;

    assert_eq!(all, entries(&[1, 2, 3, 4]));
    assert_eq!(conn.submitted().len(), 3);

    Ok(())
}

#[tokio::test]
async fn transport_failure_while_fetching_is_retried() -> Result<()> {
    let conn = ScriptedConnection::new();
    let log = database(&conn).collection("log");

    conn.script(batch(8, &[doc!{ "n": 1 }]))
        .script(transport_error())
        .script(batch(0, &[doc!{ "n": 2 }]));

    let all: Vec<Entry> = log.find_all().cursor(SerdeCodec).await?.to_list().await?;

    assert_eq!(all, entries(&[1, 2]));
    assert_eq!(conn.submitted().iter().filter_map(get_more_id).count(), 2);

    Ok(())
}
