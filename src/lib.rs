//! Drupe: the typed query-and-write pipeline of a MongoDB driver
//!
//! Drupe sits between strongly-typed application code and a transport
//! speaking the legacy MongoDB wire protocol. It turns `find`, `insert`,
//! `update`, `remove` and bulk insertion of arbitrary Rust values into
//! wire requests, interprets the acknowledgments, and exposes query
//! results as lazy, asynchronous cursors.
//!
//! The transport itself is not part of this crate: anything implementing
//! the [`Connection`](conn/trait.Connection.html) trait will do.
//!
//! ## Typed views
//!
//! A `Collection` doesn't fix the type of its documents. Each operation
//! takes a [`Writer`](codec/trait.Writer.html) or a
//! [`Reader`](codec/trait.Reader.html) which converts between typed values
//! and BSON documents. [`SerdeCodec`](codec/struct.SerdeCodec.html) covers
//! every `Serialize`/`Deserialize` type, and is what you want most of the
//! time.
//!
//! ```no_run
//! #[macro_use]
//! extern crate serde_derive;
//! #[macro_use]
//! extern crate bson;
//!
//! use std::sync::Arc;
//! use drupe::prelude::*;
//! use drupe::error::Result;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     legs: u16,
//! }
//!
//! async fn example(connection: Arc<dyn Connection>) -> Result<()> {
//!     let users = Database::new("zoo", connection).collection("users");
//!
//!     let ack = users.insert(&User { name: "Polly".into(), legs: 2 }, &SerdeCodec).await?;
//!     assert_eq!(ack.n, 1);
//!
//!     let bipeds: Vec<User> = users
//!         .find(&doc!{ "legs": 2 }, &SerdeCodec)?
//!         .sort(doc!{ "name": 1 })
//!         .cursor(SerdeCodec)
//!         .await?
//!         .to_list()
//!         .await?;
//!
//!     println!("{:#?}", bipeds);
//!
//!     users.update(&doc!{ "name": "Polly" }, &doc!{ "$inc": { "legs": 1 } }, &SerdeCodec, false, false).await?;
//!     users.remove(&doc!{ "legs": { "$gt": 2 } }, &SerdeCodec, false).await?;
//!
//!     Ok(())
//! }
//! #
//! # fn main() {}
//! ```

#![doc(html_root_url = "https://docs.rs/drupe/0.1.0")]
#![deny(missing_debug_implementations, missing_copy_implementations,
        trivial_casts, trivial_numeric_casts,
        unsafe_code,
        unstable_features,
        unused_import_braces, missing_docs)]
#![allow(clippy::single_match, clippy::match_same_arms, clippy::match_ref_pats,
         clippy::needless_pass_by_value)]
#![deny(clippy::wrong_self_convention, clippy::used_underscore_binding,
        clippy::similar_names,
        clippy::missing_docs_in_private_items,
        clippy::non_ascii_literal, clippy::unicode_not_nfc,
        clippy::unwrap_used, clippy::expect_used,
        clippy::shadow_unrelated,
        clippy::int_plus_one, clippy::string_add_assign, clippy::if_not_else,
        clippy::invalid_upcast_comparisons,
        clippy::cast_precision_loss, clippy::cast_lossless,
        clippy::cast_possible_wrap, clippy::cast_possible_truncation,
        clippy::mutex_integer, clippy::mut_mut, clippy::items_after_statements,
        clippy::print_stdout, clippy::mem_forget, clippy::maybe_infinite_iter)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate bson;
#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod bsn;
pub mod codec;
pub mod wire;
pub mod conn;
pub mod failover;
pub mod config;
pub mod write;
pub mod db;
pub mod coll;
pub mod query;
pub mod cursor;
pub mod bulk;
pub mod meta;
pub mod prelude;
