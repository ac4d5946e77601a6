//! The Drupe prelude provides re-exports of the most commonly used traits
//! and types for convenience, including ones from crate `bson`.

pub use crate::db::Database;
pub use crate::coll::Collection;
pub use crate::query::{ QueryBuilder, QueryOptions };
pub use crate::cursor::Cursor;
pub use crate::conn::Connection;
pub use crate::codec::{ Reader, Writer, DocumentModel, BsonModel, SerdeCodec, JsonCodec };
pub use crate::wire::{ Op, Request, Response, Reply, QueryFlags, ReplyFlags };
pub use crate::write::{ WriteConcern, LastError };
pub use crate::failover::FailoverStrategy;
pub use crate::bulk::BulkLimits;
pub use crate::config::Config;
pub use bson::{ Bson, Document, oid::ObjectId };
