//! Represents a database on the server.

use std::fmt;
use std::sync::Arc;
use bytes::Bytes;
use bson::{ Bson, Document };
use tracing::debug;
use crate::{
    coll::Collection,
    conn::Connection,
    config::Config,
    codec::{ self, BsonModel, DocumentModel, SerdeCodec },
    failover::{ self, FailoverStrategy },
    wire::{ Op, QueryFlags, Request },
    bsn::{ BsonExt, server_error_message },
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// A named database, bound to a shared connection.
///
/// Cloning is cheap: all clones share the same connection,
/// document model and configuration.
#[derive(Clone)]
pub struct Database {
    /// The shared state.
    inner: Arc<Inner>,
}

/// The state shared between clones of a `Database`.
struct Inner {
    /// The name of the database.
    name: String,
    /// The transport.
    connection: Arc<dyn Connection>,
    /// The structure-level codec.
    model: Arc<dyn DocumentModel>,
    /// Defaults inherited by collections.
    config: Config,
}

impl Database {
    /// Binds the database called `name` to `connection`, with the BSON
    /// document model and the default configuration.
    pub fn new<S: Into<String>>(name: S, connection: Arc<dyn Connection>) -> Self {
        Database {
            inner: Arc::new(Inner {
                name: name.into(),
                connection,
                model: Arc::new(BsonModel),
                config: Config::default(),
            }),
        }
    }

    /// Returns a copy of this handle using a different document model.
    pub fn with_model(&self, model: Arc<dyn DocumentModel>) -> Self {
        self.rebuild(|inner| inner.model = model)
    }

    /// Returns a copy of this handle using a different configuration.
    /// Collections obtained from it afterwards inherit the new defaults.
    pub fn with_config(&self, config: Config) -> Self {
        self.rebuild(|inner| inner.config = config)
    }

    /// Helper for the `with_*` methods.
    fn rebuild<F: FnOnce(&mut Inner)>(&self, change: F) -> Self {
        let mut inner = Inner {
            name: self.inner.name.clone(),
            connection: Arc::clone(&self.inner.connection),
            model: Arc::clone(&self.inner.model),
            config: self.inner.config.clone(),
        };
        change(&mut inner);
        Database { inner: Arc::new(inner) }
    }

    /// The name of the database.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The transport shared by every collection of this database.
    pub fn connection(&self) -> &dyn Connection {
        &*self.inner.connection
    }

    /// The structure-level codec.
    pub fn model(&self) -> &dyn DocumentModel {
        &*self.inner.model
    }

    /// The defaults inherited by collections.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns a handle to the collection called `name`.
    ///
    /// # Panics
    ///
    /// If `name` is empty.
    pub fn collection<S: Into<String>>(&self, name: S) -> Collection {
        Collection::new(self.clone(), name.into())
    }

    /// Runs a command against this database.
    pub async fn command(&self, command: Document) -> Result<Document> {
        self.command_on(self.name(), command).await
    }

    /// Runs a command against the `admin` database.
    pub async fn admin_command(&self, command: Document) -> Result<Document> {
        self.command_on("admin", command).await
    }

    /// Runs `command` against the `$cmd` pseudo-collection of `db_name`,
    /// and fails with `CommandFailure` unless the reply says `ok`.
    async fn command_on(&self, db_name: &str, command: Document) -> Result<Document> {
        let strategy: FailoverStrategy = self.config().failover;
        let payload: Bytes = codec::encode(&command, &SerdeCodec, self.model())?;
        let op = Op::Query {
            flags: QueryFlags::empty(),
            full_collection_name: format!("{}.$cmd", db_name),
            number_to_skip: 0,
            number_to_return: -1,
        };
        let message = || format!("error running command {} on {}", command, db_name);

        debug!(db = db_name, %command, "running command");

        let reply = failover::submit(self.connection(), &Request::new(op, payload), &strategy)
            .await
            .and_then(|response| response.into_first_document(self.model()))
            .chain(&message)?;

        match reply.get("ok").and_then(Bson::try_as_bool) {
            Some(true) => Ok(reply),
            _ => {
                let reason = server_error_message(&reply, "errmsg")
                    .unwrap_or_else(|| reply.to_string());
                Err(Error::new(ErrorKind::CommandFailure, format!("{}: {}", message(), reason)))
            }
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("connection", &self.inner.connection)
            .field("model", &self.inner.model)
            .finish()
    }
}
