//! Administrative commands on a single collection.

use bson::Document;
use crate::{
    coll::Collection,
    codec::{ Reader, SerdeCodec },
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// Statistics of a collection, as reported by `collStats`.
/// Sizes are in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollStats {
    /// `<database>.<collection>`.
    pub ns: String,
    /// Number of documents.
    pub count: i64,
    /// Total size of the documents.
    pub size: f64,
    /// Average document size.
    #[serde(default)]
    pub avg_obj_size: f64,
    /// Storage allocated for the documents.
    pub storage_size: f64,
    /// Number of indexes.
    #[serde(rename = "nindexes")]
    pub num_indexes: i64,
    /// Total size of the indexes.
    pub total_index_size: f64,
    /// Whether the collection is capped.
    #[serde(default)]
    pub capped: bool,
    /// Maximum number of documents of a capped collection.
    #[serde(default)]
    pub max: Option<i64>,
}

/// Thin wrappers around the commands which create, drop, rename or
/// describe a collection. Obtained from `Collection::meta()`.
#[derive(Debug, Clone, Copy)]
pub struct MetaCommands<'a> {
    /// The collection the commands concern.
    collection: &'a Collection,
}

impl<'a> MetaCommands<'a> {
    /// Commands concerning `collection`.
    pub(crate) fn new(collection: &'a Collection) -> Self {
        MetaCommands { collection }
    }

    /// Explicitly creates the collection.
    pub async fn create(&self) -> Result<()> {
        self.run(doc!{ "create": self.collection.name() }).await.map(drop)
    }

    /// Creates the collection as a capped one, limited to `size` bytes and,
    /// optionally, to `max` documents.
    pub async fn create_capped(&self, size: i64, max: Option<i64>) -> Result<()> {
        let mut command = doc!{
            "create": self.collection.name(),
            "capped": true,
            "size": size,
        };

        if let Some(max) = max {
            command.insert("max", max);
        }

        self.run(command).await.map(drop)
    }

    /// Drops the collection along with its indexes.
    pub async fn drop(&self) -> Result<()> {
        self.run(doc!{ "drop": self.collection.name() }).await.map(drop)
    }

    /// Renames the collection within the same database, replacing an
    /// existing collection called `to` if `drop_target` is set.
    /// Returns a handle to the renamed collection.
    ///
    /// An empty `to` is rejected without contacting the server.
    pub async fn rename(&self, to: &str, drop_target: bool) -> Result<Collection> {
        if to.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidName,
                format!("can't rename {} to an empty name", self.collection.full_name()),
            ));
        }

        let target = self.collection.sister(to);
        let command = doc!{
            "renameCollection": self.collection.full_name(),
            "to": target.full_name(),
            "dropTarget": drop_target,
        };

        self.collection.db().admin_command(command).await?;

        Ok(target)
    }

    /// Retrieves storage statistics.
    pub async fn stats(&self) -> Result<CollStats> {
        let reply = self.run(doc!{ "collStats": self.collection.name() }).await?;
        SerdeCodec.read(reply).chain("can't read collection statistics")
    }

    /// Runs `command` in the collection's database.
    async fn run(&self, command: Document) -> Result<Document> {
        self.collection.db().command(command).await
    }
}
