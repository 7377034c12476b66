//! MongoDB access
//!
//! `MongoClient` pings on connect so a dead server is noticed at startup.
//! `MongoCollection<T>` creates the indexes `T` declares before first use;
//! the ledger and link collections depend on their unique indexes.

use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::db::store::{InsertOutcome, Page};
use crate::types::QuestError;

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

const FAIL_FAST_OPTIONS: &str = "serverSelectionTimeoutMS=3000&connectTimeoutMS=3000";

/// Index definitions declared by a document type
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

fn driver_error(op: &'static str) -> impl Fn(mongodb::error::Error) -> QuestError {
    move |e| QuestError::InternalServer(format!("MongoDB {} failed: {}", op, e))
}

#[derive(Clone)]
pub struct MongoClient {
    db: Database,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, QuestError> {
        info!("Connecting to MongoDB at {}", uri);

        let separator = if uri.contains('?') { '&' } else { '?' };
        let uri = format!("{}{}{}", uri, separator, FAIL_FAST_OPTIONS);

        let db = Client::with_uri_str(&uri)
            .await
            .map_err(driver_error("connect"))?
            .database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(driver_error("ping"))?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(Self { db })
    }

    /// Typed collection with its indexes in place
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, QuestError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let collection = MongoCollection {
            inner: self.db.collection::<T>(name),
        };
        collection.ensure_indexes(name).await?;
        Ok(collection)
    }
}

#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    async fn ensure_indexes(&self, name: &str) -> Result<(), QuestError> {
        let models: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();
        if models.is_empty() {
            return Ok(());
        }

        let count = models.len();
        self.inner
            .create_indexes(models)
            .await
            .map_err(driver_error("index creation"))?;
        debug!(collection = name, count, "Indexes ensured");
        Ok(())
    }

    pub async fn insert_one(&self, item: T) -> Result<(), QuestError> {
        self.inner
            .insert_one(item)
            .await
            .map_err(driver_error("insert"))?;
        Ok(())
    }

    /// Insert against a unique index; a collision is `Duplicate`, not an error
    pub async fn insert_unique(&self, item: T) -> Result<InsertOutcome, QuestError> {
        match self.inner.insert_one(item).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(driver_error("insert")(e)),
        }
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, QuestError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(driver_error("find"))
    }

    /// First match in `sort` order
    pub async fn find_first(
        &self,
        filter: Document,
        sort: Document,
    ) -> Result<Option<T>, QuestError> {
        self.inner
            .find(filter)
            .sort(sort)
            .limit(1)
            .await
            .map_err(driver_error("find"))?
            .try_next()
            .await
            .map_err(driver_error("cursor"))
    }

    /// All matches. A document that fails to decode fails the read.
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, QuestError> {
        self.inner
            .find(filter)
            .await
            .map_err(driver_error("find"))?
            .try_collect()
            .await
            .map_err(driver_error("cursor"))
    }

    /// One page of matches in `sort` order
    pub async fn find_page(
        &self,
        filter: Document,
        sort: Document,
        page: Page,
    ) -> Result<Vec<T>, QuestError> {
        self.inner
            .find(filter)
            .sort(sort)
            .skip(page.skip())
            .limit(page.size as i64)
            .await
            .map_err(driver_error("find"))?
            .try_collect()
            .await
            .map_err(driver_error("cursor"))
    }

    pub async fn count(&self, filter: Document) -> Result<u64, QuestError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(driver_error("count"))
    }

    /// Raw aggregation output
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, QuestError> {
        self.inner
            .aggregate(pipeline)
            .await
            .map_err(driver_error("aggregate"))?
            .try_collect()
            .await
            .map_err(driver_error("cursor"))
    }

    /// Upsert against a unique index. When `filter` misses a document that
    /// the index still matches, the insert collides and `Duplicate` is
    /// returned.
    pub async fn guarded_upsert(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<InsertOutcome, QuestError> {
        match self.inner.update_one(filter, update).upsert(true).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(driver_error("upsert")(e)),
        }
    }

    /// Sum of an integer `field` over the matches of `filter`
    pub async fn sum_field(&self, filter: Document, field: &str) -> Result<i64, QuestError> {
        let pipeline = vec![
            doc! { "$match": filter },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": format!("${}", field) } } },
        ];

        let groups = self.aggregate(pipeline).await?;
        Ok(groups.first().map(|d| int_field(d, "total")).unwrap_or(0))
    }
}

/// Integer value of `field`, whatever numeric type the server chose
pub fn int_field(doc: &Document, field: &str) -> i64 {
    match doc.get(field) {
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

/// Whether a driver error is a unique index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

