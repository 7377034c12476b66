//! Persistence for quest-gateway
//!
//! MongoDB in production, `MemoryStore` in dev mode and tests.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection};
pub use mongo_store::MongoStore;
pub use store::{
    CacheStore, CreditRank, IdentityLinks, InsertOutcome, Ledger, LedgerQuery, MissionCatalog,
    Page, Paged, PostLinks, UserDirectory,
};
