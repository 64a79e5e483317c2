//! # Swap storage
//!
//! Pluggable persistence for swap data. Every backend exposes the same
//! single-collection API keyed by swap id, so the rest of the engine is
//! oblivious to where swaps actually live.
//!
//! ## Available implementations
//!
//! - [`InMemorySwapRepository`] - default in-memory implementation for
//!   development and testing
//! - [`SqliteSwapRepository`] - SQLite-based persistent implementation
//!   (behind the `sqlite` feature)

use crate::error::Error;
use crate::swap::Swap;
use crate::swap::SwapFilter;
use async_trait::async_trait;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemorySwapRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSwapRepository;

/// Trait for storing and retrieving swap data.
#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// Upsert a swap, last writer wins. Must be atomic per swap.
    async fn save(&self, swap: &Swap) -> Result<(), Error>;

    /// Remove a swap. Idempotent; removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), Error>;

    /// Fetch all swaps matching `filter`.
    ///
    /// Value sets within a filter field are disjunctive, fields are
    /// conjunctive. A filter with an explicitly empty value set returns the
    /// empty result without hitting storage.
    async fn get_all(&self, filter: &SwapFilter) -> Result<Vec<Swap>, Error>;

    /// Remove every swap.
    async fn clear(&self) -> Result<(), Error>;

    /// Fetch a single swap by id.
    async fn get(&self, id: &str) -> Result<Option<Swap>, Error> {
        let swaps = self.get_all(&SwapFilter::by_id(id)).await?;

        Ok(swaps.into_iter().next())
    }
}
