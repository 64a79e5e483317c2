use super::SwapRepository;
use crate::error::Error;
use crate::swap::Swap;
use crate::swap::SwapFilter;
use crate::swap::SwapOrder;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

/// In-memory implementation of [`SwapRepository`].
///
/// Swaps live in a [`HashMap`] behind a [`Mutex`]. Data is lost when the
/// process exits, which makes this suitable for development and testing.
pub struct InMemorySwapRepository {
    swaps: Arc<Mutex<HashMap<String, Swap>>>,
}

impl InMemorySwapRepository {
    pub fn new() -> Self {
        Self {
            swaps: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySwapRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapRepository for InMemorySwapRepository {
    async fn save(&self, swap: &Swap) -> Result<(), Error> {
        let mut swaps = self.swaps.lock().expect("lock");
        swaps.insert(swap.id().to_string(), swap.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let mut swaps = self.swaps.lock().expect("lock");
        swaps.remove(id);
        Ok(())
    }

    async fn get_all(&self, filter: &SwapFilter) -> Result<Vec<Swap>, Error> {
        if filter.is_vacuous() {
            return Ok(Vec::new());
        }

        let swaps = self.swaps.lock().expect("lock");

        let mut matching = swaps
            .values()
            .filter(|swap| filter.matches(swap))
            .cloned()
            .collect::<Vec<_>>();

        match filter.order {
            Some(SwapOrder::CreatedAtAsc) => {
                matching.sort_by_key(|swap| (swap.created_at(), swap.id().to_string()));
            }
            Some(SwapOrder::CreatedAtDesc) => {
                matching.sort_by_key(|swap| (swap.created_at(), swap.id().to_string()));
                matching.reverse();
            }
            None => {}
        }

        Ok(matching)
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut swaps = self.swaps.lock().expect("lock");
        swaps.clear();
        Ok(())
    }
}
