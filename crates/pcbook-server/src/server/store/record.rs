use super::RecordStore;
use crate::server::context::CallContext;
use core::future::Future;
use parking_lot::RwLock;
use pcbook_core::{
    Error, Result,
    proto::{Filter, Laptop},
};
use std::collections::HashMap;

/// An in-memory [`RecordStore`].
///
/// All laptops live in a `HashMap` behind a single `RwLock`. Writers take the
/// lock exclusively; searches take it shared, once to list identifiers and
/// then once per laptop to copy it out, so a slow consumer never blocks
/// writers for longer than one copy.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    laptops: RwLock<HashMap<String, Laptop>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.laptops.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.laptops.read().is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save(&self, laptop: &Laptop) -> Result<()> {
        let mut laptops = self.laptops.write();
        if laptops.contains_key(&laptop.id) {
            return Err(Error::AlreadyExists {
                id: laptop.id.clone(),
            });
        }
        laptops.insert(laptop.id.clone(), laptop.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<Laptop>> {
        Ok(self.laptops.read().get(id).cloned())
    }

    async fn search<F, Fut>(&self, ctx: &CallContext, filter: &Filter, mut visit: F) -> Result<()>
    where
        F: FnMut(Laptop) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let ids: Vec<String> = self.laptops.read().keys().cloned().collect();

        for id in ids {
            ctx.check()?;

            let snapshot = self.laptops.read().get(&id).cloned();
            let Some(laptop) = snapshot else {
                continue;
            };

            if filter.matches(&laptop) {
                visit(laptop).await?;
            }
        }

        Ok(())
    }
}
