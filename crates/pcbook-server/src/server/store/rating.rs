use super::RatingStore;
use parking_lot::Mutex;
use pcbook_core::{Error, Result};
use std::collections::HashMap;

/// Running count and sum of every score accepted for one laptop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rating {
    pub count: u32,
    pub sum: f64,
}

impl Rating {
    /// Mean of all accepted scores, `0.0` before the first one.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

/// An in-memory [`RatingStore`].
///
/// A single mutex guards every aggregate; each add is a short
/// read-modify-write, so no update can be lost.
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    ratings: Mutex<HashMap<String, Rating>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, laptop_id: &str) -> Option<Rating> {
        self.ratings.lock().get(laptop_id).copied()
    }
}

impl RatingStore for InMemoryRatingStore {
    fn add(&self, laptop_id: &str, score: f64) -> Result<Rating> {
        let mut ratings = self.ratings.lock();
        let rating = ratings.entry(laptop_id.to_string()).or_default();
        let Some(count) = rating.count.checked_add(1) else {
            return Err(Error::internal(format!(
                "Rating count for laptop {laptop_id} is exhausted"
            )));
        };
        rating.count = count;
        rating.sum += score;
        Ok(*rating)
    }
}
