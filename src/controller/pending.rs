/// Pending-operation ledger for optimistic mutations
use std::collections::HashMap;

/// Issued for every optimistic mutation of a wallpaper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToken {
    pub wallpaper_id: String,
    pub generation: u64,
}

/// Generation numbers observed before a reconciliation fetch
#[derive(Debug, Clone, Default)]
pub struct GenerationSnapshot(HashMap<String, u64>);

/// Tracks the newest mutation and the in-flight count per wallpaper
#[derive(Debug, Default)]
pub struct PendingLedger {
    generations: HashMap<String, u64>,
    in_flight: HashMap<String, usize>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new operation on a wallpaper; older tokens become stale
    pub fn issue(&mut self, wallpaper_id: &str) -> PendingToken {
        let generation = self.generations.entry(wallpaper_id.to_string()).or_insert(0);
        *generation += 1;
        *self.in_flight.entry(wallpaper_id.to_string()).or_insert(0) += 1;

        PendingToken {
            wallpaper_id: wallpaper_id.to_string(),
            generation: *generation,
        }
    }

    /// Finish an operation. Returns whether it was still the newest one.
    pub fn settle(&mut self, token: &PendingToken) -> bool {
        if let Some(count) = self.in_flight.get_mut(&token.wallpaper_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(&token.wallpaper_id);
            }
        }

        self.generations.get(&token.wallpaper_id) == Some(&token.generation)
    }

    pub fn in_flight(&self, wallpaper_id: &str) -> usize {
        self.in_flight.get(wallpaper_id).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot(self.generations.clone())
    }

    /// No operation started since the snapshot and none still in flight
    pub fn is_quiet_since(&self, wallpaper_id: &str, snapshot: &GenerationSnapshot) -> bool {
        self.in_flight(wallpaper_id) == 0
            && self.generations.get(wallpaper_id) == snapshot.0.get(wallpaper_id)
    }
}
