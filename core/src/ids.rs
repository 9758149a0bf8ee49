//! Id generation for `tx-<8 hex>` tasks and `worker-<8 hex>` workers.
//!
//! Production code uses [`IdGenerator::random`]; tests that need
//! deterministic ids (the deep-cycle scenario creates a hundred of them by
//! hand, for instance) use [`IdGenerator::seeded`].

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

enum Source {
    ThreadRng,
    Seeded(StdRng),
}

/// Generates opaque entity ids. Not `Clone` — the seeded variant owns
/// mutable RNG state that callers should route through a single generator
/// per test rather than fork.
pub struct IdGenerator {
    source: Source,
}

impl IdGenerator {
    pub fn random() -> Self {
        Self { source: Source::ThreadRng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { source: Source::Seeded(StdRng::seed_from_u64(seed)) }
    }

    fn next_hex8(&mut self) -> String {
        let mut bytes = [0u8; 4];
        match &mut self.source {
            Source::ThreadRng => rand::thread_rng().fill_bytes(&mut bytes),
            Source::Seeded(rng) => rng.fill_bytes(&mut bytes),
        }
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn task_id(&mut self) -> String {
        format!("tx-{}", self.next_hex8())
    }

    pub fn worker_id(&mut self) -> String {
        format!("worker-{}", self.next_hex8())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::random()
    }
}

pub fn is_task_id(id: &str) -> bool {
    id.strip_prefix("tx-")
        .map(|rest| rest.len() == 8 && rest.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

pub fn is_worker_id(id: &str) -> bool {
    id.strip_prefix("worker-")
        .map(|rest| rest.len() == 8 && rest.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
