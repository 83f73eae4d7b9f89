use std::hash::{Hash, Hasher};

/// FNV-1a over the trigger id, used to give every Monte Carlo partition its
/// own reproducible RNG stream.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Seed for one Monte Carlo partition. Mixing in the driver id keeps runs
/// for different triggers from sharing random streams under the same base
/// seed.
pub fn task_seed(base: u64, driver_id: &str, task_index: u64) -> u64 {
    let mut hasher = FnvHasher::new();
    driver_id.hash(&mut hasher);
    base ^ hasher.finish() ^ task_index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
