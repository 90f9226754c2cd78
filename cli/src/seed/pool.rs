//! Credential pool: discovers credential slots mounted into containers and
//! assigns them to agents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default in-container mount point for the credential pool.
pub const DEFAULT_POOL_MOUNT: &str = "/var/codex-pool";

/// One credential slot: an immediate subdirectory of the pool dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub path: String,
}

/// Sorted immediate subdirectories of `dir`. A missing dir yields an empty
/// list rather than an error — pool mode simply finds no slots.
pub fn discover(dir: &Path) -> Result<Vec<Slot>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading pool dir {}", dir.display())),
    };
    let mut slots = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            slots.push(Slot {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().display().to_string(),
            });
        }
    }
    slots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(slots)
}

// ── Assignment ───────────────────────────────────────────────────────────────

/// Slot assignment strategy for agents 1..n.
#[derive(Debug, Clone)]
pub enum Assigner {
    /// Agent j gets slot (j-1) mod len.
    ByIndex,
    /// Seeded deterministic permutation; same seed, same mapping.
    Shuffle { permutation: Vec<usize> },
}

impl Assigner {
    #[must_use]
    pub fn by_index() -> Self {
        Assigner::ByIndex
    }

    /// Fisher-Yates over slot indices driven by a small LCG, so assignments
    /// are reproducible across invocations with the same seed.
    #[must_use]
    pub fn shuffle(slot_count: usize, seed: u64) -> Self {
        let mut perm: Vec<usize> = (0..slot_count).collect();
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        for i in (1..perm.len()).rev() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            perm.swap(i, j);
        }
        Assigner::Shuffle { permutation: perm }
    }

    /// Slot for the 1-based agent index. Panics on an empty slot list —
    /// callers check for slots before assigning.
    #[must_use]
    pub fn assign<'s>(&self, slots: &'s [Slot], agent_index: usize) -> &'s Slot {
        let idx = agent_index.max(1) - 1;
        match self {
            Assigner::ByIndex => &slots[idx % slots.len()],
            Assigner::Shuffle { permutation } => {
                let pos = permutation[idx % permutation.len()] % slots.len();
                &slots[pos]
            }
        }
    }
}

// ── Env config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredMode {
    Host,
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ByIndex,
    Shuffle,
}

/// Pool behavior read from `DEVKIT_CODEX_*` environment variables. Defaults
/// preserve plain host seeding.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub mode: CredMode,
    pub dir: PathBuf,
    pub strategy: Strategy,
    pub seed: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let mode = match std::env::var("DEVKIT_CODEX_CRED_MODE").as_deref() {
            Ok("pool") => CredMode::Pool,
            _ => CredMode::Host,
        };
        let dir = std::env::var("DEVKIT_CODEX_POOL_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_POOL_MOUNT), PathBuf::from);
        let strategy = match std::env::var("DEVKIT_CODEX_POOL_STRATEGY").as_deref() {
            Ok("shuffle") => Strategy::Shuffle,
            _ => Strategy::ByIndex,
        };
        let seed = std::env::var("DEVKIT_CODEX_POOL_SEED")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Self {
            mode,
            dir,
            strategy,
            seed,
        }
    }

    /// Assigner for the configured strategy over `slot_count` slots.
    #[must_use]
    pub fn assigner(&self, slot_count: usize) -> Assigner {
        match self.strategy {
            Strategy::ByIndex => Assigner::by_index(),
            Strategy::Shuffle => Assigner::shuffle(slot_count, self.seed),
        }
    }
}
