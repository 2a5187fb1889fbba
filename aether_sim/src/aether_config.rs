use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::components::ResourceKind;

pub const BUILTIN_AETHER_CONFIG: &str = include_str!("data/aether_config.json");

pub const AETHER_CONFIG_ENV: &str = "AETHER_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AetherConfig {
    world_id: String,
    rng_seed: u64,
    vitium_kind: String,
    ticks_per_day: u64,
    ledger: LedgerConfig,
    dead_zones: DeadZoneConfig,
    regions: RegionConfig,
    corruption: CorruptionConfig,
    markers: MarkerConfig,
    persistence: PersistenceConfig,
}

impl AetherConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_AETHER_CONFIG)
                .expect("builtin aether config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, AetherConfigError> {
        let config: AetherConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AetherConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| AetherConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        AetherConfig::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), AetherConfigError> {
        let invalid = |message: String| Err(AetherConfigError::Invalid(message));

        if self.vitium_kind.trim().is_empty() {
            return invalid("vitium_kind must not be empty".to_string());
        }
        if self.ticks_per_day == 0 {
            return invalid("ticks_per_day must be positive".to_string());
        }
        if self.ledger.cell_volume <= 0 {
            return invalid("ledger.cell_volume must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.ledger.depletion_ratio) {
            return invalid("ledger.depletion_ratio must lie in [0, 1]".to_string());
        }
        if self.ledger.recovery_rate < 0.0 || !self.ledger.recovery_rate.is_finite() {
            return invalid("ledger.recovery_rate must be a non-negative number".to_string());
        }
        if !(0.0..=1.0).contains(&self.dead_zones.permanent_chance) {
            return invalid("dead_zones.permanent_chance must lie in [0, 1]".to_string());
        }
        if self.dead_zones.recovery_interval_ticks == 0 {
            return invalid("dead_zones.recovery_interval_ticks must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.markers.chance) {
            return invalid("markers.chance must lie in [0, 1]".to_string());
        }
        if self.markers.cell_edge == 0 {
            return invalid("markers.cell_edge must be positive".to_string());
        }
        if self.markers.table.iter().map(|entry| entry.weight).sum::<u32>() == 0 {
            return invalid("markers.table needs at least one weighted entry".to_string());
        }
        if self.regions.max_cells == 0 {
            return invalid("regions.max_cells must be positive".to_string());
        }

        let check = self.corruption.check_interval;
        if check == 0 {
            return invalid("corruption.check_interval must be positive".to_string());
        }
        for (name, interval) in [
            ("aspect_transfer_interval", self.corruption.aspect_transfer_interval),
            (
                "aether_consumption_interval",
                self.corruption.aether_consumption_interval,
            ),
        ] {
            if interval == 0 || interval % check != 0 {
                return invalid(format!(
                    "corruption.{name} ({interval}) must be a positive multiple of check_interval ({check})"
                ));
            }
        }
        for (name, interval) in [
            ("ledger.recovery_sweep_interval", self.ledger.recovery_sweep_interval),
            ("dead_zones.sweep_interval", self.dead_zones.sweep_interval),
        ] {
            if interval == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        Ok(())
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    pub fn vitium_kind(&self) -> ResourceKind {
        ResourceKind::new(&self.vitium_kind)
    }

    pub fn ticks_per_day(&self) -> u64 {
        self.ticks_per_day
    }

    pub fn ledger(&self) -> &LedgerConfig {
        &self.ledger
    }

    pub fn dead_zones(&self) -> &DeadZoneConfig {
        &self.dead_zones
    }

    pub fn regions(&self) -> &RegionConfig {
        &self.regions
    }

    pub fn corruption(&self) -> &CorruptionConfig {
        &self.corruption
    }

    pub fn markers(&self) -> &MarkerConfig {
        &self.markers
    }

    pub fn persistence(&self) -> &PersistenceConfig {
        &self.persistence
    }
}

impl Default for AetherConfig {
    fn default() -> Self {
        Self {
            world_id: "overworld".to_string(),
            rng_seed: 0,
            vitium_kind: "vitium".to_string(),
            ticks_per_day: 24_000,
            ledger: LedgerConfig::default(),
            dead_zones: DeadZoneConfig::default(),
            regions: RegionConfig::default(),
            corruption: CorruptionConfig::default(),
            markers: MarkerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AetherConfigError {
    #[error("failed to parse aether config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read aether config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid aether config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    cell_volume: i64,
    recovery_rate: f64,
    recovery_sweep_interval: u64,
    expenditure_window_ticks: u64,
    permanent_expenditure_threshold: f64,
    depletion_ratio: f64,
}

impl LedgerConfig {
    /// Units of capacity granted per unit of base density.
    pub fn cell_volume(&self) -> i64 {
        self.cell_volume
    }

    /// Units restored per kind for every whole in-world day elapsed.
    pub fn recovery_rate(&self) -> f64 {
        self.recovery_rate
    }

    pub fn recovery_sweep_interval(&self) -> u64 {
        self.recovery_sweep_interval
    }

    pub fn expenditure_window_ticks(&self) -> u64 {
        self.expenditure_window_ticks
    }

    pub fn permanent_expenditure_threshold(&self) -> f64 {
        self.permanent_expenditure_threshold
    }

    pub fn depletion_ratio(&self) -> f64 {
        self.depletion_ratio
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cell_volume: 16 * 16 * 256,
            recovery_rate: 1.0,
            recovery_sweep_interval: 100,
            expenditure_window_ticks: 72_000,
            permanent_expenditure_threshold: 10_000.0,
            depletion_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadZoneConfig {
    permanent_chance: f64,
    temporary_drain: f64,
    recovery_interval_ticks: u64,
    sweep_interval: u64,
}

impl DeadZoneConfig {
    pub fn permanent_chance(&self) -> f64 {
        self.permanent_chance
    }

    pub fn temporary_drain(&self) -> f64 {
        self.temporary_drain
    }

    pub fn recovery_interval_ticks(&self) -> u64 {
        self.recovery_interval_ticks
    }

    pub fn sweep_interval(&self) -> u64 {
        self.sweep_interval
    }
}

impl Default for DeadZoneConfig {
    fn default() -> Self {
        Self {
            permanent_chance: 0.1,
            temporary_drain: 3.0,
            recovery_interval_ticks: 24_000,
            sweep_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    max_radius: u32,
    max_cells: usize,
}

impl RegionConfig {
    pub fn max_radius(&self) -> u32 {
        self.max_radius
    }

    pub fn max_cells(&self) -> usize {
        self.max_cells
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            max_radius: 8,
            max_cells: 1024,
        }
    }
}

/// When a corrupted region starts feeding on its cells' aether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AetherDrainPolicy {
    #[default]
    OnlyVitiumRemains,
    OnCorrupted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorruptionConfig {
    check_interval: u64,
    aspect_transfer_interval: u64,
    aether_consumption_interval: u64,
    max_regions_per_window: usize,
    aether_drain_policy: AetherDrainPolicy,
}

impl CorruptionConfig {
    pub fn check_interval(&self) -> u64 {
        self.check_interval
    }

    pub fn aspect_transfer_interval(&self) -> u64 {
        self.aspect_transfer_interval
    }

    pub fn aether_consumption_interval(&self) -> u64 {
        self.aether_consumption_interval
    }

    pub fn max_regions_per_window(&self) -> usize {
        self.max_regions_per_window
    }

    pub fn aether_drain_policy(&self) -> AetherDrainPolicy {
        self.aether_drain_policy
    }
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            check_interval: 200,
            aspect_transfer_interval: 400,
            aether_consumption_interval: 1200,
            max_regions_per_window: 256,
            aether_drain_policy: AetherDrainPolicy::OnlyVitiumRemains,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarkerWeight {
    pub id: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    chance: f64,
    attempts: u32,
    max_per_cell: u32,
    cell_edge: u32,
    table: Vec<MarkerWeight>,
}

impl MarkerConfig {
    pub fn chance(&self) -> f64 {
        self.chance
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_per_cell(&self) -> u32 {
        self.max_per_cell
    }

    pub fn cell_edge(&self) -> u32 {
        self.cell_edge
    }

    pub fn table(&self) -> &[MarkerWeight] {
        &self.table
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        let weighted = |id: &str, weight| MarkerWeight {
            id: id.to_string(),
            weight,
        };
        Self {
            chance: 0.2,
            attempts: 3,
            max_per_cell: 64,
            cell_edge: 16,
            table: vec![
                weighted("decay_growth", 50),
                weighted("decay_vein", 20),
                weighted("decay_sensor", 15),
                weighted("decay_catalyst", 10),
                weighted("decay_shrieker", 5),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    autosave_interval: u64,
}

impl PersistenceConfig {
    /// Zero disables periodic saving; hosts then call `save_now` themselves.
    pub fn autosave_interval(&self) -> u64 {
        self.autosave_interval
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            autosave_interval: 6_000,
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct AetherConfigHandle(pub Arc<AetherConfig>);

impl AetherConfigHandle {
    pub fn new(config: Arc<AetherConfig>) -> Self {
        Self(config)
    }

    pub fn config(&self) -> &AetherConfig {
        &self.0
    }

    pub fn get(&self) -> Arc<AetherConfig> {
        Arc::clone(&self.0)
    }

    pub fn replace_from_json(&mut self, json: &str) -> Result<Arc<AetherConfig>, AetherConfigError> {
        let parsed = AetherConfig::from_json_str(json)?;
        let shared = Arc::new(parsed);
        self.0 = Arc::clone(&shared);
        Ok(shared)
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct AetherConfigMetadata {
    path: Option<PathBuf>,
}

impl AetherConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_aether_config_from_env() -> (Arc<AetherConfig>, AetherConfigMetadata) {
    let Some(path) = env::var(AETHER_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "aether::config", "aether_config.loaded=builtin");
        return (AetherConfig::builtin(), AetherConfigMetadata::new(None));
    };

    match AetherConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "aether::config",
                path = %path.display(),
                "aether_config.loaded=file"
            );
            (Arc::new(config), AetherConfigMetadata::new(Some(path)))
        }
        Err(err) => {
            tracing::warn!(
                target: "aether::config",
                path = %path.display(),
                error = %err,
                "aether_config.load_failed"
            );
            tracing::info!(target: "aether::config", "aether_config.loaded=builtin");
            (AetherConfig::builtin(), AetherConfigMetadata::new(None))
        }
    }
}
