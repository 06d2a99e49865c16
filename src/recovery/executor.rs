use crate::config::RecoveryConfig;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Executes a single recovery action against a service
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run `action_type` for `service_name`, returning whether it worked
    async fn execute(&self, action_type: &str, service_name: &str) -> bool;
}

/// Stand-in for real infrastructure calls: waits, then succeeds with a
/// fixed probability
pub struct SimulatedExecutor {
    success_rate: f64,
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn new(success_rate: f64, delay: Duration) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            delay,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        let executor = Self::new(config.success_rate, config.action_delay());
        match config.seed {
            Some(seed) => executor.with_seed(seed),
            None => executor,
        }
    }

    /// Seed the internal RNG for deterministic runs
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    fn roll(&self) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>() < self.success_rate,
            Err(poisoned) => poisoned.into_inner().gen::<f64>() < self.success_rate,
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, action_type: &str, service_name: &str) -> bool {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let success = self.roll();
        if success {
            info!("Successfully executed {} for {}", action_type, service_name);
        } else {
            warn!("Failed to execute {} for {}", action_type, service_name);
        }
        success
    }
}
