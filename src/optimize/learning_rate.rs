//! Learning rate decayed on plateaus of a minimized metric.

pub use super::*;

use std::ops::Deref;

pub type LearningRateValue = f64;

#[derive(Config, Copy, Debug, PartialEq)]
pub struct LearningRateConfig {
    #[config(default = "0.5")]
    pub factor: f64,

    #[config(default = "1e-2")]
    pub initial: LearningRateValue,

    #[config(default = "1e-5")]
    pub minimum: LearningRateValue,

    /// Number of non-improving updates tolerated before decaying.
    #[config(default = "5")]
    pub patience: u64,

    /// Relative improvement required to reset the patience.
    #[config(default = "1e-4")]
    pub threshold: f64,
}

/// The current learning rate and its plateau state.
#[derive(Clone, Debug, PartialEq)]
pub struct LearningRate {
    pub config: LearningRateConfig,
    pub value: LearningRateValue,
    /// The best metric so far.
    pub metric_best: f64,
    /// Number of updates since the best metric.
    pub plateau_count: u64,
    /// Number of decays applied.
    pub decay_count: u64,
}

impl LearningRateConfig {
    pub fn init(&self) -> LearningRate {
        LearningRate {
            config: *self,
            value: self.initial,
            metric_best: f64::INFINITY,
            plateau_count: 0,
            decay_count: 0,
        }
    }
}

impl LearningRate {
    /// Updating the plateau state with the latest metric.
    ///
    /// The value is multiplied by [`LearningRateConfig::factor`] once the
    /// metric has not improved for more than [`LearningRateConfig::patience`]
    /// updates, and it never goes below [`LearningRateConfig::minimum`].
    pub fn update(
        &mut self,
        metric: f64,
    ) -> &mut Self {
        const EPSILON: f64 = 1e-8;

        if metric < self.metric_best * (1.0 - self.config.threshold) {
            self.metric_best = metric;
            self.plateau_count = 0;
        } else {
            self.plateau_count += 1;
        }

        if self.plateau_count > self.config.patience {
            let value = (self.value * self.config.factor).max(self.config.minimum);
            if self.value - value > EPSILON {
                #[cfg(not(test))]
                log::debug!(
                    target: "body_fit::optimize",
                    "learning rate decay ({} -> {value})",
                    self.value,
                );

                self.value = value;
                self.decay_count += 1;
            }
            self.plateau_count = 0;
        }

        self
    }
}

impl Deref for LearningRate {
    type Target = LearningRateValue;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl Default for LearningRateConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Default for LearningRate {
    #[inline]
    fn default() -> Self {
        LearningRateConfig::default().init()
    }
}
