//! Fixed timestep driver for a [`World`].

use rein2d::{StepConf, StepStats, World};

/// Configuration for the fixed timestep loop.
#[derive(Debug, Clone)]
pub struct StepperConfig {
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of steps per frame. Default: 4.
    pub max_substeps: u32,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
        }
    }
}

/// Turns variable frame times into whole fixed steps.
pub struct FixedStepper {
    config: StepperConfig,
    step_conf: StepConf,
    accumulator: f64,
    steps_taken: u64,
}

impl FixedStepper {
    pub fn new(config: StepperConfig, step_conf: StepConf) -> Self {
        let step_conf = StepConf {
            dt: config.fixed_timestep as f32,
            ..step_conf
        };
        Self {
            config,
            step_conf,
            accumulator: 0.0,
            steps_taken: 0,
        }
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Advance by one frame of `delta_time` seconds, returning the stats of
    /// every step taken.
    pub fn advance(&mut self, world: &mut World, delta_time: f64) -> anyhow::Result<Vec<StepStats>> {
        self.accumulator += delta_time;

        let mut stats = Vec::new();
        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps
        {
            stats.push(world.step(&self.step_conf)?);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
            self.steps_taken += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            tracing::warn!(
                dropped = self.accumulator,
                "Frame too long, dropping accumulated time"
            );
            self.accumulator = 0.0;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_steps_only() {
        let mut world = World::default();
        let mut stepper = FixedStepper::new(StepperConfig::default(), StepConf::default());

        let stats = stepper.advance(&mut world, 1.0 / 120.0).unwrap();
        assert!(stats.is_empty(), "Half a step should not run");
        let stats = stepper.advance(&mut world, 1.0 / 120.0 + 1e-9).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stepper.steps_taken(), 1);
    }

    #[test]
    fn test_long_frame_is_clamped() {
        let mut world = World::default();
        let mut stepper = FixedStepper::new(StepperConfig::default(), StepConf::default());

        let stats = stepper.advance(&mut world, 1.0).unwrap();
        assert_eq!(stats.len(), 4, "Steps per frame are capped");
        let stats = stepper.advance(&mut world, 0.0).unwrap();
        assert!(stats.is_empty(), "Leftover time should have been dropped");
    }
}
