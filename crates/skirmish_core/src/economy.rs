//! Resource tracking.
//!
//! The scheduler samples metal/energy surplus into small rolling windows on
//! a fixed interval and derives construction urgency from the averages via
//! an inverse-square falloff: urgency climbs steeply as the surplus
//! approaches zero.

use serde::{Deserialize, Serialize};

/// One resource snapshot reported by the host engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Metal income per tick.
    pub metal_income: f32,
    /// Metal spent per tick.
    pub metal_usage: f32,
    /// Energy income per tick.
    pub energy_income: f32,
    /// Energy spent per tick.
    pub energy_usage: f32,
    /// Metal currently stored.
    pub metal_stored: f32,
    /// Metal storage capacity.
    pub metal_storage: f32,
    /// Energy currently stored.
    pub energy_stored: f32,
    /// Energy storage capacity.
    pub energy_storage: f32,
}

/// Fixed-size rolling window of surplus samples.
#[derive(Debug, Clone)]
struct SurplusWindow {
    samples: Vec<f32>,
    cursor: usize,
}

impl SurplusWindow {
    fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len.max(1)],
            cursor: 0,
        }
    }

    fn push(&mut self, value: f32) {
        self.samples[self.cursor] = value.max(0.0);
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    fn average(&self) -> f32 {
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }
}

/// Rolling resource state plus the projected demand of orders in flight.
#[derive(Debug, Clone)]
pub struct EconomyTracker {
    metal: SurplusWindow,
    energy: SurplusWindow,
    latest: ResourceSnapshot,
    metal_energy_ratio: f32,

    /// Energy the orders in flight will produce once finished.
    pub future_available_energy: f32,
    /// Metal the orders in flight will produce once finished.
    pub future_available_metal: f32,
    /// Energy upkeep the orders in flight will add.
    pub future_requested_energy: f32,
    /// Storage capacity the orders in flight will add.
    pub future_stored_metal: f32,
}

impl EconomyTracker {
    /// Create a tracker with the configured window length.
    #[must_use]
    pub fn new(window: usize, metal_energy_ratio: f32) -> Self {
        Self {
            metal: SurplusWindow::new(window),
            energy: SurplusWindow::new(window),
            latest: ResourceSnapshot::default(),
            metal_energy_ratio,
            future_available_energy: 0.0,
            future_available_metal: 0.0,
            future_requested_energy: 0.0,
            future_stored_metal: 0.0,
        }
    }

    /// Record one snapshot. Called on the resource-sampling interval.
    pub fn sample(&mut self, snapshot: ResourceSnapshot) {
        self.metal
            .push(snapshot.metal_income - snapshot.metal_usage);
        self.energy
            .push(snapshot.energy_income - snapshot.energy_usage);
        self.latest = snapshot;

        // prevent projection drift from accumulating rounding errors
        if self.future_available_energy < 0.0 {
            self.future_available_energy = 0.0;
        }
        if self.future_available_metal < 0.0 {
            self.future_available_metal = 0.0;
        }
    }

    /// Rolling average metal surplus.
    #[must_use]
    pub fn average_metal_surplus(&self) -> f32 {
        self.metal.average()
    }

    /// Rolling average energy surplus.
    #[must_use]
    pub fn average_energy_surplus(&self) -> f32 {
        self.energy.average()
    }

    /// Latest raw snapshot.
    #[must_use]
    pub fn latest(&self) -> ResourceSnapshot {
        self.latest
    }

    /// Urgency of new energy production. Inverse-square in the projected
    /// surplus; tiered by how many plants are already running.
    #[must_use]
    pub fn energy_urgency(&self, active_power_plants: u32) -> f32 {
        let surplus =
            (self.average_energy_surplus() + self.future_available_energy * 0.5).max(0.0);

        if active_power_plants > 8 {
            if self.average_energy_surplus() > 1000.0 {
                0.0
            } else {
                8.0 / (surplus / self.metal_energy_ratio + 2.0).powi(2)
            }
        } else if active_power_plants > 0 {
            15.0 / (surplus / self.metal_energy_ratio + 2.0).powi(2)
        } else {
            6.0
        }
    }

    /// Urgency of new metal extraction.
    #[must_use]
    pub fn metal_urgency(&self, active_extractors: u32) -> f32 {
        if active_extractors > 0 {
            20.0 / (self.average_metal_surplus() * self.metal_energy_ratio + 2.0).powi(2)
        } else {
            7.0
        }
    }

    /// Urgency of additional energy storage.
    #[must_use]
    pub fn energy_storage_urgency(&self) -> f32 {
        if self.average_energy_surplus() / self.metal_energy_ratio > 4.0 {
            0.2
        } else {
            0.0
        }
    }

    /// Urgency of additional metal storage.
    #[must_use]
    pub fn metal_storage_urgency(&self) -> f32 {
        let headroom =
            self.latest.metal_storage + self.future_stored_metal - self.latest.metal_stored;
        if self.average_metal_surplus() > 2.0 && headroom < 100.0 {
            0.3
        } else {
            0.0
        }
    }

    /// Whether the economy is starved for energy (used to throttle metal
    /// makers and accelerate plant construction).
    #[must_use]
    pub fn energy_starved(&self) -> bool {
        self.average_energy_surplus() < 1.5 * self.metal_energy_ratio
    }

    /// Whether the economy is starved for metal.
    #[must_use]
    pub fn metal_starved(&self) -> bool {
        self.average_metal_surplus() < 15.0 / self.metal_energy_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> EconomyTracker {
        EconomyTracker::new(8, 25.0)
    }

    fn snapshot(metal: f32, energy: f32) -> ResourceSnapshot {
        ResourceSnapshot {
            metal_income: metal,
            energy_income: energy,
            ..ResourceSnapshot::default()
        }
    }

    #[test]
    fn window_averages_over_eight_samples() {
        let mut t = tracker();
        for _ in 0..4 {
            t.sample(snapshot(8.0, 0.0));
        }
        // half the window filled
        assert!((t.average_metal_surplus() - 4.0).abs() < 1e-6);
        for _ in 0..4 {
            t.sample(snapshot(8.0, 0.0));
        }
        assert!((t.average_metal_surplus() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn negative_surplus_clamps_to_zero() {
        let mut t = tracker();
        t.sample(ResourceSnapshot {
            metal_income: 1.0,
            metal_usage: 10.0,
            ..ResourceSnapshot::default()
        });
        assert_eq!(t.average_metal_surplus(), 0.0);
    }

    #[test]
    fn metal_urgency_rises_as_surplus_falls() {
        let mut rich = tracker();
        for _ in 0..8 {
            rich.sample(snapshot(10.0, 0.0));
        }
        let mut poor = tracker();
        for _ in 0..8 {
            poor.sample(snapshot(0.1, 0.0));
        }
        assert!(poor.metal_urgency(1) > rich.metal_urgency(1));
    }

    #[test]
    fn bootstrap_urgencies_apply_without_production() {
        let t = tracker();
        // no extractor / power plant yet: fixed bootstrap levels
        assert!((t.metal_urgency(0) - 7.0).abs() < 1e-6);
        assert!((t.energy_urgency(0) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn energy_urgency_tiers_by_plant_count() {
        let mut t = tracker();
        for _ in 0..8 {
            t.sample(snapshot(0.0, 50.0));
        }
        let few = t.energy_urgency(1);
        let many = t.energy_urgency(9);
        assert!(few > many);

        for _ in 0..8 {
            t.sample(snapshot(0.0, 2000.0));
        }
        assert_eq!(t.energy_urgency(9), 0.0);
    }

    #[test]
    fn storage_urgency_needs_surplus_and_full_stores() {
        let mut t = tracker();
        for _ in 0..8 {
            t.sample(ResourceSnapshot {
                metal_income: 5.0,
                metal_stored: 950.0,
                metal_storage: 1000.0,
                ..ResourceSnapshot::default()
            });
        }
        assert!(t.metal_storage_urgency() > 0.0);

        t.future_stored_metal = 1000.0;
        assert_eq!(t.metal_storage_urgency(), 0.0);
    }
}
