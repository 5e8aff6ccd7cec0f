//! Simulated sensor source.
//!
//! Emits a uniformly random value in `[min, max]` for each parameter every
//! heartbeat.  Each task owns its RNG, seeded from its config, so two
//! simulated sources never share state and a given seed always produces
//! the same sequence.

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::climate_descriptions;
use crate::params::ParameterDescription;
use crate::task::{PeriodicTask, TaskContext};

pub struct SimulatedSensor {
    descs: Vec<ParameterDescription>,
    rng: StdRng,
}

impl SimulatedSensor {
    /// Simulate whatever `descs` describe.
    pub fn new(descs: Vec<ParameterDescription>, seed: u64) -> Self {
        Self {
            descs,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Temperature plus humidity, the plain `simulated` task kind.
    pub fn climate(seed: u64) -> Self {
        Self::new(climate_descriptions(), seed)
    }
}

impl PeriodicTask for SimulatedSensor {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        self.descs.clone()
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        for d in &self.descs {
            let value = if d.max > d.min { self.rng.gen_range(d.min..=d.max) } else { d.min };
            ctx.emit(&d.name, trigger, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::fixture::context;
    use crate::params::Category;

    #[test]
    fn values_within_range_and_seeded() {
        let mut a = SimulatedSensor::climate(7);
        let mut b = SimulatedSensor::climate(7);
        let fa = context("a", &a, ("x", "x", Category::Unknown));
        let fb = context("b", &b, ("x", "x", Category::Unknown));
        let now = Local::now();
        for _ in 0..50 {
            a.heartbeat(now, &fa.ctx);
            b.heartbeat(now, &fb.ctx);
        }
        let va: Vec<(String, f64)> = fa.rx.try_iter().map(|s| (s.parameter, s.value)).collect();
        let vb: Vec<(String, f64)> = fb.rx.try_iter().map(|s| (s.parameter, s.value)).collect();
        assert_eq!(va.len(), 100);
        assert_eq!(va, vb);
        for (p, v) in &va {
            match p.as_str() {
                "Temp" => assert!((-10.0..=40.0).contains(v)),
                "Humid" => assert!((0.0..=100.0).contains(v)),
                other => panic!("unexpected parameter {other}"),
            }
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = SimulatedSensor::climate(1);
        let mut b = SimulatedSensor::climate(2);
        let fa = context("a", &a, ("x", "x", Category::Unknown));
        let fb = context("b", &b, ("x", "x", Category::Unknown));
        let now = Local::now();
        a.heartbeat(now, &fa.ctx);
        b.heartbeat(now, &fb.ctx);
        assert_ne!(fa.drain()["Temp"], fb.drain()["Temp"]);
    }
}
