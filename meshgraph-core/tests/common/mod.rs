//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use meshgraph_core::dependencies;
use meshgraph_core::graph::{Dependencies, InputSlot, Port};
use meshgraph_core::Compute;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a test subscriber when `RUST_LOG` is set. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    }
}

/// Stand-in for a mesh: just the list of part names.
pub type Mesh = Vec<String>;

/// Repeats its input mesh `times` times and counts its computations.
pub struct Repeat {
    pub mesh: Port<Mesh>,
    pub times: Port<usize>,
    pub runs: Arc<AtomicUsize>,
}

impl Repeat {
    pub fn new(mesh: Port<Mesh>, times: Port<usize>) -> Self {
        Self {
            mesh,
            times,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Compute for Repeat {
    type Output = Mesh;

    fn dependencies(&self) -> Dependencies {
        dependencies!(self => mesh, times)
    }

    fn compute(&self) -> anyhow::Result<Mesh> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mesh = self.mesh.value()?;
        let times = self.times.value()?;
        Ok(std::iter::repeat(mesh).take(times).flatten().collect())
    }
}

/// Adds one to a late-bound input. Two relays bound to each other form a
/// cycle.
pub struct Relay {
    pub input: InputSlot<i64>,
}

impl Relay {
    pub fn unbound() -> Self {
        Self {
            input: InputSlot::required("input"),
        }
    }
}

impl Compute for Relay {
    type Output = i64;

    fn dependencies(&self) -> Dependencies {
        dependencies!(self => input)
    }

    fn compute(&self) -> anyhow::Result<i64> {
        Ok(self.input.value()? + 1)
    }
}
