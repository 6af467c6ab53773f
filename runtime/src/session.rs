// session.rs — Execution session for probabilistic programs
//
// Carries what `sample` and `observe` need while a program runs: the
// registry, a private random stream, the accumulated observation log weight,
// and captured `print` output. One session per execution; never shared
// between threads.

use std::sync::Arc;

use crate::dist::{Registry, Variate};
use crate::error::Fault;
use crate::rng::RngStream;
use crate::value::Value;

pub struct Session {
    registry: Arc<Registry>,
    rng: RngStream,
    log_weight: f64,
    output: Vec<String>,
    echo: bool,
}

impl Session {
    pub fn new(registry: Arc<Registry>, seed: u64) -> Self {
        Session {
            registry,
            rng: RngStream::derive(seed, "session"),
            log_weight: 0.0,
            output: Vec::new(),
            echo: false,
        }
    }

    /// Also write `print` output to stdout as it happens.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Draw from a registered distribution.
    pub fn sample(&mut self, dist: &str, params: &[Value]) -> Result<Value, Fault> {
        let params = to_variates(params)?;
        let x = self.registry.sample(dist, &params, &mut self.rng)?;
        Ok(Value::from_variate(x))
    }

    /// Condition on an observed value: adds its log density to the weight.
    pub fn observe(&mut self, dist: &str, params: &[Value], value: &Value) -> Result<(), Fault> {
        let params = to_variates(params)?;
        let ld = self
            .registry
            .log_density(dist, &params, &value.to_variate()?)?;
        self.log_weight += ld;
        Ok(())
    }

    pub fn print(&mut self, line: String) {
        if self.echo {
            println!("{line}");
        }
        self.output.push(line);
    }

    pub fn log_weight(&self) -> f64 {
        self.log_weight
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

fn to_variates(params: &[Value]) -> Result<Vec<Variate>, Fault> {
    params.iter().map(Value::to_variate).collect()
}
