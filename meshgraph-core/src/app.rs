//! Application shell.
//!
//! An [`App`] owns a parameter set and a list of producers. A producer is a
//! named output file backed by a graph port; running the app reads each port
//! (lazily computing whatever it needs) and writes the value to
//! `out_dir/<name>`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{GraphError, GraphResult};
use crate::graph::{NodeRef, Port, Topology};
use crate::params::ParameterSet;

/// A value that knows how to serialize itself to an output file.
pub trait Artifact {
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()>;
}

impl Artifact for String {
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.as_bytes())
    }
}

impl Artifact for Vec<u8> {
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self)
    }
}

impl Artifact for serde_json::Value {
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        out.write_all(b"\n")
    }
}

/// Source of one output file.
pub trait Producer: Send + Sync {
    /// The node whose output is written.
    fn node(&self) -> NodeRef;

    /// Force the value and hand it over for writing.
    fn produce(&self) -> GraphResult<Box<dyn Artifact>>;
}

impl<T> Producer for Port<T>
where
    T: Artifact + Send + Sync + 'static,
{
    fn node(&self) -> NodeRef {
        Port::node(self).clone()
    }

    fn produce(&self) -> GraphResult<Box<dyn Artifact>> {
        Ok(Box::new(self.value()?))
    }
}

/// A producer whose node failed to compute.
#[derive(Debug, Clone)]
pub struct ProducerFailure {
    pub producer: String,
    pub error: GraphError,
}

/// Outcome of [`App::run`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Files written, in producer order.
    pub written: Vec<PathBuf>,
    pub failures: Vec<ProducerFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A named set of parameters and producers.
pub struct App {
    name: String,
    version: Option<String>,
    parameters: ParameterSet,
    producers: IndexMap<String, Box<dyn Producer>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            parameters: ParameterSet::new(),
            producers: IndexMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }

    /// Add an output file. `name` is the file name under the output directory.
    pub fn add_producer<P>(
        &mut self,
        name: impl Into<String>,
        producer: P,
    ) -> GraphResult<&mut Self>
    where
        P: Producer + 'static,
    {
        let name = name.into();
        if self.producers.contains_key(&name) {
            return Err(GraphError::DuplicateProducer(name));
        }
        self.producers.insert(name, Box::new(producer));
        Ok(self)
    }

    pub fn producer_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.producers.keys().map(String::as_str)
    }

    /// Snapshot of everything the producers depend on, checked for unset
    /// inputs and cycles.
    pub fn validate(&self) -> GraphResult<Topology> {
        let topology = Topology::from_roots(self.producers.values().map(|p| p.node()));
        topology.validate()?;
        Ok(topology)
    }

    /// Validate, then write every producer to `out_dir`.
    ///
    /// A producer whose node fails to compute is recorded in the report and
    /// the others still run. Graph and I/O errors abort the run.
    pub fn run(&self, out_dir: impl AsRef<Path>) -> GraphResult<RunReport> {
        let out_dir = out_dir.as_ref();
        let topology = self.validate()?;
        info!(
            app = %self.name,
            producers = self.producers.len(),
            nodes = topology.len(),
            out_dir = %out_dir.display(),
            "running"
        );

        fs::create_dir_all(out_dir).map_err(|e| write_error(out_dir, e))?;

        let mut report = RunReport::default();
        for (name, producer) in &self.producers {
            let artifact = match producer.produce() {
                Ok(artifact) => artifact,
                Err(error) if !error.is_fatal() => {
                    warn!(producer = %name, %error, "producer failed");
                    report.failures.push(ProducerFailure {
                        producer: name.clone(),
                        error,
                    });
                    continue;
                }
                Err(error) => return Err(error),
            };

            let path = out_dir.join(name);
            write_artifact(&path, artifact.as_ref())?;
            report.written.push(path);
        }

        info!(
            app = %self.name,
            written = report.written.len(),
            failed = report.failures.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Parameter names, types and current values as JSON.
    pub fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "app": self.name,
            "version": self.version,
            "parameters": self.parameters.schema(),
        })
    }
}

fn write_artifact(path: &Path, artifact: &dyn Artifact) -> GraphResult<()> {
    let file = File::create(path).map_err(|e| write_error(path, e))?;
    let mut writer = BufWriter::new(file);
    artifact
        .write_to(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, error: io::Error) -> GraphError {
    GraphError::Write {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_artifact_is_pretty_with_newline() {
        let mut out = Vec::new();
        json!({ "a": 1 }).write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn duplicate_producer_is_rejected() {
        let mut app = App::new("demo");
        let text = crate::eval::Value::new("hi".to_string());
        app.add_producer("out.txt", text.port()).unwrap();

        let err = app.add_producer("out.txt", text.port()).err();
        assert!(matches!(err, Some(GraphError::DuplicateProducer(ref name)) if name == "out.txt"));
        assert_eq!(app.producer_names().collect::<Vec<_>>(), vec!["out.txt"]);
    }
}
