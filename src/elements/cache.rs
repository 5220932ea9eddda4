use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::{same_element, Cached, Element, Error, Flow, Result, Run, Value};

/// Pass a flow through while persisting it; replay it on later runs.
///
/// Values are written as JSON lines to `<path>.partial`, which is renamed to
/// `<path>` only once the flow is exhausted. A flow dropped half way never
/// produces a cache that looks complete.
///
/// When the cache exists, `run` ignores its input and replays the cache. The
/// cache rewrite in [`crate::rewrite`] goes further and drops every stage in
/// front of a filled cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".partial");
        PathBuf::from(name)
    }

    /// Remove the cache if it exists.
    pub fn drop_cache(&self) -> Result<()> {
        for path in [self.path.clone(), self.partial_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "cache removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Cached for Cache {
    fn cache_exists(&self) -> bool {
        self.path.is_file()
    }

    fn replay(&self) -> Result<Flow> {
        let file = File::open(&self.path)?;
        debug!(path = %self.path.display(), "replaying cache");
        #[cfg(feature = "metrics")]
        crate::metrics::record_cache_replay();
        Ok(Box::new(BufReader::new(file).lines().map(
            |line| -> Result<Value> {
                let line = line?;
                Ok(serde_json::from_str(&line)?)
            },
        )))
    }
}

impl Run for Cache {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        if self.cache_exists() {
            return self.replay();
        }
        let partial = self.partial_path();
        let file = File::create(&partial)?;
        Ok(Box::new(CacheWriter {
            input: flow,
            writer: Some(BufWriter::new(file)),
            partial,
            path: self.path.clone(),
        }))
    }
}

impl Element for Cache {
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn as_cache(&self) -> Option<&dyn Cached> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        same_element(self, other)
    }
}

struct CacheWriter {
    input: Flow,
    /// `None` once the cache is complete or abandoned.
    writer: Option<BufWriter<File>>,
    partial: PathBuf,
    path: PathBuf,
}

impl CacheWriter {
    fn write(&mut self, value: &Value) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, value)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            drop(writer);
            fs::rename(&self.partial, &self.path)?;
            debug!(path = %self.path.display(), "cache complete");
        }
        Ok(())
    }

    fn abandon(&mut self, reason: &Error) {
        if self.writer.take().is_some() {
            warn!(path = %self.partial.display(), error = %reason, "cache left partial");
        }
    }
}

impl Iterator for CacheWriter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.input.next() {
            Some(Ok(value)) => {
                if let Err(e) = self.write(&value) {
                    self.abandon(&e);
                    return Some(Err(e));
                }
                Some(Ok(value))
            }
            Some(Err(e)) => {
                self.abandon(&e);
                Some(Err(e))
            }
            None => match self.complete() {
                Ok(()) => None,
                Err(e) => {
                    self.abandon(&e);
                    Some(Err(e))
                }
            },
        }
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(path = %self.partial.display(), "flow dropped before exhaustion, cache left partial");
        }
    }
}
