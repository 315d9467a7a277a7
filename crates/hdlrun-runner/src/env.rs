//! Environment handed to every simulator process

use crate::error::Result;
use hdlrun_backends::{EnvOverrides, RuntimeLayout, SimulationRequest};
use indexmap::IndexMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub const RESULTS_FILE_VAR: &str = "COCOTB_RESULTS_FILE";

/// Variable name to value map passed to child processes.
///
/// Built once per run right before execution. Children get exactly this
/// environment, nothing else is inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    vars: IndexMap<OsString, OsString>,
}

impl ExecutionEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn inherit() -> Self {
        env::vars_os().collect()
    }

    /// Derive the run environment from `inherited`.
    ///
    /// Request values win over inherited ones. Applied in order: extra
    /// variables, `TESTCASE`, `RANDOM_SEED`, the results file, backend
    /// variables, `PATH`, `PYTHONPATH`, `PYTHONHOME`, `TOPLEVEL`, `MODULE`.
    pub fn prepare(
        inherited: ExecutionEnvironment,
        request: &SimulationRequest,
        layout: &RuntimeLayout,
        backend_vars: &EnvOverrides,
        results_file: &Path,
    ) -> Result<Self> {
        let mut env = inherited;

        for (key, value) in request.extra_env() {
            env.set(key, value);
        }
        if let Some(testcase) = request.testcase() {
            env.set("TESTCASE", testcase);
        }
        if let Some(seed) = request.seed() {
            env.set("RANDOM_SEED", seed);
        }
        env.set(RESULTS_FILE_VAR, results_file);
        for (key, value) in backend_vars.iter() {
            env.set(key, value);
        }

        env.append_paths("PATH", [layout.lib_dir().to_path_buf()])?;
        env.append_paths("PYTHONPATH", request.python_search().iter().cloned())?;
        if let Some(home) = &layout.python_home {
            env.set("PYTHONHOME", home);
        }

        env.set("TOPLEVEL", request.toplevel());
        env.set("MODULE", request.module());
        Ok(env)
    }

    pub fn set(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
        self.vars
            .insert(key.as_ref().to_os_string(), value.as_ref().to_os_string());
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    pub fn remove(&mut self, key: impl AsRef<OsStr>) -> Option<OsString> {
        self.vars.shift_remove(key.as_ref())
    }

    /// Search path used for the pre-flight executable check
    pub fn search_path(&self) -> Option<&OsStr> {
        self.get("PATH")
    }

    /// Append directories to a search-path variable, creating it if unset
    pub fn append_paths<I>(&mut self, key: &str, dirs: I) -> Result<()>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut entries: Vec<PathBuf> = match self.get(key) {
            Some(current) if !current.is_empty() => env::split_paths(current).collect(),
            _ => Vec::new(),
        };
        let before = entries.len();
        entries.extend(dirs);
        if entries.len() == before {
            return Ok(());
        }
        let joined = env::join_paths(entries).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot extend {}: {}", key, e),
            )
        })?;
        self.set(key, joined);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ExecutionEnvironment
where
    K: Into<OsString>,
    V: Into<OsString>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
