//! Result collector
//!
//! Reads the JUnit-style report the test runtime writes and turns the first
//! recorded failure into [`RunError::TestFailure`]. The report is streamed
//! top to bottom, so "first" means first in document order.

use crate::error::{Result, RunError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of a run whose report recorded no failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub report_path: PathBuf,
    /// Test cases seen in the report
    pub tests: usize,
    /// Test cases marked as skipped
    pub skipped: usize,
}

/// Inspect the report at `report_path`
pub fn collect(report_path: &Path) -> Result<RunResult> {
    if !report_path.is_file() {
        return Err(RunError::ReportMissing(report_path.to_path_buf()));
    }

    let mut scanner = Scanner::new(report_path);
    let mut reader = Reader::from_file(report_path).map_err(|e| scanner.malformed(e))?;
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                let message = format!("at byte {}: {}", reader.buffer_position(), e);
                return Err(scanner.malformed(message));
            }
        };
        match event {
            Event::Start(element) => scanner.open(&element)?,
            Event::Empty(element) => {
                scanner.open(&element)?;
                scanner.close(element.name().as_ref());
            }
            Event::End(element) => scanner.close(element.name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        "{}: {} tests, {} skipped",
        report_path.display(),
        scanner.tests,
        scanner.skipped
    );
    Ok(RunResult {
        report_path: report_path.to_path_buf(),
        tests: scanner.tests,
        skipped: scanner.skipped,
    })
}

struct Scanner<'a> {
    path: &'a Path,
    suites: Vec<String>,
    /// (name, classname) of the enclosing test case
    case: Option<(String, String)>,
    tests: usize,
    skipped: usize,
}

impl<'a> Scanner<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            suites: Vec::new(),
            case: None,
            tests: 0,
            skipped: 0,
        }
    }

    fn malformed(&self, message: impl ToString) -> RunError {
        RunError::MalformedReport {
            path: self.path.to_path_buf(),
            message: message.to_string(),
        }
    }

    fn open(&mut self, element: &BytesStart<'_>) -> Result<()> {
        match element.name().as_ref() {
            b"testsuite" => {
                let name = self.attribute(element, "name")?.unwrap_or_default();
                self.suites.push(name);
            }
            b"testcase" if !self.suites.is_empty() => {
                let name = self.attribute(element, "name")?.unwrap_or_default();
                let classname = self.attribute(element, "classname")?.unwrap_or_default();
                self.tests += 1;
                self.case = Some((name, classname));
            }
            b"skipped" if self.case.is_some() => self.skipped += 1,
            b"failure" => {
                if let Some((case, classname)) = self.case.take() {
                    return Err(RunError::TestFailure {
                        suite: self.suites.last().cloned().unwrap_or_default(),
                        case,
                        classname,
                        message: self.attribute(element, "message")?.unwrap_or_default(),
                        stdout: self.attribute(element, "stdout")?,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"testsuite" => {
                self.suites.pop();
            }
            b"testcase" => self.case = None,
            _ => {}
        }
    }

    fn attribute(&self, element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
        let attr = element
            .try_get_attribute(key)
            .map_err(|e| self.malformed(e))?;
        match attr {
            Some(attr) => {
                let value = attr.unescape_value().map_err(|e| self.malformed(e))?;
                Ok(Some(value.into_owned()))
            }
            None => Ok(None),
        }
    }
}
