//! # Delta Application
//!
//! Applies the content of one delta variant to an accumulated buffer.
//!
//! - `.cat` line deltas: every `+line` appends the line, every `-line`
//!   removes the first matching line. A `-line` whose text is absent fails
//!   the whole resolution with [`ResolveError::DeltaTargetMissing`].
//! - `.udiff` patch deltas: handed to a [`PatchApplier`]. The default
//!   [`ExternalPatch`] runs the system `patch` tool on files in a private
//!   temporary directory that is removed on every exit path.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::entry_set::CandidateEntry;
use crate::error::ResolveError;
use crate::specificity::DeltaKind;

/// Applies a unified diff to a buffer
pub trait PatchApplier: Send + Sync {
    /// Apply `diff` to `base`. `delta_path` names the delta file in errors.
    fn apply(&self, base: &[u8], diff: &[u8], delta_path: &Path) -> Result<Vec<u8>, ResolveError>;
}

/// Patch adapter that shells out to an external `patch` program
#[derive(Debug, Clone)]
pub struct ExternalPatch {
    pub program: String,
    pub timeout: Duration,
}

impl Default for ExternalPatch {
    fn default() -> Self {
        Self {
            program: "patch".to_string(),
            timeout: Duration::from_millis(crate::defaults::DEFAULT_PATCH_TIMEOUT_MS),
        }
    }
}

const POLL_STEP: Duration = Duration::from_millis(10);

impl ExternalPatch {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }
}

impl PatchApplier for ExternalPatch {
    fn apply(&self, base: &[u8], diff: &[u8], delta_path: &Path) -> Result<Vec<u8>, ResolveError> {
        let failed = |message: String| ResolveError::DeltaApplyFailed {
            path: delta_path.to_path_buf(),
            message,
        };

        // Dropping the TempDir removes the base, diff and any .rej file
        let workdir = tempfile::Builder::new()
            .prefix("fleetcfg-patch")
            .tempdir()
            .map_err(|e| failed(format!("cannot create temporary directory: {}", e)))?;
        let target = workdir.path().join("base");
        let diff_file = workdir.path().join("delta.udiff");
        let stderr_file = workdir.path().join("stderr");

        fs::write(&target, base).map_err(|e| failed(e.to_string()))?;
        fs::write(&diff_file, diff).map_err(|e| failed(e.to_string()))?;
        let stderr = File::create(&stderr_file).map_err(|e| failed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(["-u", "-f", "-s", "--no-backup-if-mismatch", "-i"])
            .arg(&diff_file)
            .arg(&target)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| failed(format!("cannot run {}: {}", self.program, e)))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().map_err(|e| failed(e.to_string()))? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(failed(format!(
                        "{} timed out after {} ms",
                        self.program,
                        self.timeout.as_millis()
                    )));
                }
                None => thread::sleep(POLL_STEP),
            }
        };

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_file).unwrap_or_default();
            let stderr = stderr.trim();
            return Err(failed(if stderr.is_empty() {
                format!("{} exited with {}", self.program, status)
            } else {
                stderr.to_string()
            }));
        }

        fs::read(&target).map_err(|e| failed(e.to_string()))
    }
}

/// Apply one `.cat` line delta to `buffer`.
///
/// The buffer is treated as UTF-8 text; its trailing newlines are dropped
/// before splitting and the result ends with a single newline unless it is
/// empty. Lines of the delta that start with neither `+` nor `-` are
/// ignored.
pub fn apply_line_delta(buffer: &[u8], delta: &CandidateEntry) -> Result<Vec<u8>, ResolveError> {
    let text = std::str::from_utf8(buffer).map_err(|e| ResolveError::DeltaApplyFailed {
        path: delta.path.clone(),
        message: format!("buffer is not UTF-8 text: {}", e),
    })?;
    let ops = std::str::from_utf8(&delta.content).map_err(|e| ResolveError::DeltaApplyFailed {
        path: delta.path.clone(),
        message: format!("delta is not UTF-8 text: {}", e),
    })?;

    let trimmed = text.trim_end_matches('\n');
    let mut lines: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('\n').collect()
    };

    for op in ops.lines() {
        if let Some(added) = op.strip_prefix('+') {
            lines.push(added);
        } else if let Some(removed) = op.strip_prefix('-') {
            let position = lines.iter().position(|l| *l == removed).ok_or_else(|| {
                ResolveError::DeltaTargetMissing {
                    path: delta.path.clone(),
                    line: removed.to_string(),
                }
            })?;
            lines.remove(position);
        }
    }

    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out.into_bytes())
}

/// Apply one delta entry to `buffer`, dispatching on its delta kind.
pub fn apply_delta(
    buffer: &[u8],
    delta: &CandidateEntry,
    patcher: &dyn PatchApplier,
) -> Result<Vec<u8>, ResolveError> {
    match delta.specificity.delta {
        Some(DeltaKind::Line) => apply_line_delta(buffer, delta),
        Some(DeltaKind::Patch) => patcher.apply(buffer, &delta.content, &delta.path),
        None => Err(ResolveError::DeltaApplyFailed {
            path: delta.path.clone(),
            message: "entry is not a delta".to_string(),
        }),
    }
}

/// Apply `deltas` in order, each to the output of the previous one.
pub fn apply_chain<'a, I>(
    base: &[u8],
    deltas: I,
    patcher: &dyn PatchApplier,
) -> Result<Vec<u8>, ResolveError>
where
    I: IntoIterator<Item = &'a CandidateEntry>,
{
    let mut buffer = base.to_vec();
    for delta in deltas {
        log::debug!("applying {} from {}", delta.specificity, delta.path.display());
        buffer = apply_delta(&buffer, delta, patcher)?;
    }
    Ok(buffer)
}
