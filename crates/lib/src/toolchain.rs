//! Compiler invocation.
//!
//! A [`CompileInvocation`] captures everything needed to run `go build` for one target.
//! The [`Toolchain`] trait runs it; [`GoToolchain`] is the real subprocess-backed
//! implementation, tests substitute a recording fake.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::platform::{Host, PlatformSpec};

/// Linker flags forcing a fully static executable.
pub const STATIC_LDFLAGS: &str = r#"-linkmode external -extldflags "-static""#;

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} exited with status {}", describe_exit(.code, .stderr))]
  Failed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },
}

fn describe_exit(code: &Option<i32>, stderr: &str) -> String {
  let code = code.map_or_else(|| "unknown (terminated by signal)".to_string(), |c| c.to_string());
  if stderr.is_empty() {
    code
  } else {
    format!("{}: {}", code, stderr)
  }
}

/// Append static-link flags when the target is the host itself.
///
/// Cross-compiled binaries cannot reliably link externally, so any other target keeps the
/// flags unchanged.
pub fn resolve_ldflags(ldflags: &str, spec: &PlatformSpec, host: &Host) -> String {
  if !host.matches(spec) {
    return ldflags.to_string();
  }

  let mut flags = ldflags.to_string();
  if !flags.is_empty() {
    flags.push(' ');
  }
  flags.push_str(STATIC_LDFLAGS);
  flags
}

/// Package path argument for `go build`: `.` for the root, `./<package>` otherwise.
pub fn package_arg(package: &str) -> String {
  if package.is_empty() {
    ".".to_string()
  } else {
    format!("./{}", package)
  }
}

/// A single `go build` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInvocation {
  pub program: String,
  pub args: Vec<String>,
  /// Overrides layered on top of the inherited environment.
  pub envs: Vec<(String, String)>,
  pub cwd: PathBuf,
  pub output: PathBuf,
}

impl CompileInvocation {
  pub fn new(
    program: &str,
    spec: &PlatformSpec,
    ldflags: String,
    output: &Path,
    package: &str,
    cwd: &Path,
  ) -> Self {
    let args = vec![
      "build".to_string(),
      "-buildmode".to_string(),
      "exe".to_string(),
      "-ldflags".to_string(),
      ldflags,
      "-o".to_string(),
      output.display().to_string(),
      package_arg(package),
    ];

    Self {
      program: program.to_string(),
      args,
      envs: vec![
        ("GOOS".to_string(), spec.kernel.clone()),
        ("GOARCH".to_string(), spec.arch.clone()),
      ],
      cwd: cwd.to_path_buf(),
      output: output.to_path_buf(),
    }
  }
}

impl fmt::Display for CompileInvocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (key, value) in &self.envs {
      write!(f, "{}={} ", key, value)?;
    }
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
        write!(f, " {:?}", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

/// Something that can turn a [`CompileInvocation`] into an executable on disk.
pub trait Toolchain: Send + Sync {
  /// Run the invocation to completion, returning its captured stdout.
  fn compile(&self, invocation: &CompileInvocation) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Runs the Go compiler as a subprocess.
#[derive(Debug, Clone, Default)]
pub struct GoToolchain;

impl Toolchain for GoToolchain {
  async fn compile(&self, invocation: &CompileInvocation) -> Result<String, ToolError> {
    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .envs(invocation.envs.iter().map(|(k, v)| (k, v)))
      .current_dir(&invocation.cwd)
      .kill_on_drop(true);

    debug!(program = %invocation.program, cwd = ?invocation.cwd, "spawning compiler");

    let output = command.output().await.map_err(|source| ToolError::Spawn {
      program: invocation.program.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "compiler stdout");
      }
      return Err(ToolError::Failed {
        program: invocation.program.clone(),
        code: output.status.code(),
        stderr,
      });
    }

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "compiler stderr");
    }

    Ok(stdout)
  }
}
