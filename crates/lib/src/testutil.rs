//! Test helpers shared by the build and execute tests.

use std::path::Path;
use std::sync::Mutex;

use crate::platform::PlatformSpec;
use crate::toolchain::{CompileInvocation, ToolError, Toolchain};

/// A fake compiler that records every invocation and writes a small file at the output path.
#[derive(Debug, Default)]
pub struct RecordingToolchain {
  invocations: Mutex<Vec<CompileInvocation>>,
  fail_on: Option<PlatformSpec>,
  skip_output: bool,
}

impl RecordingToolchain {
  /// A toolchain that fails (exit status 1) when asked to build `spec`.
  pub fn failing_on(spec: &PlatformSpec) -> Self {
    Self {
      fail_on: Some(spec.clone()),
      ..Self::default()
    }
  }

  /// A toolchain that reports success without writing the executable.
  pub fn without_output() -> Self {
    Self {
      skip_output: true,
      ..Self::default()
    }
  }

  pub fn invocations(&self) -> Vec<CompileInvocation> {
    self.invocations.lock().unwrap().clone()
  }

  /// `GOOS/GOARCH` of every invocation, in call order.
  pub fn targets(&self) -> Vec<String> {
    self
      .invocations()
      .iter()
      .map(|inv| format!("{}/{}", inv.envs[0].1, inv.envs[1].1))
      .collect()
  }
}

impl Toolchain for RecordingToolchain {
  async fn compile(&self, invocation: &CompileInvocation) -> Result<String, ToolError> {
    self.invocations.lock().unwrap().push(invocation.clone());

    let target = format!("{}/{}", invocation.envs[0].1, invocation.envs[1].1);
    if self.fail_on.as_ref().is_some_and(|spec| spec.to_string() == target) {
      return Err(ToolError::Failed {
        program: invocation.program.clone(),
        code: Some(1),
        stderr: "boom".to_string(),
      });
    }

    if !self.skip_output {
      tokio::fs::write(&invocation.output, target.as_bytes()).await.unwrap();
    }
    Ok(String::new())
  }
}

/// Sorted names of the entries directly inside `dir`, hidden ones included.
pub fn dir_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}
