//! Control surface backed by an external utility

use std::path::PathBuf;
use std::process::Command;

use super::ControlSurface;
use crate::error::{Error, Result};

/// Runs `<program> <prefix...> <args...>` for every operation
///
/// Runs synchronously on the calling thread.
#[derive(Debug, Clone)]
pub struct ProcessSurface {
    program: PathBuf,
    prefix: Vec<String>,
}

impl ProcessSurface {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    /// Arguments placed before every operation (e.g. `-i wlan0`)
    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.prefix = prefix;
        self
    }
}

impl ControlSurface for ProcessSurface {
    fn run(&self, args: &[String]) -> Result<()> {
        self.output(args).map(|_| ())
    }

    fn output(&self, args: &[String]) -> Result<String> {
        let op = args.join(" ");
        tracing::debug!(
            program = %self.program.display(),
            prefix = ?self.prefix,
            op = %op,
            "Invoking control surface"
        );

        let output = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .output()
            .map_err(|e| Error::control_surface(&op, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::control_surface(
                &op,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::surface::argv;

    #[test]
    fn test_output_and_exit_status() {
        let echo = ProcessSurface::new("echo").with_prefix(argv(&["-n", "current"]));
        assert_eq!(echo.output(&argv(&["channel"])).unwrap(), "current channel");

        let failing = ProcessSurface::new("false");
        let err = failing.run(&argv(&["radio", "on"])).unwrap_err();
        assert!(matches!(err, Error::ControlSurface { ref op, .. } if op == "radio on"));
    }

    #[test]
    fn test_missing_program_is_control_surface_error() {
        let surface = ProcessSurface::new("/nonexistent/wl");
        assert!(matches!(
            surface.run(&argv(&["up"])),
            Err(Error::ControlSurface { .. })
        ));
    }
}
