//! Execution context for report-writer collaborators.
//!
//! Instead of mutating a process-wide classloader search path, the runtime
//! classpath is an explicit value: constructed once per invocation, extended
//! idempotently, and passed to whatever action needs it. Repeated or
//! concurrent construction is safe because insertion skips entries already
//! present.

use std::path::{Path, PathBuf};

use tracing::debug;

/// An augmented runtime classpath for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    entries: Vec<PathBuf>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries that are not already on the path, preserving order.
    pub fn extend<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            let path = path.into();
            if !self.entries.contains(&path) {
                debug!(entry = %path.display(), "adding runtime classpath entry");
                self.entries.push(path);
            }
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_is_idempotent() {
        let mut ctx = ExecutionContext::new();
        ctx.extend(["a.jar", "b.jar"]);
        ctx.extend(["b.jar", "c.jar", "a.jar"]);
        let entries: Vec<_> = ctx.entries().iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(entries, vec!["a.jar", "b.jar", "c.jar"]);
        assert!(ctx.contains(Path::new("a.jar")));
        assert!(!ctx.contains(Path::new("d.jar")));
    }
}
