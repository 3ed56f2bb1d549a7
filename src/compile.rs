//! Instrumented-compile support: the flags handed to the external compiler
//! plugin and the post-compile reconciliation of instrumented output against
//! the original compile output.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::CoverageSettings;
use crate::error::Result;

/// Build the instrumentation flags for the compiler plugin. String-valued
/// and order-independent beyond last-wins on conflicting keys.
pub fn instrumentation_args(settings: &CoverageSettings) -> Vec<String> {
    let mut args = Vec::new();
    args.push(format!(
        "-P:scoverage:dataDir:{}",
        settings.data_dir.display()
    ));
    if !settings.excluded_packages.is_empty() {
        args.push(format!(
            "-P:scoverage:excludedPackages:{}",
            settings.excluded_packages.join(";")
        ));
    }
    if !settings.excluded_files.is_empty() {
        args.push(format!(
            "-P:scoverage:excludedFiles:{}",
            settings.excluded_files.join(";")
        ));
    }
    if settings.highlighting {
        args.push("-Yrangepos".to_string());
    }
    args
}

/// The plugin-activation flag. The plugin artifact path is resolved lazily,
/// at execution time, so that resolving the dependency configuration does
/// not happen while the build is still being configured.
pub fn plugin_arg(resolve_plugin: impl FnOnce() -> Result<PathBuf>) -> Result<String> {
    let path = resolve_plugin()?;
    Ok(format!("-Xplugin:{}", path.display()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            // Store paths relative to the tree root for pairwise comparison.
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Post-compile cleanup, default mode: delete from the instrumented output
/// tree every file that is byte-identical to its counterpart in the original
/// output tree. Such files were not actually instrumented, and retaining the
/// copy could mask staleness.
///
/// Returns the relative paths of the deleted files.
pub fn reconcile_outputs(original_dir: &Path, instrumented_dir: &Path) -> Result<Vec<PathBuf>> {
    info!(
        original = %original_dir.display(),
        instrumented = %instrumented_dir.display(),
        "deleting instrumented classes identical to the original compilation"
    );

    if !instrumented_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut instrumented_files = Vec::new();
    collect_files(instrumented_dir, instrumented_dir, &mut instrumented_files)?;
    instrumented_files.sort();

    let mut deleted = Vec::new();
    for rel in instrumented_files {
        let original = original_dir.join(&rel);
        if !original.is_file() {
            continue;
        }
        let instrumented = instrumented_dir.join(&rel);
        if std::fs::read(&original)? == std::fs::read(&instrumented)? {
            debug!(file = %rel.display(), "identical to original, deleting");
            std::fs::remove_file(&instrumented)?;
            deleted.push(rel);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_instrumentation_args_defaults() {
        let settings = CoverageSettings::default();
        let args = instrumentation_args(&settings);
        assert_eq!(args[0], "-P:scoverage:dataDir:build/scoverage");
        assert!(args.contains(&"-Yrangepos".to_string()));
        assert!(!args.iter().any(|a| a.contains("excludedPackages")));
    }

    #[test]
    fn test_instrumentation_args_exclusions_joined() {
        let settings = CoverageSettings {
            excluded_packages: vec!["com\\.gen\\..*".to_string(), "macros\\..*".to_string()],
            excluded_files: vec![".*Generated.*".to_string()],
            highlighting: false,
            ..Default::default()
        };
        let args = instrumentation_args(&settings);
        assert!(args.contains(&"-P:scoverage:excludedPackages:com\\.gen\\..*;macros\\..*".to_string()));
        assert!(args.contains(&"-P:scoverage:excludedFiles:.*Generated.*".to_string()));
        assert!(!args.contains(&"-Yrangepos".to_string()));
    }

    #[test]
    fn test_plugin_arg_resolved_lazily() {
        let arg = plugin_arg(|| Ok(PathBuf::from("libs/scalac-scoverage-plugin.jar"))).unwrap();
        assert_eq!(arg, "-Xplugin:libs/scalac-scoverage-plugin.jar");
    }

    #[test]
    fn test_reconcile_deletes_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("classes");
        let instrumented = dir.path().join("scoverage-classes");
        fs::create_dir_all(original.join("pkg")).unwrap();
        fs::create_dir_all(instrumented.join("pkg")).unwrap();

        // Identical in both trees → deleted from instrumented output.
        fs::write(original.join("pkg/Same.class"), b"bytes").unwrap();
        fs::write(instrumented.join("pkg/Same.class"), b"bytes").unwrap();
        // Differing content → instrumented copy kept.
        fs::write(original.join("pkg/Probed.class"), b"plain").unwrap();
        fs::write(instrumented.join("pkg/Probed.class"), b"probed").unwrap();
        // Only in instrumented output → kept.
        fs::write(instrumented.join("pkg/Extra.class"), b"x").unwrap();

        let deleted = reconcile_outputs(&original, &instrumented).unwrap();
        assert_eq!(deleted, vec![PathBuf::from("pkg/Same.class")]);
        assert!(!instrumented.join("pkg/Same.class").exists());
        assert!(instrumented.join("pkg/Probed.class").exists());
        assert!(instrumented.join("pkg/Extra.class").exists());
    }

    #[test]
    fn test_reconcile_missing_instrumented_dir() {
        let dir = tempfile::tempdir().unwrap();
        let deleted =
            reconcile_outputs(&dir.path().join("orig"), &dir.path().join("missing")).unwrap();
        assert!(deleted.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("classes");
        let instrumented = dir.path().join("scoverage-classes");
        fs::create_dir_all(&original).unwrap();
        fs::create_dir_all(&instrumented).unwrap();
        fs::write(original.join("A.class"), b"a").unwrap();
        fs::write(instrumented.join("A.class"), b"a").unwrap();

        assert_eq!(reconcile_outputs(&original, &instrumented).unwrap().len(), 1);
        assert!(reconcile_outputs(&original, &instrumented).unwrap().is_empty());
    }
}
