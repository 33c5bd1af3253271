use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

/// Fixed service identity every report is sent from.
pub const SENDER_ADDRESS: &str = "trendmail-cron@localhost";
pub const SENDER_HEADER: &str = "\"trendmail-cron\" <trendmail-cron@localhost>";

/// Destination list shared by all stock reports.
pub const INFRASTRUCTURE_LIST: &str = "infrastructure-reports@localhost";

/// Days of prior history behind every sparkline window.
pub const HISTORY_WINDOW_DAYS: u32 = 14;

/// Effective CPU weight per serving module, used to turn request latency
/// into instance hours. Multithreaded batch modules count their two
/// processors against eight concurrent threads. An approximation.
#[must_use]
pub fn module_cpu_weights() -> &'static [(&'static str, f64)] {
    &[
        ("default", 4.0),
        ("i18n", 4.0),
        ("frontend-highmem", 4.0),
        ("batch-lowlatency", 2.0),
        ("batch", 2.0 / 8.0),
        ("highmem", 8.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub data_dir: PathBuf,
}

/// Resolves the snapshot data directory: an explicit override (absolute,
/// `~`-prefixed, or relative to `cwd`), else `$HOME/bq_data`.
pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    data_dir_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let data_dir = match data_dir_override {
        Some(path) => {
            let expanded = expand_tilde(path, &home_dir)?;
            if expanded.is_absolute() {
                expanded
            } else {
                cwd.join(expanded)
            }
        }
        None => home_dir.join("bq_data"),
    };

    Ok(RuntimePaths {
        data_dir: normalize_lexical(&data_dir),
    })
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::{module_cpu_weights, resolve_runtime_paths};
    use std::path::Path;

    #[test]
    fn defaults_data_dir_under_home() {
        let paths = resolve_runtime_paths(Path::new("/home/reporter"), Path::new("/work"), None)
            .expect("paths should resolve");
        assert_eq!(paths.data_dir, Path::new("/home/reporter/bq_data"));
    }

    #[test]
    fn expands_tilde_override_against_home_dir() {
        let paths = resolve_runtime_paths(
            Path::new("/home/reporter"),
            Path::new("/work"),
            Some(Path::new("~/warehouse/snapshots")),
        )
        .expect("tilde override should resolve");
        assert_eq!(paths.data_dir, Path::new("/home/reporter/warehouse/snapshots"));
    }

    #[test]
    fn resolves_relative_override_against_cwd() {
        let paths = resolve_runtime_paths(
            Path::new("/home/reporter"),
            Path::new("/work"),
            Some(Path::new("./data/../data/bq")),
        )
        .expect("relative override should resolve");
        assert_eq!(paths.data_dir, Path::new("/work/data/bq"));
    }

    #[test]
    fn rejects_non_absolute_home_dir() {
        let err = resolve_runtime_paths(Path::new("home"), Path::new("/work"), None)
            .expect_err("relative home dir must fail");
        assert!(
            err.to_string().contains("home_dir must be absolute"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_tilde_username_syntax() {
        let err = resolve_runtime_paths(
            Path::new("/home/reporter"),
            Path::new("/work"),
            Some(Path::new("~someone/data")),
        )
        .expect_err("~username syntax must fail");
        assert!(
            err.to_string().contains("unsupported home expansion syntax"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn batch_module_weight_accounts_for_threading() {
        let weights = module_cpu_weights();
        let batch = weights
            .iter()
            .find(|(module, _)| *module == "batch")
            .expect("batch module should be listed");
        assert!((batch.1 - 0.25).abs() < f64::EPSILON);
    }
}
