use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::errors::GenerationError;
use crate::generators::{GeneratorConfig, GeneratorContext};
use crate::params::ParamIssue;
use crate::validate::ValidatedProject;

/// One sampling pool: a CSV column, optionally indexed by a match column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PoolKey {
    pub path: PathBuf,
    pub column_index: usize,
    pub match_column_index: Option<usize>,
}

/// Trimmed, non-empty values of one CSV column.
#[derive(Debug, Default)]
pub struct ColumnPool {
    values: Vec<String>,
    by_match: BTreeMap<String, Vec<String>>,
}

impl ColumnPool {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Values whose match cell equals `needle`; `None` when no row matches.
    pub fn matching(&self, needle: &str) -> Option<&[String]> {
        self.by_match.get(needle).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// CSV sample pools shared by all workers.
///
/// `preload` fills the cache before partitions run; afterwards lookups only take
/// the read lock.
#[derive(Debug, Default)]
pub struct CsvCache {
    root: Option<PathBuf>,
    pools: RwLock<BTreeMap<PoolKey, Arc<ColumnPool>>>,
}

impl CsvCache {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Relative paths resolve against the asset root, when one is set.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Load every pool referenced by `project`, reading each file once.
    pub fn preload(&self, project: &ValidatedProject) -> Result<usize, GenerationError> {
        let mut wanted: BTreeMap<PathBuf, Vec<(PoolKey, &str, &str)>> = BTreeMap::new();
        for (table, column, plan) in project.column_plans() {
            if let Some(GeneratorConfig::SampleCsv(config)) = &plan.config {
                let key = config.pool_key();
                wanted
                    .entry(key.path.clone())
                    .or_default()
                    .push((key, table, column));
            }
        }

        let mut loaded = 0;
        for (path, keys) in wanted {
            let resolved = self.resolve(&path);
            let to_error = |table: &str, column: &str, issue: ParamIssue| {
                GenerationError::param(table, column, "sample_csv", issue.issue, issue.hint)
            };
            let rows = match read_rows(&path, &resolved) {
                Ok(rows) => rows,
                Err(issue) => {
                    let (_, table, column) = &keys[0];
                    return Err(to_error(*table, *column, issue));
                }
            };
            for (key, table, column) in keys {
                if self.cached(&key).is_some() {
                    continue;
                }
                let pool = build_pool(&rows, &key).map_err(|issue| to_error(table, column, issue))?;
                self.insert(key, Arc::new(pool))?;
                loaded += 1;
            }
            debug!(path = %resolved.display(), rows = rows.len(), "csv sample loaded");
        }
        Ok(loaded)
    }

    /// The pool for `key`, loading it on first use when it was not preloaded.
    pub fn pool(
        &self,
        key: &PoolKey,
        ctx: &GeneratorContext<'_>,
    ) -> Result<Arc<ColumnPool>, GenerationError> {
        if let Some(pool) = self.cached(key) {
            return Ok(pool);
        }
        let resolved = self.resolve(&key.path);
        let pool = read_rows(&key.path, &resolved)
            .and_then(|rows| build_pool(&rows, key))
            .map_err(|issue| ctx.error("sample_csv", issue.issue, issue.hint))?;
        let pool = Arc::new(pool);
        self.insert(key.clone(), Arc::clone(&pool))?;
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.pools.read().map(|pools| pools.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, key: &PoolKey) -> Option<Arc<ColumnPool>> {
        let pools = self.pools.read().ok()?;
        pools.get(key).cloned()
    }

    fn insert(&self, key: PoolKey, pool: Arc<ColumnPool>) -> Result<(), GenerationError> {
        let mut pools = self.pools.write().map_err(|_| GenerationError::Sink {
            table: "csv samples".to_string(),
            message: "sample cache lock poisoned".to_string(),
        })?;
        pools.entry(key).or_insert(pool);
        Ok(())
    }
}

/// Data rows of a CSV file; the header row is skipped and cells are trimmed.
fn read_rows(path: &Path, resolved: &Path) -> Result<Vec<Vec<String>>, ParamIssue> {
    if !resolved.exists() {
        return Err(ParamIssue::new(
            format!("params.path '{}' does not exist", path.display()),
            "point params.path at an existing CSV file or set the asset root",
        ));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(resolved)
        .map_err(|err| read_issue(path, &err))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| read_issue(path, &err))?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(rows)
}

fn read_issue(path: &Path, err: &csv::Error) -> ParamIssue {
    ParamIssue::new(
        format!("could not read params.path '{}': {err}", path.display()),
        "check that the file is readable CSV",
    )
}

fn build_pool(rows: &[Vec<String>], key: &PoolKey) -> Result<ColumnPool, ParamIssue> {
    let mut pool = ColumnPool::default();
    for row in rows {
        let Some(value) = row.get(key.column_index).filter(|value| !value.is_empty()) else {
            continue;
        };
        pool.values.push(value.clone());
        if let Some(match_idx) = key.match_column_index
            && let Some(needle) = row.get(match_idx).filter(|needle| !needle.is_empty())
        {
            pool.by_match
                .entry(needle.clone())
                .or_default()
                .push(value.clone());
        }
    }
    if pool.values.is_empty() {
        return Err(ParamIssue::new(
            format!(
                "params.path '{}' has no values in column {}",
                key.path.display(),
                key.column_index
            ),
            "point params.column_index at a populated column",
        ));
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_csv(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seedforge_assets_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("cities.csv");
        std::fs::write(&path, contents).expect("write csv");
        path
    }

    #[test]
    fn header_is_skipped_and_blanks_dropped() {
        let path = temp_csv("country,city\nUS, Seattle \nUS,\nFR,Paris\n");
        let rows = read_rows(&path, &path).expect("rows");
        let key = PoolKey {
            path: path.clone(),
            column_index: 1,
            match_column_index: Some(0),
        };
        let pool = build_pool(&rows, &key).expect("pool");
        assert_eq!(pool.values(), ["Seattle".to_string(), "Paris".to_string()]);
        assert_eq!(pool.matching("US"), Some(&["Seattle".to_string()][..]));
        assert_eq!(pool.matching("DE"), None);
    }

    #[test]
    fn missing_file_names_the_param_path() {
        let path = PathBuf::from("no/such/file.csv");
        let issue = read_rows(&path, &path).expect_err("missing");
        assert_eq!(issue.issue, "params.path 'no/such/file.csv' does not exist");
    }

    #[test]
    fn relative_paths_use_the_asset_root() {
        let cache = CsvCache::new(Some(PathBuf::from("/data")));
        assert_eq!(cache.resolve(Path::new("a.csv")), PathBuf::from("/data/a.csv"));
        assert_eq!(cache.resolve(Path::new("/abs/a.csv")), PathBuf::from("/abs/a.csv"));
        assert!(cache.is_empty());
    }
}
