//! Template-driven filesystem discovery.
use crate::config::{Filters, DATA_DIR_FIELD};
use crate::error::QcError;
use crate::template::{Template, Variables};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Wildcard used for fields without a filter.
pub const WILDCARD: &str = "*";

/// Wildcards never match a leading `.`; hidden files are not artifacts.
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Reject filters on fields the template does not bind.
pub fn validate_filters(template: &Template, filters: &Filters) -> Result<()> {
    for (field, values) in filters {
        if field == DATA_DIR_FIELD || !template.references(field) {
            return Err(QcError::Filter {
                field: field.clone(),
                template: template.as_str().to_string(),
            }
            .into());
        }
        if values.is_empty() {
            return Err(anyhow!("filter '{field}' has no values"));
        }
    }
    Ok(())
}

/// Glob every filter combination of `template` under `base_dir`.
///
/// Combinations are enumerated by field name, then by each field's value
/// order; the returned paths are de-duplicated and sorted.
pub fn discover(template: &Template, base_dir: &Path, filters: &Filters) -> Result<Vec<PathBuf>> {
    validate_filters(template, filters)?;
    let root = base_dir
        .to_str()
        .ok_or_else(|| anyhow!("base directory {} is not valid UTF-8", base_dir.display()))?;
    let escaped_root = glob::Pattern::escape(root);

    let mut found = BTreeSet::new();
    for combo in combinations(template, filters) {
        let pattern = template.expand_with(|field| {
            if field == DATA_DIR_FIELD {
                Some(escaped_root.as_str())
            } else {
                combo.get(field).map(String::as_str)
            }
        })?;
        tracing::debug!(%pattern, "glob");
        let entries = glob::glob_with(&pattern, MATCH_OPTIONS)
            .with_context(|| format!("invalid glob pattern {pattern}"))?;
        for entry in entries {
            let path = entry.with_context(|| format!("read glob match for {pattern}"))?;
            found.insert(path);
        }
    }
    Ok(found.into_iter().collect())
}

/// Cartesian product of per-field value sets; unfiltered fields get the
/// wildcard.
fn combinations(template: &Template, filters: &Filters) -> Vec<Variables> {
    let wildcard = vec![WILDCARD.to_string()];
    let mut combos = vec![Variables::new()];
    for field in template.fields() {
        if field == DATA_DIR_FIELD {
            continue;
        }
        let values = filters.get(field).unwrap_or(&wildcard);
        combos = combos
            .into_iter()
            .flat_map(move |combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(field.to_string(), value.clone());
                    next
                })
            })
            .collect();
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn primary() -> Template {
        Template::parse("{data_dir}/{subj}_{sess}_T1w.nii.gz").unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"img").unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    fn filters(pairs: &[(&str, &[&str])]) -> Filters {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn wildcard_discovery_and_filtered_discovery() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "A_1_T1w.nii.gz");
        touch(dir.path(), "B_1_T1w.nii.gz");
        touch(dir.path(), "notes.txt");

        let all = discover(&primary(), dir.path(), &Filters::new()).unwrap();
        assert_eq!(names(&all), vec!["A_1_T1w.nii.gz", "B_1_T1w.nii.gz"]);

        let only_a = discover(&primary(), dir.path(), &filters(&[("subj", &["A"])])).unwrap();
        assert_eq!(names(&only_a), vec!["A_1_T1w.nii.gz"]);
    }

    #[test]
    fn overlapping_filter_values_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "A_1_T1w.nii.gz");
        touch(dir.path(), "A_2_T1w.nii.gz");

        let found = discover(
            &primary(),
            dir.path(),
            &filters(&[("subj", &["A", "*"]), ("sess", &["1", "?"])]),
        )
        .unwrap();
        assert_eq!(names(&found), vec!["A_1_T1w.nii.gz", "A_2_T1w.nii.gz"]);
        let again = discover(
            &primary(),
            dir.path(),
            &filters(&[("subj", &["A", "*"]), ("sess", &["1", "?"])]),
        )
        .unwrap();
        assert_eq!(found, again);
    }

    #[test]
    fn unknown_filter_field_is_rejected_before_globbing() {
        let dir = TempDir::new().unwrap();
        for bad in ["run", DATA_DIR_FIELD] {
            let err = discover(&primary(), dir.path(), &filters(&[(bad, &["x"])])).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<QcError>(),
                Some(QcError::Filter { field, .. }) if field == bad
            ));
        }
    }

    #[test]
    fn combinations_follow_field_then_value_order() {
        let combos = combinations(
            &primary(),
            &filters(&[("subj", &["B", "A"]), ("sess", &["2", "1"])]),
        );
        let flat: Vec<String> = combos
            .iter()
            .map(|c| format!("{}{}", c["sess"], c["subj"]))
            .collect();
        assert_eq!(flat, vec!["2B", "2A", "1B", "1A"]);
    }

    #[test]
    fn hidden_files_are_not_discovered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "A_1_T1w.nii.gz");
        touch(dir.path(), ".A_2_T1w.nii.gz");
        let found = discover(&primary(), dir.path(), &Filters::new()).unwrap();
        assert_eq!(names(&found), vec!["A_1_T1w.nii.gz"]);
    }

    #[test]
    fn glob_metacharacters_in_base_dir_are_escaped() {
        let parent = TempDir::new().unwrap();
        let base = parent.path().join("study[1]");
        fs::create_dir_all(&base).unwrap();
        touch(&base, "A_1_T1w.nii.gz");
        let found = discover(&primary(), &base, &Filters::new()).unwrap();
        assert_eq!(names(&found), vec!["A_1_T1w.nii.gz"]);
    }
}
