use crate::core::asset::{ImageAsset, UsageStatus};
use crate::core::search::{SearchRequest, TextSearcher};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Operation cancelled")]
    Cancelled,
}

pub const DEFAULT_SOURCE_GLOBS: &[&str] = &[
    "*.swift",
    "*.m",
    "*.mm",
    "*.h",
    "*.storyboard",
    "*.xib",
    "*.plist",
];

pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[".git", "Build", "DerivedData", "Pods", "Carthage"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub used: usize,
    pub unused: usize,
}

/// Decides whether each asset is referenced from project sources.
pub struct UsageAnalyzer {
    searcher: Arc<dyn TextSearcher>,
    source_globs: Vec<String>,
    excluded_dirs: Vec<String>,
    cancellation_token: Arc<AtomicBool>,
}

impl UsageAnalyzer {
    pub fn new(searcher: Arc<dyn TextSearcher>) -> Self {
        Self {
            searcher,
            source_globs: DEFAULT_SOURCE_GLOBS.iter().map(|s| s.to_string()).collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_source_globs(mut self, globs: Vec<String>) -> Self {
        self.source_globs = globs;
        self
    }

    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Set `usage_status` on every asset to `Used` or `Unused`.
    ///
    /// An asset is used when its display name appears as a quoted string
    /// literal, or when its alphanumeric-only variant appears as an
    /// identifier in any case. A failed search counts as no matches.
    pub fn analyze(&self, assets: &mut [ImageAsset], project_root: &Path) -> Result<UsageSummary, UsageError> {
        if assets.is_empty() {
            return Ok(UsageSummary::default());
        }

        log::info!("Checking usage of {} assets...", assets.len());

        let names: BTreeSet<String> = assets.iter().map(ImageAsset::display_name).collect();
        let literal_pattern = quoted_alternation(&names);
        log::debug!(
            "Searching for {} asset names in project files (pattern length {})",
            names.len(),
            literal_pattern.len()
        );

        self.check_cancelled()?;
        let literal_matches: HashSet<String> = self
            .run_search(project_root, literal_pattern, false)
            .into_iter()
            .collect();

        let mut used: Vec<bool> = assets
            .iter()
            .map(|asset| literal_matches.contains(&quote(&asset.display_name())))
            .collect();

        let pending: BTreeSet<String> = assets
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .filter_map(|(asset, _)| asset.resource_identifier())
            .collect();

        if !pending.is_empty() {
            self.check_cancelled()?;
            log::debug!("Searching for {} resource identifiers", pending.len());
            let identifier_matches: HashSet<String> = self
                .run_search(project_root, identifier_alternation(&pending), true)
                .into_iter()
                .map(|m| fold_case(&m))
                .collect();

            for (asset, used) in assets.iter().zip(used.iter_mut()) {
                if *used {
                    continue;
                }
                if let Some(identifier) = asset.resource_identifier() {
                    *used = identifier_matches.contains(&fold_case(&identifier));
                }
            }
        }

        let mut summary = UsageSummary::default();
        for (asset, used) in assets.iter_mut().zip(used) {
            if used {
                asset.usage_status = UsageStatus::Used;
                summary.used += 1;
            } else {
                asset.usage_status = UsageStatus::Unused;
                summary.unused += 1;
            }
        }

        log::info!("{} assets used, {} unused", summary.used, summary.unused);
        Ok(summary)
    }

    fn run_search(&self, root: &Path, pattern: String, case_insensitive: bool) -> Vec<String> {
        let request = SearchRequest {
            root: root.to_path_buf(),
            file_globs: self.source_globs.clone(),
            excluded_dirs: self.excluded_dirs.clone(),
            pattern,
            case_insensitive,
        };

        match self.searcher.search(&request) {
            Ok(matches) => matches,
            Err(e) => {
                log::debug!("Error during search execution: {}", e);
                Vec::new()
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), UsageError> {
        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(UsageError::Cancelled);
        }
        Ok(())
    }
}

/// Map each character to one representative of its case-insensitive
/// class, so `Σ`, `σ` and `ς` all fold to `σ`.
fn fold_case(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => single(u.to_lowercase()).unwrap_or(u),
        _ => single(c.to_lowercase()).unwrap_or(c),
    }
}

fn single(mut chars: impl Iterator<Item = char>) -> Option<char> {
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// `"(a|b|c)"` with every name escaped as a literal.
fn quoted_alternation(names: &BTreeSet<String>) -> String {
    format!("\"({})\"", escaped_alternation(names))
}

/// `\b(a|b|c)\b` with every identifier escaped as a literal.
fn identifier_alternation(identifiers: &BTreeSet<String>) -> String {
    format!("\\b({})\\b", escaped_alternation(identifiers))
}

fn escaped_alternation(items: &BTreeSet<String>) -> String {
    items
        .iter()
        .map(|item| regex::escape(item))
        .collect::<Vec<_>>()
        .join("|")
}
