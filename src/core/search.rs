use glob::Pattern;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Search exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One pattern search over the source files below `root`.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub root: PathBuf,
    pub file_globs: Vec<String>,
    pub excluded_dirs: Vec<String>,
    pub pattern: String,
    pub case_insensitive: bool,
}

/// Runs a pattern search and returns the matched text, one entry per
/// distinct match, sorted.
pub trait TextSearcher: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<Vec<String>, SearchError>;
}

/// Shells out to `grep -rhoIE`.
pub struct GrepSearcher {
    program: String,
}

impl GrepSearcher {
    pub fn new() -> Self {
        Self::with_program("grep")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GrepSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSearcher for GrepSearcher {
    fn search(&self, request: &SearchRequest) -> Result<Vec<String>, SearchError> {
        let mut command = Command::new(&self.program);
        // -r recursive, -h no file names, -o only matches, -I skip binaries,
        // -E extended regex
        command.arg("-rhoIE");
        if request.case_insensitive {
            command.arg("-i");
        }
        for glob in &request.file_globs {
            command.arg(format!("--include={glob}"));
        }
        for dir in &request.excluded_dirs {
            command.arg(format!("--exclude-dir={dir}"));
        }
        // Patterns are read from stdin: a whole catalog's alternation can
        // exceed the argument length limit.
        command
            .arg("-f")
            .arg("-")
            .arg("--")
            .arg(&request.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| SearchError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("grep stdin was not captured"))?;
        let pattern = format!("{}\n", request.pattern);
        let writer = thread::spawn(move || stdin.write_all(pattern.as_bytes()));
        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("pattern writer panicked")));

        // grep exits with 1 when nothing matched
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(SearchError::Failed {
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }

        // Matches only count if grep saw the whole pattern.
        written?;

        let matches: BTreeSet<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Ok(matches.into_iter().collect())
    }
}

/// In-process search with `walkdir` and `regex`.
#[derive(Default)]
pub struct RegexSearcher;

impl RegexSearcher {
    pub fn new() -> Self {
        Self
    }

    fn candidate_files(&self, request: &SearchRequest, globs: &[Pattern]) -> Result<Vec<PathBuf>, SearchError> {
        fs::read_dir(&request.root)?;

        let excluded: HashSet<&str> = request.excluded_dirs.iter().map(String::as_str).collect();
        let files = WalkDir::new(&request.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| excluded.contains(name))
            })
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                globs.iter().any(|glob| glob.matches(&name))
            })
            .map(|entry| entry.into_path())
            .collect();
        Ok(files)
    }
}

impl TextSearcher for RegexSearcher {
    fn search(&self, request: &SearchRequest) -> Result<Vec<String>, SearchError> {
        let regex = RegexBuilder::new(&request.pattern)
            .case_insensitive(request.case_insensitive)
            .build()
            .map_err(|e| SearchError::InvalidPattern(e.to_string()))?;

        let globs = request
            .file_globs
            .iter()
            .map(|glob| Pattern::new(glob))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SearchError::InvalidPattern(e.to_string()))?;

        let files = self.candidate_files(request, &globs)?;

        let matches: BTreeSet<String> = files
            .par_iter()
            .flat_map_iter(|path| matches_in_file(&regex, path))
            .collect();
        Ok(matches.into_iter().collect())
    }
}

fn matches_in_file(regex: &Regex, path: &Path) -> Vec<String> {
    // Non-UTF-8 content is treated as binary and skipped.
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .flat_map(|line| regex.find_iter(line).map(|m| m.as_str().to_string()))
        .collect()
}
