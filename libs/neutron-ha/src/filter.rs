// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Router filters restricting which routers an operation may move

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

/// Narrows a sequence of router ids, preserving order
pub trait RouterFilter: Send + Sync {
    fn filter_routers(&self, router_ids: Vec<String>) -> Vec<String>;
}

/// Lets every router through
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRouterFilter;

impl RouterFilter for NullRouterFilter {
    fn filter_routers(&self, router_ids: Vec<String>) -> Vec<String> {
        router_ids
    }
}

/// Lets through only the listed routers
///
/// An empty allow-list lets nothing through, which turns the operation into
/// a no-op rather than an error.
#[derive(Debug, Clone, Default)]
pub struct WhitelistRouterFilter {
    allowed: HashSet<String>,
}

impl WhitelistRouterFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a filter from a router list file
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(load_router_ids(path)?))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl RouterFilter for WhitelistRouterFilter {
    fn filter_routers(&self, router_ids: Vec<String>) -> Vec<String> {
        router_ids
            .into_iter()
            .filter(|id| self.allowed.contains(id))
            .collect()
    }
}

/// Read router ids from a file, one per line
///
/// Surrounding whitespace is stripped and blank lines are skipped.
pub fn load_router_ids(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read router list file: {}", path.display()))?;

    Ok(parse_router_ids(&content))
}

fn parse_router_ids(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn null_filter_is_identity() {
        let input = ids(&["router-id-1", "router-id-2"]);
        assert_eq!(NullRouterFilter.filter_routers(input.clone()), input);
    }

    #[test]
    fn empty_white_list_filters_out_all_router_ids() {
        let filter = WhitelistRouterFilter::new(Vec::<String>::new());

        let filtered = filter.filter_routers(ids(&["router-id-1", "router-id-2"]));

        assert_eq!(filtered, Vec::<String>::new());
    }

    #[test]
    fn only_whitelisted_routers_returned() {
        let filter = WhitelistRouterFilter::new(["router-id-1"]);

        let filtered = filter.filter_routers(ids(&["router-id-1", "router-id-2"]));

        assert_eq!(filtered, ids(&["router-id-1"]));
    }

    #[test]
    fn input_order_is_preserved() {
        let filter = WhitelistRouterFilter::new(["c", "a"]);

        let filtered = filter.filter_routers(ids(&["a", "b", "c"]));

        assert_eq!(filtered, ids(&["a", "c"]));
    }

    #[test]
    fn loading_empty_file_returns_empty_list() {
        let file = NamedTempFile::new().unwrap();

        assert_eq!(load_router_ids(file.path()).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn empty_lines_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "\n      ").unwrap();

        assert_eq!(load_router_ids(file.path()).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn lines_stripped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "  some-router-id   ").unwrap();

        assert_eq!(load_router_ids(file.path()).unwrap(), ids(&["some-router-id"]));
    }

    #[test]
    fn crlf_lines_are_stripped() {
        assert_eq!(parse_router_ids("r1\r\n\r\nr2\r\n"), ids(&["r1", "r2"]));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_router_ids(Path::new("/nonexistent/routers.txt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/routers.txt"));
    }

    #[test]
    fn filter_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "r1").unwrap();
        writeln!(file, "r3").unwrap();

        let filter = WhitelistRouterFilter::from_file(file.path()).unwrap();

        assert_eq!(filter.len(), 2);
        assert_eq!(filter.filter_routers(ids(&["r1", "r2", "r3"])), ids(&["r1", "r3"]));
    }
}
