//! Include Tree
//!
//! Nested relationship names requested for sideloading.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Recursive map from relationship name to the includes below it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct IncludeTree(BTreeMap<String, IncludeTree>);

impl IncludeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dotted include string such as `books.genre,dwelling`
    pub fn parse(input: &str) -> Self {
        let mut tree = Self::new();
        for path in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            tree.insert_path(path.split('.').map(str::trim).filter(|s| !s.is_empty()));
        }
        tree
    }

    /// Add one path, creating intermediate levels as needed
    pub fn insert_path<'a>(&mut self, segments: impl IntoIterator<Item = &'a str>) {
        let mut current = self;
        for segment in segments {
            current = current.0.entry(segment.to_string()).or_default();
        }
    }

    /// Builder-style helper for nested literals in code and tests
    pub fn with(mut self, name: &str, children: IncludeTree) -> Self {
        self.0.insert(name.to_string(), children);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&IncludeTree> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the top-level names accepted by `keep`
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> IncludeTree {
        IncludeTree(
            self.0
                .iter()
                .filter(|(name, _)| keep(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_and_sibling_paths() {
        let tree = IncludeTree::parse("books.genre, books.tags,dwelling");
        let books = tree.get("books").expect("books should be included");
        assert!(books.get("genre").is_some());
        assert!(books.get("tags").is_some());
        assert!(tree.get("dwelling").is_some_and(IncludeTree::is_empty));
    }

    #[test]
    fn test_parse_empty_string_is_empty_tree() {
        assert!(IncludeTree::parse("").is_empty());
        assert!(IncludeTree::parse(" , ").is_empty());
    }

    #[test]
    fn test_builder_matches_parsed_tree() {
        let built = IncludeTree::new().with("books", IncludeTree::new().with("genre", IncludeTree::new()));
        assert_eq!(built, IncludeTree::parse("books.genre"));
    }

    #[test]
    fn test_deserialize_from_yaml_map() {
        let tree: IncludeTree = serde_yaml::from_str("books:\n  genre: {}\ndwelling: {}\n").unwrap();
        assert_eq!(tree, IncludeTree::parse("books.genre,dwelling"));
    }
}
