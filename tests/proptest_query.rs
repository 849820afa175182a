//! Property-based tests using proptest
//!
//! These tests verify sort order, pagination and included-section
//! deduplication over randomized tables.

use proptest::prelude::*;
use serde_json::{json, Value};
use sideload::query::{RawPage, RawParams};
use sideload::resource::{Registry, Relationship, ResourceDef};
use sideload::{Document, IncludeTree, MemoryAdapter, RequestParams, Sideloader};
use std::collections::HashSet;

fn registry() -> Registry {
    let mut builder = Registry::builder();
    builder
        .register_resource(ResourceDef::new("authors").attributes(["name"]))
        .unwrap()
        .register_resource(
            ResourceDef::new("books")
                .attributes(["title", "pages"])
                .allow_filters(["id"]),
        )
        .unwrap()
        .register_resource(ResourceDef::new("genres").attributes(["name"]))
        .unwrap()
        .register_relationship("authors", "books", Relationship::has_many("books", "author_id"))
        .unwrap()
        .register_relationship("books", "author", Relationship::belongs_to("authors", "author_id"))
        .unwrap()
        .register_relationship("books", "genre", Relationship::belongs_to("genres", "genre_id"))
        .unwrap();
    builder.build().unwrap()
}

/// Generate one book row without an id: (author_id, genre_id, pages)
fn arb_book() -> impl Strategy<Value = (u32, u32, u32)> {
    (1u32..=5, 1u32..=3, 0u32..5)
}

fn library(books: &[(u32, u32, u32)]) -> MemoryAdapter {
    let authors = (1..=5).map(|id| json!({"id": id, "name": format!("author-{}", id)}));
    let genres = (1..=3).map(|id| json!({"id": id, "name": format!("genre-{}", id)}));
    let books = books.iter().enumerate().map(|(i, (author, genre, pages))| {
        json!({
            "id": i + 1,
            "title": format!("book-{}", i + 1),
            "author_id": author,
            "genre_id": genre,
            "pages": pages
        })
    });

    MemoryAdapter::new()
        .with_table("authors", authors)
        .and_then(|a| a.with_table("genres", genres))
        .and_then(|a| a.with_table("books", books))
        .unwrap()
}

fn base_params(sort: &str, number: u32, size: u32) -> RequestParams {
    RequestParams {
        base: RawParams {
            sort: (!sort.is_empty()).then(|| sort.into()),
            page: Some(RawPage {
                number: Some(number.to_string().as_str().into()),
                size: Some(size.to_string().as_str().into()),
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn run(adapter: &MemoryAdapter, resource: &str, include: &str, params: &RequestParams) -> Document {
    let registry = registry();
    let sideloader = Sideloader::new(&registry, adapter);
    tokio_test::block_on(sideloader.run(resource, &IncludeTree::parse(include), params))
        .expect("request succeeds")
}

fn numeric_ids(doc: &Document) -> Vec<u64> {
    doc.data
        .iter()
        .map(|o| o.id.as_str().parse().unwrap())
        .collect()
}

proptest! {
    /// Every (type, id) pair appears at most once across data and included
    #[test]
    fn included_pairs_are_unique(books in prop::collection::vec(arb_book(), 0..40)) {
        let adapter = library(&books);
        let doc = run(&adapter, "authors", "books.genre,books.author", &RequestParams::default());

        let mut seen = HashSet::new();
        for object in doc.data.iter().chain(&doc.included) {
            prop_assert!(
                seen.insert((object.resource.clone(), object.id.clone())),
                "duplicate {} {}", object.resource, object.id
            );
        }
    }

    /// Sorting by -id yields a non-increasing id sequence
    #[test]
    fn sort_by_desc_id_is_non_increasing(ids in prop::collection::hash_set(0u32..10_000, 0..60)) {
        let rows: Vec<Value> = ids.iter().map(|id| json!({"id": id, "title": "t"})).collect();
        let adapter = MemoryAdapter::new().with_table("books", rows).unwrap();

        let doc = run(&adapter, "books", "", &base_params("-id", 1, 100));
        let sorted = numeric_ids(&doc);
        prop_assert_eq!(sorted.len(), ids.len());
        prop_assert!(sorted.windows(2).all(|w| w[0] >= w[1]));
    }

    /// Ties on a non-unique key keep insertion order
    #[test]
    fn sort_ties_are_stable(books in prop::collection::vec(arb_book(), 0..40)) {
        let adapter = library(&books);
        let doc = run(&adapter, "books", "", &base_params("pages", 1, 100));

        let rows: Vec<(u64, u64)> = doc
            .data
            .iter()
            .map(|o| {
                let pages = o.attributes["pages"].as_u64().unwrap();
                (pages, o.id.as_str().parse().unwrap())
            })
            .collect();
        prop_assert!(rows.windows(2).all(|w| w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1)));
    }

    /// A page is exactly the matching slice of the sorted result
    #[test]
    fn page_is_a_slice(count in 0u64..30, number in 1u32..6, size in 1u32..10) {
        let rows: Vec<Value> = (1..=count).map(|id| json!({"id": id, "title": "t"})).collect();
        let adapter = MemoryAdapter::new().with_table("books", rows).unwrap();

        let doc = run(&adapter, "books", "", &base_params("id", number, size));
        let expected: Vec<u64> = (1..=count)
            .skip(((number - 1) * size) as usize)
            .take(size as usize)
            .collect();
        prop_assert_eq!(numeric_ids(&doc), expected);
    }

    /// Sideloads follow the parent's page, never the other way round
    #[test]
    fn sideloads_never_exceed_parent_links(
        books in prop::collection::vec(arb_book(), 0..40),
        size in 1u32..5,
    ) {
        let adapter = library(&books);
        let doc = run(&adapter, "authors", "books", &base_params("", 1, size));

        let shown: HashSet<u32> = doc.data.iter().map(|o| o.id.as_str().parse().unwrap()).collect();
        let expected = books.iter().filter(|(author, _, _)| shown.contains(author)).count();
        prop_assert_eq!(doc.included.len(), expected);
    }
}
