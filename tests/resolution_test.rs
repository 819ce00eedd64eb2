use std::collections::HashMap;

use blockref::cache::VirtualKeywordCache;
use blockref::db::Database;
use blockref::resolution::{BlockTree, RefResolver};
use blockref::types::*;
use tempfile::TempDir;

fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("test.db");
    let db = Database::initialize(&db_path).expect("failed to initialize database");
    (db, dir)
}

fn sample_block(id: &str, root_id: &str, kind: BlockType, content: &str) -> Block {
    Block {
        id: id.to_string(),
        parent_id: String::new(),
        root_id: root_id.to_string(),
        box_id: "notebook-1".to_string(),
        path: format!("/{root_id}.sy"),
        hpath: format!("/{root_id}"),
        name: String::new(),
        alias: String::new(),
        memo: String::new(),
        tag: String::new(),
        content: content.to_string(),
        fcontent: content.to_string(),
        markdown: content.to_string(),
        length: content.len() as u32,
        kind,
        subtype: String::new(),
        ial: String::new(),
        sort: 0,
        created: "20240101120000".to_string(),
        updated: "20240101120000".to_string(),
    }
}

fn sample_ref(
    id: &str,
    def_block_id: &str,
    def_root_id: &str,
    block_id: &str,
    root_id: &str,
    content: &str,
) -> Ref {
    Ref {
        id: id.to_string(),
        def_block_id: def_block_id.to_string(),
        def_block_parent_id: String::new(),
        def_block_root_id: def_root_id.to_string(),
        def_block_path: format!("/{def_root_id}.sy"),
        block_id: block_id.to_string(),
        root_id: root_id.to_string(),
        box_id: "notebook-1".to_string(),
        path: format!("/{root_id}.sy"),
        content: content.to_string(),
        markdown: format!("(({def_block_id} \"{content}\"))"),
        kind: "textmark".to_string(),
    }
}

/// Configurable hierarchy stub. Unconfigured blocks are their own only
/// descendant.
struct StubTree {
    children: HashMap<String, Vec<String>>,
}

impl StubTree {
    fn empty() -> Self {
        Self {
            children: HashMap::new(),
        }
    }

    fn with(parent: &str, descendants: &[&str]) -> Self {
        let mut children = HashMap::new();
        children.insert(
            parent.to_string(),
            descendants.iter().map(|id| id.to_string()).collect(),
        );
        Self { children }
    }
}

impl BlockTree for StubTree {
    fn children_ids(&self, block_id: &str) -> Vec<String> {
        self.children
            .get(block_id)
            .cloned()
            .unwrap_or_else(|| vec![block_id.to_string()])
    }
}

// ---------------------------------------------------------------------------
// Definition lookup by anchor text
// ---------------------------------------------------------------------------

#[test]
fn test_def_ids_by_anchor_text() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-1", "src-1", "doc-2", "borrow checker"),
        sample_ref("r-2", "def-2", "doc-1", "src-2", "doc-2", "lifetimes"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let ids = resolver.block_def_ids_by_ref_text("borrow checker", &[]);
    assert_eq!(ids, vec!["def-1".to_string()]);
}

#[test]
fn test_def_ids_alias_token_boundary() {
    let (db, _dir) = setup_db();
    let mut shadowed = sample_block("b-shadowed", "doc-1", BlockType::Paragraph, "text");
    shadowed.alias = "Golang,Rust".to_string();
    let mut exact = sample_block("b-exact", "doc-1", BlockType::Paragraph, "text");
    exact.alias = "Go,Rust".to_string();
    db.upsert_blocks(&[shadowed, exact])
        .expect("failed to upsert blocks");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let ids = resolver.block_def_ids_by_ref_text("Go", &[]);
    assert!(
        ids.iter().any(|id| id == "b-exact"),
        "exact alias token must match: {ids:?}"
    );
    assert!(
        !ids.iter().any(|id| id == "b-shadowed"),
        "substring of another token must not match: {ids:?}"
    );

    let ids = resolver.block_def_ids_by_ref_text("Rust", &[]);
    assert!(ids.iter().any(|id| id == "b-shadowed"));
    assert!(ids.iter().any(|id| id == "b-exact"));
}

#[test]
fn test_def_ids_name_wins_over_alias_rejection() {
    let (db, _dir) = setup_db();
    let mut block = sample_block("b-1", "doc-1", BlockType::Paragraph, "text");
    block.name = "Go".to_string();
    block.alias = "Golang".to_string();
    db.upsert_block(&block).expect("failed to upsert block");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let ids = resolver.block_def_ids_by_ref_text("Go", &[]);
    assert_eq!(ids, vec!["b-1".to_string()]);
}

#[test]
fn test_def_ids_by_doc_title() {
    let (db, _dir) = setup_db();
    db.upsert_blocks(&[
        sample_block("doc-1", "doc-1", BlockType::Document, "Road Map"),
        // Same content on a paragraph must not match the title source.
        sample_block("b-1", "doc-1", BlockType::Paragraph, "Road Map"),
    ])
    .expect("failed to upsert blocks");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let ids = resolver.block_def_ids_by_ref_text("Road Map", &[]);
    assert_eq!(ids, vec!["doc-1".to_string()]);
}

#[test]
fn test_def_ids_exclusions_respected_by_every_source() {
    let (db, _dir) = setup_db();
    let mut named = sample_block("b-named", "doc-1", BlockType::Paragraph, "text");
    named.name = "kernel".to_string();
    db.upsert_blocks(&[
        named,
        sample_block("doc-title", "doc-title", BlockType::Document, "kernel"),
    ])
    .expect("failed to upsert blocks");
    db.upsert_ref(&sample_ref(
        "r-1", "def-anchor", "doc-1", "src-1", "doc-2", "kernel",
    ))
    .expect("failed to upsert ref");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let unfiltered = resolver.block_def_ids_by_ref_text("kernel", &[]);
    for id in ["def-anchor", "b-named", "doc-title"] {
        assert!(unfiltered.iter().any(|x| x == id), "missing {id}: {unfiltered:?}");
    }

    let exclude: Vec<String> = ["def-anchor", "b-named", "doc-title"]
        .iter()
        .map(|id| id.to_string())
        .collect();
    let filtered = resolver.block_def_ids_by_ref_text("kernel", &exclude);
    assert!(
        filtered.is_empty(),
        "excluded ids must never be returned: {filtered:?}"
    );
}

#[test]
fn test_def_ids_deduplicated_across_sources() {
    let (db, _dir) = setup_db();
    // def-1 is both a named block and the target of a matching anchor.
    let mut named = sample_block("def-1", "doc-1", BlockType::Paragraph, "text");
    named.name = "kernel".to_string();
    db.upsert_block(&named).expect("failed to upsert block");
    db.upsert_ref(&sample_ref("r-1", "def-1", "doc-1", "src-1", "doc-2", "kernel"))
        .expect("failed to upsert ref");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let ids = resolver.block_def_ids_by_ref_text("kernel", &[]);
    assert_eq!(ids, vec!["def-1".to_string()]);
}

// ---------------------------------------------------------------------------
// Scoped backlink queries
// ---------------------------------------------------------------------------

#[test]
fn test_root_children_ref_count() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "x", "doc-d", "b-1", "doc-d", "x"),
        sample_ref("r-2", "y", "doc-d", "b-2", "doc-d", "y"),
        sample_ref("r-3", "x", "doc-d", "b-1", "doc-d", "x"),
        // Different defining document, must not be counted.
        sample_ref("r-4", "z", "doc-other", "b-3", "doc-d", "z"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let counts = resolver.root_children_ref_count("doc-d");
    assert_eq!(counts.len(), 2);
    assert_eq!(counts.get("x"), Some(&2));
    assert_eq!(counts.get("y"), Some(&1));
}

#[test]
fn test_root_ref_count_groups_by_defining_document() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "a-1", "doc-a", "b-1", "doc-c", "a"),
        sample_ref("r-2", "a-2", "doc-a", "b-2", "doc-c", "a"),
        sample_ref("r-3", "b-1", "doc-b", "b-3", "doc-c", "b"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let counts = resolver.root_ref_count();
    assert_eq!(counts.get("doc-a"), Some(&2));
    assert_eq!(counts.get("doc-b"), Some(&1));
}

#[test]
fn test_def_and_ref_root_blocks_between_documents() {
    let (db, _dir) = setup_db();
    db.upsert_blocks(&[
        sample_block("doc-a", "doc-a", BlockType::Document, "Source"),
        sample_block("doc-b", "doc-b", BlockType::Document, "Target"),
    ])
    .expect("failed to upsert blocks");
    db.upsert_ref(&sample_ref("r-1", "def-x", "doc-b", "src-1", "doc-a", "x"))
        .expect("failed to upsert ref");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let targets = resolver.def_root_blocks_by_ref_root_id("doc-a");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].id, "doc-b");

    let sources = resolver.ref_root_blocks_by_def_root_id("doc-b");
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, "doc-a");
}

#[test]
fn test_child_def_ids_by_root_def_id_distinct() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-d", "src-1", "doc-a", "one"),
        sample_ref("r-2", "def-1", "doc-d", "src-2", "doc-b", "one"),
        sample_ref("r-3", "def-2", "doc-d", "src-3", "doc-a", "two"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let mut ids = resolver.child_def_ids_by_root_def_id("doc-d");
    ids.sort();
    assert_eq!(ids, vec!["def-1".to_string(), "def-2".to_string()]);
}

#[test]
fn test_ref_ids_by_def_id_scopes() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-d", "src-1", "doc-a", "one"),
        sample_ref("r-2", "def-2", "doc-d", "src-2", "doc-b", "two"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let (ids, texts) = resolver.ref_ids_by_def_id("def-1", false);
    assert_eq!(ids, vec!["src-1".to_string()]);
    assert_eq!(texts, vec!["one".to_string()]);

    // Root-wide scope returns the referrers of everything under doc-d.
    let (ids, texts) = resolver.ref_ids_by_def_id("doc-d", true);
    assert_eq!(ids.len(), 2);
    assert_eq!(texts.len(), 2);
}

#[test]
fn test_refs_by_def_id_document_always_scopes_root_wide() {
    let (db, _dir) = setup_db();
    db.upsert_block(&sample_block("doc-d", "doc-d", BlockType::Document, "Doc"))
        .expect("failed to upsert block");
    db.upsert_refs(&[
        sample_ref("r-1", "child-1", "doc-d", "src-1", "doc-a", "one"),
        sample_ref("r-2", "child-2", "doc-d", "src-2", "doc-b", "two"),
        sample_ref("r-3", "other", "doc-e", "src-3", "doc-a", "three"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let refs = resolver.refs_by_def_id("doc-d", false);
    let mut ids: Vec<&str> = refs.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["r-1", "r-2"]);
}

#[test]
fn test_refs_by_def_id_subtree_vs_exact() {
    let (db, _dir) = setup_db();
    db.upsert_block(&sample_block("h-1", "doc-d", BlockType::Heading, "Section"))
        .expect("failed to upsert block");
    db.upsert_refs(&[
        sample_ref("r-1", "h-1", "doc-d", "src-1", "doc-a", "section"),
        sample_ref("r-2", "c-1", "doc-d", "src-2", "doc-a", "child one"),
        sample_ref("r-3", "c-2", "doc-d", "src-3", "doc-b", "child two"),
        sample_ref("r-4", "elsewhere", "doc-d", "src-4", "doc-b", "other"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::with("h-1", &["h-1", "c-1", "c-2"]);
    let resolver = RefResolver::new(&db, &cache, &tree);

    let subtree = resolver.refs_by_def_id("h-1", true);
    let mut ids: Vec<&str> = subtree.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["r-1", "r-2", "r-3"]);

    let exact = resolver.refs_by_def_id("h-1", false);
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].id, "r-1");
}

#[test]
fn test_refs_by_def_id_missing_block_returns_empty() {
    let (db, _dir) = setup_db();
    db.upsert_ref(&sample_ref("r-1", "def-1", "doc-d", "src-1", "doc-a", "one"))
        .expect("failed to upsert ref");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    assert!(resolver.refs_by_def_id("def-1", false).is_empty());
}

#[test]
fn test_refs_by_def_id_ref_id_exact_pair() {
    let (db, _dir) = setup_db();
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-d", "src-1", "doc-a", "one"),
        sample_ref("r-2", "def-1", "doc-d", "src-2", "doc-a", "one"),
        sample_ref("r-3", "def-2", "doc-d", "src-1", "doc-a", "two"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let refs = resolver.refs_by_def_id_ref_id("def-1", "src-1");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].id, "r-1");
}

// ---------------------------------------------------------------------------
// Recent refs
// ---------------------------------------------------------------------------

#[test]
fn test_refs_recent_one_per_definition_newest_first() {
    let (db, _dir) = setup_db();
    let refs: Vec<Ref> = (1..=40)
        .map(|i| {
            sample_ref(
                &format!("r-{i:02}"),
                &format!("def-{}", i % 10),
                "doc-d",
                &format!("src-{i:02}"),
                "doc-a",
                "anchor",
            )
        })
        .collect();
    db.upsert_refs(&refs).expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let recent = resolver.refs_recent();
    assert_eq!(recent.len(), 10, "one entry per distinct definition");

    let ids: Vec<&str> = recent.iter().map(|r| r.id.as_str()).collect();
    let expected: Vec<String> = (31..=40).rev().map(|i| format!("r-{i:02}")).collect();
    assert_eq!(ids, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
}

#[test]
fn test_refs_recent_capped() {
    let (db, _dir) = setup_db();
    let refs: Vec<Ref> = (1..=40)
        .map(|i| {
            sample_ref(
                &format!("r-{i:02}"),
                &format!("def-{i:02}"),
                "doc-d",
                &format!("src-{i:02}"),
                "doc-a",
                "anchor",
            )
        })
        .collect();
    db.upsert_refs(&refs).expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let recent = resolver.refs_recent();
    assert_eq!(recent.len(), 32);
    assert_eq!(recent[0].id, "r-40");
    assert_eq!(recent[31].id, "r-09");
}

// ---------------------------------------------------------------------------
// Bidirectional def/ref map
// ---------------------------------------------------------------------------

#[test]
fn test_def_refs_pairs_definitions_with_referrers() {
    let (db, _dir) = setup_db();
    db.upsert_blocks(&[
        sample_block("src-1", "doc-a", BlockType::Paragraph, "the referrer"),
        sample_block("def-1", "doc-b", BlockType::Paragraph, "the definition"),
    ])
    .expect("failed to upsert blocks");
    db.upsert_ref(&sample_ref("r-1", "def-1", "doc-b", "src-1", "doc-a", "anchor"))
        .expect("failed to upsert ref");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let pairs = resolver.def_refs("");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].def.id, "def-1");
    assert_eq!(pairs[0].referrer.id, "src-1");
}

#[test]
fn test_def_refs_drops_orphaned_pairs() {
    let (db, _dir) = setup_db();
    db.upsert_blocks(&[
        sample_block("src-1", "doc-a", BlockType::Paragraph, "the referrer"),
        sample_block("def-1", "doc-b", BlockType::Paragraph, "the definition"),
    ])
    .expect("failed to upsert blocks");
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-b", "src-1", "doc-a", "anchor"),
        // Definition row no longer exists; the pair must be dropped.
        sample_ref("r-2", "def-gone", "doc-b", "src-1", "doc-a", "anchor"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let pairs = resolver.def_refs("");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].def.id, "def-1");
}

#[test]
fn test_def_refs_condition_narrows_referring_side() {
    let (db, _dir) = setup_db();
    db.upsert_blocks(&[
        sample_block("src-1", "doc-a", BlockType::Paragraph, "from doc-a"),
        sample_block("src-2", "doc-b", BlockType::Paragraph, "from doc-b"),
        sample_block("def-1", "doc-c", BlockType::Paragraph, "the definition"),
    ])
    .expect("failed to upsert blocks");
    db.upsert_refs(&[
        sample_ref("r-1", "def-1", "doc-c", "src-1", "doc-a", "anchor"),
        sample_ref("r-2", "def-1", "doc-c", "src-2", "doc-b", "anchor"),
    ])
    .expect("failed to upsert refs");

    let cache = VirtualKeywordCache::new();
    let tree = StubTree::empty();
    let resolver = RefResolver::new(&db, &cache, &tree);

    let pairs = resolver.def_refs("r.root_id = 'doc-a'");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].referrer.id, "src-1");
}
