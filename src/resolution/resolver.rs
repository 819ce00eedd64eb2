use std::collections::{HashMap, HashSet};

use rusqlite::params;
use tracing::error;

use super::BlockTree;
use crate::cache::{KeywordSources, VirtualKeywordCache};
use crate::db::queries::{row_to_block, row_to_ref};
use crate::db::Database;
use crate::errors::Result;
use crate::types::*;

/// Maximum `refs` rows sampled when collecting anchor-text keywords.
const ANCHOR_SAMPLE_LIMIT: u32 = 1024;

/// Maximum entries returned by `refs_recent`.
const RECENT_REFS_LIMIT: u32 = 32;

/// Resolves anchor texts and block ids to defining/referencing blocks over
/// the `blocks` and `refs` tables.
///
/// All public operations are read-only and infallible: a failed query is
/// logged and degrades to an empty (or partial) result, so a backlink panel
/// renders as empty rather than erroring.
pub struct RefResolver<'a> {
    db: &'a Database,
    keywords: &'a VirtualKeywordCache,
    tree: &'a dyn BlockTree,
}

impl<'a> RefResolver<'a> {
    /// Creates a new resolver over the given database, keyword cache, and
    /// block hierarchy.
    pub fn new(db: &'a Database, keywords: &'a VirtualKeywordCache, tree: &'a dyn BlockTree) -> Self {
        Self { db, keywords, tree }
    }

    // ------------------------------------------------------------------
    // Virtual reference keyword discovery
    // ------------------------------------------------------------------

    /// Returns the candidate anchor texts usable for virtual reference
    /// matching, sorted by descending length.
    ///
    /// The descending-length order matters to consumers doing substring
    /// matching: a longer anchor must be tried before any shorter prefix or
    /// substring of it, or the longer match is shadowed.
    ///
    /// Results are cached per source combination until
    /// [`VirtualKeywordCache::invalidate`] is called.
    pub fn virtual_ref_keywords(&self, sources: KeywordSources) -> Vec<String> {
        if let Some(cached) = self.keywords.get(sources) {
            return cached;
        }

        let mut candidates = Vec::new();
        if sources.names {
            candidates.extend(
                self.keyword_source("SELECT DISTINCT name FROM blocks WHERE name != ''"),
            );
        }
        if sources.aliases {
            candidates.extend(self.alias_tokens());
        }
        if sources.anchors {
            candidates.extend(self.keyword_source(&format!(
                "SELECT DISTINCT content FROM refs LIMIT {ANCHOR_SAMPLE_LIMIT}"
            )));
        }
        if sources.doc_titles {
            candidates.extend(
                self.keyword_source("SELECT DISTINCT content FROM blocks WHERE type = 'd'"),
            );
        }

        let mut seen = HashSet::new();
        let mut ret: Vec<String> = candidates
            .into_iter()
            .filter(|keyword| seen.insert(keyword.clone()))
            .collect();
        ret.sort_by(|a, b| b.len().cmp(&a.len()));

        self.keywords.set(sources, ret.clone());
        ret
    }

    /// Runs a single-column keyword query, skipping blank values.
    fn keyword_source(&self, sql: &str) -> Vec<String> {
        self.try_strings(sql).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    /// Collects the comma-split alias tokens of every aliased block. Empty
    /// tokens are skipped.
    fn alias_tokens(&self) -> Vec<String> {
        let sql = "SELECT alias FROM blocks WHERE alias != ''";
        let aliases = self.try_strings(sql).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        });

        let mut tokens = Vec::new();
        for alias in aliases {
            for token in alias.split(',') {
                if token.is_empty() {
                    continue;
                }
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    // ------------------------------------------------------------------
    // Definition lookup by anchor text
    // ------------------------------------------------------------------

    /// Returns the ids of blocks that `text` can refer to, combining three
    /// candidate sources: existing ref anchors, block names/aliases, and
    /// document titles. The result is deduplicated and unordered.
    ///
    /// Every id in `exclude_ids` is filtered inside each source query.
    pub fn block_def_ids_by_ref_text(&self, text: &str, exclude_ids: &[String]) -> Vec<String> {
        let mut ids = self.def_ids_by_anchor(text, exclude_ids);
        ids.extend(self.def_ids_by_name_alias(text, exclude_ids));
        ids.extend(self.doc_ids_by_title(text, exclude_ids));

        let mut seen = HashSet::new();
        ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
    }

    /// Definition ids of refs whose anchor text equals `text` exactly.
    fn def_ids_by_anchor(&self, text: &str, exclude_ids: &[String]) -> Vec<String> {
        let sql = format!(
            "SELECT DISTINCT def_block_id FROM refs WHERE content = ?1 AND def_block_id {}",
            not_in_clause(2, exclude_ids.len())
        );
        self.try_excluding_ids(&sql, text, exclude_ids)
            .unwrap_or_else(|e| {
                error!("sql query failed: {sql}: {e}");
                Vec::new()
            })
    }

    /// Block ids whose name equals `text`, or whose alias list carries
    /// `text` as an exact comma-split token.
    ///
    /// A pure substring hit inside some other token is rejected, so `"Go"`
    /// never matches an alias list containing only `"Golang"`.
    fn def_ids_by_name_alias(&self, text: &str, exclude_ids: &[String]) -> Vec<String> {
        let sql = format!(
            "SELECT DISTINCT id, name, alias FROM blocks WHERE (name = ?1 OR alias LIKE ?2) AND id {}",
            not_in_clause(3, exclude_ids.len())
        );

        let rows = self.try_name_alias_rows(&sql, text, exclude_ids);
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!("sql query failed: {sql}: {e}");
                return Vec::new();
            }
        };

        let mut ret = Vec::new();
        for (id, name, alias) in rows {
            if name == text {
                ret.push(id);
                continue;
            }

            let mut hit_alias = false;
            for token in alias.split(',') {
                if token.is_empty() {
                    continue;
                }
                if token == text {
                    hit_alias = true;
                }
            }
            if alias.contains(text) && !hit_alias {
                continue;
            }
            ret.push(id);
        }
        ret
    }

    /// Document blocks whose title equals `text`.
    fn doc_ids_by_title(&self, text: &str, exclude_ids: &[String]) -> Vec<String> {
        let sql = format!(
            "SELECT DISTINCT id FROM blocks WHERE type = 'd' AND content = ?1 AND id {}",
            not_in_clause(2, exclude_ids.len())
        );
        self.try_excluding_ids(&sql, text, exclude_ids)
            .unwrap_or_else(|e| {
                error!("sql query failed: {sql}: {e}");
                Vec::new()
            })
    }

    // ------------------------------------------------------------------
    // Scoped backlink queries
    // ------------------------------------------------------------------

    /// Counts refs per definition block, scoped to a single document.
    pub fn root_children_ref_count(&self, root_id: &str) -> HashMap<String, usize> {
        let sql = "SELECT def_block_id, COUNT(*) FROM refs WHERE def_block_root_id = ?1 GROUP BY def_block_id";
        self.try_counts(sql, params![root_id]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            HashMap::new()
        })
    }

    /// Counts refs grouped by defining document, across all documents.
    pub fn root_ref_count(&self) -> HashMap<String, usize> {
        let sql = "SELECT def_block_root_id, COUNT(*) FROM refs GROUP BY def_block_root_id";
        self.try_counts(sql, params![]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            HashMap::new()
        })
    }

    /// Documents targeted by references originating anywhere inside
    /// `ref_root_id`.
    pub fn def_root_blocks_by_ref_root_id(&self, ref_root_id: &str) -> Vec<Block> {
        let sql = "SELECT * FROM blocks WHERE id IN (SELECT DISTINCT def_block_root_id FROM refs WHERE root_id = ?1)";
        self.try_blocks(sql, params![ref_root_id]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    /// Documents referencing anywhere inside `def_root_id`.
    pub fn ref_root_blocks_by_def_root_id(&self, def_root_id: &str) -> Vec<Block> {
        let sql = "SELECT * FROM blocks WHERE id IN (SELECT DISTINCT root_id FROM refs WHERE def_block_root_id = ?1)";
        self.try_blocks(sql, params![def_root_id]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    /// Distinct definition ids referenced from within the given document.
    pub fn child_def_ids_by_root_def_id(&self, root_def_id: &str) -> Vec<String> {
        let sql = "SELECT DISTINCT def_block_id FROM refs WHERE def_block_root_id = ?1";
        self.try_ids(sql, params![root_def_id]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    /// Referencing block ids and their anchor texts for a definition.
    ///
    /// With `contain_children` the scope is the whole document rooted at
    /// `def_id` (meaningful when `def_id` is itself a root); otherwise the
    /// single definition block.
    pub fn ref_ids_by_def_id(&self, def_id: &str, contain_children: bool) -> (Vec<String>, Vec<String>) {
        let sql = if contain_children {
            "SELECT block_id, content FROM refs WHERE def_block_root_id = ?1"
        } else {
            "SELECT block_id, content FROM refs WHERE def_block_id = ?1"
        };
        self.try_id_text_pairs(sql, def_id).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            (Vec::new(), Vec::new())
        })
    }

    /// Refs targeting a definition block.
    ///
    /// A document block always scopes root-wide. For any other block,
    /// `contain_children` widens the scope to the block's full descendant
    /// set (resolved through the [`BlockTree`] collaborator); otherwise only
    /// the exact block id is matched. Returns empty if the definition block
    /// cannot be found.
    pub fn refs_by_def_id(&self, def_block_id: &str, contain_children: bool) -> Vec<Ref> {
        let block = match self.db.get_block_by_id(def_block_id) {
            Ok(Some(block)) => block,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("block lookup failed: {def_block_id}: {e}");
                return Vec::new();
            }
        };

        if block.kind == BlockType::Document {
            let sql = "SELECT * FROM refs WHERE def_block_root_id = ?1";
            return self.try_refs(sql, params![def_block_id]).unwrap_or_else(|e| {
                error!("sql query failed: {sql}: {e}");
                Vec::new()
            });
        }

        if contain_children {
            let ids = self.tree.children_ids(def_block_id);
            if ids.is_empty() {
                return Vec::new();
            }
            let placeholders: Vec<String> =
                (0..ids.len()).map(|i| format!("?{}", i + 1)).collect();
            let sql = format!(
                "SELECT * FROM refs WHERE def_block_id IN ({})",
                placeholders.join(", ")
            );
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            return self.try_refs(&sql, param_refs.as_slice()).unwrap_or_else(|e| {
                error!("sql query failed: {sql}: {e}");
                Vec::new()
            });
        }

        let sql = "SELECT * FROM refs WHERE def_block_id = ?1";
        self.try_refs(sql, params![def_block_id]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    /// Exact-pair lookup, used to re-validate a specific link.
    pub fn refs_by_def_id_ref_id(&self, def_block_id: &str, ref_block_id: &str) -> Vec<Ref> {
        let sql = "SELECT * FROM refs WHERE def_block_id = ?1 AND block_id = ?2";
        self.try_refs(sql, params![def_block_id, ref_block_id])
            .unwrap_or_else(|e| {
                error!("sql query failed: {sql}: {e}");
                Vec::new()
            })
    }

    /// The most recently created ref per distinct definition block, newest
    /// first, capped at 32 entries.
    pub fn refs_recent(&self) -> Vec<Ref> {
        let sql = format!(
            "SELECT * FROM refs WHERE id IN (SELECT MAX(id) FROM refs GROUP BY def_block_id)
             ORDER BY id DESC LIMIT {RECENT_REFS_LIMIT}"
        );
        self.try_refs(&sql, params![]).unwrap_or_else(|e| {
            error!("sql query failed: {sql}: {e}");
            Vec::new()
        })
    }

    // ------------------------------------------------------------------
    // Bidirectional def/ref map
    // ------------------------------------------------------------------

    /// Pairs every referencing block with the definition block it points at.
    ///
    /// `condition` is an optional predicate appended verbatim to the
    /// referencing-side join (empty string for none); it is caller-owned SQL
    /// and must not carry untrusted input. Pairs whose definition block does
    /// not resolve are dropped. Output order is unspecified.
    pub fn def_refs(&self, condition: &str) -> Vec<DefRefPair> {
        self.try_def_refs(condition).unwrap_or_else(|e| {
            error!("def/ref map query failed: {e}");
            Vec::new()
        })
    }

    fn try_def_refs(&self, condition: &str) -> Result<Vec<DefRefPair>> {
        let mut sql = "SELECT ref.*, r.block_id || '@' || r.def_block_id AS rel \
                       FROM blocks AS ref, refs AS r WHERE ref.id = r.block_id"
            .to_string();
        if !condition.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(condition);
        }

        let mut referrers: HashMap<String, Block> = HashMap::new();
        {
            let mut stmt = self.db.conn().prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let block = row_to_block(row)?;
                let rel: String = row.get("rel")?;
                Ok((rel, block))
            })?;
            for row in rows {
                let (rel, block) = row?;
                referrers.insert(rel, block);
            }
        }

        let mut defs: HashMap<String, Block> = HashMap::new();
        {
            let mut stmt = self
                .db
                .conn()
                .prepare("SELECT def.* FROM blocks AS def, refs AS r WHERE def.id = r.def_block_id")?;
            let rows = stmt.query_map([], row_to_block)?;
            for row in rows {
                let def = row?;
                defs.insert(def.id.clone(), def);
            }
        }

        let mut pairs = Vec::new();
        for (rel, referrer) in referrers {
            let def_id = rel.splitn(2, '@').nth(1).unwrap_or("");
            let Some(def) = defs.get(def_id) else {
                // Orphaned ref: its definition row is gone. Dropped, not
                // surfaced.
                continue;
            };
            pairs.push(DefRefPair {
                def: def.clone(),
                referrer,
            });
        }
        Ok(pairs)
    }

    // ------------------------------------------------------------------
    // Query plumbing
    // ------------------------------------------------------------------

    fn try_strings(&self, sql: &str) -> Result<Vec<String>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let value = row?;
            if value.trim().is_empty() {
                continue;
            }
            out.push(value);
        }
        Ok(out)
    }

    fn try_ids<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<String>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn try_blocks<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Block>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_block)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn try_refs<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Ref>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_ref)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn try_counts<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<HashMap<String, usize>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (id, count) = row?;
            out.insert(id, count as usize);
        }
        Ok(out)
    }

    fn try_id_text_pairs(&self, sql: &str, def_id: &str) -> Result<(Vec<String>, Vec<String>)> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params![def_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut ids = Vec::new();
        let mut texts = Vec::new();
        for row in rows {
            let (id, text) = row?;
            ids.push(id);
            texts.push(text);
        }
        Ok((ids, texts))
    }

    /// Runs an id query whose parameters are `text` followed by the
    /// exclusion list (or a single empty string when the list is empty).
    fn try_excluding_ids(&self, sql: &str, text: &str, exclude_ids: &[String]) -> Result<Vec<String>> {
        let owned = exclusion_params(text, None, exclude_ids);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            owned.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Runs the name/alias candidate query, returning `(id, name, alias)`
    /// rows for filtering in code.
    fn try_name_alias_rows(
        &self,
        sql: &str,
        text: &str,
        exclude_ids: &[String],
    ) -> Result<Vec<(String, String, String)>> {
        let like = format!("%{text}%");
        let owned = exclusion_params(text, Some(&like), exclude_ids);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            owned.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Builds a bound `NOT IN (...)` tail whose placeholders start at index
/// `start`. An empty exclusion list still produces one placeholder, bound to
/// an empty string, degenerating to a filter that excludes nothing.
fn not_in_clause(start: usize, exclusions: usize) -> String {
    let count = exclusions.max(1);
    let placeholders: Vec<String> = (0..count).map(|i| format!("?{}", start + i)).collect();
    format!("NOT IN ({})", placeholders.join(", "))
}

/// Assembles the owned parameter list matching [`not_in_clause`]: the query
/// text, an optional LIKE pattern, then the exclusion ids (or one empty
/// string when there are none).
fn exclusion_params(
    text: &str,
    like: Option<&str>,
    exclude_ids: &[String],
) -> Vec<Box<dyn rusqlite::types::ToSql>> {
    let mut owned: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(text.to_string())];
    if let Some(like) = like {
        owned.push(Box::new(like.to_string()));
    }
    if exclude_ids.is_empty() {
        owned.push(Box::new(String::new()));
    } else {
        for id in exclude_ids {
            owned.push(Box::new(id.clone()));
        }
    }
    owned
}
