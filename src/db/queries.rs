use rusqlite::params;
use rusqlite::OptionalExtension;

use super::connection::Database;
use crate::errors::{BlockRefError, Result};
use crate::types::*;

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

/// Maps a row from the `blocks` table to a `Block`.
pub fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<Block> {
    let type_code: String = row.get("type")?;

    Ok(Block {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        root_id: row.get("root_id")?,
        box_id: row.get("box")?,
        path: row.get("path")?,
        hpath: row.get("hpath")?,
        name: row.get("name")?,
        alias: row.get("alias")?,
        memo: row.get("memo")?,
        tag: row.get("tag")?,
        content: row.get("content")?,
        fcontent: row.get("fcontent")?,
        markdown: row.get("markdown")?,
        length: row.get::<_, i64>("length")? as u32,
        kind: BlockType::from_code(&type_code),
        subtype: row.get("subtype")?,
        ial: row.get("ial")?,
        sort: row.get("sort")?,
        created: row.get("created")?,
        updated: row.get("updated")?,
    })
}

/// Maps a row from the `refs` table to a `Ref`.
pub fn row_to_ref(row: &rusqlite::Row) -> rusqlite::Result<Ref> {
    Ok(Ref {
        id: row.get("id")?,
        def_block_id: row.get("def_block_id")?,
        def_block_parent_id: row.get("def_block_parent_id")?,
        def_block_root_id: row.get("def_block_root_id")?,
        def_block_path: row.get("def_block_path")?,
        block_id: row.get("block_id")?,
        root_id: row.get("root_id")?,
        box_id: row.get("box")?,
        path: row.get("path")?,
        content: row.get("content")?,
        markdown: row.get("markdown")?,
        kind: row.get("type")?,
    })
}

const INSERT_BLOCK_SQL: &str = "INSERT OR REPLACE INTO blocks
    (id, parent_id, root_id, box, path, hpath, name, alias, memo, tag,
     content, fcontent, markdown, length, type, subtype, ial, sort,
     created, updated)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

const INSERT_REF_SQL: &str = "INSERT OR REPLACE INTO refs
    (id, def_block_id, def_block_parent_id, def_block_root_id, def_block_path,
     block_id, root_id, box, path, content, markdown, type)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

// ---------------------------------------------------------------------------
// Block operations
// ---------------------------------------------------------------------------

impl Database {
    /// Inserts or replaces a single block.
    pub fn upsert_block(&self, block: &Block) -> Result<()> {
        self.conn()
            .execute(
                INSERT_BLOCK_SQL,
                params![
                    block.id,
                    block.parent_id,
                    block.root_id,
                    block.box_id,
                    block.path,
                    block.hpath,
                    block.name,
                    block.alias,
                    block.memo,
                    block.tag,
                    block.content,
                    block.fcontent,
                    block.markdown,
                    block.length as i64,
                    block.kind.as_code(),
                    block.subtype,
                    block.ial,
                    block.sort,
                    block.created,
                    block.updated,
                ],
            )
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to upsert block: {e}"),
                operation: "upsert_block".to_string(),
            })?;
        Ok(())
    }

    /// Inserts or replaces a batch of blocks inside a single transaction.
    pub fn upsert_blocks(&self, blocks: &[Block]) -> Result<()> {
        let tx = self
            .conn()
            .unchecked_transaction()
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to begin transaction: {e}"),
                operation: "upsert_blocks".to_string(),
            })?;

        {
            let mut stmt =
                tx.prepare_cached(INSERT_BLOCK_SQL)
                    .map_err(|e| BlockRefError::Database {
                        message: format!("failed to prepare statement: {e}"),
                        operation: "upsert_blocks".to_string(),
                    })?;

            for block in blocks {
                stmt.execute(params![
                    block.id,
                    block.parent_id,
                    block.root_id,
                    block.box_id,
                    block.path,
                    block.hpath,
                    block.name,
                    block.alias,
                    block.memo,
                    block.tag,
                    block.content,
                    block.fcontent,
                    block.markdown,
                    block.length as i64,
                    block.kind.as_code(),
                    block.subtype,
                    block.ial,
                    block.sort,
                    block.created,
                    block.updated,
                ])
                .map_err(|e| BlockRefError::Database {
                    message: format!("failed to upsert block: {e}"),
                    operation: "upsert_blocks".to_string(),
                })?;
            }
        }

        tx.commit().map_err(|e| BlockRefError::Database {
            message: format!("failed to commit transaction: {e}"),
            operation: "upsert_blocks".to_string(),
        })
    }

    /// Retrieves a block by its unique id, returning `None` if not found.
    pub fn get_block_by_id(&self, id: &str) -> Result<Option<Block>> {
        self.conn()
            .query_row(
                "SELECT * FROM blocks WHERE id = ?1",
                params![id],
                row_to_block,
            )
            .optional()
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to get block by id: {e}"),
                operation: "get_block_by_id".to_string(),
            })
    }

    /// Deletes every block belonging to the given document root.
    pub fn delete_blocks_by_root(&self, root_id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM blocks WHERE root_id = ?1", params![root_id])
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to delete blocks by root: {e}"),
                operation: "delete_blocks_by_root".to_string(),
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ref operations
// ---------------------------------------------------------------------------

impl Database {
    /// Inserts or replaces a single ref edge.
    pub fn upsert_ref(&self, edge: &Ref) -> Result<()> {
        self.conn()
            .execute(
                INSERT_REF_SQL,
                params![
                    edge.id,
                    edge.def_block_id,
                    edge.def_block_parent_id,
                    edge.def_block_root_id,
                    edge.def_block_path,
                    edge.block_id,
                    edge.root_id,
                    edge.box_id,
                    edge.path,
                    edge.content,
                    edge.markdown,
                    edge.kind,
                ],
            )
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to upsert ref: {e}"),
                operation: "upsert_ref".to_string(),
            })?;
        Ok(())
    }

    /// Inserts or replaces a batch of ref edges inside a single transaction.
    pub fn upsert_refs(&self, refs: &[Ref]) -> Result<()> {
        let tx = self
            .conn()
            .unchecked_transaction()
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to begin transaction: {e}"),
                operation: "upsert_refs".to_string(),
            })?;

        {
            let mut stmt =
                tx.prepare_cached(INSERT_REF_SQL)
                    .map_err(|e| BlockRefError::Database {
                        message: format!("failed to prepare statement: {e}"),
                        operation: "upsert_refs".to_string(),
                    })?;

            for edge in refs {
                stmt.execute(params![
                    edge.id,
                    edge.def_block_id,
                    edge.def_block_parent_id,
                    edge.def_block_root_id,
                    edge.def_block_path,
                    edge.block_id,
                    edge.root_id,
                    edge.box_id,
                    edge.path,
                    edge.content,
                    edge.markdown,
                    edge.kind,
                ])
                .map_err(|e| BlockRefError::Database {
                    message: format!("failed to upsert ref: {e}"),
                    operation: "upsert_refs".to_string(),
                })?;
            }
        }

        tx.commit().map_err(|e| BlockRefError::Database {
            message: format!("failed to commit transaction: {e}"),
            operation: "upsert_refs".to_string(),
        })
    }

    /// Deletes every ref edge originating inside the given document root.
    pub fn delete_refs_by_root(&self, root_id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM refs WHERE root_id = ?1", params![root_id])
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to delete refs by root: {e}"),
                operation: "delete_refs_by_root".to_string(),
            })?;
        Ok(())
    }

    /// Removes all data from both tables.
    pub fn clear(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "DELETE FROM refs;
                 DELETE FROM blocks;",
            )
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to clear database: {e}"),
                operation: "clear".to_string(),
            })
    }
}
