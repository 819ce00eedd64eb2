use tracing::error;

use super::MarkupParser;
use crate::db::Database;
use crate::types::BlockType;

/// Prefix identifying asset paths. Assets are not block-backed; their id is
/// already the displayable path.
const ASSETS_PREFIX: &str = "assets";

/// Placeholder label for definition ids that no longer resolve to a block.
const NOT_FOUND_TEXT: &str = "block not found";

/// Derives the human-readable label of a definition block.
pub struct RefTextRenderer<'a, P: MarkupParser> {
    db: &'a Database,
    parser: &'a P,
}

impl<'a, P: MarkupParser> RefTextRenderer<'a, P> {
    pub fn new(db: &'a Database, parser: &'a P) -> Self {
        Self { db, parser }
    }

    /// Resolves the display text for `def_block_id`.
    ///
    /// A non-empty block name always wins. Otherwise the label is derived
    /// from the block kind: documents use their title, embed/media kinds a
    /// fixed label plus their markup, container kinds the plain text
    /// extracted from their parsed markup, and everything else falls back to
    /// the block's content.
    pub fn ref_text(&self, def_block_id: &str) -> String {
        let block = match self.db.get_block_by_id(def_block_id) {
            Ok(Some(block)) => block,
            Ok(None) => return missing_text(def_block_id),
            Err(e) => {
                error!("block lookup failed: {def_block_id}: {e}");
                return missing_text(def_block_id);
            }
        };

        if !block.name.is_empty() {
            return block.name;
        }

        match block.kind {
            BlockType::Document => block.content,
            BlockType::QueryEmbed => format!("Query Embed Block {}", block.markdown),
            BlockType::IFrame => format!("IFrame {}", block.markdown),
            BlockType::ThematicBreak => "Thematic Break".to_string(),
            BlockType::Video => format!("Video {}", block.markdown),
            BlockType::Audio => format!("Audio {}", block.markdown),
            ref kind if kind.is_container() => {
                let tree = self.parser.parse(&block.markdown);
                self.parser.extract_text(&tree)
            }
            _ => block.content,
        }
    }
}

fn missing_text(def_block_id: &str) -> String {
    if def_block_id.starts_with(ASSETS_PREFIX) {
        return def_block_id.to_string();
    }
    NOT_FOUND_TEXT.to_string()
}
