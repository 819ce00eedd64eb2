use serde::{Deserialize, Serialize};

/// Kinds of blocks in a document tree, discriminated by the short type code
/// stored in the `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// Document root block (`"d"`). Owns the `root_id` of every descendant.
    Document,
    Paragraph,
    Heading,
    List,
    ListItem,
    Blockquote,
    SuperBlock,
    Table,
    CodeBlock,
    MathBlock,
    ThematicBreak,
    AttributeView,
    QueryEmbed,
    IFrame,
    Video,
    Audio,
    Html,
    Widget,
    /// Any type code this crate does not know. Rendering and scoping fall
    /// back to the block's raw content rather than failing.
    Unknown,
}

impl BlockType {
    /// Returns the stored type code for this block kind.
    pub fn as_code(&self) -> &'static str {
        match self {
            BlockType::Document => "d",
            BlockType::Paragraph => "p",
            BlockType::Heading => "h",
            BlockType::List => "l",
            BlockType::ListItem => "i",
            BlockType::Blockquote => "b",
            BlockType::SuperBlock => "s",
            BlockType::Table => "t",
            BlockType::CodeBlock => "c",
            BlockType::MathBlock => "m",
            BlockType::ThematicBreak => "tb",
            BlockType::AttributeView => "av",
            BlockType::QueryEmbed => "query_embed",
            BlockType::IFrame => "iframe",
            BlockType::Video => "video",
            BlockType::Audio => "audio",
            BlockType::Html => "html",
            BlockType::Widget => "widget",
            BlockType::Unknown => "unknown",
        }
    }

    /// Parses a stored type code, mapping unrecognized codes to `Unknown`.
    pub fn from_code(code: &str) -> BlockType {
        match code {
            "d" => BlockType::Document,
            "p" => BlockType::Paragraph,
            "h" => BlockType::Heading,
            "l" => BlockType::List,
            "i" => BlockType::ListItem,
            "b" => BlockType::Blockquote,
            "s" => BlockType::SuperBlock,
            "t" => BlockType::Table,
            "c" => BlockType::CodeBlock,
            "m" => BlockType::MathBlock,
            "tb" => BlockType::ThematicBreak,
            "av" => BlockType::AttributeView,
            "query_embed" => BlockType::QueryEmbed,
            "iframe" => BlockType::IFrame,
            "video" => BlockType::Video,
            "audio" => BlockType::Audio,
            "html" => BlockType::Html,
            "widget" => BlockType::Widget,
            _ => BlockType::Unknown,
        }
    }

    /// True for block kinds whose display text must be extracted from the
    /// parsed subtree of their markup.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockType::List | BlockType::ListItem | BlockType::Blockquote | BlockType::SuperBlock
        )
    }
}

/// A node in a hierarchical document tree.
///
/// Rootness is determined solely by `kind == BlockType::Document`; a root's
/// `root_id` is not assumed to equal its own `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub parent_id: String,
    /// Id of the document block owning this node.
    pub root_id: String,
    /// Notebook/container identifier (stored in column `box`).
    pub box_id: String,
    pub path: String,
    /// Human-readable path.
    pub hpath: String,
    /// Optional explicit label. A non-empty name wins over every
    /// type-specific rendering rule.
    pub name: String,
    /// Comma-separated alternate labels, possibly empty.
    pub alias: String,
    pub memo: String,
    pub tag: String,
    /// Plain text; for documents this is the title.
    pub content: String,
    /// First-line content.
    pub fcontent: String,
    /// Raw markup source.
    pub markdown: String,
    pub length: u32,
    pub kind: BlockType,
    pub subtype: String,
    /// Inline attribute list, opaque to this crate.
    pub ial: String,
    pub sort: i32,
    pub created: String,
    pub updated: String,
}

/// A directed reference edge: a referencing block pointing at a definition
/// block.
///
/// `def_block_root_id` denormalizes the defining document so scoped queries
/// never join through the block hierarchy; the external indexing pipeline
/// keeps it consistent across block moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    pub id: String,
    pub def_block_id: String,
    pub def_block_parent_id: String,
    pub def_block_root_id: String,
    pub def_block_path: String,
    /// Id of the referencing block.
    pub block_id: String,
    /// Root of the referencing block.
    pub root_id: String,
    pub box_id: String,
    pub path: String,
    /// The literal anchor text used in the reference.
    pub content: String,
    pub markdown: String,
    /// Ref type code, opaque to this crate.
    pub kind: String,
}

/// A definition block paired with one of its referencing blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefRefPair {
    pub def: Block,
    pub referrer: Block,
}
