/// Reference resolution module.
///
/// Resolves block ids and anchor texts to the blocks that define or
/// reference them, maintains the virtual reference keyword set, and derives
/// display labels for definition blocks.
mod ref_text;
mod resolver;

pub use ref_text::RefTextRenderer;
pub use resolver::RefResolver;

/// Access to the block hierarchy, provided by the surrounding application.
pub trait BlockTree {
    /// All descendant block ids of `block_id`, including `block_id` itself.
    fn children_ids(&self, block_id: &str) -> Vec<String>;
}

/// Markup parsing and plain-text extraction, provided by the surrounding
/// application. Container blocks carry no usable `content` of their own, so
/// their display text is extracted from the parsed subtree of their markup.
pub trait MarkupParser {
    /// Parsed subtree handle, produced by `parse` and consumed by
    /// `extract_text`.
    type Tree;

    /// Parses raw markup into a subtree.
    fn parse(&self, markdown: &str) -> Self::Tree;

    /// Recursively extracts the rendered plain text of a parsed subtree.
    fn extract_text(&self, tree: &Self::Tree) -> String;
}
