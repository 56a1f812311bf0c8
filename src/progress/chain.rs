//! Row tokens handed down through nested traversal
//!
//! Each traversal level receives the chain of its ancestors, derives its own row
//! from the last token, and passes an extended copy to the level below. A level
//! whose bar is disabled still appends a `Reserved` token so row accounting stays
//! intact for its descendants.

use indicatif::ProgressBar;

/// A row in the nested progress display
#[derive(Debug, Clone)]
pub enum RowToken {
    /// No visible bar, but the row index is kept for descendants
    Reserved(usize),
    /// A live bar drawn at `row`
    Active { bar: ProgressBar, row: usize },
}

impl RowToken {
    /// Row a descendant of this token starts from
    ///
    /// A reserved row is handed down as-is; an active bar pushes its child one
    /// row further.
    pub fn effective_row(&self) -> usize {
        match self {
            Self::Reserved(row) => *row,
            Self::Active { row, .. } => row + 1,
        }
    }

    /// Redraw the bar if there is one
    pub fn refresh_if_active(&self) {
        if let Self::Active { bar, .. } = self {
            bar.tick();
        }
    }
}

/// Ordered ancestor tokens, root first
#[derive(Debug, Clone, Default)]
pub struct RowChain {
    tokens: Vec<RowToken>,
}

impl RowChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row the next level down should use; an empty chain starts at row 0
    pub fn next_row(&self) -> usize {
        self.tokens.last().map_or(0, RowToken::effective_row)
    }

    /// Copy of this chain with `token` appended
    pub fn extended(&self, token: RowToken) -> RowChain {
        let mut tokens = self.tokens.clone();
        tokens.push(token);
        RowChain { tokens }
    }

    /// Redraw every live ancestor bar
    pub fn refresh_all(&self) {
        for token in &self.tokens {
            token.refresh_if_active();
        }
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&RowToken> {
        self.tokens.last()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}
