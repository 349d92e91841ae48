use crate::parser::Span;

/// Source code position of an expression in a node's text
#[derive(Clone, Copy, Debug)]
pub enum Pos {
    No,
    Pos {
        from_offset: usize,
        from_line: usize,
        from_column: usize,
        upto_offset: usize,
        upto_line: usize,
        upto_column: usize,
    },
}

// This is so we can easily use derive(PartialEq) on datatypes like `Expr` which contain `Pos`,
// since the source position an AST node comes from doesn't effect its equality
impl PartialEq for Pos {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Pos {}

impl Pos {
    /// Construct a position from the difference of two Spans
    pub fn from_upto(from: Span<'_>, upto: Span<'_>) -> Self {
        Self::Pos {
            from_offset: from.location_offset(),
            from_line: from.location_line() as usize,
            from_column: from.get_utf8_column(),
            upto_offset: upto.location_offset(),
            upto_line: upto.location_line() as usize,
            upto_column: upto.get_utf8_column(),
        }
    }

    /// Retrieves the `from_offset` attribute, if present
    pub fn get_from_offset(&self) -> Option<usize> {
        match self {
            Self::No => None,
            Self::Pos { from_offset, .. } => Some(*from_offset),
        }
    }

    /// Slices the source text this position was taken from
    pub fn snippet<'a>(&self, input: &'a str) -> Option<&'a str> {
        match self {
            Self::No => None,
            Self::Pos {
                from_offset,
                upto_offset,
                ..
            } => input.get(*from_offset..*upto_offset),
        }
    }
}
