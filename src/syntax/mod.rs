/*!
Pattern text parsing and the pattern tree.

[`parse`] turns pattern text into a [`Pattern`]: a flat, index-addressed
tree of [`Node`]s with character classes normalized into [`CharSet`]s.
This is the only module that looks at pattern text; everything
downstream works on the tree.
*/

pub use self::{
    charset::{ByteRange, CharSet},
    parser::{parse, ParseError, ParseErrorKind},
    pattern::{CharSetRef, Node, NodeRef, Pattern, RepeatKind},
};

mod charset;
mod parser;
mod pattern;
