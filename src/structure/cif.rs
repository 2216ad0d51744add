//! mmCIF text reader.
//!
//! Parses the first data block of a CIF/STAR file into [`Block`]s of columnar
//! [`Category`] tables. The same table types are produced by the BinaryCIF
//! decoder, so the model builder never needs to know which format it came from.

use crate::errors::{Result, SurfaceError};
use std::borrow::Cow;

/// A single column of a category, stored in its decoded type.
/// Missing values (`.` and `?` in text, masked values in BinaryCIF) are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Strings, including numbers that were not converted
    Text(Vec<Option<String>>),
    /// Integers
    Int(Vec<Option<i32>>),
    /// Floating point numbers
    Float(Vec<Option<f64>>),
}

impl Column {
    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row` as a string.
    pub fn str(&self, row: usize) -> Option<Cow<'_, str>> {
        match self {
            Column::Text(v) => v.get(row)?.as_deref().map(Cow::Borrowed),
            Column::Int(v) => v.get(row).copied().flatten().map(|x| Cow::Owned(x.to_string())),
            Column::Float(v) => v.get(row).copied().flatten().map(|x| Cow::Owned(x.to_string())),
        }
    }

    /// Value at `row` as a float.
    ///
    /// Handles CIF uncertainty notation like `50.123(4)` by stripping the
    /// parenthesized uncertainty before parsing.
    pub fn f64(&self, row: usize) -> Option<f64> {
        match self {
            Column::Text(v) => {
                let s = v.get(row)?.as_deref()?;
                let s = match s.find('(') {
                    Some(idx) => &s[..idx],
                    None => s,
                };
                s.trim().parse().ok()
            }
            Column::Int(v) => v.get(row).copied().flatten().map(f64::from),
            Column::Float(v) => v.get(row).copied().flatten(),
        }
    }

    /// Value at `row` as an integer.
    pub fn i32(&self, row: usize) -> Option<i32> {
        match self {
            Column::Text(v) => v.get(row)?.as_deref()?.trim().parse().ok(),
            Column::Int(v) => v.get(row).copied().flatten(),
            Column::Float(v) => {
                let x = v.get(row).copied().flatten()?;
                (x.fract() == 0.0).then_some(x as i32)
            }
        }
    }
}

/// A named table of equally long columns (`_atom_site`, `_entity`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    name: String,
    row_count: usize,
    fields: Vec<(String, Column)>,
}

impl Category {
    /// Create an empty category. The name is stored without the leading underscore.
    pub fn new(name: &str, row_count: usize) -> Self {
        Self {
            name: normalize_name(name),
            row_count,
            fields: Vec::new(),
        }
    }

    /// Category name without the leading underscore, lowercased.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows shared by all fields.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Add a field; its length must match the category row count.
    pub fn push_field(&mut self, name: &str, column: Column) -> Result<()> {
        if column.len() != self.row_count {
            return Err(SurfaceError::parse(format!(
                "field _{}.{name} has {} rows, expected {}",
                self.name,
                column.len(),
                self.row_count
            )));
        }
        self.fields.push((name.to_ascii_lowercase(), column));
        Ok(())
    }

    /// Look up a field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&Column> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| c)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('_').to_ascii_lowercase()
}

/// One data block: the categories of a single entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Data block name (`data_<name>`)
    pub name: String,
    categories: Vec<Category>,
}

impl Block {
    /// Create an empty block.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            categories: Vec::new(),
        }
    }

    /// Look up a category by name, with or without the leading underscore.
    pub fn category(&self, name: &str) -> Option<&Category> {
        let name = normalize_name(name);
        self.categories.iter().find(|c| c.name == name)
    }

    /// Append a category.
    pub fn push_category(&mut self, category: Category) {
        self.categories.push(category);
    }

    /// Names of all categories in file order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }
}

/// Parse mmCIF text and return its first data block.
pub fn parse(input: &str) -> Result<Block> {
    Parser::new(input).parse_first_block()
}

#[derive(Debug)]
enum Token<'a> {
    DataBlock(&'a str),
    Loop,
    SaveStart,
    SaveEnd,
    Tag(&'a str),
    Value(Option<&'a str>),
    Eof,
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    at_line_start: bool,
    pending: Option<Token<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            at_line_start: true,
            pending: None,
        }
    }

    fn parse_first_block(mut self) -> Result<Block> {
        let mut block: Option<Block> = None;
        loop {
            match self.next()? {
                Token::Eof => break,
                Token::DataBlock(name) => {
                    if block.is_some() {
                        // Only the first block describes the entry
                        break;
                    }
                    block = Some(Block::new(name));
                }
                Token::Loop => {
                    let category = self.parse_loop()?;
                    current(&mut block)?.push_category(category);
                }
                Token::Tag(tag) => {
                    let value = match self.next()? {
                        Token::Value(v) => v,
                        other => {
                            return Err(SurfaceError::parse(format!(
                                "tag {tag} is followed by {other:?} instead of a value"
                            )))
                        }
                    };
                    push_pair(current(&mut block)?, tag, value)?;
                }
                Token::SaveStart => self.skip_save_frame()?,
                Token::SaveEnd => {}
                Token::Value(v) => {
                    return Err(SurfaceError::parse(format!(
                        "unexpected value {v:?} at byte offset {}",
                        self.pos
                    )))
                }
            }
        }
        block.ok_or_else(|| SurfaceError::parse("no data block found"))
    }

    fn parse_loop(&mut self) -> Result<Category> {
        let mut tags: Vec<&str> = Vec::new();
        loop {
            match self.next()? {
                Token::Tag(tag) => tags.push(tag),
                other => {
                    self.push_back(other);
                    break;
                }
            }
        }
        if tags.is_empty() {
            return Err(SurfaceError::parse("loop_ without tags"));
        }

        let mut values: Vec<Option<&str>> = Vec::new();
        loop {
            match self.next()? {
                Token::Value(v) => values.push(v),
                other => {
                    self.push_back(other);
                    break;
                }
            }
        }
        if values.len() % tags.len() != 0 {
            return Err(SurfaceError::parse(format!(
                "loop over {} has {} values, not a multiple of {} tags",
                tags[0],
                values.len(),
                tags.len()
            )));
        }

        let (category_name, _) = split_tag(tags[0])?;
        let row_count = values.len() / tags.len();
        let mut category = Category::new(category_name, row_count);
        for (col, tag) in tags.iter().enumerate() {
            let (cat, field) = split_tag(tag)?;
            if !cat.eq_ignore_ascii_case(category_name) {
                return Err(SurfaceError::parse(format!(
                    "loop mixes categories {category_name} and {cat}"
                )));
            }
            let column = values
                .iter()
                .skip(col)
                .step_by(tags.len())
                .map(|v| v.map(str::to_string))
                .collect();
            category.push_field(field, Column::Text(column))?;
        }
        Ok(category)
    }

    fn skip_save_frame(&mut self) -> Result<()> {
        loop {
            match self.next()? {
                Token::SaveEnd | Token::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn next(&mut self) -> Result<Token<'a>> {
        if let Some(t) = self.pending.take() {
            return Ok(t);
        }
        self.scan_token()
    }

    fn push_back(&mut self, token: Token<'a>) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(token);
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    self.at_line_start = true;
                }
                b'#' => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self) -> Result<Token<'a>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.bytes.len() {
            return Ok(Token::Eof);
        }

        let b = self.bytes[self.pos];

        // Semicolon text field (only valid at line start)
        if b == b';' && self.at_line_start {
            return self.scan_text_field();
        }
        self.at_line_start = false;

        if b == b'\'' || b == b'"' {
            return self.scan_quoted(b);
        }

        let start = self.pos;
        while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Ok(classify_unquoted(&self.input[start..self.pos]))
    }

    fn scan_quoted(&mut self, quote: u8) -> Result<Token<'a>> {
        let start = self.pos;
        self.pos += 1;
        loop {
            if self.pos >= self.bytes.len() {
                return Err(SurfaceError::parse(format!(
                    "unterminated quoted string at byte offset {start}"
                )));
            }
            // A closing quote must be followed by whitespace or the end of input
            if self.bytes[self.pos] == quote
                && (self.pos + 1 >= self.bytes.len()
                    || self.bytes[self.pos + 1].is_ascii_whitespace())
            {
                let value = &self.input[start + 1..self.pos];
                self.pos += 1;
                return Ok(Token::Value(Some(value)));
            }
            self.pos += 1;
        }
    }

    fn scan_text_field(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let content_start = self.pos + 1;
        let Some(offset) = self.input[content_start..].find("\n;") else {
            return Err(SurfaceError::parse(format!(
                "unterminated semicolon text field at byte offset {start}"
            )));
        };
        let newline = content_start + offset;
        let content = self.input[content_start..newline]
            .trim_start_matches(['\r', '\n'])
            .trim_end_matches('\r');
        self.pos = newline + 2;
        self.at_line_start = false;
        Ok(Token::Value(Some(content)))
    }
}

fn classify_unquoted(token: &str) -> Token<'_> {
    let lower = token.to_ascii_lowercase();
    if lower.starts_with("data_") {
        Token::DataBlock(&token[5..])
    } else if lower == "loop_" {
        Token::Loop
    } else if lower == "save_" {
        Token::SaveEnd
    } else if lower.starts_with("save_") {
        Token::SaveStart
    } else if token.starts_with('_') {
        Token::Tag(token)
    } else if token == "." || token == "?" {
        Token::Value(None)
    } else {
        Token::Value(Some(token))
    }
}

fn current(block: &mut Option<Block>) -> Result<&mut Block> {
    block
        .as_mut()
        .ok_or_else(|| SurfaceError::parse("data found before the first data_ block"))
}

fn split_tag(tag: &str) -> Result<(&str, &str)> {
    let tag = tag.trim_start_matches('_');
    tag.split_once('.')
        .ok_or_else(|| SurfaceError::parse(format!("tag _{tag} has no category prefix")))
}

fn push_pair(block: &mut Block, tag: &str, value: Option<&str>) -> Result<()> {
    let (category_name, field) = split_tag(tag)?;
    let column = Column::Text(vec![value.map(str::to_string)]);
    let name = normalize_name(category_name);
    match block.categories.iter_mut().find(|c| c.name == name) {
        Some(category) => category.push_field(field, column),
        None => {
            let mut category = Category::new(category_name, 1);
            category.push_field(field, column)?;
            block.push_category(category);
            Ok(())
        }
    }
}
