//! Compound CSS selectors
//!
//! Supports the subset report pages are wired with: type, `#id`, `.class`,
//! attribute presence and `=`, `^=`, `$=`, `*=`, `~=` matches, and comma
//! separated selector lists. Combinators are not supported; structural
//! relations are expressed by the caller (see `toggle::Relation`).

use anyhow::Result;
use std::fmt;

use super::Element;

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[a=v]`
    Equals,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
    /// `[a*=v]`
    Contains,
    /// `[a~=v]`
    Word,
}

impl AttrOp {
    fn symbol(self) -> &'static str {
        match self {
            AttrOp::Equals => "=",
            AttrOp::Prefix => "^=",
            AttrOp::Suffix => "$=",
            AttrOp::Contains => "*=",
            AttrOp::Word => "~=",
        }
    }

    /// Empty values never match for the substring operators, as in CSS
    fn test(self, actual: &str, expected: &str) -> bool {
        if expected.is_empty() && self != AttrOp::Equals {
            return false;
        }
        match self {
            AttrOp::Equals => actual == expected,
            AttrOp::Prefix => actual.starts_with(expected),
            AttrOp::Suffix => actual.ends_with(expected),
            AttrOp::Contains => actual.contains(expected),
            AttrOp::Word => actual.split_ascii_whitespace().any(|w| w == expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    pub name: String,
    pub op: Option<(AttrOp, String)>,
}

/// One selector without combinators, e.g. `input.creq[type=checkbox]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatch>,
}

impl Compound {
    pub fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        self.attrs.iter().all(|m| match (&m.op, el.attr(&m.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some((op, expected)), Some(actual)) => op.test(actual, expected),
        })
    }
}

/// Comma separated list of compound selectors; matches if any alternative does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Compound>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                anyhow::bail!("empty selector in '{}'", input);
            }
            let compound = parse_compound(part)
                .map_err(|e| anyhow::anyhow!("invalid selector '{}': {}", input, e))?;
            alternatives.push(compound);
        }
        Ok(Self { alternatives })
    }

    pub fn alternatives(&self) -> &[Compound] {
        &self.alternatives
    }

    /// Add an attribute condition to every alternative
    pub fn with_attr(mut self, name: &str, op: AttrOp, value: &str) -> Self {
        for compound in &mut self.alternatives {
            compound.attrs.push(AttrMatch {
                name: name.to_ascii_lowercase(),
                op: Some((op, value.to_string())),
            });
        }
        self
    }

    pub fn matches(&self, el: &Element) -> bool {
        self.alternatives.iter().any(|c| c.matches(el))
    }
}

impl std::str::FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{}", tag)?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        for attr in &self.attrs {
            match &attr.op {
                None => write!(f, "[{}]", attr.name)?,
                Some((op, value)) => write!(f, "[{}{}'{}']", attr.name, op.symbol(), value)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, compound) in self.alternatives.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", compound)?;
        }
        Ok(())
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(input: &str) -> Result<Compound> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first() == Some(&'*') {
        pos += 1;
    } else {
        let tag = read_ident(&chars, &mut pos);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                let id = read_ident(&chars, &mut pos);
                if id.is_empty() {
                    anyhow::bail!("expected id after '#'");
                }
                compound.id = Some(id);
            }
            '.' => {
                pos += 1;
                let class = read_ident(&chars, &mut pos);
                if class.is_empty() {
                    anyhow::bail!("expected class after '.'");
                }
                compound.classes.push(class);
            }
            '[' => {
                pos += 1;
                compound.attrs.push(parse_attr(&chars, &mut pos)?);
            }
            c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                anyhow::bail!("combinators are not supported");
            }
            c => anyhow::bail!("unexpected character '{}'", c),
        }
    }

    if compound == Compound::default() && chars.first() != Some(&'*') {
        anyhow::bail!("selector matches nothing");
    }
    Ok(compound)
}

fn parse_attr(chars: &[char], pos: &mut usize) -> Result<AttrMatch> {
    let name = read_ident(chars, pos).to_ascii_lowercase();
    if name.is_empty() {
        anyhow::bail!("expected attribute name after '['");
    }
    let op = match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            return Ok(AttrMatch { name, op: None });
        }
        Some('=') => {
            *pos += 1;
            AttrOp::Equals
        }
        Some(&c) if chars.get(*pos + 1) == Some(&'=') => {
            *pos += 2;
            match c {
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Contains,
                '~' => AttrOp::Word,
                other => anyhow::bail!("unsupported attribute operator '{}='", other),
            }
        }
        _ => anyhow::bail!("unterminated attribute selector"),
    };

    let value = match chars.get(*pos) {
        Some(&q @ ('"' | '\'')) => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != q {
                *pos += 1;
            }
            if *pos >= chars.len() {
                anyhow::bail!("unterminated quoted attribute value");
            }
            let value: String = chars[start..*pos].iter().collect();
            *pos += 1;
            value
        }
        _ => {
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != ']' {
                *pos += 1;
            }
            chars[start..*pos].iter().collect::<String>().trim().to_string()
        }
    };

    if chars.get(*pos) != Some(&']') {
        anyhow::bail!("expected ']' after attribute value");
    }
    *pos += 1;
    Ok(AttrMatch {
        name,
        op: Some((op, value)),
    })
}
