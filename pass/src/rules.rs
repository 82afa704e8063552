use std::collections::BTreeMap;
use std::fmt::Display;

use crate::Error;

/// Description of one block-RAM primitive from the rules file. Immutable
/// after parsing; every mapping attempt works on a flattened copy of the
/// per-port attributes instead.
///
/// The six per-group vectors are indexed by group number and may be shorter
/// than `groups`; a missing entry reads as 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bram {
    pub name: String,
    /// Whether the primitive supports power-up initialization. Recorded for
    /// downstream tooling; matching does not consult it.
    pub init: usize,
    /// Address width of the primitive.
    pub abits: usize,
    /// Data width of the primitive.
    pub dbits: usize,
    /// Number of port groups.
    pub groups: usize,
    /// Number of physical ports in each group.
    pub ports: Vec<usize>,
    /// 1 if the group's ports are write ports, 0 if read ports.
    pub wrmode: Vec<usize>,
    /// Number of write-enable bits; 0 means writes cannot be masked.
    pub enable: Vec<usize>,
    /// Read transparency: 0 opaque, 1 transparent, >1 configurable (groups
    /// sharing a value share the configuration bit).
    pub transp: Vec<usize>,
    /// Clock group: 0 asynchronous, >0 clocked; groups sharing a value
    /// share a physical clock pin.
    pub clocks: Vec<usize>,
    /// Clock polarity: 0 negedge, 1 posedge, >1 configurable (shared like
    /// `transp`).
    pub clkpol: Vec<usize>,
}

impl Bram {
    pub(crate) fn group_value(vector: &[usize], group: usize) -> usize {
        vector.get(group).copied().unwrap_or(0)
    }
}

/// A match rule: the name of the descriptor to try, plus lower and upper
/// bounds on named memory properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchRule {
    pub name: String,
    pub min_limits: BTreeMap<String, i64>,
    pub max_limits: BTreeMap<String, i64>,
}

/// The parsed rules file: descriptors by name, and match rules in the order
/// they were written, which is the order they are tried in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rules {
    pub brams: BTreeMap<String, Bram>,
    pub matches: Vec<MatchRule>,
}

struct Lines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    /// 1-based number of the most recently returned line; on EOF, of the
    /// last line in the file.
    number: usize,
}

impl<'a> Lines<'a> {
    fn new(source: &'a str) -> Self {
        Lines { lines: source.lines().enumerate(), number: 0 }
    }

    /// Returns the tokens of the next line that has any, skipping blank and
    /// comment-only lines. A token starting with `#` comments out the rest
    /// of its line.
    fn next_tokens(&mut self) -> Option<Vec<&'a str>> {
        for (index, line) in &mut self.lines {
            self.number = index + 1;
            let tokens: Vec<&str> =
                line.split_whitespace().take_while(|token| !token.starts_with('#')).collect();
            if !tokens.is_empty() {
                return Some(tokens);
            }
        }
        None
    }
}

fn parse_value<V: std::str::FromStr>(token: &str, line: usize) -> Result<V, Error> {
    token.parse().map_err(|_| Error::RulesSyntax { line })
}

fn parse_scalar(tokens: &[&str], line: usize) -> Result<usize, Error> {
    if tokens.len() != 2 {
        return Err(Error::RulesSyntax { line });
    }
    parse_value(tokens[1], line)
}

fn parse_vector(tokens: &[&str], line: usize) -> Result<Vec<usize>, Error> {
    if tokens.len() < 2 {
        return Err(Error::RulesSyntax { line });
    }
    tokens[1..].iter().map(|token| parse_value(token, line)).collect()
}

fn parse_bram(lines: &mut Lines, tokens: &[&str]) -> Result<Bram, Error> {
    if tokens.len() != 2 {
        return Err(Error::RulesSyntax { line: lines.number });
    }
    let mut bram = Bram { name: tokens[1].to_owned(), ..Bram::default() };
    while let Some(tokens) = lines.next_tokens() {
        let line = lines.number;
        match tokens[0] {
            "endbram" if tokens.len() == 1 => return Ok(bram),
            "init" => bram.init = parse_scalar(&tokens, line)?,
            "abits" => bram.abits = parse_scalar(&tokens, line)?,
            "dbits" => bram.dbits = parse_scalar(&tokens, line)?,
            "groups" => bram.groups = parse_scalar(&tokens, line)?,
            "ports" => bram.ports = parse_vector(&tokens, line)?,
            "wrmode" => bram.wrmode = parse_vector(&tokens, line)?,
            "enable" => bram.enable = parse_vector(&tokens, line)?,
            "transp" => bram.transp = parse_vector(&tokens, line)?,
            "clocks" => bram.clocks = parse_vector(&tokens, line)?,
            "clkpol" => bram.clkpol = parse_vector(&tokens, line)?,
            _ => return Err(Error::RulesSyntax { line }),
        }
    }
    Err(Error::RulesUnexpectedEof { line: lines.number })
}

fn parse_match(lines: &mut Lines, tokens: &[&str]) -> Result<MatchRule, Error> {
    if tokens.len() != 2 {
        return Err(Error::RulesSyntax { line: lines.number });
    }
    let mut rule = MatchRule { name: tokens[1].to_owned(), ..MatchRule::default() };
    while let Some(tokens) = lines.next_tokens() {
        let line = lines.number;
        match tokens[0] {
            "endmatch" if tokens.len() == 1 => return Ok(rule),
            "min" if tokens.len() == 3 => {
                rule.min_limits.insert(tokens[1].to_owned(), parse_value(tokens[2], line)?);
            }
            "max" if tokens.len() == 3 => {
                rule.max_limits.insert(tokens[1].to_owned(), parse_value(tokens[2], line)?);
            }
            _ => return Err(Error::RulesSyntax { line }),
        }
    }
    Err(Error::RulesUnexpectedEof { line: lines.number })
}

/// Parses the text of a rules file: a sequence of `bram` and `match`
/// blocks, line-oriented, with `#` comments.
pub fn parse_rules(source: &str) -> Result<Rules, Error> {
    let mut rules = Rules::default();
    let mut lines = Lines::new(source);
    while let Some(tokens) = lines.next_tokens() {
        match tokens[0] {
            "bram" => {
                let bram = parse_bram(&mut lines, &tokens)?;
                rules.brams.insert(bram.name.clone(), bram);
            }
            "match" => rules.matches.push(parse_match(&mut lines, &tokens)?),
            _ => return Err(Error::RulesSyntax { line: lines.number }),
        }
    }
    Ok(rules)
}

fn write_vector(f: &mut std::fmt::Formatter, name: &str, vector: &[usize]) -> std::fmt::Result {
    if vector.is_empty() {
        return Ok(());
    }
    write!(f, "  {}", name)?;
    for value in vector {
        write!(f, " {}", value)?;
    }
    writeln!(f)
}

impl Display for Rules {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for bram in self.brams.values() {
            writeln!(f, "bram {}", bram.name)?;
            writeln!(f, "  init {}", bram.init)?;
            writeln!(f, "  abits {}", bram.abits)?;
            writeln!(f, "  dbits {}", bram.dbits)?;
            writeln!(f, "  groups {}", bram.groups)?;
            write_vector(f, "ports", &bram.ports)?;
            write_vector(f, "wrmode", &bram.wrmode)?;
            write_vector(f, "enable", &bram.enable)?;
            write_vector(f, "transp", &bram.transp)?;
            write_vector(f, "clocks", &bram.clocks)?;
            write_vector(f, "clkpol", &bram.clkpol)?;
            writeln!(f, "endbram")?;
        }
        for rule in &self.matches {
            writeln!(f, "match {}", rule.name)?;
            for (property, limit) in &rule.min_limits {
                writeln!(f, "  min {} {}", property, limit)?;
            }
            for (property, limit) in &rule.max_limits {
                writeln!(f, "  max {} {}", property, limit)?;
            }
            writeln!(f, "endmatch")?;
        }
        Ok(())
    }
}
