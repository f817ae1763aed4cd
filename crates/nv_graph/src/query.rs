//! Conjunctive triple-pattern queries.
//!
//! Grammar (keywords case-insensitive, `#` comments run to end of line):
//!
//! ```text
//! query      := [ SELECT [DISTINCT] projection WHERE ] block
//! projection := '*' | var+
//! block      := '{' patterns '}' | patterns        (braces required after WHERE)
//! patterns   := pattern ( ('.' | newline)+ pattern )*
//! pattern    := term term term
//! term       := var | identifier
//! var        := '?' [A-Za-z0-9_-]+
//! ```
//!
//! Evaluation is a naive nested-loop join: each stored triple is unified with
//! the first pattern, and every successful partial binding is extended
//! against the next pattern. Results come out in triple insertion order.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::Serialize;

use crate::error::GraphError;
use crate::triple::Triple;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Pattern {
    fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Vars(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    patterns: Vec<Pattern>,
    projection: Projection,
    distinct: bool,
}

/// Variable name → bound identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Binding(BTreeMap<String, String>);

impl Binding {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, var: &str) -> Option<&str> {
        self.0.get(var).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn project(mut self, vars: &[String]) -> Self {
        self.0.retain(|k, _| vars.contains(k));
        self
    }
}

impl Query {
    pub fn parse(source: &str) -> Result<Self, GraphError> {
        Parser::new(source).parse()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Variables in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for term in self.patterns.iter().flat_map(Pattern::terms) {
            if let Term::Var(name) = term {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }
}

impl FromStr for Query {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Query::parse(s)
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────────

pub fn evaluate(query: &Query, triples: &[Triple]) -> Vec<Binding> {
    let mut complete = Vec::new();
    extend(&query.patterns, triples, &Binding::default(), &mut complete);

    let projected = complete.into_iter().map(|binding| match &query.projection {
        Projection::All => binding,
        Projection::Vars(vars) => binding.project(vars),
    });

    if query.distinct {
        let mut seen = HashSet::new();
        projected.filter(|b| seen.insert(b.clone())).collect()
    } else {
        projected.collect()
    }
}

fn extend(patterns: &[Pattern], triples: &[Triple], partial: &Binding, out: &mut Vec<Binding>) {
    let Some((first, rest)) = patterns.split_first() else {
        out.push(partial.clone());
        return;
    };
    for triple in triples {
        if let Some(next) = unify(first, triple, partial) {
            extend(rest, triples, &next, out);
        }
    }
}

fn unify(pattern: &Pattern, triple: &Triple, partial: &Binding) -> Option<Binding> {
    let mut binding = partial.clone();
    bind(&pattern.subject, &triple.subject, &mut binding)?;
    bind(&pattern.predicate, &triple.predicate, &mut binding)?;
    bind(&pattern.object, &triple.object, &mut binding)?;
    Some(binding)
}

fn bind(term: &Term, value: &str, binding: &mut Binding) -> Option<()> {
    match term {
        Term::Literal(lit) => (lit == value).then_some(()),
        Term::Var(name) => match binding.0.get(name) {
            Some(bound) => (bound == value).then_some(()),
            None => {
                binding.0.insert(name.clone(), value.to_string());
                Some(())
            }
        },
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Dot,
    Newline,
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            '\n' => {
                tokens.push(Token { kind: TokenKind::Newline, pos });
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            '{' | '}' => {
                let kind = if c == '{' { TokenKind::Open } else { TokenKind::Close };
                tokens.push(Token { kind, pos });
                chars.next();
            }
            _ => {
                let mut end = pos;
                while let Some((i, c)) =
                    chars.next_if(|&(_, c)| !c.is_whitespace() && c != '{' && c != '}')
                {
                    end = i + c.len_utf8();
                }
                let word = &src[pos..end];
                if word == "." {
                    tokens.push(Token { kind: TokenKind::Dot, pos });
                } else if let Some(stripped) = word.strip_suffix('.') {
                    tokens.push(Token { kind: TokenKind::Word(stripped.to_string()), pos });
                    tokens.push(Token { kind: TokenKind::Dot, pos: end - 1 });
                } else {
                    tokens.push(Token { kind: TokenKind::Word(word.to_string()), pos });
                }
            }
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    end: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            tokens: tokenize(source),
            idx: 0,
            end: source.len(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn pos(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token { kind: TokenKind::Newline, .. })) {
            self.idx += 1;
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse(mut self) -> Result<Query, GraphError> {
        self.skip_newlines();
        let mut projection = Projection::All;
        let mut distinct = false;
        let has_header = self.at_keyword("SELECT");
        if has_header {
            self.idx += 1;
            self.skip_newlines();
            if self.at_keyword("DISTINCT") {
                self.idx += 1;
                distinct = true;
            }
            projection = self.parse_projection()?;
        }

        let body = self.take_body(has_header)?;
        let patterns = parse_patterns(&body, self.end)?;
        if patterns.is_empty() {
            return Err(GraphError::syntax(self.end, "query has no triple patterns"));
        }

        let query = Query {
            patterns,
            projection,
            distinct,
        };
        if let Projection::Vars(vars) = &query.projection {
            let known = query.variables();
            if let Some(missing) = vars.iter().find(|v| !known.contains(&v.as_str())) {
                return Err(GraphError::syntax(
                    0,
                    format!("projected variable ?{missing} does not occur in any pattern"),
                ));
            }
        }
        Ok(query)
    }

    fn parse_projection(&mut self) -> Result<Projection, GraphError> {
        let mut vars = Vec::new();
        let mut star = false;
        loop {
            self.skip_newlines();
            let pos = self.pos();
            let Some(token) = self.peek().cloned() else {
                return Err(GraphError::syntax(pos, "expected WHERE after SELECT list"));
            };
            match token.kind {
                TokenKind::Word(w) if w.eq_ignore_ascii_case("WHERE") => {
                    self.idx += 1;
                    break;
                }
                TokenKind::Word(w) if w == "*" => {
                    star = true;
                    self.idx += 1;
                }
                TokenKind::Word(w) => {
                    match parse_term(&w, pos)? {
                        Term::Var(name) => vars.push(name),
                        Term::Literal(_) => {
                            return Err(GraphError::syntax(pos, format!("expected variable in SELECT list, found '{w}'")));
                        }
                    }
                    self.idx += 1;
                }
                _ => return Err(GraphError::syntax(pos, "expected WHERE after SELECT list")),
            }
        }
        match (star, vars.is_empty()) {
            (true, true) => Ok(Projection::All),
            (false, false) => Ok(Projection::Vars(vars)),
            (true, false) => Err(GraphError::syntax(0, "'*' cannot be combined with named variables")),
            (false, true) => Err(GraphError::syntax(0, "SELECT needs at least one variable or '*'")),
        }
    }

    /// Tokens between the braces (or all remaining tokens without braces).
    fn take_body(&mut self, braces_required: bool) -> Result<Vec<Token>, GraphError> {
        self.skip_newlines();
        let opened = matches!(self.peek(), Some(Token { kind: TokenKind::Open, .. }));
        if !opened {
            if braces_required {
                return Err(GraphError::syntax(self.pos(), "expected '{' after WHERE"));
            }
            let rest: Vec<Token> = self.tokens[self.idx..].to_vec();
            if let Some(close) = rest.iter().find(|t| t.kind == TokenKind::Close) {
                return Err(GraphError::syntax(close.pos, "unmatched '}'"));
            }
            if let Some(open) = rest.iter().find(|t| t.kind == TokenKind::Open) {
                return Err(GraphError::syntax(open.pos, "unexpected '{' inside patterns"));
            }
            self.idx = self.tokens.len();
            return Ok(rest);
        }

        let open_pos = self.pos();
        self.idx += 1;
        let mut body = Vec::new();
        loop {
            let Some(token) = self.peek().cloned() else {
                return Err(GraphError::syntax(open_pos, "unclosed '{'"));
            };
            self.idx += 1;
            match token.kind {
                TokenKind::Close => break,
                TokenKind::Open => return Err(GraphError::syntax(token.pos, "nested '{' is not supported")),
                _ => body.push(token),
            }
        }
        self.skip_newlines();
        if let Some(extra) = self.peek() {
            return Err(GraphError::syntax(extra.pos, "unexpected input after '}'"));
        }
        Ok(body)
    }
}

fn parse_patterns(tokens: &[Token], end: usize) -> Result<Vec<Pattern>, GraphError> {
    let mut patterns = Vec::new();
    let mut group: Vec<(String, usize)> = Vec::new();
    for token in tokens.iter().map(Some).chain(std::iter::once(None)) {
        match token.map(|t| &t.kind) {
            Some(TokenKind::Word(w)) => {
                group.push((w.clone(), token.map_or(end, |t| t.pos)));
            }
            _ => {
                if group.is_empty() {
                    continue;
                }
                if group.len() != 3 {
                    return Err(GraphError::syntax(
                        group[0].1,
                        format!("expected 3 terms (subject predicate object), found {}", group.len()),
                    ));
                }
                let mut terms = group
                    .drain(..)
                    .map(|(w, pos)| parse_term(&w, pos))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter();
                if let (Some(subject), Some(predicate), Some(object)) = (terms.next(), terms.next(), terms.next()) {
                    patterns.push(Pattern {
                        subject,
                        predicate,
                        object,
                    });
                }
            }
        }
    }
    Ok(patterns)
}

fn parse_term(word: &str, pos: usize) -> Result<Term, GraphError> {
    let Some(name) = word.strip_prefix('?') else {
        return Ok(Term::Literal(word.to_string()));
    };
    if name.is_empty() {
        return Err(GraphError::syntax(pos, "variable name missing after '?'"));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(GraphError::syntax(pos, format!("invalid variable name '?{name}'")));
    }
    Ok(Term::Var(name.to_string()))
}
