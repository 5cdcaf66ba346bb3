//! Template rendering: fill a document template with a record's fields.
//!
//! Templates use a small Jinja-style subset so LaTeX sources written for the
//! usual `{{ field }}` / `{% for %}` conventions work unchanged:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `{{ a.b }}` | substitute a scalar field |
//! | `{{ a \| upper }}` | apply a filter (`upper`, `lower`, `latex`) |
//! | `{% for x in list %}…{% endfor %}` | repeat over an array |
//! | `{% if [not] a %}…{% else %}…{% endif %}` | conditional on truthiness |
//! | `{# … #}` | comment |
//!
//! A [`Template`] is parsed once and shared read-only between jobs. The
//! render context is any `Serialize` value, converted to `serde_json::Value`,
//! so the template sees exactly the record's serialised field names.
//!
//! Every field a template mentions must exist. [`Template::validate_against`]
//! walks *both* branches of every conditional against a sample record so a
//! schema mismatch is caught once, before any job runs.

use crate::error::TemplateError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}|\{#.*?#\}").expect("valid tag regex")
});

static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid path regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Upper,
    Lower,
    Latex,
}

impl Filter {
    fn parse(name: &str, line: usize) -> Result<Self, TemplateError> {
        match name {
            "upper" => Ok(Filter::Upper),
            "lower" => Ok(Filter::Lower),
            "latex" => Ok(Filter::Latex),
            other => Err(TemplateError::UnknownFilter {
                line,
                name: other.to_string(),
            }),
        }
    }

    fn apply(self, s: String) -> String {
        match self {
            Filter::Upper => s.to_uppercase(),
            Filter::Lower => s.to_lowercase(),
            Filter::Latex => escape_latex(&s),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var {
        path: String,
        filters: Vec<Filter>,
        line: usize,
    },
    For {
        var: String,
        path: String,
        body: Vec<Node>,
        line: usize,
    },
    If {
        path: String,
        negate: bool,
        then: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
}

/// A parsed, reusable template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source text.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source);
        let mut pos = 0;
        let (nodes, end) = parse_block(&tokens, &mut pos)?;
        if let Some((tag, line)) = end {
            return Err(TemplateError::Syntax {
                line,
                detail: format!("unexpected '{{% {tag} %}}' without an open block"),
            });
        }
        Ok(Self { nodes })
    }

    /// Render against any serialisable record.
    pub fn render<T: Serialize>(&self, record: &T) -> Result<String, TemplateError> {
        let root = to_context(record)?;
        let mut out = String::new();
        let mut scope = Scope::new(&root);
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }

    /// Check every reference in every branch resolves against `sample`.
    ///
    /// Loop bodies are checked against the first element of the sample's
    /// array; a loop over an empty sample array is not descended into.
    pub fn validate_against<T: Serialize>(&self, sample: &T) -> Result<(), TemplateError> {
        let root = to_context(sample)?;
        let mut scope = Scope::new(&root);
        validate_nodes(&self.nodes, &mut scope)
    }
}

fn to_context<T: Serialize>(record: &T) -> Result<Value, TemplateError> {
    serde_json::to_value(record).map_err(|e| TemplateError::Syntax {
        line: 0,
        detail: format!("record is not serialisable: {e}"),
    })
}

// ── Tokenizer ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Token {
    Text(String),
    Var(String, usize),
    Block(String, usize),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in TAG_RE.captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > last {
            tokens.push(Token::Text(source[last..whole.start()].to_string()));
        }
        let line = source[..whole.start()].matches('\n').count() + 1;
        if let Some(var) = caps.get(1) {
            tokens.push(Token::Var(var.as_str().trim().to_string(), line));
        } else if let Some(block) = caps.get(2) {
            tokens.push(Token::Block(block.as_str().trim().to_string(), line));
        }
        last = whole.end();
    }
    if last < source.len() {
        tokens.push(Token::Text(source[last..].to_string()));
    }
    tokens
}

// ── Parser ───────────────────────────────────────────────────────────────

/// Parse nodes until a closing tag (`endfor`, `endif`, `else`) or EOF.
/// Returns the closing tag, if any, so the caller can check it matches.
fn parse_block(
    tokens: &[Token],
    pos: &mut usize,
) -> Result<(Vec<Node>, Option<(String, usize)>), TemplateError> {
    let mut nodes = Vec::new();
    while *pos < tokens.len() {
        let token = &tokens[*pos];
        *pos += 1;
        match token {
            Token::Text(t) => nodes.push(Node::Text(t.clone())),
            Token::Var(expr, line) => nodes.push(parse_var(expr, *line)?),
            Token::Block(stmt, line) => {
                let line = *line;
                let words: Vec<&str> = stmt.split_whitespace().collect();
                match words.as_slice() {
                    ["for", var, "in", path] => {
                        check_path(path, line)?;
                        let (body, end) = parse_block(tokens, pos)?;
                        expect_end(end, "endfor", line)?;
                        nodes.push(Node::For {
                            var: var.to_string(),
                            path: path.to_string(),
                            body,
                            line,
                        });
                    }
                    ["if", rest @ ..] => {
                        let (negate, path) = match rest {
                            ["not", path] => (true, *path),
                            [path] => (false, *path),
                            _ => {
                                return Err(TemplateError::Syntax {
                                    line,
                                    detail: format!("malformed condition '{stmt}'"),
                                })
                            }
                        };
                        check_path(path, line)?;
                        let (then, end) = parse_block(tokens, pos)?;
                        let otherwise = match end {
                            Some((ref tag, _)) if tag == "else" => {
                                let (otherwise, end) = parse_block(tokens, pos)?;
                                expect_end(end, "endif", line)?;
                                otherwise
                            }
                            other => {
                                expect_end(other, "endif", line)?;
                                Vec::new()
                            }
                        };
                        nodes.push(Node::If {
                            path: path.to_string(),
                            negate,
                            then,
                            otherwise,
                            line,
                        });
                    }
                    [tag @ ("endfor" | "endif" | "else")] => {
                        return Ok((nodes, Some((tag.to_string(), line))));
                    }
                    _ => {
                        return Err(TemplateError::Syntax {
                            line,
                            detail: format!("unknown block '{{% {stmt} %}}'"),
                        })
                    }
                }
            }
        }
    }
    Ok((nodes, None))
}

fn expect_end(
    end: Option<(String, usize)>,
    expected: &str,
    opened_at: usize,
) -> Result<(), TemplateError> {
    match end {
        Some((tag, _)) if tag == expected => Ok(()),
        Some((tag, line)) => Err(TemplateError::Syntax {
            line,
            detail: format!("expected '{expected}', found '{tag}'"),
        }),
        None => Err(TemplateError::Syntax {
            line: opened_at,
            detail: format!("block opened here is never closed with '{expected}'"),
        }),
    }
}

fn parse_var(expr: &str, line: usize) -> Result<Node, TemplateError> {
    let mut parts = expr.split('|').map(str::trim);
    let path = parts.next().unwrap_or_default();
    check_path(path, line)?;
    let filters = parts
        .map(|name| Filter::parse(name, line))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::Var {
        path: path.to_string(),
        filters,
        line,
    })
}

fn check_path(path: &str, line: usize) -> Result<(), TemplateError> {
    if PATH_RE.is_match(path) {
        Ok(())
    } else {
        Err(TemplateError::Syntax {
            line,
            detail: format!("invalid reference '{path}'"),
        })
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────

struct Scope<'a> {
    root: &'a Value,
    locals: Vec<(String, &'a Value)>,
}

impl<'a> Scope<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            locals: Vec::new(),
        }
    }

    fn lookup(&self, path: &str, line: usize) -> Result<&'a Value, TemplateError> {
        let unresolved = || TemplateError::UnresolvedReference {
            line,
            name: path.to_string(),
        };
        let mut segments = path.split('.');
        let head = segments.next().ok_or_else(unresolved)?;
        let mut value = match self.locals.iter().rev().find(|(name, _)| name == head) {
            Some((_, v)) => *v,
            None => self.root.get(head).ok_or_else(unresolved)?,
        };
        for segment in segments {
            value = value.get(segment).ok_or_else(unresolved)?;
        }
        Ok(value)
    }
}

fn render_nodes<'a>(
    nodes: &'a [Node],
    scope: &mut Scope<'a>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Var {
                path,
                filters,
                line,
            } => {
                let value = scope.lookup(path, *line)?;
                let text = filters
                    .iter()
                    .fold(scalar_text(value, path, *line)?, |acc, f| f.apply(acc));
                out.push_str(&text);
            }
            Node::For {
                var,
                path,
                body,
                line,
            } => {
                let items = iterable(scope.lookup(path, *line)?, path, *line)?;
                for item in items {
                    scope.locals.push((var.clone(), item));
                    let result = render_nodes(body, scope, out);
                    scope.locals.pop();
                    result?;
                }
            }
            Node::If {
                path,
                negate,
                then,
                otherwise,
                line,
            } => {
                let truthy = is_truthy(scope.lookup(path, *line)?);
                if truthy != *negate {
                    render_nodes(then, scope, out)?;
                } else {
                    render_nodes(otherwise, scope, out)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_nodes<'a>(nodes: &'a [Node], scope: &mut Scope<'a>) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var { path, line, .. } => {
                scalar_text(scope.lookup(path, *line)?, path, *line)?;
            }
            Node::For {
                var,
                path,
                body,
                line,
            } => {
                let items = iterable(scope.lookup(path, *line)?, path, *line)?;
                if let Some(first) = items.first() {
                    scope.locals.push((var.clone(), first));
                    let result = validate_nodes(body, scope);
                    scope.locals.pop();
                    result?;
                }
            }
            Node::If {
                path,
                then,
                otherwise,
                line,
                ..
            } => {
                scope.lookup(path, *line)?;
                validate_nodes(then, scope)?;
                validate_nodes(otherwise, scope)?;
            }
        }
    }
    Ok(())
}

fn scalar_text(value: &Value, path: &str, line: usize) -> Result<String, TemplateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(TemplateError::NotScalar {
            line,
            name: path.to_string(),
        }),
    }
}

fn iterable<'a>(value: &'a Value, path: &str, line: usize) -> Result<&'a [Value], TemplateError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(TemplateError::NotIterable {
            line,
            name: path.to_string(),
        }),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Escape the ten LaTeX special characters.
pub fn escape_latex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}
