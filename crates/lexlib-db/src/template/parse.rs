//! Template parsing.
//!
//! A template is literal SQL interleaved with `{{ ... }}` actions. Actions
//! are a small closed vocabulary: argument markers, literal and column-type
//! helpers, and `if`/`else if`/`else`/`end` blocks whose conditions are
//! boolean expressions over dialect predicates. Anything else is rejected
//! here, so the set of directives a template may use stays enumerable.
//!
//! A lone quoted string is emitted as literal SQL, so `{{"{{"}}` writes a
//! literal `{{`. Closing braces inside quoted strings and comments do not
//! end an action.

use lexlib_types::{field_limit, ColumnKind, Dialect};

use super::TemplateError;

/// Parsed template tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Sql(String),
    Arg { name: String, list: bool },
    Bool(bool),
    Now,
    DialectName,
    Column(ColumnKind),
    If {
        branches: Vec<(Cond, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

/// Condition of an `if` block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cond {
    Is(Dialect),
    Not(Box<Cond>),
    Any(Vec<Cond>),
    All(Vec<Cond>),
}

impl Cond {
    pub(crate) fn holds(&self, dialect: Dialect) -> bool {
        match self {
            Self::Is(d) => *d == dialect,
            Self::Not(inner) => !inner.holds(dialect),
            Self::Any(operands) => operands.iter().any(|c| c.holds(dialect)),
            Self::All(operands) => operands.iter().all(|c| c.holds(dialect)),
        }
    }
}

/// Parses `source` into a node tree.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser { source, pos: 0 };
    let (nodes, end) = parser.block()?;
    match end {
        BlockEnd::Eof => Ok(nodes),
        BlockEnd::Else { at, .. } => Err(TemplateError::UnexpectedBranch {
            directive: "else",
            at,
        }),
        BlockEnd::End { at } => Err(TemplateError::UnexpectedBranch {
            directive: "end",
            at,
        }),
    }
}

enum BlockEnd {
    Eof,
    Else { cond: Option<Cond>, at: usize },
    End { at: usize },
}

enum Action {
    Node(Node),
    If(Cond),
    Else(Option<Cond>),
    End,
    Comment,
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl Parser<'_> {
    /// Reads nodes until end of input or a branch directive.
    fn block(&mut self) -> Result<(Vec<Node>, BlockEnd), TemplateError> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.source[self.pos..];
            let Some(open) = rest.find("{{") else {
                if !rest.is_empty() {
                    nodes.push(Node::Sql(rest.to_string()));
                }
                self.pos = self.source.len();
                return Ok((nodes, BlockEnd::Eof));
            };
            if open > 0 {
                nodes.push(Node::Sql(rest[..open].to_string()));
            }

            let at = self.pos + open;
            let body_start = at + 2;
            let close = action_close(&self.source[body_start..])
                .ok_or(TemplateError::UnclosedAction { at })?;
            let body = &self.source[body_start..body_start + close];
            self.pos = body_start + close + 2;

            match parse_action(body, at)? {
                Action::Node(node) => nodes.push(node),
                Action::Comment => {}
                Action::If(cond) => nodes.push(self.conditional(cond, at)?),
                Action::Else(cond) => return Ok((nodes, BlockEnd::Else { cond, at })),
                Action::End => return Ok((nodes, BlockEnd::End { at })),
            }
        }
    }

    fn conditional(&mut self, first: Cond, if_at: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut cond = first;
        loop {
            let (body, end) = self.block()?;
            branches.push((cond, body));
            match end {
                BlockEnd::End { .. } => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                BlockEnd::Else {
                    cond: Some(next), ..
                } => cond = next,
                BlockEnd::Else { cond: None, .. } => {
                    let (otherwise, end) = self.block()?;
                    return match end {
                        BlockEnd::End { .. } => Ok(Node::If {
                            branches,
                            otherwise,
                        }),
                        BlockEnd::Else { at, .. } => Err(TemplateError::UnexpectedBranch {
                            directive: "else",
                            at,
                        }),
                        BlockEnd::Eof => Err(TemplateError::UnclosedIf { at: if_at }),
                    };
                }
                BlockEnd::Eof => return Err(TemplateError::UnclosedIf { at: if_at }),
            }
        }
    }
}

/// Offset of the `}}` that ends an action body.
fn action_close(body: &str) -> Option<usize> {
    let trimmed = body.trim_start();
    if trimmed.starts_with("/*") {
        let comment_end = body.len() - trimmed.len() + trimmed.find("*/")? + 2;
        return body[comment_end..]
            .find("}}")
            .map(|close| comment_end + close);
    }

    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if body[i..].starts_with("}}") {
            return Some(i);
        }
    }
    None
}

fn parse_action(body: &str, at: usize) -> Result<Action, TemplateError> {
    let trimmed = body.trim();
    if trimmed.len() >= 4 && trimmed.starts_with("/*") && trimmed.ends_with("*/") {
        return Ok(Action::Comment);
    }

    let tokens = tokenize(body, at)?;
    if let [Token::Str(text)] = tokens.as_slice() {
        return Ok(if text.is_empty() {
            Action::Comment
        } else {
            Action::Node(Node::Sql(text.clone()))
        });
    }

    let mut cursor = Cursor {
        tokens: &tokens,
        next: 0,
        at,
    };
    let Some(Token::Word(word)) = cursor.next() else {
        return Err(malformed(at, "action must start with a directive"));
    };

    let action = match word.as_str() {
        "arg" | "args" => {
            let name = cursor.string("argument name")?;
            validate_arg_name(&name, at)?;
            Action::Node(Node::Arg {
                name,
                list: word == "args",
            })
        }
        "TRUE" => Action::Node(Node::Bool(true)),
        "FALSE" => Action::Node(Node::Bool(false)),
        "NOW" => Action::Node(Node::Now),
        "db" => Action::Node(Node::DialectName),
        "text" => Action::Node(Node::Column(ColumnKind::Text)),
        "bytes" => Action::Node(Node::Column(ColumnKind::Bytes)),
        "bool" => Action::Node(Node::Column(ColumnKind::Bool)),
        "int" => Action::Node(Node::Column(ColumnKind::Int)),
        "datetime" => Action::Node(Node::Column(ColumnKind::DateTime)),
        "id" => Action::Node(Node::Column(ColumnKind::Id)),
        "varchar" => Action::Node(Node::Column(ColumnKind::VarChar(varchar_size(
            &mut cursor,
        )?))),
        "if" => Action::If(cursor.expr()?),
        "else" => match cursor.next() {
            None => Action::Else(None),
            Some(Token::Word(w)) if w == "if" => Action::Else(Some(cursor.expr()?)),
            Some(_) => return Err(malformed(at, "expected 'if' after 'else'")),
        },
        "end" => Action::End,
        other if Dialect::from_name(other).is_some() => {
            return Err(malformed(
                at,
                format!("dialect predicate '{other}' is only valid inside a condition"),
            ))
        }
        other => {
            return Err(TemplateError::UnknownDirective {
                name: other.to_string(),
                at,
            })
        }
    };

    cursor.finish()?;
    Ok(action)
}

fn varchar_size(cursor: &mut Cursor<'_>) -> Result<u32, TemplateError> {
    let at = cursor.at;
    match cursor.next() {
        Some(Token::Number(0)) => Err(malformed(at, "varchar size must be positive")),
        Some(Token::Number(n)) => Ok(*n),
        Some(Token::Str(field)) => field_limit(field)
            .map(|limit| limit.max)
            .ok_or_else(|| TemplateError::UnknownField {
                field: field.clone(),
                at,
            }),
        _ => Err(malformed(at, "varchar needs a size or a field name")),
    }
}

fn validate_arg_name(name: &str, at: usize) -> Result<(), TemplateError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    // `__` is reserved for list element names on named-parameter dialects.
    if valid_start && valid_rest && !name.contains("__") {
        Ok(())
    } else {
        Err(TemplateError::InvalidArgumentName {
            name: name.to_string(),
            at,
        })
    }
}

fn malformed(at: usize, reason: impl Into<String>) -> TemplateError {
    TemplateError::Malformed {
        at,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Number(u32),
    Open,
    Close,
}

fn tokenize(body: &str, at: usize) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            _ => return Err(malformed(at, "invalid escape in string")),
                        },
                        Some(ch) => text.push(ch),
                        None => return Err(malformed(at, "unterminated string")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse::<u32>()
                    .map_err(|_| malformed(at, "number out of range"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if !(w.is_ascii_alphanumeric() || w == '_' || w == '.') {
                        break;
                    }
                    word.push(w);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            other => return Err(malformed(at, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

struct Cursor<'t> {
    tokens: &'t [Token],
    next: usize,
    at: usize,
}

impl<'t> Cursor<'t> {
    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.next);
        if token.is_some() {
            self.next += 1;
        }
        token
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.next)
    }

    fn finish(&self) -> Result<(), TemplateError> {
        if self.next == self.tokens.len() {
            Ok(())
        } else {
            Err(malformed(self.at, "unexpected trailing tokens"))
        }
    }

    fn string(&mut self, what: &str) -> Result<String, TemplateError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s.clone()),
            _ => Err(malformed(self.at, format!("expected a quoted {what}"))),
        }
    }

    /// `pred | not EXPR | or EXPR.. | and EXPR.. | ( EXPR )`
    fn expr(&mut self) -> Result<Cond, TemplateError> {
        let at = self.at;
        match self.next() {
            Some(Token::Open) => {
                let cond = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(cond),
                    _ => Err(malformed(at, "expected ')'")),
                }
            }
            Some(Token::Word(word)) => match word.as_str() {
                "not" => Ok(Cond::Not(Box::new(self.expr()?))),
                "or" | "and" => {
                    let mut operands = Vec::new();
                    while !matches!(self.peek(), None | Some(Token::Close)) {
                        operands.push(self.expr()?);
                    }
                    if operands.is_empty() {
                        return Err(malformed(
                            at,
                            format!("'{word}' needs at least one operand"),
                        ));
                    }
                    Ok(if word == "or" {
                        Cond::Any(operands)
                    } else {
                        Cond::All(operands)
                    })
                }
                name => Dialect::from_name(name)
                    .map(Cond::Is)
                    .ok_or_else(|| malformed(at, format!("unknown predicate '{name}'"))),
            },
            _ => Err(malformed(at, "expected a condition")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(text: &str) -> Node {
        Node::Sql(text.to_string())
    }

    #[test]
    fn literal_text_and_markers() {
        let nodes = parse(r#"select * from t where a = {{arg "a"}} and b in ({{args "b"}})"#)
            .expect("should parse");
        assert_eq!(
            nodes,
            vec![
                sql("select * from t where a = "),
                Node::Arg {
                    name: "a".to_string(),
                    list: false
                },
                sql(" and b in ("),
                Node::Arg {
                    name: "b".to_string(),
                    list: true
                },
                sql(")"),
            ]
        );
    }

    #[test]
    fn nested_conditions_with_operators() {
        let nodes = parse(
            "{{if or postgres cockroachdb}}A{{else if (not sqlite)}}B{{else}}C{{end}}",
        )
        .expect("should parse");
        let [Node::If {
            branches,
            otherwise,
        }] = nodes.as_slice()
        else {
            panic!("expected a single if node, got {nodes:?}");
        };
        assert_eq!(branches.len(), 2);
        assert!(branches[0].0.holds(Dialect::Cockroachdb));
        assert!(!branches[0].0.holds(Dialect::Mysql));
        assert!(branches[1].0.holds(Dialect::Mysql));
        assert!(!branches[1].0.holds(Dialect::Sqlite));
        assert_eq!(otherwise, &vec![sql("C")]);
    }

    #[test]
    fn and_with_grouped_operands() {
        let nodes = parse("{{if and (not sqlite) (not mysql)}}x{{end}}").expect("should parse");
        let [Node::If { branches, .. }] = nodes.as_slice() else {
            panic!("expected an if node");
        };
        let cond = &branches[0].0;
        assert!(cond.holds(Dialect::Postgres));
        assert!(!cond.holds(Dialect::Sqlite));
        assert!(!cond.holds(Dialect::Mysql));
    }

    #[test]
    fn varchar_accepts_size_or_field_limit() {
        let nodes = parse(r#"{{varchar 30}} {{varchar "group.name"}}"#).expect("should parse");
        assert_eq!(nodes[0], Node::Column(ColumnKind::VarChar(30)));
        assert_eq!(nodes[2], Node::Column(ColumnKind::VarChar(128)));

        let err = parse(r#"{{varchar "group.motto"}}"#).expect_err("unknown field");
        assert!(matches!(err, TemplateError::UnknownField { .. }));
        let err = parse("{{varchar 0}}").expect_err("zero size");
        assert!(matches!(err, TemplateError::Malformed { .. }));
    }

    #[test]
    fn comments_render_nothing() {
        let nodes = parse("a{{/* note */}}b").expect("should parse");
        assert_eq!(nodes, vec![sql("a"), sql("b")]);
    }

    #[test]
    fn structural_errors_carry_offsets() {
        assert_eq!(
            parse("select {{arg \"x\"").expect_err("unclosed"),
            TemplateError::UnclosedAction { at: 7 }
        );
        assert_eq!(
            parse("ab{{if sqlite}}x").expect_err("no end"),
            TemplateError::UnclosedIf { at: 2 }
        );
        assert_eq!(
            parse("x{{end}}").expect_err("stray end"),
            TemplateError::UnexpectedBranch {
                directive: "end",
                at: 1
            }
        );
        assert!(matches!(
            parse("{{if sqlite}}a{{else}}b{{else}}c{{end}}").expect_err("double else"),
            TemplateError::UnexpectedBranch {
                directive: "else",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_and_misplaced_directives() {
        assert!(matches!(
            parse("{{uuid}}").expect_err("unknown"),
            TemplateError::UnknownDirective { .. }
        ));
        assert!(matches!(
            parse("{{sqlite}}").expect_err("predicate as output"),
            TemplateError::Malformed { .. }
        ));
        assert!(matches!(
            parse("{{if oracle}}x{{end}}").expect_err("unknown predicate"),
            TemplateError::Malformed { .. }
        ));
        assert!(matches!(
            parse("{{if sqlite mysql}}x{{end}}").expect_err("trailing tokens"),
            TemplateError::Malformed { .. }
        ));
        assert!(matches!(
            parse("{{arg id}}").expect_err("unquoted name"),
            TemplateError::Malformed { .. }
        ));
    }

    #[test]
    fn argument_names_must_be_identifiers() {
        for bad in ["", "1st", "has space", "a-b", "ids__0"] {
            let template = format!("{{{{arg \"{bad}\"}}}}");
            assert!(
                matches!(
                    parse(&template),
                    Err(TemplateError::InvalidArgumentName { .. })
                ),
                "'{bad}' should be rejected"
            );
        }
        parse(r#"{{arg "_user_id2"}}"#).expect("valid name");
    }

    #[test]
    fn quoted_string_action_is_literal_sql() {
        let nodes = parse(r#"select '{{"{{"}}' || '{{"}}"}}'"#).expect("should parse");
        assert_eq!(
            nodes,
            vec![sql("select '"), sql("{{"), sql("' || '"), sql("}}"), sql("'")]
        );
        assert_eq!(parse(r#"a{{""}}b"#).expect("should parse"), vec![sql("a"), sql("b")]);
    }

    #[test]
    fn braces_inside_strings_and_comments_do_not_close() {
        assert!(matches!(
            parse(r#"{{arg "a}}b"}}"#).expect_err("braces are not identifier characters"),
            TemplateError::InvalidArgumentName { name, .. } if name == "a}}b"
        ));
        let nodes = parse(r#"x{{/* "}}" stays quoted */}}y"#).expect("should parse");
        assert_eq!(nodes, vec![sql("x"), sql("y")]);
    }
}
