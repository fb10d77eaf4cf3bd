use super::StoreError;

/// Glob pattern with the same dialect as Redis `KEYS`: `*`, `?`, `[...]` classes (with `^`/`!`
/// negation and `a-z` ranges) and `\` escapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPattern {
    tokens: Vec<Token>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnySeq,
    Class { negated: bool, items: Vec<ClassItem> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ClassItem {
    Single(char),
    Range(char, char),
}

impl Token {
    fn accepts(&self, ch: char) -> bool {
        match self {
            Self::Literal(expected) => *expected == ch,
            Self::AnyOne => true,
            Self::AnySeq => false,
            Self::Class { negated, items } => {
                let hit = items.iter().any(|item| match item {
                    ClassItem::Single(single) => *single == ch,
                    ClassItem::Range(lo, hi) => (*lo..=*hi).contains(&ch),
                });
                hit != *negated
            }
        }
    }
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Result<Self, StoreError> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            let token = match ch {
                '*' => {
                    // Collapse runs of `*`; they match the same thing as one.
                    if matches!(tokens.last(), Some(Token::AnySeq)) {
                        continue;
                    }
                    Token::AnySeq
                }
                '?' => Token::AnyOne,
                '\\' => Token::Literal(chars.next().unwrap_or('\\')),
                '[' => {
                    let negated = matches!(chars.peek(), Some('^') | Some('!'));
                    if negated {
                        chars.next();
                    }

                    let mut items = Vec::new();
                    let mut closed = false;
                    while let Some(next) = chars.next() {
                        let start = match next {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '\\' => chars.next().unwrap_or('\\'),
                            other => other,
                        };

                        let is_range = chars.peek() == Some(&'-');
                        if is_range {
                            let mut lookahead = chars.clone();
                            lookahead.next();
                            match lookahead.next() {
                                Some(']') | None => items.push(ClassItem::Single(start)),
                                Some(end) => {
                                    chars.next();
                                    chars.next();
                                    let end = if end == '\\' { chars.next().unwrap_or('\\') } else { end };
                                    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                                    items.push(ClassItem::Range(lo, hi));
                                }
                            }
                        } else {
                            items.push(ClassItem::Single(start));
                        }
                    }

                    if !closed {
                        return Err(StoreError::InvalidPattern {
                            pattern: pattern.to_string(),
                            reason: "unterminated character class".to_string(),
                        });
                    }
                    Token::Class { negated, items }
                }
                other => Token::Literal(other),
            };
            tokens.push(token);
        }

        Ok(Self { tokens })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let text: Vec<char> = candidate.chars().collect();
        let (mut p, mut t) = (0usize, 0usize);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::AnySeq) => {
                    backtrack = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                Some(token) if token.accepts(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }

            match backtrack {
                Some((resume, consumed)) => {
                    p = resume;
                    t = consumed + 1;
                    backtrack = Some((resume, consumed + 1));
                }
                None => return false,
            }
        }

        self.tokens[p..].iter().all(|token| matches!(token, Token::AnySeq))
    }
}

/// Escapes glob metacharacters so `literal` can be embedded in a `KEYS` pattern.
pub fn escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
