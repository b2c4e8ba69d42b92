//! Tokenizer for strategy scripts.

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    If,
    Else,
    // Punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
}

/// A token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Tokenize a script. `#` starts a comment running to end of line.
pub fn tokenize(source: &str, phase: &'static str) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\n') | None => {
                            return Err(ScriptError::new(phase, line, "unterminated string"))
                        }
                        Some(c) => s.push(c),
                    }
                }
                tokens.push(Spanned {
                    token: Token::Str(s),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
                        s.push(c);
                        chars.next();
                    } else if (c == '+' || c == '-') && matches!(s.chars().last(), Some('e' | 'E'))
                    {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = s
                    .parse()
                    .map_err(|_| ScriptError::new(phase, line, format!("bad number '{s}'")))?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    line,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match s.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(s),
                };
                tokens.push(Spanned { token, line });
            }
            _ => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Eq
                        } else {
                            Token::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Ne
                        } else {
                            Token::Not
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Le
                        } else {
                            Token::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Ge
                        } else {
                            Token::Gt
                        }
                    }
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                            Token::And
                        } else {
                            return Err(ScriptError::new(phase, line, "expected '&&'"));
                        }
                    }
                    '|' => {
                        if chars.peek() == Some(&'|') {
                            chars.next();
                            Token::Or
                        } else {
                            return Err(ScriptError::new(phase, line, "expected '||'"));
                        }
                    }
                    other => {
                        return Err(ScriptError::new(
                            phase,
                            line,
                            format!("unexpected character '{other}'"),
                        ))
                    }
                };
                tokens.push(Spanned { token, line });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source, "indicators")
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds(r#"x = sma(close("BTCUSDT"), 60)"#),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Ident("sma".into()),
                Token::LParen,
                Token::Ident("close".into()),
                Token::LParen,
                Token::Str("BTCUSDT".into()),
                Token::RParen,
                Token::Comma,
                Token::Number(60.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("if a >= 1.5e2 && !b { c = true } else { c = false }").first(),
            Some(&Token::If)
        );
        assert_eq!(
            kinds("a == b != c <= d"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = tokenize("a = 1 # set a\nb = 2", "indicators").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[3].line, 2);
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_bad_character() {
        let err = tokenize("a = $", "decision").unwrap_err();
        assert_eq!(err.phase, "decision");
        assert!(err.message.contains('$'));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("a = \"oops", "indicators").is_err());
    }
}
