use crate::analysis::AnalysisError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Pipe,
    Comma,
    LParen,
    RParen,
    Assign,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    AndAnd,
    OrOr,
    Newline,
    Semicolon,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, AnalysisError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(ch) = chars.next() {
        let kind = match ch {
            '\n' => {
                let token = Token { kind: TokenKind::Newline, line };
                line += 1;
                tokens.push(token);
                continue;
            }
            c if c.is_whitespace() => continue,
            '#' => {
                while let Some(next) = chars.peek() {
                    if *next == '\n' {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                TokenKind::OrOr
            }
            '|' => TokenKind::Pipe,
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                TokenKind::AndAnd
            }
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' if chars.peek() == Some(&'=') => {
                chars.next();
                TokenKind::Eq
            }
            '=' => TokenKind::Assign,
            '!' if chars.peek() == Some(&'=') => {
                chars.next();
                TokenKind::NotEq
            }
            '!' => TokenKind::Bang,
            '<' if chars.peek() == Some(&'=') => {
                chars.next();
                TokenKind::Le
            }
            '<' => TokenKind::Lt,
            '>' if chars.peek() == Some(&'=') => {
                chars.next();
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            c if c.is_ascii_digit() || (c == '.' && chars.peek().is_some_and(char::is_ascii_digit)) => {
                let mut literal = String::from(c);
                while let Some(next) = chars.peek() {
                    if next.is_ascii_digit() || *next == '.' || *next == '_' {
                        if *next != '_' {
                            literal.push(*next);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| AnalysisError::Syntax {
                    line,
                    message: format!("invalid number `{literal}`"),
                })?;
                TokenKind::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        ident.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            }
            other => {
                return Err(AnalysisError::Syntax {
                    line,
                    message: format!("unexpected character `{other}`"),
                });
            }
        };
        tokens.push(Token { kind, line });
    }

    tokens.push(Token { kind: TokenKind::Eof, line });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::{tokenize, TokenKind};
    use crate::analysis::AnalysisError;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).expect("tokenize").into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn tokenizes_pipeline_with_comparison() {
        assert_eq!(
            kinds("health | where Smoking == 1"),
            vec![
                TokenKind::Ident("health".to_string()),
                TokenKind::Pipe,
                TokenKind::Ident("where".to_string()),
                TokenKind::Ident("Smoking".to_string()),
                TokenKind::Eq,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let tokens = tokenize("# count smokers\nhealth\n| count").expect("tokenize");
        let pipe = tokens.iter().find(|token| token.kind == TokenKind::Pipe).expect("pipe");
        assert_eq!(pipe.line, 3);
    }

    #[test]
    fn double_operators_are_single_tokens() {
        assert_eq!(
            kinds("a >= 1 && b != 2 || !c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ge,
                TokenKind::Number(1.0),
                TokenKind::AndAnd,
                TokenKind::Ident("b".to_string()),
                TokenKind::NotEq,
                TokenKind::Number(2.0),
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unexpected_characters_report_line() {
        let error = tokenize("health\n| where Age > 40 @").expect_err("@ is not valid");
        assert_eq!(
            error,
            AnalysisError::Syntax { line: 2, message: "unexpected character `@`".to_string() }
        );
    }
}
