//! Tokenizer for the declarative source format

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Str(String),
    Number(serde_json::Number),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    Comma,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "`{}`", w),
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::LBrace => f.write_str("`{`"),
            Token::RBrace => f.write_str("`}`"),
            Token::LBracket => f.write_str("`[`"),
            Token::RBracket => f.write_str("`]`"),
            Token::Eq => f.write_str("`=`"),
            Token::Comma => f.write_str("`,`"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with the position of its first character (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
    pub col: u32,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    origin: &'a str,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn err(&self, line: u32, col: u32, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.origin, line, col, kind)
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn string(&mut self, line: u32, col: u32) -> Result<Token, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.err(line, col, ParseErrorKind::UnterminatedString));
                }
                Some('"') => return Ok(Token::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(self.err(line, col, ParseErrorKind::UnterminatedString)),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self, first: char, line: u32, col: u32) -> Result<Token, ParseError> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let number = if let Ok(i) = text.parse::<i64>() {
            Some(serde_json::Number::from(i))
        } else {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
        };
        number
            .map(Token::Number)
            .ok_or_else(|| self.err(line, col, ParseErrorKind::InvalidNumber(text)))
    }
}

pub fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split source text into tokens. The last token is always [`Token::Eof`].
pub fn tokenize(source: &str, origin: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        origin,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();

    loop {
        let (line, col) = (lexer.line, lexer.col);
        let Some(c) = lexer.bump() else {
            tokens.push(Spanned {
                token: Token::Eof,
                line,
                col,
            });
            return Ok(tokens);
        };
        let token = match c {
            c if c.is_whitespace() => continue,
            '#' => {
                lexer.skip_line();
                continue;
            }
            '/' if lexer.chars.peek() == Some(&'/') => {
                lexer.skip_line();
                continue;
            }
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '=' => Token::Eq,
            ',' => Token::Comma,
            '"' => lexer.string(line, col)?,
            c if c.is_ascii_digit() || c == '-' => lexer.number(c, line, col)?,
            c if is_word_start(c) => {
                let mut word = String::from(c);
                while let Some(&next) = lexer.chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    word.push(next);
                    lexer.bump();
                }
                Token::Word(word)
            }
            other => return Err(lexer.err(line, col, ParseErrorKind::UnexpectedChar(other))),
        };
        tokens.push(Spanned { token, line, col });
    }
}
