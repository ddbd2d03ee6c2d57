use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
    Spread,
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Name(name) => write!(f, "'{}'", name),
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(x) => write!(f, "{}", x),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Punct(c) => write!(f, "'{}'", c),
            Token::Spread => write!(f, "'...'"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

const PUNCTUATORS: &[char] = &['{', '}', '(', ')', '[', ']', ':', '!', '$', '=', '@', '|', '&'];

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    // Commas are insignificant in GraphQL and lex like whitespace.
    fn skip_ignored(&mut self) {
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\n' | '\r' | ',' | '\u{feff}' => {
                    self.bump();
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned> {
        self.skip_ignored();
        let (line, column) = (self.line, self.column);

        let token = match self.chars.peek().copied() {
            None => Token::Eof,
            Some('.') => {
                for _ in 0..3 {
                    if self.bump() != Some('.') {
                        return Err(self.error("expected '...'"));
                    }
                }
                Token::Spread
            }
            Some('"') => self.string()?,
            Some(c) if c == '-' || c.is_ascii_digit() => self.number()?,
            Some(c) if c == '_' || c.is_ascii_alphabetic() => self.name(),
            Some(c) if PUNCTUATORS.contains(&c) => {
                self.bump();
                Token::Punct(c)
            }
            Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
        };

        Ok(Spanned { token, line, column })
    }

    fn name(&mut self) -> Token {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Token::Name(name)
    }

    fn number(&mut self) -> Result<Token> {
        let mut text = String::new();
        let mut is_float = false;

        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.bump();
        }

        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => is_float = true,
                '+' | '-' if is_float => {}
                _ => break,
            }
            text.push(c);
            self.bump();
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid float '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(format!("invalid int '{}'", text)))
        }
    }

    fn string(&mut self) -> Result<Token> {
        self.bump();
        if self.chars.peek() == Some(&'"') {
            self.bump();
            if self.chars.peek() == Some(&'"') {
                return Err(self.error("block strings are not supported"));
            }
            return Ok(Token::Str(String::new()));
        }

        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some('"') => return Ok(Token::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('b') => '\u{0008}',
                        Some('f') => '\u{000c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => self.unicode_escape()?,
                        other => {
                            return Err(self.error(format!("invalid escape {:?}", other)));
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode code point"))
    }
}
