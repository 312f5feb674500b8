use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Plus,   // +
    Minus,  // -
    Star,   // *
    Slash,  // /
    Amp,    // &
    Pipe,   // |
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=
    EqEq,   // ==
    NotEq,  // !=
    LParen, // (
    RParen, // )
    Comma,  // ,
    Eof,
}

impl Token {
    /// How the token reads in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("'{name}'"),
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::True => "'true'".into(),
            Token::False => "'false'".into(),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Amp => "'&'".into(),
            Token::Pipe => "'|'".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::EqEq => "'=='".into(),
            Token::NotEq => "'!='".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
            Token::Eof => "end of input".into(),
        }
    }
}

/// A token and the character offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

fn syntax(pos: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        position: pos,
        message: message.into(),
    }
}

/// Split an expression into tokens. The result always ends with `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = src.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '&' => Some(Token::Amp),
            '|' => Some(Token::Pipe),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned { token, pos: start });
            i += 1;
            continue;
        }

        let next_is_eq = i + 1 < len && chars[i + 1] == '=';
        let compare = match c {
            '<' if next_is_eq => Some((Token::Le, 2)),
            '<' => Some((Token::Lt, 1)),
            '>' if next_is_eq => Some((Token::Ge, 2)),
            '>' => Some((Token::Gt, 1)),
            '=' if next_is_eq => Some((Token::EqEq, 2)),
            '!' if next_is_eq => Some((Token::NotEq, 2)),
            '=' => return Err(syntax(start, "use '==' to compare for equality")),
            _ => None,
        };
        if let Some((token, width)) = compare {
            tokens.push(Spanned { token, pos: start });
            i += width;
            continue;
        }

        // String literals, single or double quoted. Backslash escapes the next char.
        if c == '\'' || c == '"' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(syntax(start, "unterminated string")),
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(&'\\') if i + 1 < len => {
                        s.push(chars[i + 1]);
                        i += 2;
                    }
                    Some(&ch) => {
                        s.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                pos: start,
            });
            continue;
        }

        // Numbers: 12, 0.5, .5, 1e6, 2.5E-3
        if c.is_ascii_digit() || (c == '.' && i + 1 < len && chars[i + 1].is_ascii_digit()) {
            let mut has_dot = false;
            while i < len && (chars[i].is_ascii_digit() || (!has_dot && chars[i] == '.')) {
                if chars[i] == '.' {
                    has_dot = true;
                }
                i += 1;
            }
            if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < len && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < len && chars[j].is_ascii_digit() {
                    i = j;
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n: f64 = text
                .parse()
                .map_err(|_| syntax(start, format!("invalid number '{text}'")))?;
            tokens.push(Spanned {
                token: Token::Number(n),
                pos: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < len && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned { token, pos: start });
            continue;
        }

        return Err(syntax(start, format!("unexpected character '{c}'")));
    }

    tokens.push(Spanned {
        token: Token::Eof,
        pos: len,
    });
    Ok(tokens)
}
