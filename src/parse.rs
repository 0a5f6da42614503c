use crate::command::Command;
use crate::key::{Key, RecordId};

pub fn parse_command(input: &str) -> Result<Command, String> {
    let tokens = Lexer::new(input).lex()?;
    parse_tokens(tokens.into_iter())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Keyword {
    Get,
    Put,
    Delete,
    Contains,
    Count,
    Size,
    Stats,
    Flush,
    Clear,
    Exit,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        let keyword = match word.to_ascii_uppercase().as_str() {
            "GET" => Keyword::Get,
            "PUT" => Keyword::Put,
            "DELETE" => Keyword::Delete,
            "CONTAINS" => Keyword::Contains,
            "COUNT" => Keyword::Count,
            "SIZE" => Keyword::Size,
            "STATS" => Keyword::Stats,
            "FLUSH" => Keyword::Flush,
            "CLEAR" => Keyword::Clear,
            "EXIT" => Keyword::Exit,
            _ => return None,
        };
        Some(keyword)
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Keyword(Keyword),
    Ident(String),
    Int(i64),
    Rid(RecordId),
    Literal(String),
}

#[derive(Debug)]
struct Lexer {
    input: Vec<char>,
    pos: usize,
    buffer: String,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input: &str) -> Lexer {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, String> {
        while let Some(c) = self.input.get(self.pos) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == &'"' {
                self.lex_literal()?;
            } else {
                self.lex_word()?;
            }
        }
        Ok(self.tokens)
    }

    /// Keywords, identifiers, integers and `#cluster:position` references.
    fn lex_word(&mut self) -> Result<(), String> {
        while let Some(c) = self.input.get(self.pos) {
            if c.is_whitespace() {
                break;
            }
            self.pos += 1;
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '#' | ':') {
                self.buffer.push(*c);
            } else {
                return Err(format!("Unexpected character: {}", c));
            }
        }

        let word = std::mem::take(&mut self.buffer);
        let token = if let Some(keyword) = Keyword::from_word(&word) {
            Token::Keyword(keyword)
        } else if word.starts_with('#') {
            Token::Rid(word.parse()?)
        } else if let Ok(value) = word.parse::<i64>() {
            Token::Int(value)
        } else if word.chars().all(|c| c.is_alphanumeric() || c == '_') {
            Token::Ident(word)
        } else {
            return Err(format!("Invalid identifier: {}", word));
        };
        self.tokens.push(token);
        Ok(())
    }

    fn lex_literal(&mut self) -> Result<(), String> {
        // Skip the first '"'
        self.pos += 1;

        // Flag to indicate if the next character is escaped
        let mut is_escaped = false;

        while let Some(c) = self.input.get(self.pos) {
            self.pos += 1;
            if is_escaped {
                let unescaped = match c {
                    '"' | '\\' => *c,
                    'n' => '\n',
                    't' => '\t',
                    _ => {
                        return Err(format!("Invalid escaped character: {}", c));
                    }
                };
                self.buffer.push(unescaped);
                is_escaped = false;
            } else {
                match c {
                    '"' => {
                        self.tokens
                            .push(Token::Literal(std::mem::take(&mut self.buffer)));
                        return Ok(());
                    }
                    '\\' => {
                        is_escaped = true;
                    }
                    _ => {
                        self.buffer.push(*c);
                    }
                }
            }
        }

        Err(format!("Unexpected end of input, {}", self.buffer))
    }
}

fn parse_tokens(mut tokens: impl Iterator<Item = Token>) -> Result<Command, String> {
    let Some(next) = tokens.next() else {
        return Err("Unexpected end of input".into());
    };
    let Token::Keyword(keyword) = next else {
        return Err("Expected a command keyword such as GET, PUT or DELETE".into());
    };
    let command = match keyword {
        Keyword::Put => {
            let key = parse_key(&mut tokens, "PUT")?;
            match tokens.next() {
                Some(Token::Rid(rid)) => Command::Put(key, rid),
                _ => return Err("Expected #cluster:position after key".to_string()),
            }
        }
        Keyword::Get => Command::Get(parse_key(&mut tokens, "GET")?),
        Keyword::Delete => Command::Delete(parse_key(&mut tokens, "DELETE")?),
        Keyword::Contains => Command::Contains(parse_key(&mut tokens, "CONTAINS")?),
        Keyword::Count => Command::Count(parse_key(&mut tokens, "COUNT")?),
        Keyword::Size => Command::Size,
        Keyword::Stats => Command::Stats,
        Keyword::Flush => Command::Flush,
        Keyword::Clear => Command::Clear,
        Keyword::Exit => Command::Exit,
    };
    if tokens.next().is_some() {
        return Err(format!("Unexpected token after {:?}", keyword));
    }
    Ok(command)
}

fn parse_key(tokens: &mut impl Iterator<Item = Token>, keyword: &str) -> Result<Key, String> {
    match tokens.next() {
        Some(Token::Ident(ident)) => Ok(Key::Str(ident)),
        Some(Token::Literal(literal)) => Ok(Key::Str(literal)),
        Some(Token::Int(value)) => Ok(Key::Int(value)),
        _ => Err(format!("Expected key after {}", keyword)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_words() {
        let tokens = Lexer::new("put user_1 -5 #2:9").lex().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Put),
                Token::Ident("user_1".into()),
                Token::Int(-5),
                Token::Rid(RecordId::new(2, 9)),
            ]
        );
    }

    #[test]
    fn test_lex_literal_escapes() {
        let tokens = Lexer::new(r#""a \"b\"\n\tc\\""#).lex().unwrap();
        assert_eq!(tokens, vec![Token::Literal("a \"b\"\n\tc\\".into())]);
        assert!(Lexer::new(r#""open"#).lex().is_err());
        assert!(Lexer::new(r#""bad \q""#).lex().is_err());
    }

    #[test]
    fn test_quoted_key_may_look_like_a_keyword() {
        assert_eq!(
            parse_command(r#"GET "size""#).unwrap(),
            Command::Get(Key::from("size"))
        );
    }

    #[test]
    fn test_malformed_record_id() {
        assert!(parse_command("PUT a #x:1").is_err());
        assert!(parse_command("PUT a #1").is_err());
    }
}
