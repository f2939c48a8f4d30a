//! `#if` expression evaluation

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Not,
    And,
    Or,
    Eq,
    Ne,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    /// An identifier that is not defined. Compares as its own name.
    Undefined(String),
    Str(String),
    Num(i64),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Undefined(_) => false,
            Value::Num(n) => *n != 0,
            Value::Str(s) => !s.is_empty() && s != "0",
        }
    }

    fn as_text(&self) -> String {
        match self {
            Value::Undefined(name) => name.clone(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => n.to_string(),
        }
    }

    fn from_bool(b: bool) -> Self {
        Value::Num(if b { 1 } else { 0 })
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<i64>()
                    .map_err(|_| format!("invalid number {}", text))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character {:?} in expression", other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    defines: &'a BTreeMap<String, String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", expected, t)),
            None => Err(format!("expected {:?} at end of expression", expected)),
        }
    }

    fn or(&mut self) -> Result<Value, String> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.and()?;
            lhs = Value::from_bool(lhs.truthy() || rhs.truthy());
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Value, String> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.unary()?;
            lhs = Value::from_bool(lhs.truthy() && rhs.truthy());
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Value, String> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let value = self.unary()?;
            return Ok(Value::from_bool(!value.truthy()));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, String> {
        let lhs = self.primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.next();
                let rhs = self.primary()?;
                Ok(Value::from_bool(lhs.as_text() == rhs.as_text()))
            }
            Some(Token::Ne) => {
                self.next();
                let rhs = self.primary()?;
                Ok(Value::from_bool(lhs.as_text() != rhs.as_text()))
            }
            _ => Ok(lhs),
        }
    }

    fn primary(&mut self) -> Result<Value, String> {
        match self.next() {
            Some(Token::LParen) => {
                let value = self.or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Number(n)) => Ok(Value::Num(n)),
            Some(Token::Ident(name)) if name == "defined" => {
                let parenthesized = self.peek() == Some(&Token::LParen);
                if parenthesized {
                    self.next();
                }
                let target = match self.next() {
                    Some(Token::Ident(target)) => target,
                    other => return Err(format!("defined() expects a name, found {:?}", other)),
                };
                if parenthesized {
                    self.expect(Token::RParen)?;
                }
                Ok(Value::from_bool(self.defines.contains_key(&target)))
            }
            Some(Token::Ident(name)) => Ok(match self.defines.get(&name) {
                Some(value) => Value::Str(value.clone()),
                None => Value::Undefined(name),
            }),
            Some(other) => Err(format!("unexpected {:?} in expression", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Evaluate a condition against the current defines.
pub fn evaluate(expression: &str, defines: &BTreeMap<String, String>) -> Result<bool, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        defines,
    };
    let value = parser.or()?;
    if let Some(extra) = parser.peek() {
        return Err(format!("unexpected {:?} after expression", extra));
    }
    Ok(value.truthy())
}
