//! Splits template source into text runs and tokenized actions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(0[xX][0-9a-fA-F_]+|(\d[\d_]*)?\.?\d*([eE][+-]?\d+)?)$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.`
    Dot,
    /// `.A.B`; never empty.
    Field(Vec<String>),
    /// `$name.A.B`; the name is empty for `$`.
    Variable(String, Vec<String>),
    Ident(String),
    Str(String),
    Number(String),
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub token: Token,
    /// No whitespace separates this token from the previous one.
    pub glued: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action { tokens: Vec<Lexeme>, line: usize },
}

pub(crate) fn lex(source: &str) -> Result<Vec<Item>, ParseError> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut offset = 0;
    let mut trim_next = false;

    while let Some(start) = rest.find(LEFT_DELIM) {
        let line = line_at(source, offset + start);
        push_text(&mut items, &rest[..start], trim_next);

        let mut body_start = start + LEFT_DELIM.len();
        if has_trim_marker(&rest[body_start..]) {
            trim_last_text(&mut items);
            body_start += 2;
        }

        let (body, consumed) = scan_action(&rest[body_start..], line)?;
        let (body, trim_right) = match body.strip_suffix('-') {
            Some(stripped) if stripped.ends_with(char::is_whitespace) => (stripped, true),
            _ => (body, false),
        };
        trim_next = trim_right;

        let trimmed = body.trim();
        if trimmed.starts_with(LEFT_COMMENT) {
            if !trimmed.ends_with(RIGHT_COMMENT) || trimmed.len() < 4 {
                return Err(ParseError::new(line, "comment ends before closing delimiter"));
            }
        } else {
            let tokens = tokenize(body, line)?;
            if tokens.is_empty() {
                return Err(ParseError::new(line, "missing value for command"));
            }
            items.push(Item::Action { tokens, line });
        }

        let advance = body_start + consumed;
        offset += advance;
        rest = &rest[advance..];
    }

    push_text(&mut items, rest, trim_next);
    Ok(items)
}

fn line_at(source: &str, byte: usize) -> usize {
    source[..byte].matches('\n').count() + 1
}

fn has_trim_marker(after_delim: &str) -> bool {
    let mut chars = after_delim.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        items.push(Item::Text(text.to_owned()));
    }
}

fn trim_last_text(items: &mut Vec<Item>) {
    if let Some(Item::Text(text)) = items.last_mut() {
        text.truncate(text.trim_end().len());
        if text.is_empty() {
            items.pop();
        }
    }
}

/// Finds the closing delimiter, skipping over quoted text and comments.
/// Returns the action body and the bytes consumed including `}}`.
fn scan_action(input: &str, line: usize) -> Result<(&str, usize), ParseError> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_quoted(bytes, i, b'"', line)?,
            b'`' => i = skip_quoted(bytes, i, b'`', line)?,
            b'/' if input[i..].starts_with(LEFT_COMMENT) => {
                let end = input[i + 2..]
                    .find(RIGHT_COMMENT)
                    .ok_or_else(|| ParseError::new(line, "unclosed comment"))?;
                i += 2 + end + 2;
            }
            b'}' if input[i..].starts_with(RIGHT_DELIM) => {
                return Ok((&input[..i], i + RIGHT_DELIM.len()));
            }
            _ => i += 1,
        }
    }
    Err(ParseError::new(line, "unclosed action"))
}

fn skip_quoted(bytes: &[u8], open: usize, quote: u8, line: usize) -> Result<usize, ParseError> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote == b'"' => i += 2,
            b'\n' if quote == b'"' => break,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(ParseError::new(line, "unterminated quoted string"))
}

fn tokenize(body: &str, line: usize) -> Result<Vec<Lexeme>, ParseError> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut glued = false;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            glued = false;
            i += 1;
            continue;
        }

        let token = match c {
            '|' => {
                i += 1;
                Token::Pipe
            }
            '(' => {
                i += 1;
                Token::LeftParen
            }
            ')' => {
                i += 1;
                Token::RightParen
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '=' => {
                i += 1;
                Token::Assign
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Declare
            }
            '"' => {
                let (text, next) = read_quoted(&chars, i, line)?;
                i = next;
                Token::Str(text)
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or_else(|| ParseError::new(line, "unterminated raw quoted string"))?;
                let text = chars[i + 1..i + 1 + end].iter().collect();
                i += end + 2;
                Token::Str(text)
            }
            '$' => {
                let (name, next) = read_ident(&chars, i + 1);
                let (fields, next) = read_fields(&chars, next, line)?;
                i = next;
                Token::Variable(name, fields)
            }
            '.' if chars.get(i + 1).is_some_and(|c| is_ident_start(*c)) => {
                let (fields, next) = read_fields(&chars, i, line)?;
                i = next;
                Token::Field(fields)
            }
            '.' if chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                let (number, next) = read_number(&chars, i, line)?;
                i = next;
                Token::Number(number)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '+' | '-' | '0'..='9' => {
                let (number, next) = read_number(&chars, i, line)?;
                i = next;
                Token::Number(number)
            }
            c if is_ident_start(c) => {
                let (name, next) = read_ident(&chars, i);
                i = next;
                Token::Ident(name)
            }
            '\'' => {
                return Err(ParseError::new(line, "character constants are not supported"));
            }
            other => {
                return Err(ParseError::new(line, format!("unexpected {other:?} in command")));
            }
        };

        tokens.push(Lexeme { token, glued });
        glued = true;
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let end = chars[start..]
        .iter()
        .position(|c| !(c.is_alphanumeric() || *c == '_'))
        .map_or(chars.len(), |len| start + len);
    (chars[start..end].iter().collect(), end)
}

fn read_fields(chars: &[char], mut i: usize, line: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut fields = Vec::new();
    while chars.get(i) == Some(&'.') {
        let (name, next) = read_ident(chars, i + 1);
        if name.is_empty() {
            return Err(ParseError::new(line, "bad field name"));
        }
        fields.push(name);
        i = next;
    }
    Ok((fields, i))
}

fn read_number(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ParseError> {
    let mut i = start + 1;
    while let Some(&c) = chars.get(i) {
        let exponent_sign = (c == '+' || c == '-') && matches!(chars[i - 1], 'e' | 'E');
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
            i += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..i].iter().collect();
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    if has_digit && NUMBER_RE.is_match(&text) {
        Ok((text, i))
    } else {
        Err(ParseError::new(line, format!("bad number syntax: {text:?}")))
    }
}

fn read_quoted(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ParseError> {
    let mut text = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None | Some('\n') => {
                return Err(ParseError::new(line, "unterminated quoted string"));
            }
            Some('"') => return Ok((text, i + 1)),
            Some('\\') => {
                let escaped = match chars.get(i + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some('u') => {
                        let hex: String = chars.iter().skip(i + 2).take(4).collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| ParseError::new(line, "invalid unicode escape"))?;
                        text.push(decoded);
                        i += 6;
                        continue;
                    }
                    other => {
                        return Err(ParseError::new(
                            line,
                            format!("unknown escape sequence: \\{}", other.copied().unwrap_or(' ')),
                        ));
                    }
                };
                text.push(escaped);
                i += 2;
            }
            Some(&c) => {
                text.push(c);
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        match lex(source).unwrap().remove(0) {
            Item::Action { tokens, .. } => tokens.into_iter().map(|lexeme| lexeme.token).collect(),
            Item::Text(text) => panic!("expected an action, got text {text:?}"),
        }
    }

    #[test]
    fn splits_text_and_actions() {
        let items = lex("Hello, {{.Name}}!").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Item::Text("Hello, ".into()));
        assert_eq!(items[2], Item::Text("!".into()));
    }

    #[test]
    fn field_chains_are_single_tokens() {
        assert_eq!(
            tokens("{{.Txn.Preimage.String}}"),
            vec![Token::Field(vec!["Txn".into(), "Preimage".into(), "String".into()])]
        );
    }

    #[test]
    fn variables_and_declarations() {
        assert_eq!(
            tokens("{{range $i, $e := .List}}"),
            vec![
                Token::Ident("range".into()),
                Token::Variable("i".into(), vec![]),
                Token::Comma,
                Token::Variable("e".into(), vec![]),
                Token::Declare,
                Token::Field(vec!["List".into()]),
            ]
        );
    }

    #[test]
    fn quoted_strings_may_contain_delimiters() {
        assert_eq!(
            tokens(r#"{{printf "%s}}\n" .X}}"#),
            vec![
                Token::Ident("printf".into()),
                Token::Str("%s}}\n".into()),
                Token::Field(vec!["X".into()]),
            ]
        );
    }

    #[test]
    fn trim_markers_eat_surrounding_whitespace() {
        let items = lex("a  \n {{- .X -}} \n b").unwrap();
        assert_eq!(items[0], Item::Text("a".into()));
        assert_eq!(items[2], Item::Text("b".into()));
    }

    #[test]
    fn negative_numbers_are_not_trim_markers() {
        assert_eq!(tokens("{{-3}}"), vec![Token::Number("-3".into())]);
    }

    #[test]
    fn comments_produce_nothing() {
        let items = lex("a{{/* note }} */}}b").unwrap();
        assert_eq!(items, vec![Item::Text("a".into()), Item::Text("b".into())]);
    }

    #[test]
    fn reports_line_of_unclosed_action() {
        let err = lex("one\ntwo {{ .X").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.reason, "unclosed action");
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = lex("{{ 12abc }}").unwrap_err();
        assert!(err.reason.starts_with("bad number syntax"));
    }

    #[test]
    fn glued_tokens_are_marked() {
        let Item::Action { tokens, .. } = lex("{{(.A).B .C}}").unwrap().remove(0) else {
            panic!("expected action");
        };
        assert!(tokens[3].glued);
        assert!(!tokens[4].glued);
    }
}
