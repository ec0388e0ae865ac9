//! Indentation-aware tokenizer for the Python subset in `ast.rs`.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Int(String),
    Float(String),
    Str(String),
    FString(String),
    Op(String),
    Newline,
    Indent,
    Dedent,
    Eof,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0usize;
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut paren_depth: i32 = 0;
    let mut at_line_start = true;

    while i < chars.len() {
        if at_line_start && paren_depth == 0 {
            let line_start = i;
            let mut width = 0usize;
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                width += if chars[i] == '\t' { 8 } else { 1 };
                i += 1;
            }
            // blank or comment-only line: no indent change, no Newline token
            if i >= chars.len() || chars[i] == '\n' || chars[i] == '#' {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                if i < chars.len() {
                    i += 1;
                }
                continue;
            }
            let _ = line_start;
            let current = *indents.last().unwrap();
            if width > current {
                indents.push(width);
                tokens.push(Token::Indent);
            } else {
                while *indents.last().unwrap() > width {
                    indents.pop();
                    tokens.push(Token::Dedent);
                }
            }
            at_line_start = false;
        }

        let c = chars[i];

        if c == ' ' || c == '\t' {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '\\' && i + 1 < chars.len() && chars[i + 1] == '\n' {
            i += 2;
            continue;
        }
        if c == '\n' {
            i += 1;
            if paren_depth == 0 {
                if !matches!(tokens.last(), Some(Token::Newline) | None) {
                    tokens.push(Token::Newline);
                }
                at_line_start = true;
            }
            continue;
        }

        // string literal, with optional prefix letters
        if c.is_ascii_alphabetic() {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let word: String = chars[start..j].iter().collect();
            let lower = word.to_ascii_lowercase();
            let is_prefix = j < chars.len()
                && (chars[j] == '"' || chars[j] == '\'')
                && lower.len() <= 2
                && lower.chars().all(|ch| matches!(ch, 'f' | 'r' | 'b' | 'u'));
            if is_prefix {
                let is_fstring = lower.contains('f');
                let (content, next) = lex_string(&chars, j)?;
                i = next;
                tokens.push(if is_fstring {
                    Token::FString(content)
                } else {
                    Token::Str(content)
                });
                continue;
            }
            i = j;
            tokens.push(Token::Name(word));
            continue;
        }

        if c == '"' || c == '\'' {
            let (content, next) = lex_string(&chars, i)?;
            i = next;
            tokens.push(Token::Str(content));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut j = i;
            let mut is_float = false;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '_') {
                j += 1;
            }
            if j < chars.len() && chars[j] == '.' {
                is_float = true;
                j += 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '_') {
                    j += 1;
                }
            }
            if j < chars.len() && (chars[j] == 'e' || chars[j] == 'E') {
                is_float = true;
                j += 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
            }
            let text: String = chars[start..j].iter().collect();
            i = j;
            tokens.push(if is_float { Token::Float(text) } else { Token::Int(text) });
            continue;
        }

        if matches!(c, '(' | '[' | '{') {
            paren_depth += 1;
            tokens.push(Token::Op(c.to_string()));
            i += 1;
            continue;
        }
        if matches!(c, ')' | ']' | '}') {
            paren_depth -= 1;
            tokens.push(Token::Op(c.to_string()));
            i += 1;
            continue;
        }

        // multi-char operators, longest match first
        const THREE: &[&str] = &["**=", "//=", "...", ">>=", "<<="];
        const TWO: &[&str] = &[
            "**", "//", "==", "!=", "<=", ">=", "->", ":=", "+=", "-=", "*=", "/=", "%=", "&=",
            "|=", "^=", ">>", "<<",
        ];
        let rest: String = chars[i..(i + 3).min(chars.len())].iter().collect();
        if let Some(op) = THREE.iter().find(|op| rest.starts_with(*op)) {
            tokens.push(Token::Op(op.to_string()));
            i += op.len();
            continue;
        }
        let rest2: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(op) = TWO.iter().find(|op| rest2.starts_with(*op)) {
            tokens.push(Token::Op(op.to_string()));
            i += op.len();
            continue;
        }
        if "+-*/%()[]{},:.=<>!&|^~@;".contains(c) {
            tokens.push(Token::Op(c.to_string()));
            i += 1;
            continue;
        }

        return Err(format!("unexpected character {c:?} at byte offset {i}"));
    }

    while *indents.last().unwrap() > 0 {
        indents.pop();
        tokens.push(Token::Dedent);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Lex a string literal starting at the opening quote, returning its raw
/// inner content (quotes stripped, escapes left as-is) and the index just
/// past the closing quote.
fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let triple = start + 2 < chars.len() && chars[start + 1] == quote && chars[start + 2] == quote;
    let mut i = if triple { start + 3 } else { start + 1 };
    let content_start = i;
    loop {
        if i >= chars.len() {
            return Err("unterminated string literal".to_string());
        }
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if triple {
            if chars[i] == quote && i + 2 < chars.len() && chars[i + 1] == quote && chars[i + 2] == quote {
                let content: String = chars[content_start..i].iter().collect();
                return Ok((content, i + 3));
            }
            if i + 2 >= chars.len() && chars[i] == quote {
                // allow closing at buffer end for malformed-but-tolerated input
            }
        } else if chars[i] == quote {
            let content: String = chars[content_start..i].iter().collect();
            return Ok((content, i + 1));
        } else if chars[i] == '\n' {
            return Err("unterminated single-line string literal".to_string());
        }
        i += 1;
    }
}
