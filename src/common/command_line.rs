use anyhow::{bail, Result};

use super::resp3::RESP3Value;

/// Split a typed command such as `SET k "hello world" EX 10` into arguments.
///
/// Whitespace separates arguments. Single and double quotes group words, and
/// inside double quotes a backslash escapes the next character (`\n`, `\r`
/// and `\t` are translated).
pub fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some('t') => current.push('\t'),
                Some(escaped) => current.push(escaped),
                None => bail!("Unbalanced quotes in command line"),
            },
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        bail!("Unbalanced quotes in command line");
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Build the request frame for a typed command, or `None` for a blank line.
pub fn command_line_frame(line: &str) -> Result<Option<RESP3Value>> {
    let tokens = split_command_line(line)?;

    if tokens.is_empty() {
        return Ok(None);
    }

    Ok(Some(RESP3Value::Array(
        tokens.into_iter().map(RESP3Value::bulk).collect(),
    )))
}
