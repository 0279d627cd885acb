//! Splitting of the `args` task option.
//!
//! Words are separated by unquoted whitespace. Single quotes keep their content
//! verbatim, double quotes allow `\"`, `\\` and `\$` escapes, and a backslash outside
//! quotes escapes the next character. `$NAME` and `${NAME}` are replaced from the task
//! environment outside single quotes; unknown names are kept as written.
use std::{collections::HashMap, iter::Peekable, str::Chars};

use tno_core::DriverError;

pub fn parse_and_replace(
    raw: &str,
    env: &HashMap<String, String>,
) -> Result<Vec<String>, DriverError> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => cur.push(c),
                        None => return Err(invalid(raw, "unterminated single quote")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.peek() {
                            Some(&n @ ('"' | '\\' | '$')) => {
                                cur.push(n);
                                chars.next();
                            }
                            _ => cur.push('\\'),
                        },
                        Some('$') => expand(&mut chars, &mut cur, env, raw)?,
                        Some(c) => cur.push(c),
                        None => return Err(invalid(raw, "unterminated double quote")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                cur.push(chars.next().unwrap_or('\\'));
            }
            '$' => {
                in_word = true;
                expand(&mut chars, &mut cur, env, raw)?;
            }
            c => {
                in_word = true;
                cur.push(c);
            }
        }
    }
    if in_word {
        args.push(cur);
    }
    Ok(args)
}

/// Expands a variable reference whose `$` has already been consumed.
fn expand(
    chars: &mut Peekable<Chars<'_>>,
    out: &mut String,
    env: &HashMap<String, String>,
    raw: &str,
) -> Result<(), DriverError> {
    if chars.peek() == Some(&'{') {
        chars.next();
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) => name.push(c),
                None => return Err(invalid(raw, "unterminated ${")),
            }
        }
        match env.get(&name) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        }
        return Ok(());
    }

    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    match env.get(&name) {
        _ if name.is_empty() => out.push('$'),
        Some(value) => out.push_str(value),
        None => {
            out.push('$');
            out.push_str(&name);
        }
    }
    Ok(())
}

fn invalid(raw: &str, reason: &str) -> DriverError {
    DriverError::Config(format!("failed to parse args {raw:?}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> HashMap<String, String> {
        HashMap::from([
            ("TNO_TASK_DIR".to_string(), "/local".to_string()),
            ("PORT".to_string(), "8080".to_string()),
            ("SPACED".to_string(), "a b".to_string()),
        ])
    }

    #[test]
    fn splits_on_whitespace() {
        let args = parse_and_replace("  -v   --name web ", &env()).unwrap();
        assert_eq!(args, vec!["-v", "--name", "web"]);
    }

    #[test]
    fn empty_input_yields_no_args() {
        assert!(parse_and_replace("", &env()).unwrap().is_empty());
        assert!(parse_and_replace("   ", &env()).unwrap().is_empty());
    }

    #[test]
    fn replaces_variables() {
        let args = parse_and_replace("--dir=${TNO_TASK_DIR}/data -p $PORT", &env()).unwrap();
        assert_eq!(args, vec!["--dir=/local/data", "-p", "8080"]);
    }

    #[test]
    fn expanded_value_is_not_resplit() {
        let args = parse_and_replace("$SPACED", &env()).unwrap();
        assert_eq!(args, vec!["a b"]);
    }

    #[test]
    fn unknown_variables_are_kept() {
        let args = parse_and_replace("$NOPE ${ALSO_NOPE} $ cost$", &env()).unwrap();
        assert_eq!(args, vec!["$NOPE", "${ALSO_NOPE}", "$", "cost$"]);
    }

    #[test]
    fn quotes_group_words() {
        let args = parse_and_replace(r#"echo "hello world" 'single $PORT' "port $PORT""#, &env())
            .unwrap();
        assert_eq!(args, vec!["echo", "hello world", "single $PORT", "port 8080"]);
    }

    #[test]
    fn escapes() {
        let args = parse_and_replace(r#"a\ b "say \"hi\"" \$PORT "\$PORT""#, &env()).unwrap();
        assert_eq!(args, vec!["a b", r#"say "hi""#, "$PORT", "$PORT"]);
    }

    #[test]
    fn empty_quotes_are_an_argument() {
        let args = parse_and_replace(r#"--flag "" ''"#, &env()).unwrap();
        assert_eq!(args, vec!["--flag", "", ""]);
    }

    #[test]
    fn unterminated_constructs_are_config_errors() {
        for raw in [r#"echo "oops"#, "echo 'oops", "echo ${PORT"] {
            let err = parse_and_replace(raw, &env()).unwrap_err();
            assert!(matches!(err, DriverError::Config(_)), "{raw}");
        }
    }
}
