/// Split one line of `sg batch` input into arguments.
///
/// Whitespace separates arguments; single or double quotes group words
/// (`set 7:30 anna "Jan Kowalski"`), and a backslash escapes the next
/// character outside single quotes. Returns an error for an unterminated
/// quote.
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('"'), '"') => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_arg = true;
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            split_command_line("mv 7:30 anna  8:00 bob").unwrap(),
            vec!["mv", "7:30", "anna", "8:00", "bob"]
        );
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            split_command_line(r#"set 7:30 anna "Jan Kowalski""#).unwrap(),
            vec!["set", "7:30", "anna", "Jan Kowalski"]
        );
        assert_eq!(
            split_command_line("set 7:30 anna 'a \"b\"'").unwrap(),
            vec!["set", "7:30", "anna", "a \"b\""]
        );
    }

    #[test]
    fn empty_quotes_make_empty_argument() {
        assert_eq!(
            split_command_line(r#"set 7:30 anna """#).unwrap(),
            vec!["set", "7:30", "anna", ""]
        );
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(split_command_line(r"a\ b c").unwrap(), vec!["a b", "c"]);
    }

    #[test]
    fn unterminated_quote_is_error() {
        assert!(split_command_line("set \"oops").is_err());
    }

    #[test]
    fn blank_line_has_no_args() {
        assert!(split_command_line("   ").unwrap().is_empty());
    }
}
