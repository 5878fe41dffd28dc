//! RFC 7230 parameter-list parsing, used for headers like
//! `Sec-WebSocket-Extensions` and `Sec-WebSocket-Protocol` that carry a
//! comma-separated list of tokens, each optionally followed by
//! `;attribute=value` pairs.
//!
//! Grounded on `websocketpp::http::parser::extract_parameters`.

/// One parameter: a name plus its semicolon-delimited attributes.
pub type Attributes = Vec<(String, String)>;
pub type ParameterList = Vec<(String, Attributes)>;

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '=' | '{' | '}')
}

fn extract_token(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
    (&s[..end], &s[end..])
}

fn skip_lws(s: &str) -> &str {
    s.trim_start_matches([' ', '\t'])
}

fn extract_attributes(mut s: &str) -> (Attributes, &str) {
    let mut attrs = Attributes::new();
    loop {
        s = skip_lws(s);
        if s.is_empty() {
            break;
        }
        let (name, rest) = extract_token(s);
        if name.is_empty() {
            break;
        }
        s = skip_lws(rest);
        if let Some(after_eq) = s.strip_prefix('=') {
            let after_eq = skip_lws(after_eq);
            if let Some(quoted) = after_eq.strip_prefix('"') {
                if let Some(end) = quoted.find('"') {
                    attrs.push((name.to_string(), quoted[..end].to_string()));
                    s = &quoted[end + 1..];
                } else {
                    attrs.push((name.to_string(), String::new()));
                    s = "";
                }
            } else {
                let (value, rest) = extract_token(after_eq);
                attrs.push((name.to_string(), value.to_string()));
                s = rest;
            }
        } else {
            attrs.push((name.to_string(), String::new()));
        }
        s = skip_lws(s);
        if let Some(rest) = s.strip_prefix(';') {
            s = rest;
        } else {
            break;
        }
    }
    (attrs, s)
}

/// Parses a comma-separated parameter list such as
/// `permessage-deflate; client_max_window_bits, x-foo`.
pub fn parse_parameter_list(input: &str) -> ParameterList {
    let mut out = ParameterList::new();
    let mut s = input;
    loop {
        s = skip_lws(s);
        if s.is_empty() {
            break;
        }
        let (name, rest) = extract_token(s);
        if name.is_empty() {
            break;
        }
        s = skip_lws(rest);
        let attrs = if let Some(after_semi) = s.strip_prefix(';') {
            let (attrs, rest) = extract_attributes(after_semi);
            s = rest;
            attrs
        } else {
            Attributes::new()
        };
        out.push((name.to_string(), attrs));
        s = skip_lws(s);
        match s.strip_prefix(',') {
            Some(rest) => s = rest,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_tokens() {
        let list = parse_parameter_list("chat, superchat");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].0, "chat");
        assert_eq!(list[1].0, "superchat");
    }

    #[test]
    fn parses_attributes() {
        let list = parse_parameter_list("permessage-deflate; client_max_window_bits=15");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, "permessage-deflate");
        assert_eq!(list[0].1, vec![("client_max_window_bits".to_string(), "15".to_string())]);
    }

    #[test]
    fn parses_quoted_attribute_value() {
        let list = parse_parameter_list(r#"foo; bar="baz qux""#);
        assert_eq!(list[0].1, vec![("bar".to_string(), "baz qux".to_string())]);
    }
}
