use super::types::ValidationMode;

const LOCAL_MAX: usize = 64;

/// atext (RFC 5322 §3.2.3) minus the dot, which is checked structurally.
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// Checks the local part and pushes one reason per broken rule.
pub(crate) fn check_local(local: &str, mode: ValidationMode, reasons: &mut Vec<String>) {
    if local.is_empty() || local.len() > LOCAL_MAX {
        reasons.push(format!(
            "local part length {} invalid (1..={LOCAL_MAX})",
            local.len()
        ));
        if local.is_empty() {
            return;
        }
    }

    if mode == ValidationMode::Relaxed && is_simple_quoted(local) {
        return;
    }

    if local.starts_with('.') {
        reasons.push("local part cannot start with '.'".to_string());
    }
    if local.ends_with('.') {
        reasons.push("local part cannot end with '.'".to_string());
    }
    if local.contains("..") {
        reasons.push("local part cannot contain consecutive dots".to_string());
    }

    let mut bad: Vec<char> = local
        .chars()
        .filter(|c| *c != '.' && !is_atext(*c))
        .collect();
    bad.dedup();
    if !bad.is_empty() {
        let listed: String = bad.iter().collect();
        reasons.push(match mode {
            ValidationMode::Strict => format!("invalid local part (strict rules): '{listed}'"),
            ValidationMode::Relaxed => format!("invalid local part (relaxed rules): '{listed}'"),
        });
    }
}

/// Relaxed mode accepts a quoted-string without embedded quotes or control chars.
fn is_simple_quoted(s: &str) -> bool {
    if s.len() < 2 || !s.starts_with('"') || !s.ends_with('"') {
        return false;
    }
    let inner = &s[1..s.len() - 1];
    !inner.is_empty() && inner.chars().all(|c| c != '"' && c != '\\' && !c.is_control())
}
