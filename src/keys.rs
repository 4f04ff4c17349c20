//! Key bindings: compile `"ctrl+shift+up"`-style patterns and match them
//! against decoded key events.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::error::{EngineError, Result};
use crate::input::{KeyEvent, Modifiers};

/// A compiled key binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    name: String,
    modifiers: Modifiers,
}

impl KeyPattern {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        let (name, modifiers) = normalize(&event.name, event.modifiers);
        name == self.name && modifiers == self.modifiers
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, label) in [
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::ALT, "alt"),
            (Modifiers::SHIFT, "shift"),
            (Modifiers::META, "meta"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{label}+")?;
            }
        }
        f.write_str(&self.name)
    }
}

impl FromStr for KeyPattern {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        parse_key_pattern(s)
    }
}

fn modifier_alias(part: &str) -> Option<Modifiers> {
    Some(match part {
        "ctrl" | "control" => Modifiers::CTRL,
        "alt" | "option" => Modifiers::ALT,
        "shift" => Modifiers::SHIFT,
        "meta" | "cmd" | "super" => Modifiers::META,
        _ => return None,
    })
}

fn name_alias(name: &str) -> &str {
    match name {
        "esc" => "escape",
        "return" => "enter",
        "del" => "delete",
        "pgup" => "pageup",
        "pgdn" => "pagedown",
        " " => "space",
        other => other,
    }
}

/// Uppercase single letters are shift + the lowercase letter, for both
/// events and patterns.
fn normalize(name: &str, modifiers: Modifiers) -> (String, Modifiers) {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_uppercase() {
            return (c.to_ascii_lowercase().to_string(), modifiers | Modifiers::SHIFT);
        }
    }
    (name.to_string(), modifiers)
}

/// Compile a binding such as `"ctrl+c"`, `"shift+tab"`, `"esc"` or `"+"`.
pub fn parse_key_pattern(pattern: &str) -> Result<KeyPattern> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(EngineError::KeyPattern(pattern.to_string()));
    }

    // A trailing "++" means the key itself is '+'.
    let (mods_part, key_part) = if trimmed == "+" {
        ("", "+")
    } else if let Some(prefix) = trimmed.strip_suffix("++") {
        (prefix, "+")
    } else {
        match trimmed.rfind('+') {
            Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
            None => ("", trimmed),
        }
    };
    if key_part.is_empty() {
        return Err(EngineError::KeyPattern(pattern.to_string()));
    }

    let mut modifiers = Modifiers::empty();
    if !mods_part.is_empty() {
        for part in mods_part.split('+') {
            let part = part.trim().to_ascii_lowercase();
            match modifier_alias(&part) {
                Some(m) => modifiers |= m,
                None => return Err(EngineError::KeyPattern(pattern.to_string())),
            }
        }
    }

    // Keep case only for single characters: "A" means shift+a.
    let key_name = if key_part.chars().count() == 1 {
        key_part.to_string()
    } else {
        key_part.to_ascii_lowercase()
    };
    let (name, modifiers) = normalize(name_alias(&key_name), modifiers);
    Ok(KeyPattern { name, modifiers })
}

/// One-shot form of `parse_key_pattern(..).matches(..)`. Invalid patterns
/// never match.
pub fn match_key(event: &KeyEvent, pattern: &str) -> bool {
    match parse_key_pattern(pattern) {
        Ok(p) => p.matches(event),
        Err(e) => {
            trace!(%e, "ignoring invalid key pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputDecoder;
    use std::time::Instant;

    fn decode_key(bytes: &[u8]) -> KeyEvent {
        match InputDecoder::new().feed(bytes, Instant::now()).remove(0) {
            crate::input::InputEvent::Key(k) => k,
            other => panic!("expected key, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_modifiers_and_aliases() {
        let p = parse_key_pattern("Control+Option+PgDn").unwrap();
        assert_eq!(p.name(), "pagedown");
        assert_eq!(p.modifiers(), Modifiers::CTRL | Modifiers::ALT);

        assert_eq!(parse_key_pattern("esc").unwrap().name(), "escape");
        assert_eq!(parse_key_pattern("return").unwrap().name(), "enter");
        assert_eq!(parse_key_pattern("cmd+s").unwrap().modifiers(), Modifiers::META);
        assert_eq!(parse_key_pattern("super+s").unwrap().modifiers(), Modifiers::META);
    }

    #[test]
    fn test_parse_plus_key() {
        assert_eq!(parse_key_pattern("+").unwrap().name(), "+");
        let p = parse_key_pattern("ctrl++").unwrap();
        assert_eq!(p.name(), "+");
        assert_eq!(p.modifiers(), Modifiers::CTRL);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(parse_key_pattern("").is_err());
        assert!(parse_key_pattern("ctrl+").is_err());
        assert!(parse_key_pattern("hyper+x").is_err());
        assert!(matches!(
            "ctrl+".parse::<KeyPattern>(),
            Err(EngineError::KeyPattern(_))
        ));
    }

    #[test]
    fn test_match_decoded_events() {
        assert!(match_key(&decode_key(b"\x03"), "ctrl+c"));
        assert!(!match_key(&decode_key(b"c"), "ctrl+c"));
        assert!(match_key(&decode_key(b"\x1b[1;5C"), "ctrl+right"));
        assert!(match_key(&decode_key(b"\x1b[Z"), "shift+tab"));
        assert!(match_key(&decode_key(b" "), "space"));
        assert!(match_key(&decode_key(b"\x1bx"), "alt+x"));
        assert!(!match_key(&decode_key(b"q"), "hyper+q"));
    }

    #[test]
    fn test_uppercase_equivalent_to_shift() {
        let ev = decode_key(b"A");
        assert!(match_key(&ev, "shift+a"));
        assert!(match_key(&ev, "A"));
        assert!(!match_key(&ev, "a"));
    }

    #[test]
    fn test_display_round_trips() {
        let p = parse_key_pattern("shift+ctrl+f5").unwrap();
        assert_eq!(p.to_string(), "ctrl+shift+f5");
        assert_eq!(p.to_string().parse::<KeyPattern>().unwrap(), p);
    }
}
