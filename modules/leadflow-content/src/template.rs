use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Resolve `{{var}}` placeholders from a personalization map.
/// Unknown variables are left as-is so missing data is visible downstream.
pub fn resolve_vars(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next(); // consume second {

            let mut var_name = String::new();
            loop {
                match chars.next() {
                    Some('}') if chars.peek() == Some(&'}') => {
                        chars.next();
                        break;
                    }
                    Some(ch) => var_name.push(ch),
                    None => {
                        // Malformed — just emit what we have
                        result.push_str("{{");
                        result.push_str(&var_name);
                        return result;
                    }
                }
            }

            let var_name = var_name.trim();
            if let Some(value) = vars.get(var_name) {
                result.push_str(value);
            } else {
                result.push_str("{{");
                result.push_str(var_name);
                result.push_str("}}");
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Hard cap for sms/whatsapp bodies.
pub const MOBILE_MAX_LEN: usize = 320;

/// Replace common long-form calls to action with short mobile forms.
fn shorten_cta(text: &str) -> String {
    static CTA_MAP: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let map = CTA_MAP.get_or_init(|| {
        [
            (r"(?i)click here", "Tap!"),
            (r"(?i)learn more", "More info"),
            (r"(?i)shop now", "Shop!"),
            (r"(?i)see details", "Details"),
            (r"(?i)contact us", "Msg us!"),
            (r"(?i)reply now", "Reply!"),
        ]
        .iter()
        .map(|(pattern, repl)| (Regex::new(pattern).unwrap(), *repl))
        .collect()
    });

    let mut out = text.to_string();
    for (pattern, repl) in map {
        out = pattern.replace_all(&out, *repl).into_owned();
    }
    out
}

/// Shorten CTAs and clamp to the mobile length cap.
/// Returns the body and whether it was truncated.
pub fn enforce_mobile_rules(text: &str, max_len: usize) -> (String, bool) {
    let text = shorten_cta(text);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return (text, false);
    }
    let mut clamped: String = chars[..max_len.saturating_sub(3)].iter().collect();
    clamped.push_str("...");
    (clamped, true)
}
