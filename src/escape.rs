//! Quoting rules for the ffmpeg filtergraph mini-language, which reuses
//! `:`, `,`, `'` and `\` as structural delimiters.

/// Escape a file path for embedding inside a filter parameter.
/// Backslashes are normalized to forward slashes first, so Windows paths
/// survive the trip through the graph parser.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Escape free text (titles, font family names). Backslash must go first
/// or the later replacements would be double-escaped.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Escape a generated numeric expression (used by `geq`). Commas separate
/// filter arguments, so they need escaping; quotes never appear in the
/// expressions we generate.
pub fn escape_expr(expr: &str) -> String {
    expr.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace(',', "\\,")
}

/// Normalize `#RGB` / `#RRGGBB` to ffmpeg's `0xRRGGBB` form. Malformed
/// input falls back to opaque white rather than failing the render.
pub fn hex_to_rgb(color: &str) -> String {
    match expand_hex(color) {
        Some(hex) => format!("0x{hex}"),
        None => "0xFFFFFF".to_owned(),
    }
}

/// Parse `#RGB` / `#RRGGBB` into channel values, falling back to white.
pub fn parse_hex_color(color: &str) -> (u8, u8, u8) {
    let Some(hex) = expand_hex(color) else {
        return (255, 255, 255);
    };
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Ok(r), Ok(g), Ok(b)) => (r, g, b),
        _ => (255, 255, 255),
    }
}

fn expand_hex(color: &str) -> Option<String> {
    let trimmed = color.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => digits.to_owned(),
        _ => return None,
    };
    Some(expanded.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{escape_expr, escape_filter_path, escape_text, hex_to_rgb, parse_hex_color};

    /// Minimal tokenizer matching ffmpeg's unescaping rules: a backslash
    /// makes the next character literal. Used to prove the escape functions
    /// round-trip.
    fn unescape(escaped: &str) -> String {
        let mut out = String::with_capacity(escaped.len());
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn path_escaping_round_trips_through_tokenizer() {
        let path = "C:/media/it's a clip.mp4";
        let escaped = escape_filter_path(path);
        assert!(!escaped.contains("::"));
        assert_eq!(unescape(&escaped), path);
    }

    #[test]
    fn path_escaping_normalizes_backslashes() {
        let escaped = escape_filter_path("C:\\media\\clip.mp4");
        assert_eq!(unescape(&escaped), "C:/media/clip.mp4");
    }

    #[test]
    fn text_escaping_round_trips_with_all_delimiters() {
        let text = "intro: it's \\ over";
        assert_eq!(unescape(&escape_text(text)), text);
    }

    #[test]
    fn expr_escaping_round_trips_commas() {
        let expr = "hypot(X-W/2,Y-H/2)";
        let escaped = escape_expr(expr);
        assert!(escaped.contains("\\,"));
        assert_eq!(unescape(&escaped), expr);
    }

    #[test]
    fn short_hex_expands_to_six_digits() {
        assert_eq!(hex_to_rgb("#abc"), "0xAABBCC");
        assert_eq!(parse_hex_color("#abc"), (0xAA, 0xBB, 0xCC));
    }

    #[test]
    fn full_hex_is_uppercased() {
        assert_eq!(hex_to_rgb("#4fe1b8"), "0x4FE1B8");
        assert_eq!(parse_hex_color("4fe1b8"), (0x4F, 0xE1, 0xB8));
    }

    #[test]
    fn malformed_hex_falls_back_to_white() {
        assert_eq!(hex_to_rgb("#12"), "0xFFFFFF");
        assert_eq!(hex_to_rgb(""), "0xFFFFFF");
        assert_eq!(hex_to_rgb("#zzzzzz"), "0xFFFFFF");
        assert_eq!(parse_hex_color("#12345"), (255, 255, 255));
    }
}
