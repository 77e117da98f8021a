use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";

fn is_control(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// Remove control characters and ANSI escape sequences from stored text.
///
/// Category names and course summaries are typed by users and later printed
/// to a terminal by the CLI, so escape sequences must not survive. Tab,
/// newline and carriage return are kept.
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| b == 0x1b || is_control(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x1b if bytes.get(i + 1) == Some(&b'[') => {
                // CSI: parameters up to and including a final byte in 0x40..=0x7e
                i += 2;
                while let Some(&c) = bytes.get(i) {
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            }
            0x1b if bytes.get(i + 1) == Some(&b']') => {
                // OSC: terminated by BEL or ESC \
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b if b == 0x1b || is_control(b) => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && bytes[i] != 0x1b && !is_control(bytes[i]) {
                    i += 1;
                }
                // Only ASCII bytes end a run, so the slice is on char boundaries.
                out.push_str(&s[start..i]);
            }
        }
    }
    Cow::Owned(out)
}

/// Plain-text view of an HTML fragment: tags dropped, common entities
/// decoded, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => text.push(c),
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorten text to at most `max_width` display columns, cutting at the last
/// word boundary that fits and appending `...`.
///
/// Width is measured in terminal columns, so CJK characters count double.
/// A single word longer than the limit is cut mid-word.
pub fn shorten_text(s: &str, max_width: usize) -> Cow<'_, str> {
    let mut width = 0;
    let mut fits_until = None;
    for (idx, c) in s.char_indices() {
        width += c.width().unwrap_or(0);
        if width > max_width {
            fits_until = Some(idx);
            break;
        }
    }
    let Some(overflow) = fits_until else {
        return Cow::Borrowed(s);
    };

    let budget = max_width.saturating_sub(ELLIPSIS.len());
    let mut cut = 0;
    let mut last_space = None;
    let mut used = 0;
    for (idx, c) in s[..overflow].char_indices() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
        if c.is_whitespace() {
            last_space = Some(idx);
        }
    }

    let end = if s[cut..].starts_with(char::is_whitespace) {
        cut
    } else {
        last_space.filter(|&space| space > 0).unwrap_or(cut)
    };
    Cow::Owned(format!("{}{ELLIPSIS}", s[..end].trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_is_borrowed() {
        let input = "Physics\tand\nChemistry";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_controls_and_del() {
        assert_eq!(strip_control_chars("Sci\x00en\x07ce\x7f"), "Science");
    }

    #[test]
    fn test_strip_csi_and_osc() {
        assert_eq!(strip_control_chars("\x1b[1;31mArts\x1b[0m"), "Arts");
        assert_eq!(strip_control_chars("\x1b]0;title\x07Maths"), "Maths");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\Maths"), "Maths");
        assert_eq!(strip_control_chars("a\x1bb"), "ab");
    }

    #[test]
    fn test_strip_keeps_unicode() {
        assert_eq!(strip_control_chars("物理\x1b[2A学"), "物理学");
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>Intro to <b>optics</b> &amp; waves</p>\n<p>Year&nbsp;1</p>"),
            "Intro to optics & waves Year 1"
        );
    }

    #[test]
    fn test_shorten_fits() {
        let result = shorten_text("Short summary", 40);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_shorten_at_word_boundary() {
        assert_eq!(
            shorten_text("An introduction to classical mechanics", 20),
            "An introduction..."
        );
    }

    #[test]
    fn test_shorten_long_word() {
        assert_eq!(shorten_text("Supercalifragilistic", 10), "Superca...");
    }

    #[test]
    fn test_shorten_wide_chars() {
        // Each character is two columns wide.
        assert_eq!(shorten_text("物理学入門講座", 9), "物理学...");
    }
}
