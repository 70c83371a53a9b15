use std::sync::LazyLock;

use mdlive_markdown::{Node, parse_html_fragment, parse_markdown};
use regex_lite::Regex;

static SINGLE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^<([a-z]+)[^>]*>(.*)</([a-z]+)>\s*$").expect("valid single element pattern")
});

/// Whether `text` has the shape of one element: an opening tag, any body and a
/// closing tag with the same name, followed only by whitespace.
pub fn is_single_element(text: &str) -> bool {
    SINGLE_ELEMENT
        .captures(text)
        .and_then(|caps| Some((caps.get(1)?, caps.get(3)?)))
        .is_some_and(|(open, close)| open.as_str().eq_ignore_ascii_case(close.as_str()))
}

/// Converts fragment output into nodes.
///
/// Output that looks like a single element and parses as well-formed HTML
/// becomes that HTML; anything else is read as markdown.
pub fn classify(text: &str) -> Vec<Node> {
    let trimmed = text.trim_start();

    if is_single_element(trimmed) {
        match parse_html_fragment(trimmed) {
            Ok(nodes) => return nodes,
            Err(err) => tracing::debug!(error = %err, "output is not well-formed html"),
        }
    }

    parse_markdown(text)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::simple("<b>ok</b>", true)]
    #[case::trailing_newline("<b>ok</b>\n", true)]
    #[case::attributes("<div class=\"x\">body</div>  \n", true)]
    #[case::multiline("<ul>\n<li>a</li>\n</ul>", true)]
    #[case::case_insensitive("<DIV>x</div>", true)]
    #[case::mismatched("<b>ok</i>", false)]
    #[case::trailing_text("<b>ok</b> tail", false)]
    #[case::leading_text("head <b>ok</b>", false)]
    #[case::markdown("# title", false)]
    #[case::digit_tag("<h1>x</h1>", false)]
    #[case::empty("", false)]
    fn test_is_single_element(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_single_element(text), expected);
    }

    #[test]
    fn test_html_output() {
        assert_eq!(classify("<b>ok</b>\n"), parse_html_fragment("<b>ok</b>\n").unwrap());
    }

    #[test]
    fn test_leading_whitespace_is_ignored() {
        assert_eq!(
            classify("  \n<em>x</em>"),
            vec![Node::element("em", vec![Node::text("x")])]
        );
    }

    #[rstest]
    #[case::markdown("# Title\n\nsome *text*")]
    #[case::plain("just words")]
    #[case::malformed_html("<p>a</span>b</p>")]
    #[case::two_roots_with_text("<b>a</b> and <i>b</i>")]
    #[case::empty("")]
    fn test_markdown_fallback(#[case] text: &str) {
        assert_eq!(classify(text), parse_markdown(text));
    }
}
