use std::ops::Range;

use pulldown_cmark::{Event, Options, Parser};
use serde::{Deserialize, Serialize};

/// Payload of the `active-file` slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Split a deck at top-level `---` thematic breaks.
///
/// Breaks inside code blocks, block quotes or lists do not split, and a
/// `---` directly under a paragraph is a setext heading underline. Always
/// yields at least one slide.
pub fn split_slides(markdown: &str) -> Vec<String> {
    let mut cuts: Vec<Range<usize>> = Vec::new();
    let mut depth = 0usize;
    for (event, range) in Parser::new_ext(markdown, options()).into_offset_iter() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Rule if depth == 0 && is_dash_break(&markdown[range.clone()]) => {
                cuts.push(range)
            }
            _ => {}
        }
    }

    let mut slides = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        slides.push(markdown[start..cut.start].trim().to_string());
        start = cut.end;
    }
    slides.push(markdown[start..].trim().to_string());

    // Leading or doubled separators leave empty slides behind.
    slides.retain(|s| !s.is_empty());
    if slides.is_empty() {
        slides.push(String::new());
    }
    slides
}

// `***` and `___` stay in-slide rules.
fn is_dash_break(source: &str) -> bool {
    source.trim().starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_separator_lines() {
        let deck = "# One\nintro\n\n---\n# Two\n\n---\n# Three";
        assert_eq!(split_slides(deck), vec!["# One\nintro", "# Two", "# Three"]);
    }

    #[test]
    fn separators_inside_fences_are_content() {
        let deck = "# Yaml\n```yaml\n---\nkey: value\n```\n---\n# Next";
        let slides = split_slides(deck);
        assert_eq!(slides.len(), 2);
        assert!(slides[0].contains("key: value"));
        assert!(slides[0].contains("---"));
    }

    #[test]
    fn tilde_fences_and_longer_closers() {
        let deck = "~~~~\n---\n~~~\n---\n~~~~\nafter";
        // The three-tilde line does not close a four-tilde fence.
        assert_eq!(split_slides(deck).len(), 1);
    }

    #[test]
    fn indented_code_keeps_its_rule() {
        let deck = "# A\n\n    code\n    ---\n    more\n\nend";
        let slides = split_slides(deck);
        assert_eq!(slides.len(), 1);
        assert!(slides[0].contains("    ---"));
    }

    #[test]
    fn fence_inside_blockquote_keeps_its_rule() {
        let deck = "> ```\n> ---\n> ```\n\nafter";
        assert_eq!(split_slides(deck).len(), 1);
    }

    #[test]
    fn nested_breaks_do_not_split() {
        assert_eq!(split_slides("> quoted\n>\n> ---\n\nafter").len(), 1);
        assert_eq!(split_slides("- item\n\n  ---\n\n- next").len(), 1);
    }

    #[test]
    fn setext_underline_is_a_heading() {
        let slides = split_slides("Title\n---\nbody\n\n---\n\nnext");
        assert_eq!(slides, vec!["Title\n---\nbody", "next"]);
    }

    #[test]
    fn star_rules_stay_in_slide() {
        assert_eq!(split_slides("one\n\n***\n\ntwo").len(), 1);
    }

    #[test]
    fn empty_input_is_one_empty_slide() {
        assert_eq!(split_slides(""), vec![String::new()]);
        assert_eq!(split_slides("---\n---"), vec![String::new()]);
    }

    #[test]
    fn document_without_separators_is_single_slide() {
        assert_eq!(split_slides("just text").len(), 1);
    }
}
