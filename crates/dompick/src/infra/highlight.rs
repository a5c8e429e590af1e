//! Markup highlighting built on syntect.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{
    Color as SyntectColor, FontStyle, Style as SyntectStyle, Theme, ThemeSet,
};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

const DEFAULT_THEME: &str = "base16-ocean.dark";
const MARKUP_EXTENSION: &str = "html";

static SYNTAXES: Lazy<Arc<SyntaxSet>> =
    Lazy::new(|| Arc::new(SyntaxSet::load_defaults_newlines()));
static THEMES: Lazy<Arc<ThemeSet>> = Lazy::new(|| Arc::new(ThemeSet::load_defaults()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HighlightStyle {
    /// `None` for fully transparent theme colors.
    pub foreground: Option<RgbColor>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub content: String,
    pub style: HighlightStyle,
}

/// One rendered line, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightLine {
    pub spans: Vec<HighlightSpan>,
}

impl HighlightLine {
    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.content.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightMode {
    Highlighted,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightResult {
    pub lines: Vec<HighlightLine>,
    /// Theme actually used, after fallback.
    pub theme: String,
    pub mode: HighlightMode,
}

impl HighlightResult {
    /// Unstyled lines of `markup`.
    pub fn plain(markup: &str, theme: impl Into<String>) -> Self {
        Self {
            lines: markup
                .lines()
                .map(|line| HighlightLine {
                    spans: vec![HighlightSpan {
                        content: line.to_owned(),
                        style: HighlightStyle::default(),
                    }],
                })
                .collect(),
            theme: theme.into(),
            mode: HighlightMode::Plain,
        }
    }
}

/// Highlights serialized markup for the inspector panel.
#[derive(Debug, Clone)]
pub struct Highlighter {
    syntaxes: Arc<SyntaxSet>,
    themes: Arc<ThemeSet>,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    /// Share the bundled syntax and theme sets; they are parsed once per process.
    pub fn new() -> Self {
        Self {
            syntaxes: Arc::clone(&SYNTAXES),
            themes: Arc::clone(&THEMES),
        }
    }

    pub fn available_themes(&self) -> Vec<String> {
        let mut themes: Vec<_> = self.themes.themes.keys().cloned().collect();
        themes.sort();
        themes
    }

    /// Highlight `markup` as HTML. Falls back to plain lines when no theme or syntax is usable.
    pub fn highlight_markup(&self, markup: &str, theme: &str) -> HighlightResult {
        let Some((theme_name, resolved)) = self.resolve_theme(theme) else {
            return HighlightResult::plain(markup, theme);
        };
        let Some(syntax) = self.syntaxes.find_syntax_by_extension(MARKUP_EXTENSION) else {
            tracing::debug!("no markup syntax available");
            return HighlightResult::plain(markup, theme_name);
        };

        match self.highlight_lines(markup, resolved, syntax) {
            Ok(lines) => HighlightResult {
                lines,
                theme: theme_name.to_owned(),
                mode: HighlightMode::Highlighted,
            },
            Err(err) => {
                tracing::warn!(error = %err, "markup highlight failed");
                HighlightResult::plain(markup, theme_name)
            }
        }
    }

    fn highlight_lines(
        &self,
        markup: &str,
        theme: &Theme,
        syntax: &SyntaxReference,
    ) -> Result<Vec<HighlightLine>> {
        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines = Vec::new();
        for line in LinesWithEndings::from(markup) {
            let spans = highlighter
                .highlight_line(line, &self.syntaxes)?
                .into_iter()
                .filter_map(|(style, text)| {
                    let text = text.trim_end_matches(['\n', '\r']);
                    (!text.is_empty()).then(|| HighlightSpan {
                        content: text.to_owned(),
                        style: convert_style(style),
                    })
                })
                .collect();
            lines.push(HighlightLine { spans });
        }
        Ok(lines)
    }

    /// Exact name, then a case-insensitive match, then the default theme, then any theme.
    fn resolve_theme<'a>(&'a self, requested: &str) -> Option<(&'a str, &'a Theme)> {
        let themes = &self.themes.themes;
        if let Some((name, theme)) = themes.get_key_value(requested) {
            return Some((name.as_str(), theme));
        }
        if let Some((name, theme)) = themes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(requested))
        {
            return Some((name.as_str(), theme));
        }

        let (name, theme) = themes
            .get_key_value(DEFAULT_THEME)
            .or_else(|| themes.iter().next())?;
        tracing::warn!(requested, fallback = %name, "theme not found");
        Some((name.as_str(), theme))
    }
}

fn convert_style(style: SyntectStyle) -> HighlightStyle {
    HighlightStyle {
        foreground: opaque(style.foreground),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
        underline: style.font_style.contains(FontStyle::UNDERLINE),
    }
}

fn opaque(color: SyntectColor) -> Option<RgbColor> {
    (color.a != 0).then_some(RgbColor {
        r: color.r,
        g: color.g,
        b: color.b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_split_into_styled_spans() {
        let highlighter = Highlighter::new();
        let result = highlighter.highlight_markup(
            "<div id=\"x\" class=\"a b\">\n  hello\n</div>",
            DEFAULT_THEME,
        );

        assert_eq!(result.mode, HighlightMode::Highlighted);
        assert_eq!(result.theme, DEFAULT_THEME);
        assert_eq!(result.lines.len(), 3);
        assert_eq!(result.lines[0].text(), "<div id=\"x\" class=\"a b\">");
        assert!(result.lines[0].spans.len() > 1);
        assert!(
            result.lines[0]
                .spans
                .iter()
                .any(|span| span.style.foreground.is_some())
        );
    }

    #[test]
    fn theme_lookup_is_case_insensitive() {
        let highlighter = Highlighter::new();
        let result = highlighter.highlight_markup("<p></p>", "BASE16-OCEAN.DARK");
        assert_eq!(result.theme, DEFAULT_THEME);
    }

    #[test]
    fn unknown_theme_falls_back_to_default() {
        let highlighter = Highlighter::new();
        let result = highlighter.highlight_markup("<p>hi</p>", "does-not-exist");
        assert_eq!(result.theme, DEFAULT_THEME);
        assert_eq!(result.lines[0].text(), "<p>hi</p>");
    }

    #[test]
    fn default_theme_set_is_listed() {
        let highlighter = Highlighter::new();
        assert!(
            highlighter
                .available_themes()
                .contains(&DEFAULT_THEME.to_owned())
        );
    }
}
