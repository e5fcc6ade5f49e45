//! Colour palettes for the chat page.

use serde::Serialize;

use crate::models::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub primary_color: &'static str,
    pub background_color: &'static str,
    pub secondary_background_color: &'static str,
    pub text_color: &'static str,
}

pub fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Default => Palette {
            primary_color: "#FF6B6B",
            background_color: "#FFFFFF",
            secondary_background_color: "#F0F2F6",
            text_color: "#262730",
        },
        Theme::Dark => Palette {
            primary_color: "#00D4AA",
            background_color: "#0E1117",
            secondary_background_color: "#262730",
            text_color: "#FAFAFA",
        },
        Theme::Blue => Palette {
            primary_color: "#1E88E5",
            background_color: "#FFFFFF",
            secondary_background_color: "#E3F2FD",
            text_color: "#1A1A1A",
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeInfo {
    pub name: &'static str,
    #[serde(flatten)]
    pub palette: Palette,
    pub css: String,
}

/// All built-in themes in display order.
pub fn themes() -> Vec<ThemeInfo> {
    Theme::ALL
        .iter()
        .map(|t| ThemeInfo {
            name: t.as_str(),
            palette: palette(*t),
            css: css_for(*t),
        })
        .collect()
}

/// CSS custom properties for `theme`, scoped to `:root`.
pub fn css_for(theme: Theme) -> String {
    let p = palette(theme);
    format!(
        ":root {{\n  --primary: {};\n  --bg: {};\n  --bg-secondary: {};\n  --text: {};\n}}",
        p.primary_color, p.background_color, p.secondary_background_color, p.text_color
    )
}
