//! Fallback placeholder card
//!
//! When a mode produces a text description instead of image bytes, the text
//! is laid out on a fixed 800x800 SVG card and shipped base64-encoded in the
//! same `image` field a real image would use.

use crate::models::ImageMode;
use base64::Engine as _;
use rand::seq::SliceRandom;

pub const CANVAS_SIZE: u32 = 800;
pub const MIME_TYPE: &str = "image/svg+xml";

/// Two-stop gradient used for the background and header band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub start: &'static str,
    pub end: &'static str,
}

pub const PALETTES: [Palette; 8] = [
    Palette { start: "#667eea", end: "#764ba2" },
    Palette { start: "#f093fb", end: "#f5576c" },
    Palette { start: "#4facfe", end: "#00f2fe" },
    Palette { start: "#43e97b", end: "#38f9d7" },
    Palette { start: "#fa709a", end: "#fee140" },
    Palette { start: "#30cfd0", end: "#330867" },
    Palette { start: "#a8edea", end: "#fed6e3" },
    Palette { start: "#ff9a9e", end: "#fecfef" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderStyle {
    pub title: &'static str,
    pub footer: &'static str,
    /// Turn `【heading】` segments into `<strong>` blocks.
    pub emphasize_headings: bool,
}

impl PlaceholderStyle {
    pub fn for_mode(mode: ImageMode) -> Self {
        match mode {
            ImageMode::SceneDescription => Self {
                title: "AI シーン説明",
                footer: "※ これは実際の写真ではなく、AIが作成したシーンの説明文です",
                emphasize_headings: false,
            },
            ImageMode::ShootingPlan | ImageMode::DirectImage => Self {
                title: "AI 撮影プラン",
                footer: "※ これは実際の写真ではなく、AIが作成した撮影プランです。このプランを基に撮影または画像生成を行ってください",
                emphasize_headings: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderArtifact {
    svg: String,
}

impl PlaceholderArtifact {
    /// Render with a randomly chosen palette.
    pub fn render(description: &str, style: &PlaceholderStyle) -> Self {
        let palette = PALETTES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(PALETTES[0]);
        Self::render_with_palette(description, style, palette)
    }

    pub fn render_with_palette(description: &str, style: &PlaceholderStyle, palette: Palette) -> Self {
        let body = format_description(description, style.emphasize_headings);
        let size = CANVAS_SIZE;
        let card = size - 80;
        let content_height = card - 140;

        let svg = format!(
            r##"<svg width="{size}" height="{size}" viewBox="0 0 {size} {size}" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <linearGradient id="grad1" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:{start};stop-opacity:1" />
      <stop offset="100%" style="stop-color:{end};stop-opacity:1" />
    </linearGradient>
    <filter id="shadow" x="-50%" y="-50%" width="200%" height="200%">
      <feDropShadow dx="0" dy="4" stdDeviation="8" flood-opacity="0.15"/>
    </filter>
  </defs>
  <rect width="{size}" height="{size}" fill="url(#grad1)" opacity="0.1"/>
  <rect x="40" y="40" width="{card}" height="{card}" rx="20" fill="white" filter="url(#shadow)"/>
  <rect x="40" y="40" width="{card}" height="80" rx="20" fill="url(#grad1)"/>
  <text x="{center}" y="85" font-family="'Noto Sans JP', sans-serif" font-size="28" font-weight="bold" text-anchor="middle" fill="white">{title}</text>
  <foreignObject x="60" y="140" width="{content_width}" height="{content_height}">
    <div xmlns="http://www.w3.org/1999/xhtml" style="font-family: 'Noto Sans JP', -apple-system, BlinkMacSystemFont, sans-serif; font-size: 14px; line-height: 1.8; color: #333; padding: 20px; overflow-y: auto; height: {content_height}px; word-wrap: break-word;">
      <style>strong {{ color: #5b21b6; font-weight: 600; display: block; margin-top: 16px; margin-bottom: 8px; font-size: 16px; }}</style>
      {body}
    </div>
  </foreignObject>
  <text x="{center}" y="{footer_y}" font-family="'Noto Sans JP', sans-serif" font-size="11" text-anchor="middle" fill="#666">{footer}</text>
</svg>
"##,
            size = size,
            card = card,
            center = size / 2,
            content_width = card - 40,
            content_height = content_height,
            footer_y = size - 60,
            start = palette.start,
            end = palette.end,
            title = escape_xml(style.title),
            footer = escape_xml(style.footer),
            body = body,
        );

        Self { svg }
    }

    pub fn as_svg(&self) -> &str {
        &self.svg
    }

    pub fn into_svg(self) -> String {
        self.svg
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.svg.as_bytes())
    }
}

/// Escape the description for XHTML, then apply heading and line-break markup.
pub fn format_description(text: &str, emphasize_headings: bool) -> String {
    let escaped = escape_xml(&text.replace("\r\n", "\n"));
    let marked = if emphasize_headings {
        escaped.replace('【', "<strong>").replace('】', "</strong>")
    } else {
        escaped
    };
    marked.replace('\n', "<br/>")
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
