use std::sync::Arc;

use eframe::egui::{self, FontData, FontDefinitions, FontFamily};

pub mod config_window;
pub mod ocr_window;
pub mod popups;

/// Fonts tried in order until one can be read. The default egui fonts have no CJK glyphs.
const CJK_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    r"C:\Windows\Fonts\meiryo.ttc",
    r"C:\Windows\Fonts\msgothic.ttc",
];

/// Install the first available CJK font as a fallback for both font families.
pub fn configure_fonts(ctx: &egui::Context) {
    let mut fonts = FontDefinitions::default();

    for path in CJK_FONT_CANDIDATES {
        let Ok(data) = std::fs::read(path) else {
            continue;
        };

        fonts
            .font_data
            .insert("cjk".to_owned(), Arc::new(FontData::from_owned(data)));
        for family in [FontFamily::Proportional, FontFamily::Monospace] {
            fonts
                .families
                .entry(family)
                .or_default()
                .push("cjk".to_owned());
        }
        ctx.set_fonts(fonts);

        log::info!("Using `{path}` for Japanese text");
        return;
    }

    log::warn!("No CJK font found, Japanese text will not render correctly");
}
