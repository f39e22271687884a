use eframe::egui::{self, Color32, Widget};

/// A clickable word, optionally with its reading written above it.
pub struct WordWidget<'a> {
    text: &'a str,
    ruby: Option<&'a str>,
    text_size: f32,
    ruby_size: f32,
    colour: Color32,
    selected: bool,
}

impl<'a> WordWidget<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            ruby: None,
            text_size: 11.0,
            ruby_size: 4.0,
            colour: Color32::WHITE,
            selected: false,
        }
    }

    pub fn ruby(self, ruby: Option<&'a str>) -> Self {
        Self { ruby, ..self }
    }

    pub fn text_size(self, text_size: f32) -> Self {
        Self { text_size, ..self }
    }

    pub fn ruby_size(self, ruby_size: f32) -> Self {
        Self { ruby_size, ..self }
    }

    pub fn colour(self, colour: Color32) -> Self {
        Self { colour, ..self }
    }

    pub fn selected(self, selected: bool) -> Self {
        Self { selected, ..self }
    }
}

impl Widget for WordWidget<'_> {
    fn ui(self, ui: &mut egui::Ui) -> egui::Response {
        let font = egui::FontId::proportional(self.text_size);
        let galley =
            ui.fonts(|fonts| fonts.layout_no_wrap(self.text.to_owned(), font.clone(), self.colour));

        // the ruby line is always reserved so words with and without readings stay aligned
        let padding = self.text_size / 4.0;
        let mut desired_size = galley.size();
        desired_size.x += padding;
        desired_size.y += self.ruby_size;

        let (rect, response) = ui.allocate_exact_size(desired_size, egui::Sense::click());

        if self.selected {
            ui.painter()
                .rect_filled(rect, egui::CornerRadius::same(2), Color32::from_white_alpha(24));
        } else if response.hovered() {
            ui.painter()
                .rect_filled(rect, egui::CornerRadius::same(2), Color32::from_white_alpha(8));
        }

        let mut pos = rect.left_top();
        pos.x += padding / 2.0;
        pos.y += self.ruby_size;

        let text_rect = ui.painter().text(
            pos,
            egui::Align2::LEFT_TOP,
            self.text,
            font,
            self.colour,
        );

        if let Some(ruby) = self.ruby.filter(|ruby| *ruby != self.text) {
            ui.painter().text(
                text_rect.center_top(),
                egui::Align2::CENTER_BOTTOM,
                ruby,
                egui::FontId::proportional(self.ruby_size),
                self.colour.gamma_multiply(0.75),
            );
        }

        response.on_hover_cursor(egui::CursorIcon::PointingHand)
    }
}
