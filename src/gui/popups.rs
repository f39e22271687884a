use eframe::egui::{self, vec2};

/// A stack of error messages which should be shown to the user.
#[derive(Debug, Default)]
pub struct Popups(Vec<Popup>);

#[derive(Debug)]
struct Popup {
    id: u64,
    message: String,
}

impl Popups {
    /// Show a new error message to the user.
    pub fn error(&mut self, e: anyhow::Error) {
        log::error!("{e:?}");

        let mut message = format!("Error: {e}\n");
        for (idx, error) in e.chain().enumerate().skip(1) {
            message.push_str(&format!("\t{idx}. {error}\n"));
        }

        let id = self.0.last().map_or(0, |popup| popup.id + 1);
        self.0.push(Popup { id, message });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn last_message(&self) -> Option<&str> {
        self.0.last().map(|popup| popup.message.as_str())
    }

    /// Show all currently held popups.
    pub fn show(&mut self, ctx: &egui::Context) {
        let mut close_popup = None;

        for (idx, popup) in self.0.iter().enumerate() {
            let mut open = true;

            egui::Window::new("Error")
                .id(egui::Id::new(("error_popup", popup.id)))
                .order(egui::Order::Tooltip)
                .collapsible(false)
                .default_size(vec2(480.0, 240.0))
                .open(&mut open)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical()
                        .max_height(320.0)
                        .show(ui, |ui| {
                            ui.label(&popup.message);
                        });
                    ui.separator();
                    ui.vertical_centered(|ui| {
                        if ui.button("Close").clicked() {
                            close_popup = Some(idx);
                        }
                    });
                });

            if !open {
                close_popup = Some(idx);
            }
        }

        if let Some(idx) = close_popup {
            self.0.remove(idx);
        }
    }
}
