//! Tool palette definitions: the draggable marker kinds and their look.

use eframe::egui;
use placement_engine::ItemKind;

/// Half-size of a rendered marker; also the ghost size during a drag.
pub const MARKER_RADIUS: f32 = 12.0;

/// Marker fill color per kind.
pub fn kind_color(kind: ItemKind) -> egui::Color32 {
    match kind {
        ItemKind::Tent => egui::Color32::from_rgb(220, 140, 60),
        ItemKind::Stage => egui::Color32::from_rgb(150, 90, 220),
        ItemKind::Speaker => egui::Color32::from_rgb(70, 150, 220),
        ItemKind::Food => egui::Color32::from_rgb(90, 180, 90),
        ItemKind::Toilet => egui::Color32::from_rgb(100, 170, 180),
        ItemKind::FirstAid => egui::Color32::from_rgb(220, 80, 80),
        ItemKind::Other => egui::Color32::from_rgb(150, 150, 150),
    }
}

/// Short code drawn inside the marker circle.
pub fn kind_code(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Tent => "T",
        ItemKind::Stage => "S",
        ItemKind::Speaker => "SP",
        ItemKind::Food => "F",
        ItemKind::Toilet => "WC",
        ItemKind::FirstAid => "+",
        ItemKind::Other => "?",
    }
}

/// Draw one marker glyph (colored circle with its code) at a position.
pub fn draw_marker(painter: &egui::Painter, center: egui::Pos2, kind: ItemKind, alpha: u8) {
    let color = kind_color(kind);
    let fill = egui::Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), alpha);
    painter.circle_filled(center, MARKER_RADIUS, fill);
    painter.circle_stroke(
        center,
        MARKER_RADIUS,
        egui::Stroke::new(1.5, egui::Color32::from_rgba_unmultiplied(255, 255, 255, alpha)),
    );
    painter.text(
        center,
        egui::Align2::CENTER_CENTER,
        kind_code(kind),
        egui::FontId::proportional(11.0),
        egui::Color32::from_rgba_unmultiplied(255, 255, 255, alpha),
    );
}
