mod config;
mod map;
mod palette;
mod status;

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use eframe::egui;
use log::{info, warn};

use placement_engine::{
    DropOutcome, DropZoneConfig, FileSlot, GeocodeCandidate, GeocodeClient, GeocodeConfig,
    ItemId, ItemKind, LatLng, MercatorViewport, PixelPoint, PlanError, PlanningSession,
    SearchTicket, ViewportAdapter,
};

use config::AppConfig;
use map::TileManager;
use palette::MARKER_RADIUS;
use status::StatusLog;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Pointer must land within this distance of a marker to grab it.
const ITEM_HIT_RADIUS: f32 = MARKER_RADIUS + 4.0;

fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Config unreadable, using defaults: {}", e);
        AppConfig::default()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("EventMap Desktop"),
        ..Default::default()
    };

    eframe::run_native(
        "EventMap Desktop",
        options,
        Box::new(|_cc| Ok(Box::new(PlannerApp::new(config)))),
    )
}

/// What the current drag on the map surface is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapGesture {
    Idle,
    Pan,
    Item,
}

struct PlannerApp {
    session: PlanningSession<MercatorViewport>,
    config: AppConfig,
    tiles: TileManager,
    status: StatusLog,

    // Location search
    search_query: String,
    geocoder: Option<GeocodeClient>,
    search_tx: mpsc::Sender<(SearchTicket, Result<Vec<GeocodeCandidate>, PlanError>)>,
    search_rx: mpsc::Receiver<(SearchTicket, Result<Vec<GeocodeCandidate>, PlanError>)>,
    search_pending: bool,

    // Map interaction state
    map_gesture: MapGesture,
    map_rect: egui::Rect,
    zoom_accumulator: f32,
    selected_item: Option<ItemId>,
}

impl PlannerApp {
    fn new(config: AppConfig) -> Self {
        let viewport = MercatorViewport::new(
            LatLng::new(config.default_lat, config.default_lng),
            config.default_zoom,
        );
        let slot = FileSlot::new(Self::state_path());
        info!("Session state file: {:?}", slot.path());

        let mut session = PlanningSession::new(
            viewport,
            Box::new(slot),
            DropZoneConfig {
                overlap_threshold: config.overlap_threshold(),
            },
        );

        let mut status = StatusLog::new();
        if session.restore() {
            status.info(format!("Restored {} placed items", session.store().len()));
        }

        let geocoder = match GeocodeClient::new(GeocodeConfig {
            timeout: Duration::from_secs(config.search_timeout_secs),
            ..Default::default()
        }) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Location search unavailable: {}", e);
                status.warning("Location search unavailable");
                None
            }
        };

        let tiles = TileManager::new(config.cache_tiles);
        let (search_tx, search_rx) = mpsc::channel();

        Self {
            session,
            config,
            tiles,
            status,
            search_query: String::new(),
            geocoder,
            search_tx,
            search_rx,
            search_pending: false,
            map_gesture: MapGesture::Idle,
            map_rect: egui::Rect::NOTHING,
            zoom_accumulator: 0.0,
            selected_item: None,
        }
    }

    fn state_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".data"));
        path.push("eventmap-desktop");
        path.push("state.json");
        path
    }

    // ----- Location search ------------------------------------------------

    fn start_search(&mut self, ctx: &egui::Context) {
        let query = self.search_query.trim().to_string();
        if query.is_empty() {
            return;
        }
        let Some(client) = self.geocoder.clone() else {
            self.status.warning("Location search unavailable");
            return;
        };

        let ticket = self.session.begin_search();
        let tx = self.search_tx.clone();
        let ctx = ctx.clone();
        self.search_pending = true;
        info!("Searching for {:?}", query);

        std::thread::spawn(move || {
            let result = client.search(&query);
            let _ = tx.send((ticket, result));
            ctx.request_repaint();
        });
    }

    fn poll_search_results(&mut self) {
        while let Ok((ticket, result)) = self.search_rx.try_recv() {
            self.search_pending = false;
            match result {
                Ok(candidates) => match candidates.first() {
                    Some(place) => {
                        if self.session.apply_search_result(ticket, place.coordinate) {
                            let label = if place.label.is_empty() {
                                place.coordinate.to_string()
                            } else {
                                place.label.clone()
                            };
                            self.status.info(format!("Moved to {}", label));
                        }
                    }
                    None => self.status.warning("No results for that search"),
                },
                Err(e) => {
                    warn!("{}", e);
                    self.status.error("Location search failed");
                }
            }
        }
    }

    // ----- Panels ---------------------------------------------------------

    fn draw_search_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new("EVENTMAP")
                    .color(egui::Color32::from_rgb(120, 200, 120))
                    .strong(),
            );
            ui.separator();

            let response = ui.add(
                egui::TextEdit::singleline(&mut self.search_query)
                    .hint_text("Search location...")
                    .desired_width(280.0),
            );
            let submitted =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            if ui.button("Search").clicked() || submitted {
                self.start_search(ctx);
            }
            if self.search_pending {
                ui.spinner();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(format!("{} items placed", self.session.store().len()))
                        .color(egui::Color32::from_rgb(150, 150, 150))
                        .size(11.0),
                );
            });
        });
    }

    fn draw_palette(&mut self, ui: &mut egui::Ui) {
        ui.add_space(4.0);
        ui.label(
            egui::RichText::new("TOOL PALETTE")
                .color(egui::Color32::from_rgb(120, 200, 120))
                .size(13.0)
                .strong(),
        );
        ui.label(
            egui::RichText::new("Drag a tool onto the map")
                .color(egui::Color32::from_rgb(140, 140, 140))
                .size(10.0),
        );
        ui.add_space(6.0);

        for kind in ItemKind::PALETTE {
            let (rect, response) = ui.allocate_exact_size(
                egui::vec2(ui.available_width(), 44.0),
                egui::Sense::click_and_drag(),
            );
            let painter = ui.painter();

            let hovered = response.hovered() || self.session.palette_ghost().map(|(k, _)| k) == Some(kind);
            if hovered {
                painter.rect_filled(
                    rect,
                    4.0,
                    egui::Color32::from_rgba_unmultiplied(120, 200, 120, 20),
                );
            }
            palette::draw_marker(
                painter,
                rect.left_center() + egui::vec2(MARKER_RADIUS + 8.0, 0.0),
                kind,
                255,
            );
            painter.text(
                rect.left_center() + egui::vec2(2.0 * MARKER_RADIUS + 18.0, 0.0),
                egui::Align2::LEFT_CENTER,
                kind.display_name(),
                egui::FontId::proportional(13.0),
                ui.visuals().text_color(),
            );

            // Flow A: palette entry → ghost → drop on the map.
            if response.drag_started() {
                if let Some(pos) = response.interact_pointer_pos() {
                    self.session.begin_palette_drag(kind, screen_to_pixel(pos));
                }
            }
            if response.dragged() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let overlap = self.ghost_overlap(pos);
                    self.session.move_palette_drag(screen_to_pixel(pos), overlap);
                }
            }
            if response.drag_stopped() {
                let pointer = response.interact_pointer_pos();
                let overlap = pointer.map_or(0.0, |pos| self.ghost_overlap(pos));
                let map_point = pointer.map(|pos| self.map_local(pos));
                match self.session.finish_palette_drag(overlap, map_point) {
                    DropOutcome::Dropped(id) => {
                        self.selected_item = Some(id);
                        self.status.info(format!("Placed {}", kind.display_name()));
                    }
                    DropOutcome::Cancelled => {}
                }
            }
        }

        ui.add_space(8.0);
        ui.separator();
        ui.label(
            egui::RichText::new("Drag a placed marker to move it.\nPositions are saved automatically.")
                .color(egui::Color32::from_rgb(140, 140, 140))
                .size(10.0),
        );
    }

    fn draw_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some(message) = self.status.last() {
                let color = match message.level {
                    status::DiagnosticLevel::Info => egui::Color32::from_rgb(160, 160, 160),
                    status::DiagnosticLevel::Warning => egui::Color32::from_rgb(230, 180, 60),
                    status::DiagnosticLevel::Error => egui::Color32::from_rgb(230, 90, 90),
                };
                ui.label(
                    egui::RichText::new(format!(
                        "{}  {}",
                        message.timestamp.format("%H:%M:%S"),
                        message.message
                    ))
                    .color(color)
                    .size(11.0),
                );
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Ok(state) = self.session.viewport().viewport() {
                    ui.label(
                        egui::RichText::new(format!(
                            "{:.5}, {:.5}  z{:.0}",
                            state.center.lat, state.center.lng, state.zoom
                        ))
                        .color(egui::Color32::from_rgb(130, 130, 130))
                        .size(11.0)
                        .monospace(),
                    );
                }
            });
        });
    }

    // ----- Map area -------------------------------------------------------

    fn draw_map(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), ui.available_height()),
            egui::Sense::click_and_drag(),
        );
        let rect = response.rect;
        self.map_rect = rect;

        // The first resize initializes the projection; every later layout
        // change re-anchors through the revision bump.
        self.session
            .viewport_mut()
            .resize(f64::from(rect.width()), f64::from(rect.height()));

        self.handle_zoom(ui, rect);
        self.handle_map_drag(&response);
        self.session.sync_if_needed();

        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(225, 230, 235));
        self.draw_tiles(ui, &painter, rect);
        self.draw_items(&painter, rect);
        self.draw_drop_feedback(&painter, rect);

        painter.text(
            rect.left_top() + egui::vec2(10.0, 10.0),
            egui::Align2::LEFT_TOP,
            "Drag to pan | Pinch or Ctrl+scroll to zoom",
            egui::FontId::proportional(12.0),
            egui::Color32::from_black_alpha(160),
        );

        // Attribution (required by OpenStreetMap)
        painter.text(
            rect.right_bottom() + egui::vec2(-10.0, -10.0),
            egui::Align2::RIGHT_BOTTOM,
            "© OpenStreetMap contributors",
            egui::FontId::proportional(10.0),
            egui::Color32::from_black_alpha(180),
        );

        self.draw_tile_status(&painter, rect);
    }

    fn handle_zoom(&mut self, ui: &egui::Ui, rect: egui::Rect) {
        let zoom_delta = ui.ctx().input(|i| i.zoom_delta());
        if (zoom_delta - 1.0).abs() > 0.001 {
            self.zoom_accumulator += zoom_delta.log2();
        }

        // Step whole zoom levels so markers stay aligned with the tile grid.
        while self.zoom_accumulator.abs() >= 1.0 {
            let step = self.zoom_accumulator.signum();
            self.zoom_accumulator -= step;
            let focus = ui
                .ctx()
                .input(|i| i.pointer.hover_pos())
                .filter(|pos| rect.contains(*pos))
                .map(|pos| self.map_local(pos));
            self.session.viewport_mut().zoom_by(f64::from(step), focus);
        }
    }

    fn handle_map_drag(&mut self, response: &egui::Response) {
        // Flow B begins on pointer-down over a marker; anything else pans.
        if response.drag_started() {
            self.map_gesture = MapGesture::Pan;
            if let Some(pos) = response.interact_pointer_pos() {
                let local = self.map_local(pos);
                if let Some(id) = self.hit_test(local) {
                    let start = self
                        .session
                        .reactor()
                        .anchor(id)
                        .map_or(local, |anchor| anchor.render_pixel());
                    if self.session.begin_item_drag(id, start) {
                        self.map_gesture = MapGesture::Item;
                        self.selected_item = Some(id);
                    }
                }
            }
        }

        if response.dragged() {
            let delta = response.drag_delta();
            match self.map_gesture {
                MapGesture::Item => {
                    self.session.drag_item_by(f64::from(delta.x), f64::from(delta.y));
                }
                MapGesture::Pan | MapGesture::Idle => {
                    self.session
                        .viewport_mut()
                        .pan_pixels(f64::from(delta.x), f64::from(delta.y));
                }
            }
        }

        if response.drag_stopped() {
            if self.map_gesture == MapGesture::Item {
                if let Some(id) = self.session.commit_item_drag() {
                    if let Some(item) = self.session.store().get(id) {
                        self.status
                            .info(format!("Moved {} to {}", item.kind.display_name(), item.coordinate));
                    }
                }
            }
            self.map_gesture = MapGesture::Idle;
        }

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.selected_item = self.hit_test(self.map_local(pos));
            }
        }
    }

    fn draw_tiles(&self, ui: &egui::Ui, painter: &egui::Painter, rect: egui::Rect) {
        let Ok(state) = self.session.viewport().viewport() else {
            return;
        };
        let center = rect.center();

        for (tile, offset_x, offset_y) in
            self.tiles.visible_tiles(state, rect.width(), rect.height())
        {
            if let Some(texture) = self.tiles.get_tile(tile, ui.ctx()) {
                let tile_rect = egui::Rect::from_min_size(
                    egui::pos2(center.x + offset_x, center.y + offset_y),
                    egui::vec2(256.0, 256.0),
                );
                if tile_rect.intersects(rect) {
                    painter.image(
                        texture.id(),
                        tile_rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }
            }
        }
    }

    fn draw_items(&self, painter: &egui::Painter, rect: egui::Rect) {
        for item in self.session.store().items() {
            let Some(anchor) = self.session.reactor().anchor(item.id) else {
                continue;
            };
            let pos = pixel_to_screen(anchor.render_pixel(), rect);
            if !rect.expand(MARKER_RADIUS * 2.0).contains(pos) {
                continue;
            }

            let dragging = self.session.dragged_item() == Some(item.id);
            palette::draw_marker(painter, pos, item.kind, if dragging { 170 } else { 255 });

            if self.selected_item == Some(item.id) {
                painter.circle_stroke(
                    pos,
                    MARKER_RADIUS + 3.0,
                    egui::Stroke::new(2.0, egui::Color32::from_rgb(120, 200, 120)),
                );

                // Label box above the selected marker.
                let text_pos = pos + egui::vec2(0.0, -(MARKER_RADIUS + 10.0));
                let galley = painter.layout_no_wrap(
                    item.kind.display_name().to_string(),
                    egui::FontId::proportional(11.0),
                    egui::Color32::WHITE,
                );
                let padding = egui::vec2(4.0, 2.0);
                let box_rect = egui::Rect::from_center_size(text_pos, galley.size() + padding * 2.0);
                painter.rect_filled(
                    box_rect,
                    3.0,
                    egui::Color32::from_rgba_unmultiplied(0, 0, 0, 180),
                );
                painter.text(
                    text_pos,
                    egui::Align2::CENTER_CENTER,
                    item.kind.display_name(),
                    egui::FontId::proportional(11.0),
                    egui::Color32::WHITE,
                );
            }
        }
    }

    fn draw_drop_feedback(&self, painter: &egui::Painter, rect: egui::Rect) {
        let zone = self.session.drop_zone();
        if !zone.is_active() {
            return;
        }
        let (color, fill_alpha) = if zone.is_hovering() {
            (egui::Color32::from_rgb(120, 200, 120), 18)
        } else {
            (egui::Color32::from_rgb(160, 160, 160), 8)
        };
        painter.rect_filled(
            rect,
            0.0,
            egui::Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), fill_alpha),
        );
        let stroke = egui::Stroke::new(2.0, color);
        painter.line_segment([rect.left_top(), rect.right_top()], stroke);
        painter.line_segment([rect.right_top(), rect.right_bottom()], stroke);
        painter.line_segment([rect.right_bottom(), rect.left_bottom()], stroke);
        painter.line_segment([rect.left_bottom(), rect.left_top()], stroke);
    }

    fn draw_tile_status(&self, painter: &egui::Painter, rect: egui::Rect) {
        let message = if self.tiles.error_count() > 0 {
            Some((
                format!("Failed to load {} tiles", self.tiles.error_count()),
                egui::Color32::from_rgb(220, 50, 50),
            ))
        } else if self.tiles.has_loading_tiles() {
            Some((
                "Loading map tiles...".to_string(),
                egui::Color32::from_rgb(255, 200, 100),
            ))
        } else {
            None
        };

        if let Some((text, bg_color)) = message {
            let pos = rect.center_top() + egui::vec2(0.0, 20.0);
            let galley = painter.layout_no_wrap(
                text.clone(),
                egui::FontId::proportional(12.0),
                egui::Color32::WHITE,
            );
            let padding = egui::vec2(12.0, 6.0);
            let bubble = egui::Rect::from_center_size(pos, galley.size() + padding * 2.0);
            painter.rect_filled(bubble, 5.0, bg_color);
            painter.text(
                pos,
                egui::Align2::CENTER_CENTER,
                text,
                egui::FontId::proportional(12.0),
                egui::Color32::WHITE,
            );
        }
    }

    fn draw_ghost(&self, ctx: &egui::Context) {
        if let Some((kind, pointer)) = self.session.palette_ghost() {
            let painter = ctx.layer_painter(egui::LayerId::new(
                egui::Order::Foreground,
                egui::Id::new("palette_ghost"),
            ));
            palette::draw_marker(
                &painter,
                egui::pos2(pointer.x as f32, pointer.y as f32),
                kind,
                160,
            );
        }
    }

    // ----- Coordinate helpers ---------------------------------------------

    /// Screen position → map-local pixel point.
    fn map_local(&self, pos: egui::Pos2) -> PixelPoint {
        PixelPoint::new(
            f64::from(pos.x - self.map_rect.min.x),
            f64::from(pos.y - self.map_rect.min.y),
        )
    }

    /// Fraction of the ghost square centered on `pos` that overlaps the map.
    fn ghost_overlap(&self, pos: egui::Pos2) -> f64 {
        let size = 2.0 * MARKER_RADIUS;
        let ghost = egui::Rect::from_center_size(pos, egui::vec2(size, size));
        let intersection = ghost.intersect(self.map_rect);
        let area = f64::from(intersection.width().max(0.0))
            * f64::from(intersection.height().max(0.0));
        area / (f64::from(size) * f64::from(size))
    }

    /// The placed item under a map-local point, if any.
    fn hit_test(&self, local: PixelPoint) -> Option<ItemId> {
        let mut best: Option<(ItemId, f64)> = None;
        for (id, anchor) in self.session.reactor().anchors() {
            let pixel = anchor.render_pixel();
            let distance = ((pixel.x - local.x).powi(2) + (pixel.y - local.y).powi(2)).sqrt();
            if distance <= f64::from(ITEM_HIT_RADIUS)
                && best.is_none_or(|(_, nearest)| distance < nearest)
            {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Screen position → engine pixel point (same space, different type).
fn screen_to_pixel(pos: egui::Pos2) -> PixelPoint {
    PixelPoint::new(f64::from(pos.x), f64::from(pos.y))
}

/// Map-local engine pixel point → screen position.
fn pixel_to_screen(pixel: PixelPoint, rect: egui::Rect) -> egui::Pos2 {
    egui::pos2(
        rect.min.x + pixel.x as f32,
        rect.min.y + pixel.y as f32,
    )
}

impl eframe::App for PlannerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_search_results();

        egui::TopBottomPanel::top("search_bar").show(ctx, |ui| {
            self.draw_search_bar(ui, ctx);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.draw_status_bar(ui);
        });

        let palette_width = self.config.palette_width;
        egui::SidePanel::left("tool_palette")
            .default_width(palette_width)
            .show(ctx, |ui| {
                self.draw_palette(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_map(ui);
        });

        self.draw_ghost(ctx);
    }
}
