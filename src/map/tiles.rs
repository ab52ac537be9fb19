use egui::{ColorImage, TextureHandle};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use placement_engine::viewport::{lat_to_tile_y, lon_to_tile_x};
use placement_engine::ViewportState;

const TILE_SIZE: u32 = 256;
const CACHE_DURATION_DAYS: u64 = 7;

/// One OpenStreetMap tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileId {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Tile URL on the OpenStreetMap CDN.
    pub fn url(&self) -> String {
        let subdomain = ['a', 'b', 'c'][((self.x + self.y) % 3) as usize];
        format!(
            "https://{}.tile.openstreetmap.org/{}/{}/{}.png",
            subdomain, self.zoom, self.x, self.y
        )
    }

    /// Cache filename based on hash of URL.
    fn cache_filename(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url().as_bytes());
        let hash = hasher.finalize();
        format!("{:x}", hash)
    }
}

pub enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

/// Downloads, caches, and hands out map tile textures.
pub struct TileManager {
    cache_dir: Option<PathBuf>,
    http: reqwest::blocking::Client,
    tiles: Arc<Mutex<HashMap<TileId, TileState>>>,
    download_queue: Arc<Mutex<Vec<TileId>>>,
}

impl TileManager {
    pub fn new(cache_tiles: bool) -> Self {
        let cache_dir = cache_tiles.then(Self::cache_dir);
        if let Some(dir) = &cache_dir {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create tile cache directory: {}", e);
            }
            Self::cleanup_old_tiles(dir);
        }

        // OSM's usage policy requires an identifying User-Agent.
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("eventmap-desktop/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            cache_dir,
            http,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            download_queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn cache_dir() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        path.push("eventmap-desktop");
        path.push("tiles");
        path
    }

    fn cleanup_old_tiles(cache_dir: &PathBuf) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        if let Ok(entries) = fs::read_dir(cache_dir) {
            for entry in entries.flatten() {
                let age = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok());
                if age.is_some_and(|age| age > max_age) {
                    let _ = fs::remove_file(entry.path());
                    debug!("Removed stale cached tile {:?}", entry.path());
                }
            }
        }
    }

    /// Get a tile texture from memory or disk cache, queueing a download on
    /// a miss.
    pub fn get_tile(&self, id: TileId, ctx: &egui::Context) -> Option<TextureHandle> {
        let mut tiles = match self.tiles.lock() {
            Ok(tiles) => tiles,
            Err(_) => return None,
        };

        match tiles.get(&id) {
            Some(TileState::Loaded(texture)) => Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => None,
            None => {
                if let Some(cache_path) = self.cached_tile_path(id) {
                    if cache_path.exists() {
                        match Self::load_tile_from_disk(&cache_path, ctx, id) {
                            Ok(texture) => {
                                tiles.insert(id, TileState::Loaded(texture.clone()));
                                return Some(texture);
                            }
                            Err(e) => {
                                warn!("Failed to load cached tile: {}", e);
                            }
                        }
                    }
                }
                tiles.insert(id, TileState::Loading);
                drop(tiles);
                self.queue_download(id, ctx.clone());
                None
            }
        }
    }

    fn cached_tile_path(&self, id: TileId) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.png", id.cache_filename())))
    }

    fn load_tile_from_disk(
        path: &PathBuf,
        ctx: &egui::Context,
        id: TileId,
    ) -> Result<TextureHandle, String> {
        let img_data = fs::read(path).map_err(|e| e.to_string())?;
        let img = image::load_from_memory(&img_data).map_err(|e| e.to_string())?;
        let rgba = img.to_rgba8();

        let color_image = ColorImage::from_rgba_unmultiplied(
            [TILE_SIZE as usize, TILE_SIZE as usize],
            &rgba.into_raw(),
        );

        Ok(ctx.load_texture(
            format!("tile_{}_{}/{}", id.zoom, id.x, id.y),
            color_image,
            Default::default(),
        ))
    }

    fn queue_download(&self, id: TileId, ctx: egui::Context) {
        let mut queue = match self.download_queue.lock() {
            Ok(queue) => queue,
            Err(_) => return,
        };
        if !queue.contains(&id) {
            queue.push(id);

            let tiles = self.tiles.clone();
            let cache_path = self.cached_tile_path(id);
            let http = self.http.clone();

            std::thread::spawn(move || {
                Self::download_tile(id, http, tiles, cache_path, ctx);
            });
        }
    }

    fn download_tile(
        id: TileId,
        http: reqwest::blocking::Client,
        tiles: Arc<Mutex<HashMap<TileId, TileState>>>,
        cache_path: Option<PathBuf>,
        ctx: egui::Context,
    ) {
        let url = id.url();
        debug!("Downloading tile: {}", url);

        let mut state = TileState::Failed;
        match http.get(&url).send().and_then(reqwest::blocking::Response::error_for_status) {
            Ok(response) => match response.bytes() {
                Ok(bytes) => {
                    if let Some(path) = cache_path {
                        if let Err(e) = fs::write(&path, &bytes) {
                            warn!("Failed to cache tile: {}", e);
                        }
                    }

                    match image::load_from_memory(&bytes) {
                        Ok(img) => {
                            let rgba = img.to_rgba8();
                            let color_image = ColorImage::from_rgba_unmultiplied(
                                [TILE_SIZE as usize, TILE_SIZE as usize],
                                &rgba.into_raw(),
                            );
                            let texture = ctx.load_texture(
                                format!("tile_{}_{}/{}", id.zoom, id.x, id.y),
                                color_image,
                                Default::default(),
                            );
                            state = TileState::Loaded(texture);
                        }
                        Err(e) => warn!("Failed to decode tile image: {}", e),
                    }
                }
                Err(e) => warn!("Failed to read tile bytes: {}", e),
            },
            Err(e) => warn!("Failed to fetch tile: {}", e),
        }

        if let Ok(mut tiles) = tiles.lock() {
            tiles.insert(id, state);
        }
        ctx.request_repaint();
    }

    /// All tiles covering a viewport, with each tile's top-left offset in
    /// pixels from the map-area center.
    pub fn visible_tiles(
        &self,
        viewport: ViewportState,
        width: f32,
        height: f32,
    ) -> Vec<(TileId, f32, f32)> {
        let zoom = viewport.zoom.round().clamp(1.0, 19.0);
        let tile_zoom = zoom as u8;

        let center_tile_x = lon_to_tile_x(viewport.center.lng, zoom);
        let center_tile_y = lat_to_tile_y(viewport.center.lat, zoom);

        let tiles_wide = (width / TILE_SIZE as f32).ceil() as i32 + 2;
        let tiles_high = (height / TILE_SIZE as f32).ceil() as i32 + 2;

        let start_x = center_tile_x.floor() as i32 - tiles_wide / 2;
        let start_y = center_tile_y.floor() as i32 - tiles_high / 2;

        let max_tile = 2_i32.pow(u32::from(tile_zoom));
        let mut tiles = Vec::new();

        for dy in 0..tiles_high {
            for dx in 0..tiles_wide {
                let tile_x = start_x + dx;
                let tile_y = start_y + dy;

                // Longitude wraps, latitude does not.
                let wrapped_x = ((tile_x % max_tile) + max_tile) % max_tile;
                if tile_y < 0 || tile_y >= max_tile {
                    continue;
                }

                let id = TileId::new(wrapped_x as u32, tile_y as u32, tile_zoom);
                let offset_x = (f64::from(tile_x) - center_tile_x) * f64::from(TILE_SIZE);
                let offset_y = (f64::from(tile_y) - center_tile_y) * f64::from(TILE_SIZE);
                tiles.push((id, offset_x as f32, offset_y as f32));
            }
        }

        tiles
    }

    pub fn has_loading_tiles(&self) -> bool {
        self.tiles
            .lock()
            .map(|tiles| tiles.values().any(|state| matches!(state, TileState::Loading)))
            .unwrap_or(false)
    }

    pub fn error_count(&self) -> usize {
        self.tiles
            .lock()
            .map(|tiles| {
                tiles
                    .values()
                    .filter(|state| matches!(state, TileState::Failed))
                    .count()
            })
            .unwrap_or(0)
    }
}
