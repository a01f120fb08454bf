use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Contrast-limited adaptive histogram equalization over a `grid x grid` tile
/// layout, with bilinear blending between neighbouring tile mappings.
pub(crate) fn equalize_tiles(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let layout = TileLayout::new(width, height, grid.max(1));
    let luts = build_luts(gray, &layout, clip_limit);

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel[0] as usize;
        let (tx1, tx2, xa) = neighbours(x, layout.tile_w, layout.tiles_x);
        let (ty1, ty2, ya) = neighbours(y, layout.tile_h, layout.tiles_y);
        let lut = |tx: u32, ty: u32| luts[(ty * layout.tiles_x + tx) as usize][value] as f32;
        let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
        let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
        let mixed = top * (1.0 - ya) + bottom * ya;
        out.put_pixel(x, y, Luma([mixed.round().clamp(0.0, 255.0) as u8]));
    }
    out
}

struct TileLayout {
    tiles_x: u32,
    tiles_y: u32,
    tile_w: u32,
    tile_h: u32,
}

impl TileLayout {
    fn new(width: u32, height: u32, grid: u32) -> Self {
        let tile_w = width.div_ceil(grid.min(width));
        let tile_h = height.div_ceil(grid.min(height));
        Self {
            tiles_x: width.div_ceil(tile_w),
            tiles_y: height.div_ceil(tile_h),
            tile_w,
            tile_h,
        }
    }
}

fn build_luts(gray: &GrayImage, layout: &TileLayout, clip_limit: f32) -> Vec<[u8; BINS]> {
    let (width, height) = gray.dimensions();
    let mut luts = Vec::with_capacity((layout.tiles_x * layout.tiles_y) as usize);
    for ty in 0..layout.tiles_y {
        for tx in 0..layout.tiles_x {
            let x0 = tx * layout.tile_w;
            let y0 = ty * layout.tile_h;
            let x1 = (x0 + layout.tile_w).min(width);
            let y1 = (y0 + layout.tile_h).min(height);

            let mut hist = [0u32; BINS];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            let clip = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);
            clip_histogram(&mut hist, clip);
            luts.push(cumulative_lut(&hist, area));
        }
    }
    luts
}

fn clip_histogram(hist: &mut [u32; BINS], clip: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let batch = excess / BINS as u32;
    let residual = (excess % BINS as u32) as usize;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        for index in (0..BINS).step_by(step).take(residual) {
            hist[index] += 1;
        }
    }
}

fn cumulative_lut(hist: &[u32; BINS], area: u32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    let scale = 255.0 / area.max(1) as f32;
    let mut sum = 0u32;
    for (value, count) in hist.iter().enumerate() {
        sum += count;
        lut[value] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Tile indices surrounding `coord` and the blend weight of the second one.
fn neighbours(coord: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let position = coord as f32 / tile as f32 - 0.5;
    let first = position.floor();
    let weight = position - first;
    let last = tiles as i64 - 1;
    let t1 = (first as i64).clamp(0, last) as u32;
    let t2 = (first as i64 + 1).clamp(0, last) as u32;
    (t1, t2, weight)
}
