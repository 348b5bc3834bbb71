//! Interactive shroud viewer.
//!
//! ```bash
//! cargo run --release -- assets/demo.kv
//! ```
//!
//! Controls: W/A/S/D move the player, the mouse aims the view cone,
//! Esc quits. Lit pixels are inside the cone and unoccluded; the
//! rest of the world stays shrouded.

use anyhow::Context;
use clap::Parser;
use glam::{IVec2, ivec2};
use minifb::{Key, MouseMode, Window, WindowOptions};

use shroudvis::bsp::BspTree;
use shroudvis::vis::build_shroud;

const COLOR_WHITE: u32 = 0x00FF_FFFF;
const COLOR_RED: u32 = 0x00FF_0000;
const COLOR_GREEN: u32 = 0x0000_FF00;
const COLOR_MAGENTA: u32 = 0x00FF_00FF;

const PLAYER_SPEED: i32 = 5;
const PLAYER_RADIUS: i32 = 5;

#[derive(Parser)]
#[command(about = "2-D BSP portal-flood visibility viewer")]
struct Args {
    /// Serialized world (key/value text)
    world: std::path::PathBuf,

    /// Field of view in degrees
    #[arg(long, default_value_t = 135.0)]
    fov: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.world)
        .with_context(|| format!("reading {}", args.world.display()))?;
    let mut tree = BspTree::from_kv_text(&text)
        .with_context(|| format!("decoding {}", args.world.display()))?;
    tree.generate_portals();
    log::info!(
        "loaded {}x{} world: {} leaves, {} portals",
        tree.max_width(),
        tree.max_height(),
        tree.iter_leaves().count(),
        tree.portals().len()
    );

    let fov = args.fov.to_radians();
    let (w, h) = (tree.max_width() as usize, tree.max_height() as usize);

    let mut buf = vec![0u32; w * h];
    let mut window = Window::new("shroudvis", w, h, WindowOptions::default())?;
    window.set_target_fps(60);

    let world_max = ivec2(tree.max_width() - 1, tree.max_height() - 1);
    let mut player = world_max / 2;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        /*--- input --------------------------------------------------*/
        let mut step = IVec2::ZERO;
        if window.is_key_down(Key::W) {
            step.y -= PLAYER_SPEED;
        }
        if window.is_key_down(Key::S) {
            step.y += PLAYER_SPEED;
        }
        if window.is_key_down(Key::A) {
            step.x -= PLAYER_SPEED;
        }
        if window.is_key_down(Key::D) {
            step.x += PLAYER_SPEED;
        }
        player = (player + step).clamp(IVec2::ZERO, world_max);

        let target = window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(mx, my)| ivec2(mx as i32, my as i32))
            .unwrap_or(player + ivec2(0, -1));

        /*--- flood --------------------------------------------------*/
        let shrouds = build_shroud(&tree, player, target, fov)?;

        /*--- compose ------------------------------------------------*/
        buf.fill(0);

        // lit pixels of every reached leaf
        for (&leaf_id, mask) in &shrouds {
            let origin = tree.element(leaf_id).bounds.min;
            for y in 0..mask.height() {
                let row = (origin.y + y) as usize * w;
                for x in 0..mask.width() {
                    if mask.is_lit(x, y) {
                        buf[row + (origin.x + x) as usize] = COLOR_WHITE;
                    }
                }
            }
        }

        // partition lines, then outlines of the reached leaves
        for id in tree.iter_nodes() {
            if let Some((a, b)) = tree.element(id).partition_segment() {
                draw_line(&mut buf, w, h, a, b, COLOR_MAGENTA);
            }
        }
        for &leaf_id in shrouds.keys() {
            let bounds = tree.element(leaf_id).bounds;
            let br = bounds.max - ivec2(1, 1);
            draw_line(&mut buf, w, h, bounds.min, ivec2(br.x, bounds.min.y), COLOR_RED);
            draw_line(&mut buf, w, h, ivec2(br.x, bounds.min.y), br, COLOR_RED);
            draw_line(&mut buf, w, h, br, ivec2(bounds.min.x, br.y), COLOR_RED);
            draw_line(&mut buf, w, h, ivec2(bounds.min.x, br.y), bounds.min, COLOR_RED);
        }

        fill_circle(&mut buf, w, h, player, PLAYER_RADIUS, COLOR_GREEN);

        window.update_with_buffer(&buf, w, h)?;
    }
    Ok(())
}

/*───────────────────────── drawing helpers ─────────────────────────*/

/// Integer Bresenham line drawing.
fn draw_line(buf: &mut [u32], w: usize, h: usize, a: IVec2, b: IVec2, colour: u32) {
    let (mut x0, mut y0) = (a.x, a.y);
    let (x1, y1) = (b.x, b.y);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (0..w as i32).contains(&x0) && (0..h as i32).contains(&y0) {
            buf[y0 as usize * w + x0 as usize] = colour;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            if x0 == x1 {
                break;
            }
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            if y0 == y1 {
                break;
            }
            err += dx;
            y0 += sy;
        }
    }
}

fn fill_circle(buf: &mut [u32], w: usize, h: usize, center: IVec2, radius: i32, colour: u32) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let x = center.x + dx;
            let y = center.y + dy;
            if (0..w as i32).contains(&x) && (0..h as i32).contains(&y) {
                buf[y as usize * w + x as usize] = colour;
            }
        }
    }
}
