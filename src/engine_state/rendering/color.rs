//! # Light Colors
//!
//! Vertex colors of block meshes store light, not color. `encode_light`
//! packs a `day | night << 8` light value into `rgb` = average brightness
//! and `a` = share of sunlight. The final color is produced later from the
//! current day/night ratio (`final_color_blend`), so day/night changes never
//! require a rebuild.

/// Color of artificial light, slightly brighter than white.
const ARTIFICIAL_LIGHT: [f32; 3] = [1.04, 1.04, 1.04];

/// Blue added in dark places; each entry covers 8 brightness levels.
const EMPHASIZE_BLUE_WHEN_DARK: [u8; 32] = [
    1, 4, 6, 6, 6, 5, 4, 3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Encodes a packed light value as a vertex color.
///
/// # Arguments
/// * `light` - `day | night << 8`, each on the 0..=255 scale
/// * `emissive_light` - Light level the tile emits by itself
///
/// # Returns
/// `[brightness, brightness, brightness, sunlight_ratio]`
pub fn encode_light(light: u16, emissive_light: u8) -> [u8; 4] {
    let mut day = (light & 0xff) as u32;
    let mut night = (light >> 8) as u32;
    night = (night + (emissive_light as f32 * 2.5) as u32).min(255);
    // Day light that the night bank also has is artificial.
    day = day.saturating_sub(night);
    let sum = day + night;
    let ratio = if sum > 0 { day * 255 / sum } else { 0 };
    let brightness = ((day + night) / 2).min(255) as u8;
    [brightness, brightness, brightness, ratio as u8]
}

/// Color of sunlight for a day/night ratio in `0..=1000`.
pub fn get_sunlight_color(daynight_ratio: u32) -> [f32; 3] {
    let rg = daynight_ratio as f32 / 1000.0 - 0.04;
    let b = 0.98 * daynight_ratio as f32 / 1000.0 + 0.078;
    [rg, rg, b]
}

/// Final vertex color of an encoded light color under a sunlight color.
pub fn final_color_blend(data: [u8; 4], day_light: [f32; 3]) -> [u8; 4] {
    let a = data[3] as f32 / 255.0;
    let n = 1.0 - a;
    let mut rgb = [0.0f32; 3];
    for (i, c) in rgb.iter_mut().enumerate() {
        *c = data[i] as f32 / 255.0 * (a * day_light[i] + n * ARTIFICIAL_LIGHT[i]) * 2.0;
    }
    let average = ((rgb[0] + rgb[1] + rgb[2]) / 3.0 * 255.0).clamp(0.0, 255.0) as usize;
    rgb[2] += EMPHASIZE_BLUE_WHEN_DARK[average / 8] as f32 / 255.0;

    let to_u8 = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
    [to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), data[3]]
}

/// Final color of a packed light value at a day/night ratio.
pub fn final_color_for_light(light: u16, daynight_ratio: u32) -> [u8; 4] {
    final_color_blend(encode_light(light, 0), get_sunlight_color(daynight_ratio))
}

fn shade(color: &mut [u8; 4], factor: f32) {
    for c in color.iter_mut().take(3) {
        *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
    }
}

/// Darkens a color by the direction its face points to. Used when shaders,
/// which shade by the normal themselves, are disabled. A zero normal keeps
/// full brightness.
pub fn apply_face_shading(color: &mut [u8; 4], normal: [f32; 3]) {
    if normal[1] < -0.5 {
        shade(color, 0.447213);
    } else if normal[0].abs() > 0.5 {
        shade(color, 0.670820);
    } else if normal[2].abs() > 0.5 {
        shade(color, 0.836660);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sunlight_encodes_as_pure_sun() {
        let c = encode_light(255, 0);
        assert_eq!(c[3], 255);
        assert_eq!(c[0], 127);
    }

    #[test]
    fn night_light_is_treated_as_artificial() {
        let c = encode_light(200 | 200 << 8, 0);
        assert_eq!(c[3], 0);
        assert_eq!(c[0], 100);
        let lit = encode_light(0, 4);
        assert_eq!(lit[0], 5);
    }

    #[test]
    fn sunlit_vertices_follow_the_day_night_ratio() {
        let data = encode_light(255, 0);
        let noon = final_color_blend(data, get_sunlight_color(1000));
        let night = final_color_blend(data, get_sunlight_color(0));
        assert!(noon[0] > night[0]);
        assert_eq!(night[0], 0);
    }

    #[test]
    fn face_shading_darkens_bottom_most() {
        let mut bottom = [200, 200, 200, 255];
        let mut side = bottom;
        let mut top = bottom;
        apply_face_shading(&mut bottom, [0.0, -1.0, 0.0]);
        apply_face_shading(&mut side, [1.0, 0.0, 0.0]);
        apply_face_shading(&mut top, [0.0, 1.0, 0.0]);
        assert!(bottom[0] < side[0] && side[0] < top[0]);
        assert_eq!(top[3], 255);
    }
}
