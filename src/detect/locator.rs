//! Centre, bounding box and spread statistics over the despeckled motion
//! mask. Grounded on `original_source/alg.cpp`'s `alg_locate_center_size`.

use crate::frame::Location;

/// Computes [`Location`] from a binary-ish motion mask (nonzero = hot
/// pixel). Returns `None` if no pixel is hot.
pub fn locate(mask: &[u8], width: i32, height: i32) -> Option<Location> {
    let mut count: i64 = 0;
    let mut sum_x: i64 = 0;
    let mut sum_y: i64 = 0;

    for (i, &v) in mask.iter().enumerate() {
        if v == 0 {
            continue;
        }
        let x = (i as i32) % width;
        let y = (i as i32) / width;
        sum_x += x as i64;
        sum_y += y as i64;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let cx = (sum_x / count) as i32;
    let cy = (sum_y / count) as i32;

    let mut xdist: i64 = 0;
    let mut ydist: i64 = 0;
    for (i, &v) in mask.iter().enumerate() {
        if v == 0 {
            continue;
        }
        let x = (i as i32) % width;
        let y = (i as i32) / width;
        xdist += (x - cx).unsigned_abs() as i64;
        ydist += (y - cy).unsigned_abs() as i64;
    }

    let mut minx = cx - (xdist * 3 / count) as i32;
    let mut maxx = cx + (xdist * 3 / count) as i32;
    let mut miny = cy - (ydist * 3 / count) as i32;
    let mut maxy = cy + (ydist * 3 / count) as i32;

    minx = minx.clamp(0, width - 1);
    maxx = maxx.clamp(0, width - 1);
    miny = miny.clamp(0, height - 1);
    maxy = maxy.clamp(0, height - 1);

    // align to even
    minx &= !1;
    miny &= !1;
    maxx &= !1;
    maxy &= !1;

    let mut sum_sq_x: f64 = 0.0;
    let mut sum_sq_y: f64 = 0.0;
    let mut dists: Vec<f64> = Vec::with_capacity(count as usize);
    for (i, &v) in mask.iter().enumerate() {
        if v == 0 {
            continue;
        }
        let x = (i as i32) % width;
        let y = (i as i32) / width;
        let dxf = (x - cx) as f64;
        let dyf = (y - cy) as f64;
        sum_sq_x += dxf * dxf;
        sum_sq_y += dyf * dyf;
        dists.push((dxf * dxf + dyf * dyf).sqrt());
    }

    let stddev_x = (sum_sq_x / count as f64).sqrt();
    let stddev_y = (sum_sq_y / count as f64).sqrt();

    let mean_d: f64 = dists.iter().sum::<f64>() / count as f64;
    let stddev_xy = if count > 1 {
        let var = dists.iter().map(|d| (d - mean_d).powi(2)).sum::<f64>() / (count as f64 - 1.0);
        var.sqrt()
    } else {
        0.0
    };

    Some(Location {
        x: cx,
        y: cy,
        minx,
        miny,
        maxx,
        maxy,
        width: maxx - minx,
        height: maxy - miny,
        stddev_x,
        stddev_y,
        stddev_xy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_centers_on_single_hot_pixel() {
        let width = 8;
        let height = 8;
        let mut mask = vec![0u8; (width * height) as usize];
        mask[(3 * width + 4) as usize] = 1;
        let loc = locate(&mask, width, height).unwrap();
        assert_eq!(loc.x, 4);
        assert_eq!(loc.y, 3);
    }

    #[test]
    fn locate_returns_none_for_empty_mask() {
        let mask = vec![0u8; 64];
        assert!(locate(&mask, 8, 8).is_none());
    }

    #[test]
    fn bounding_box_stays_within_frame() {
        let width = 8;
        let height = 8;
        let mut mask = vec![0u8; (width * height) as usize];
        mask[0] = 1;
        let loc = locate(&mask, width, height).unwrap();
        assert!(loc.minx >= 0 && loc.maxx < width);
        assert!(loc.miny >= 0 && loc.maxy < height);
    }
}
