use crate::types::{Landmark, POSE_LANDMARK_COUNT, PoseLandmark};

use PoseLandmark::*;

pub const POSE_CONNECTIONS: &[(PoseLandmark, PoseLandmark)] = &[
    // face
    (Nose, LeftEyeInner),
    (LeftEyeInner, LeftEye),
    (LeftEye, LeftEyeOuter),
    (LeftEyeOuter, LeftEar),
    (Nose, RightEyeInner),
    (RightEyeInner, RightEye),
    (RightEye, RightEyeOuter),
    (RightEyeOuter, RightEar),
    (MouthLeft, MouthRight),
    // torso
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, RightHip),
    // arms
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (LeftWrist, LeftPinky),
    (LeftWrist, LeftIndex),
    (LeftWrist, LeftThumb),
    (LeftPinky, LeftIndex),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (RightWrist, RightPinky),
    (RightWrist, RightIndex),
    (RightWrist, RightThumb),
    (RightPinky, RightIndex),
    // legs
    (LeftHip, LeftKnee),
    (LeftKnee, LeftAnkle),
    (LeftAnkle, LeftHeel),
    (LeftHeel, LeftFootIndex),
    (LeftAnkle, LeftFootIndex),
    (RightHip, RightKnee),
    (RightKnee, RightAnkle),
    (RightAnkle, RightHeel),
    (RightHeel, RightFootIndex),
    (RightAnkle, RightFootIndex),
];

pub const SKELETON_LINE_THICKNESS: i32 = 5;
const LINE_COLOR: [u8; 4] = [56, 189, 248, 255];
const POINT_COLOR: [u8; 4] = [248, 113, 113, 255];

/// Paints `landmarks` (already filtered for visibility) onto an RGBA buffer.
/// Edges are drawn only when both ends are present.
pub fn draw_pose(buffer: &mut [u8], width: u32, height: u32, landmarks: &[Landmark]) {
    let mut points: [Option<(f32, f32)>; POSE_LANDMARK_COUNT] = [None; POSE_LANDMARK_COUNT];
    for landmark in landmarks {
        if let Some(slot) = points.get_mut(landmark.index) {
            *slot = Some(landmark.to_pixel(width, height));
        }
    }

    for &(a, b) in POSE_CONNECTIONS {
        if let (Some(pa), Some(pb)) = (points[a as usize], points[b as usize]) {
            draw_line(
                buffer,
                width,
                height,
                &pa,
                &pb,
                LINE_COLOR,
                SKELETON_LINE_THICKNESS,
            );
        }
    }

    let point_radius = (SKELETON_LINE_THICKNESS / 2).max(2) + 1;
    for &(x, y) in points.iter().flatten() {
        draw_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            point_radius,
            POINT_COLOR,
        );
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: &(f32, f32),
    p1: &(f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buffer: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * width + x) * 4) as usize;
        [buffer[idx], buffer[idx + 1], buffer[idx + 2], buffer[idx + 3]]
    }

    fn at(kind: PoseLandmark, x: f32, y: f32) -> Landmark {
        Landmark {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
            index: kind as usize,
        }
    }

    #[test]
    fn connects_visible_pairs() {
        let (w, h) = (40u32, 40u32);
        let mut buffer = vec![0u8; (w * h * 4) as usize];
        let landmarks = [
            at(LeftShoulder, 0.25, 0.5),
            at(RightShoulder, 0.75, 0.5),
        ];
        draw_pose(&mut buffer, w, h, &landmarks);

        assert_eq!(pixel(&buffer, w, 20, 20), LINE_COLOR);
        assert_eq!(pixel(&buffer, w, 10, 20), POINT_COLOR);
        assert_eq!(pixel(&buffer, w, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn lone_points_draw_no_edges() {
        let (w, h) = (40u32, 40u32);
        let mut buffer = vec![0u8; (w * h * 4) as usize];
        draw_pose(&mut buffer, w, h, &[at(LeftShoulder, 0.25, 0.5)]);
        assert_eq!(pixel(&buffer, w, 20, 20), [0, 0, 0, 0]);
    }

    #[test]
    fn off_canvas_points_are_clipped() {
        let (w, h) = (8u32, 8u32);
        let mut buffer = vec![0u8; (w * h * 4) as usize];
        draw_pose(&mut buffer, w, h, &[at(Nose, -1.0, 3.0), at(LeftEyeInner, 0.5, 0.5)]);
        assert_eq!(buffer.len(), (w * h * 4) as usize);
    }

    #[test]
    fn connections_reference_valid_indices() {
        for &(a, b) in POSE_CONNECTIONS {
            assert!((a as usize) < POSE_LANDMARK_COUNT);
            assert!((b as usize) < POSE_LANDMARK_COUNT);
            assert_ne!(a, b);
        }
    }
}
