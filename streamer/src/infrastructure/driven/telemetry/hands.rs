use shared::{Side, TelemetryLine};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Latest pose known for one hand
#[derive(Debug, Clone, Default)]
pub struct HandState {
    pub wrist_position: Option<[f32; 3]>,
    /// Quaternion (x, y, z, w)
    pub wrist_rotation: Option<[f32; 4]>,
    /// Landmarks relative to the wrist
    pub landmarks: Vec<[f32; 3]>,
    pub updates: u64,
    pub last_update: Option<Instant>,
}

impl HandState {
    /// Landmarks placed in world space by the wrist pose, or as received
    /// when the pose is not known yet
    pub fn world_points(&self) -> Vec<[f32; 3]> {
        match (self.wrist_position, self.wrist_rotation) {
            (Some(position), Some(rotation)) => self
                .landmarks
                .iter()
                .map(|point| {
                    let [x, y, z] = rotate(rotation, *point);
                    [x + position[0], y + position[1], z + position[2]]
                })
                .collect(),
            _ => self.landmarks.clone(),
        }
    }
}

/// Per-hand state built from the telemetry stream
#[derive(Debug, Default)]
pub struct HandTracker {
    hands: HashMap<Side, HandState>,
}

impl HandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, line: TelemetryLine) {
        let hand = self.hands.entry(line.side()).or_default();
        match line {
            TelemetryLine::Wrist {
                position, rotation, ..
            } => {
                hand.wrist_position = Some(position);
                hand.wrist_rotation = Some(rotation);
            }
            TelemetryLine::Landmarks { points, .. } => hand.landmarks = points,
        }
        hand.updates += 1;
        hand.last_update = Some(Instant::now());
    }

    pub fn hand(&self, side: Side) -> Option<&HandState> {
        self.hands.get(&side)
    }
}

impl fmt::Display for HandTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for side in [Side::Left, Side::Right] {
            let Some(hand) = self.hands.get(&side) else {
                continue;
            };
            if !first {
                f.write_str(" | ")?;
            }
            first = false;

            write!(f, "{}: {} updates", side, hand.updates)?;
            if let Some([x, y, z]) = hand.wrist_position {
                write!(f, ", wrist ({:.3}, {:.3}, {:.3})", x, y, z)?;
            }
            write!(f, ", {} landmarks", hand.landmarks.len())?;
        }
        if first {
            f.write_str("no hands tracked")?;
        }
        Ok(())
    }
}

/// Rotate `v` by quaternion `q` (x, y, z, w); a zero quaternion leaves it unchanged
fn rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v;
    }
    let [qx, qy, qz, qw] = q.map(|c| c / norm);
    let u = [qx, qy, qz];

    let t = cross(u, v).map(|c| 2.0 * c);
    let ut = cross(u, t);
    [
        v[0] + qw * t[0] + ut[0],
        v[1] + qw * t[1] + ut[1],
        v[2] + qw * t[2] + ut[2],
    ]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::parse_line;

    fn close_to(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_tracker_keeps_latest_state_per_hand() {
        let mut tracker = HandTracker::new();
        tracker.apply(parse_line("Left wrist:, 1, 2, 3, 0, 0, 0, 1").unwrap());
        tracker.apply(parse_line("Left landmarks:, 0,0,0, 0.1,0,0").unwrap());
        tracker.apply(parse_line("Right wrist:, 0, 0, 0, 0, 0, 0, 1").unwrap());
        tracker.apply(parse_line("Left wrist:, 4, 5, 6, 0, 0, 0, 1").unwrap());

        let left = tracker.hand(Side::Left).unwrap();
        assert_eq!(left.updates, 3);
        assert_eq!(left.wrist_position, Some([4.0, 5.0, 6.0]));
        assert_eq!(left.landmarks.len(), 2);
        assert_eq!(tracker.hand(Side::Right).unwrap().updates, 1);

        let summary = tracker.to_string();
        assert!(summary.starts_with("Left: 3 updates, wrist (4.000, 5.000, 6.000), 2 landmarks"));
        assert!(summary.contains(" | Right: 1 updates"));
    }

    #[test]
    fn test_world_points_apply_wrist_pose() {
        let mut hand = HandState {
            landmarks: vec![[1.0, 0.0, 0.0]],
            ..Default::default()
        };
        assert_eq!(hand.world_points(), vec![[1.0, 0.0, 0.0]]);

        // 90 degrees about +Z maps +X to +Y
        let half = std::f32::consts::FRAC_1_SQRT_2;
        hand.wrist_rotation = Some([0.0, 0.0, half, half]);
        hand.wrist_position = Some([10.0, 0.0, 0.0]);
        assert!(close_to(hand.world_points()[0], [10.0, 1.0, 0.0]));
    }

    #[test]
    fn test_zero_quaternion_is_identity() {
        assert_eq!(rotate([0.0; 4], [1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_tracker_summary() {
        assert_eq!(HandTracker::new().to_string(), "no hands tracked");
    }
}
