//! Hand/wrist telemetry line format.
//!
//! One UTF-8 line per update:
//! `"<Side> wrist:, x, y, z, qx, qy, qz, qw"` or
//! `"<Side> landmarks:, x0,y0,z0, x1,y1,z1, ..."`.
//! Lines are newline-terminated on TCP and datagram-terminated on UDP.
//! Telemetry never shares the signaling channel.

use std::fmt;

/// Landmark count streamed per hand
pub const LANDMARK_COUNT: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("Left"),
            Side::Right => f.write_str("Right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryLine {
    Wrist {
        side: Side,
        position: [f32; 3],
        /// Quaternion (x, y, z, w)
        rotation: [f32; 4],
    },
    Landmarks {
        side: Side,
        points: Vec<[f32; 3]>,
    },
}

impl TelemetryLine {
    pub fn side(&self) -> Side {
        match self {
            TelemetryLine::Wrist { side, .. } | TelemetryLine::Landmarks { side, .. } => *side,
        }
    }

    /// Render the line without its terminator
    pub fn to_line(&self) -> String {
        match self {
            TelemetryLine::Wrist {
                side,
                position,
                rotation,
            } => {
                let values: Vec<String> = position
                    .iter()
                    .chain(rotation.iter())
                    .map(|v| v.to_string())
                    .collect();
                format!("{} wrist:, {}", side, values.join(", "))
            }
            TelemetryLine::Landmarks { side, points } => {
                let triples: Vec<String> = points
                    .iter()
                    .map(|[x, y, z]| format!("{},{},{}", x, y, z))
                    .collect();
                format!("{} landmarks:, {}", side, triples.join(", "))
            }
        }
    }
}

/// Parse one telemetry line.
///
/// The label is matched case-insensitively; empty or non-numeric fields are
/// skipped. Wrist lines need at least seven numbers, landmark lines at least
/// one full triple (a trailing partial triple is dropped).
pub fn parse_line(line: &str) -> Option<TelemetryLine> {
    let mut parts = line.split(',').map(str::trim);
    let label = parts.next()?.to_lowercase();

    let is_wrist = label.contains("wrist");
    if !is_wrist && !label.contains("landmarks") {
        return None;
    }
    let side = if label.contains("right") {
        Side::Right
    } else if label.contains("left") {
        Side::Left
    } else {
        return None;
    };

    let values: Vec<f32> = parts
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse::<f32>().ok())
        .collect();

    if is_wrist {
        if values.len() < 7 {
            return None;
        }
        Some(TelemetryLine::Wrist {
            side,
            position: [values[0], values[1], values[2]],
            rotation: [values[3], values[4], values[5], values[6]],
        })
    } else {
        let points: Vec<[f32; 3]> = values
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        if points.is_empty() {
            return None;
        }
        Some(TelemetryLine::Landmarks { side, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrist_line_format() {
        let line = TelemetryLine::Wrist {
            side: Side::Right,
            position: [0.5, -1.0, 2.25],
            rotation: [0.0, 0.0, 0.0, 1.0],
        };
        assert_eq!(line.to_line(), "Right wrist:, 0.5, -1, 2.25, 0, 0, 0, 1");
        assert_eq!(parse_line(&line.to_line()), Some(line));
    }

    #[test]
    fn test_landmarks_line_format() {
        let points: Vec<[f32; 3]> = (0..LANDMARK_COUNT).map(|i| [i as f32, 0.5, -0.5]).collect();
        let line = TelemetryLine::Landmarks {
            side: Side::Left,
            points,
        };
        let text = line.to_line();
        assert!(text.starts_with("Left landmarks:, 0,0.5,-0.5, 1,0.5,-0.5"));

        match parse_line(&text) {
            Some(TelemetryLine::Landmarks { side, points }) => {
                assert_eq!(side, Side::Left);
                assert_eq!(points.len(), LANDMARK_COUNT);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_is_lenient() {
        let parsed = parse_line("RIGHT WRIST:, 1, , x, 2, 3, 0, 0, 0, 1").unwrap();
        assert_eq!(parsed.side(), Side::Right);

        match parse_line("left landmarks:, 1,2,3, 4,5").unwrap() {
            TelemetryLine::Landmarks { points, .. } => assert_eq!(points, vec![[1.0, 2.0, 3.0]]),
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_lines() {
        assert_eq!(parse_line("hello world"), None);
        assert_eq!(parse_line("wrist:, 1, 2, 3, 4, 5, 6, 7"), None);
        assert_eq!(parse_line("Left wrist:, 1, 2, 3"), None);
        assert_eq!(parse_line("Left landmarks:, 1, 2"), None);
    }
}
