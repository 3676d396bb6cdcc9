//! Scripted wipe: frame index to boundary position along a hold, wipe, hold curve.

use serde::Serialize;

use wipecast_core::{BoundaryPosition, WipecastConfig, WipecastError, WipecastResult};

/// Which part of the curve a frame falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WipePhase {
    HoldStart,
    Wipe,
    HoldEnd,
}

/// A deterministic wipe over a fixed number of frames.
///
/// The first `hold` frames sit at `from`, the next `wipe` frames move
/// linearly towards `to`, and every remaining frame sits at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WipeSchedule {
    total_frames: u32,
    hold_frames: u32,
    wipe_frames: u32,
    from: BoundaryPosition,
    to: BoundaryPosition,
}

impl WipeSchedule {
    /// Build a schedule from 100 to 0. Fractions must lie in `[0, 1]` and sum to at most 1.
    pub fn new(total_frames: u32, hold_fraction: f64, wipe_fraction: f64) -> WipecastResult<Self> {
        let in_range = |f: f64| (0.0..=1.0).contains(&f);
        if !in_range(hold_fraction) || !in_range(wipe_fraction) || hold_fraction + wipe_fraction > 1.0
        {
            return Err(WipecastError::InvalidArgument(format!(
                "wipe fractions must lie in [0, 1] and sum to at most 1 (hold {}, wipe {})",
                hold_fraction, wipe_fraction
            )));
        }

        let hold_frames = ((total_frames as f64 * hold_fraction).round() as u32).min(total_frames);
        let wipe_frames = ((total_frames as f64 * wipe_fraction).round() as u32)
            .min(total_frames - hold_frames);

        Ok(Self {
            total_frames,
            hold_frames,
            wipe_frames,
            from: BoundaryPosition::MAX,
            to: BoundaryPosition::MIN,
        })
    }

    pub fn from_config(config: &WipecastConfig) -> WipecastResult<Self> {
        let schedule = Self::new(
            config.frame_count(),
            config.wipe.hold_fraction,
            config.wipe.wipe_fraction,
        )?;
        Ok(schedule.with_extremes(config.wipe.from, config.wipe.to))
    }

    pub fn with_extremes(mut self, from: BoundaryPosition, to: BoundaryPosition) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    pub fn wipe_frames(&self) -> u32 {
        self.wipe_frames
    }

    pub fn from_position(&self) -> BoundaryPosition {
        self.from
    }

    pub fn to_position(&self) -> BoundaryPosition {
        self.to
    }

    pub fn phase_at(&self, frame: u64) -> WipePhase {
        let hold = self.hold_frames as u64;
        let wipe = self.wipe_frames as u64;
        if frame < hold {
            WipePhase::HoldStart
        } else if frame < hold + wipe {
            WipePhase::Wipe
        } else {
            WipePhase::HoldEnd
        }
    }

    /// Boundary position for `frame`. Frames past the end stay at the end extreme.
    pub fn position_at(&self, frame: u64) -> BoundaryPosition {
        match self.phase_at(frame) {
            WipePhase::HoldStart => self.from,
            WipePhase::HoldEnd => self.to,
            WipePhase::Wipe => {
                let t = (frame - self.hold_frames as u64) as f64 / self.wipe_frames as f64;
                self.from.lerp(self.to, t)
            }
        }
    }

    /// Every position of the schedule, in frame order.
    pub fn iter(&self) -> impl Iterator<Item = BoundaryPosition> + '_ {
        (0..self.total_frames as u64).map(move |frame| self.position_at(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thirty_frame_schedule() {
        let schedule = WipeSchedule::new(30, 0.2, 0.6).unwrap();
        assert_eq!(schedule.hold_frames(), 6);
        assert_eq!(schedule.wipe_frames(), 18);

        let positions: Vec<f64> = schedule.iter().map(|p| p.percent()).collect();
        assert_eq!(positions.len(), 30);
        for (frame, p) in positions.iter().enumerate() {
            match frame {
                0..=5 => assert_eq!(*p, 100.0, "frame {}", frame),
                24..=29 => assert_eq!(*p, 0.0, "frame {}", frame),
                _ => {
                    let expected = 100.0 - (frame as f64 - 6.0) / 18.0 * 100.0;
                    assert!((p - expected).abs() < 1e-9, "frame {}: {}", frame, p);
                }
            }
        }
        for window in positions[6..24].windows(2) {
            assert!(window[1] < window[0]);
        }
    }

    #[test]
    fn test_default_schedule_matches_config() {
        let schedule = WipeSchedule::from_config(&WipecastConfig::default()).unwrap();
        assert_eq!(schedule.total_frames(), 150);
        assert_eq!(schedule.hold_frames(), 30);
        assert_eq!(schedule.wipe_frames(), 90);
        assert_eq!(schedule.phase_at(29), WipePhase::HoldStart);
        assert_eq!(schedule.phase_at(30), WipePhase::Wipe);
        assert_eq!(schedule.phase_at(120), WipePhase::HoldEnd);
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let a: Vec<u64> = WipeSchedule::new(97, 0.13, 0.71)
            .unwrap()
            .iter()
            .map(|p| p.percent().to_bits())
            .collect();
        let b: Vec<u64> = WipeSchedule::new(97, 0.13, 0.71)
            .unwrap()
            .iter()
            .map(|p| p.percent().to_bits())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_invalid_fractions() {
        assert!(WipeSchedule::new(30, -0.1, 0.5).is_err());
        assert!(WipeSchedule::new(30, 0.5, 1.5).is_err());
        assert!(matches!(
            WipeSchedule::new(30, 0.6, 0.6),
            Err(WipecastError::InvalidArgument(_))
        ));
        assert!(WipeSchedule::new(30, f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_rounding_never_overflows_total() {
        let schedule = WipeSchedule::new(3, 0.5, 0.5).unwrap();
        assert_eq!(schedule.hold_frames() + schedule.wipe_frames(), 3);
        assert_eq!(schedule.position_at(10), BoundaryPosition::MIN);
    }

    #[test]
    fn test_custom_extremes() {
        let schedule = WipeSchedule::new(10, 0.0, 1.0)
            .unwrap()
            .with_extremes(BoundaryPosition::MIN, BoundaryPosition::MAX);
        assert_eq!(schedule.position_at(0), BoundaryPosition::MIN);
        assert_eq!(schedule.position_at(5).percent(), 50.0);
    }

    #[test]
    fn test_zero_frames() {
        let schedule = WipeSchedule::new(0, 0.2, 0.6).unwrap();
        assert_eq!(schedule.iter().count(), 0);
    }
}
