//! # wipecast-studio
//!
//! The interactive and scripted sides of a wipe comparison: the comparator
//! view that turns pointer, touch and slider input into a boundary position,
//! the wipe scheduler, tick sources, and the recording controller that
//! drives compositing and encoding one frame per tick.

pub mod comparator;
pub mod recorder;
pub mod schedule;
pub mod ticker;

pub use comparator::{ComparatorView, InputEvent, LabelVisibility};
pub use recorder::{
    BoundarySource, PositionTimeline, RecorderConfig, RecordingController, SessionState,
};
pub use schedule::{WipePhase, WipeSchedule};
pub use ticker::{ImmediateTicker, IntervalTicker, Ticker, TickerFactory};
