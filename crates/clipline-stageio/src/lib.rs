//! The StageIO facade (C5): the one surface a stage process uses to resolve
//! its inputs and outputs, log, and author its own manifest. Stages never
//! touch the filesystem or the Stage Registry directly.

pub mod error;
pub mod line_writer;
pub mod logger;
pub mod paths;
pub mod stage_io;

pub use error::{Error, Result};
pub use line_writer::LineLockedWriter;
pub use logger::{Level, StageLogger};
pub use stage_io::StageIo;
