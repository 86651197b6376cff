//! Transcoder management subsystem.
//!
//! This module runs the external program (normally `ffmpeg`) that reads one
//! remote source and writes it as an HLS playlist plus segments into the
//! source's output directory.
//!
//! Re-exports:
//! - [`TranscoderSupervisor`]: spawns processes and monitors their exit.
//! - [`TranscoderHandle`], [`ProcessExited`], [`TranscoderEvent`],
//!   [`TranscoderExit`], [`TranscoderStats`], [`OutputLayout`]: core types.
//!
//! Example (non-running):
//! ```ignore
//! use restream::transcoder_management::{OutputLayout, TranscoderSupervisor};
//!
//! let supervisor = TranscoderSupervisor::new(config.transcoder.clone());
//! let layout = OutputLayout::new(&config.relay.output_root, "hls", SourceId(7));
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut handle = supervisor.start(Uuid::new_v4(), "http://example/live", &layout, events_tx)?;
//! handle.stop();
//! let event = events_rx.recv().await;
//! ```

pub mod transcoder_supervisor;
pub mod types;

pub use transcoder_supervisor::TranscoderSupervisor;
pub use types::{
    OutputLayout, ProcessExited, TranscoderEvent, TranscoderExit, TranscoderHandle,
    TranscoderStats,
};
