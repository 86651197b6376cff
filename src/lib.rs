pub mod catalog;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod playlist_import;
pub mod relay_management;
pub mod transcoder_management;
pub mod web_interface;

pub use controller::Controller;
pub use relay_management::{PlaybackOutcome, RelayManager, RelayState, RelayStatus};
