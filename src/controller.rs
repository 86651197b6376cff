pub mod controller_handler;
pub mod shutdown;

pub use controller_handler::{open_catalog, run_import, Controller};
pub use shutdown::ShutdownCoordinator;
