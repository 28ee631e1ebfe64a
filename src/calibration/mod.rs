pub mod driver;
pub mod points;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod task_queue;

pub use driver::CalibrationDriver;
pub use points::{generate_points, grid_points, GRID_POINT_COUNT};
pub use scheduler::DeferredScheduler;
pub use session::{CalibrationSession, SessionInbox, SessionTask};
pub use state::{CalibrationSnapshot, CalibrationState, CalibrationStatus};
pub use task_queue::TaskQueue;
