//! Client-side prediction and reconciliation.

pub mod coordinates;
pub mod identity;
pub mod input;
pub mod model;
pub mod scheduler;
pub mod session;

pub use model::{ClientModel, RenderFrame};
pub use scheduler::{ClientScheduler, InputSource, Renderer, SchedulerOptions};
pub use session::ClientSession;
