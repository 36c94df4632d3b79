mod app;
mod effects;
pub mod logging;

pub use app::run;
