pub mod logger;
pub mod throttle;

pub use logger::init_logger;
pub use throttle::ThrottledLogger;
