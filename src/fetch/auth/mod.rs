mod session;

pub use session::SessionHeaders;
