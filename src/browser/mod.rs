pub mod chromium;
pub mod downloads;
pub mod driver;
pub mod headless;
pub mod selectors;

pub use chromium::ChromiumDriver;
pub use driver::{AutomationDriver, DriverLauncher};
pub use headless::ChromiumLauncher;
pub use selectors::PortalForm;
