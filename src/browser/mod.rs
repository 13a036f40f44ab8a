//! Browser capability layer: the narrow port, the chromiumoxide adapter,
//! the in-memory stub, health probing, and lifecycle supervision.

pub mod cdp;
pub mod health;
pub mod ports;
pub mod stub;
pub mod supervisor;

pub use cdp::{CdpBrowser, LaunchOptions};
pub use ports::{BrowserPort, NavWait};
pub use stub::StubBrowser;
pub use supervisor::BrowserSupervisor;
