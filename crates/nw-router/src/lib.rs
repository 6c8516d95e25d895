//! NetWarden Router Library
//!
//! The privileged control surface of the NetWarden filtering agent: a
//! message router with named, privilege-screened channels, the concrete
//! handlers that edit the policy store through it, a coalescing action
//! scheduler, the keyboard-command surface, and user-data backup/restore.
//!
//! Everything here runs on a single-threaded cooperative executor; shared
//! state is `Rc<RefCell<..>>` and deferred replies are local futures.
//!
//! # Modules
//!
//! - `request`: Wire protocol (tagged requests, sender identity)
//! - `channel`: Channel registry and handler interface
//! - `router`: Privilege screening and dispatch
//! - `handlers`: Concrete channel handlers over the policy store
//! - `scheduler`: Per-key coalescing delayed actions
//! - `commands`: Keyboard commands and the blocking-mode ladder
//! - `backup`: User-data snapshot and restore
//! - `tabs`: Host tab-management interface

pub mod backup;
pub mod channel;
pub mod commands;
pub mod handlers;
pub mod request;
pub mod router;
pub mod scheduler;
pub mod tabs;

// Re-export commonly used types
pub use backup::{RestoreOutcome, UserDataBackup};
pub use channel::{ChannelHandler, ChannelRegistry, HandlerError, Outcome, DEFAULT_CHANNEL};
pub use commands::{BlockingProfile, Command, CommandSurface, RELAX_SETTLE_MS};
pub use handlers::{AppInfo, PageRegistry, SharedState};
pub use request::{Request, SenderContext};
pub use router::{DispatchResult, MessageRouter};
pub use scheduler::CoalescingScheduler;
pub use tabs::{RecordingTabDriver, TabDriver, TabInfo};
