//! Client engine: state, event handling, command dispatch and sessions.

pub mod action;
pub mod dispatch;
pub mod event;
pub mod handler;
pub mod ignore;
pub mod session;
pub mod state;
pub mod sysinfo;
pub mod urls;
pub mod users;
